//! FFmpeg/FFprobe command utilities.
//!
//! Every media operation of the pipeline goes through [`run_ffmpeg`] and
//! [`inspect_media`]; the binaries are injected through [`MediaBinaries`].

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;

use crate::filter_graph::FilterGraph;

/// Keep at most this many bytes of stderr in error messages.
const STDERR_TAIL_BYTES: usize = 2000;

/// Error type for FFmpeg/FFprobe operations.
#[derive(Debug, thiserror::Error)]
pub enum FfmpegError {
    #[error("ffprobe/ffmpeg binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffprobe/ffmpeg execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse ffprobe output: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("media file not found: {0}")]
    MediaNotFound(String),
}

/// Locations of the ffmpeg and ffprobe executables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaBinaries {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for MediaBinaries {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl MediaBinaries {
    /// Whether both binaries can be executed.
    pub async fn available(&self) -> bool {
        for bin in [&self.ffmpeg, &self.ffprobe] {
            let status = tokio::process::Command::new(bin)
                .arg("-version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
            if !matches!(status, Ok(s) if s.success()) {
                return false;
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

/// Top-level ffprobe JSON output (`-print_format json -show_format -show_streams`).
#[derive(Debug, Deserialize)]
pub struct FfprobeOutput {
    #[serde(default)]
    pub streams: Vec<FfprobeStream>,
    pub format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
pub struct FfprobeStream {
    pub index: i32,
    pub codec_type: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub duration: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FfprobeFormat {
    pub duration: Option<String>,
    pub format_name: Option<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

fn ensure_exists(path: &Path) -> Result<(), FfmpegError> {
    if !path.exists() {
        return Err(FfmpegError::MediaNotFound(
            path.to_string_lossy().to_string(),
        ));
    }
    Ok(())
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_TAIL_BYTES {
        return text.to_string();
    }
    let mut cut = text.len() - STDERR_TAIL_BYTES;
    while !text.is_char_boundary(cut) {
        cut += 1;
    }
    format!("...{}", &text[cut..])
}

/// Run `ffprobe` on a media file and return the parsed JSON output.
pub async fn inspect_media(bins: &MediaBinaries, path: &Path) -> Result<FfprobeOutput, FfmpegError> {
    ensure_exists(path)?;

    let output = tokio::process::Command::new(&bins.ffprobe)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(FfmpegError::NotFound)?;

    if !output.status.success() {
        return Err(FfmpegError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: stderr_tail(&output.stderr),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str::<FfprobeOutput>(&stdout)
        .map_err(|e| FfmpegError::ParseError(format!("{e}: {stdout}")))
}

/// Inspect a file and return its duration in seconds.
pub async fn media_duration(bins: &MediaBinaries, path: &Path) -> Result<f64, FfmpegError> {
    let info = inspect_media(bins, path).await?;
    let duration = parse_duration(&info);
    if duration <= 0.0 {
        return Err(FfmpegError::ParseError(format!(
            "no duration reported for {}",
            path.display()
        )));
    }
    Ok(duration)
}

/// Run ffmpeg with `args`, overwriting outputs and logging only errors.
pub async fn run_ffmpeg<I, S>(bins: &MediaBinaries, args: I) -> Result<(), FfmpegError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = tokio::process::Command::new(&bins.ffmpeg)
        .args(["-y", "-hide_banner", "-loglevel", "error"])
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(FfmpegError::NotFound)?;

    if !output.status.success() {
        return Err(FfmpegError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: stderr_tail(&output.stderr),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Argument builder
// ---------------------------------------------------------------------------

/// Ordered ffmpeg argument list.
#[derive(Debug, Clone, Default)]
pub struct FfmpegArgs {
    args: Vec<OsString>,
}

impl FfmpegArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// `-i <path>`
    pub fn input(self, path: &Path) -> Self {
        self.arg("-i").arg(path)
    }

    /// `-filter_complex <graph>`
    pub fn filter_complex(self, graph: &FilterGraph) -> Self {
        self.arg("-filter_complex").arg(graph.to_string())
    }

    /// `-map <label>`; bracketed pad labels and stream specifiers alike.
    pub fn map(self, spec: &str) -> Self {
        self.arg("-map").arg(spec)
    }

    pub fn output(self, path: &Path) -> Self {
        self.arg(path)
    }

    pub fn as_slice(&self) -> &[OsString] {
        &self.args
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

fn first_stream_of<'a>(info: &'a FfprobeOutput, kind: &str) -> Option<&'a FfprobeStream> {
    info
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some(kind))
}

/// Parse the media duration in seconds from ffprobe output.
pub fn parse_duration(info: &FfprobeOutput) -> f64 {
    // Format-level duration first.
    if let Some(secs) = info
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
    {
        return secs;
    }
    // Fall back to the first stream that reports one.
    info
        .streams
        .iter()
        .filter_map(|s| s.duration.as_deref())
        .find_map(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// First video stream's `(width, height)`.
pub fn parse_resolution(info: &FfprobeOutput) -> (i32, i32) {
    first_stream_of(info, "video")
        .map(|s| (s.width.unwrap_or(0), s.height.unwrap_or(0)))
        .unwrap_or((0, 0))
}
