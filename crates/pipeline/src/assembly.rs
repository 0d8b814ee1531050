//! Final assembly: cross-transitions, background music and thumbnails.

use std::path::{Path, PathBuf};

use storyreel_core::ffmpeg::{media_duration, run_ffmpeg, FfmpegArgs, FfmpegError};
use storyreel_core::filter_graph::{format_float, Filter, FilterChain, FilterGraph};

use crate::media::MediaConfig;

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// Cross-transition between consecutive scene clips.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// `xfade` transition name, e.g. `fade`, `dissolve`, `wipeleft`.
    pub kind: String,
    /// Seconds of overlap between two clips.
    pub duration: f64,
}

impl Default for Transition {
    fn default() -> Self {
        Self {
            kind: "fade".to_string(),
            duration: 1.0,
        }
    }
}

/// Cap the overlap at half of the shortest clip so every `xfade` offset
/// stays positive.
pub fn clamp_transition(requested: f64, durations: &[f64]) -> f64 {
    let shortest = durations.iter().copied().fold(f64::INFINITY, f64::min);
    if !shortest.is_finite() || !requested.is_finite() {
        return 0.0;
    }
    requested.min(shortest / 2.0).max(0.0)
}

/// `xfade`/`acrossfade` graph joining `durations.len()` inputs.
///
/// Outputs `[vout]` and `[aout]`. Transition `i` starts where the running
/// timeline, already shortened by `i` overlaps, reaches the end of clip `i`.
pub fn xfade_graph(durations: &[f64], transition: &Transition) -> FilterGraph {
    let n = durations.len();
    let mut graph = FilterGraph::new();
    let mut elapsed = 0.0;

    for i in 1..n {
        elapsed += durations[i - 1];
        let offset = elapsed - i as f64 * transition.duration;
        let last = i == n - 1;

        let (prev_v, prev_a) = if i == 1 {
            ("0:v".to_string(), "0:a".to_string())
        } else {
            (format!("v{}", i - 1), format!("a{}", i - 1))
        };
        let (out_v, out_a) = if last {
            ("vout".to_string(), "aout".to_string())
        } else {
            (format!("v{i}"), format!("a{i}"))
        };

        graph.push(
            FilterChain::new()
                .input(prev_v)
                .input(format!("{i}:v"))
                .filter(
                    Filter::new("xfade")
                        .opt("transition", transition.kind.as_str())
                        .opt("duration", transition.duration)
                        .opt("offset", offset.max(0.0)),
                )
                .output(out_v),
        );
        graph.push(
            FilterChain::new()
                .input(prev_a)
                .input(format!("{i}:a"))
                .filter(Filter::new("acrossfade").opt("d", transition.duration))
                .output(out_a),
        );
    }
    graph
}

/// Plain `concat` of `n` inputs, used when the overlap clamps to zero.
pub fn concat_graph(n: usize) -> FilterGraph {
    let chain = (0..n)
        .fold(FilterChain::new(), |chain, i| {
            chain.input(format!("{i}:v")).input(format!("{i}:a"))
        })
        .filter(
            Filter::new("concat")
                .opt("n", n as i64)
                .opt("v", 1i64)
                .opt("a", 1i64),
        )
        .output("vout")
        .output("aout");
    FilterGraph::new().chain(chain)
}

/// Length of `n` clips joined with `overlap` seconds between neighbours.
pub fn combined_duration(durations: &[f64], overlap: f64) -> f64 {
    let total: f64 = durations.iter().sum();
    let joins = durations.len().saturating_sub(1) as f64;
    (total - joins * overlap).max(0.0)
}

/// Join composed scene clips, in the given order, with cross-transitions.
///
/// A single clip is copied unchanged. Returns the combined duration.
pub async fn combine_videos(
    config: &MediaConfig,
    clips: &[PathBuf],
    transition: &Transition,
    output: &Path,
) -> Result<f64, FfmpegError> {
    match clips {
        [] => Err(FfmpegError::MediaNotFound("no clips to combine".to_string())),
        [only] => {
            tokio::fs::copy(only, output).await?;
            media_duration(&config.binaries, output).await
        }
        _ => {
            let mut durations = Vec::with_capacity(clips.len());
            for clip in clips {
                durations.push(media_duration(&config.binaries, clip).await?);
            }

            let overlap = clamp_transition(transition.duration, &durations);
            let graph = if overlap > 0.0 {
                xfade_graph(
                    &durations,
                    &Transition {
                        kind: transition.kind.clone(),
                        duration: overlap,
                    },
                )
            } else {
                concat_graph(clips.len())
            };
            tracing::debug!(
                clips = clips.len(),
                overlap,
                filter = %graph,
                "Combining scene clips",
            );

            let args = clips
                .iter()
                .fold(FfmpegArgs::new(), |args, clip| args.input(clip))
                .filter_complex(&graph)
                .map("[vout]")
                .map("[aout]")
                .args(config.video_codec_args())
                .args(config.audio_codec_args())
                .output(output);
            run_ffmpeg(&config.binaries, args.as_slice()).await?;
            Ok(combined_duration(&durations, overlap))
        }
    }
}

// ---------------------------------------------------------------------------
// Music
// ---------------------------------------------------------------------------

/// Narration at full volume over looped, attenuated music. The mix lasts as
/// long as the narration track.
pub fn music_mix_graph(volume: f64) -> FilterGraph {
    FilterGraph::new()
        .chain(
            FilterChain::new()
                .input("1:a")
                .filter(Filter::new("volume").arg(volume))
                .output("bg"),
        )
        .chain(
            FilterChain::new()
                .input("0:a")
                .input("bg")
                .filter(
                    Filter::new("amix")
                        .opt("inputs", 2i64)
                        .opt("duration", "first")
                        .opt("dropout_transition", 0i64)
                        .opt("normalize", 0i64),
                )
                .output("aout"),
        )
}

/// Mix background music under the video's narration. The video stream is
/// copied, not re-encoded.
pub async fn add_music_to_video(
    config: &MediaConfig,
    video: &Path,
    music: &Path,
    output: &Path,
    volume: f64,
) -> Result<(), FfmpegError> {
    let graph = music_mix_graph(volume);
    tracing::debug!(filter = %graph, volume, "Mixing background music");

    let args = FfmpegArgs::new()
        .input(video)
        .args(["-stream_loop", "-1"])
        .input(music)
        .filter_complex(&graph)
        .map("0:v")
        .map("[aout]")
        .args(["-c:v", "copy"])
        .args(config.audio_codec_args())
        .output(output);
    run_ffmpeg(&config.binaries, args.as_slice()).await
}

// ---------------------------------------------------------------------------
// Thumbnail
// ---------------------------------------------------------------------------

pub fn thumbnail_graph(size: (u32, u32)) -> FilterGraph {
    let (w, h) = size;
    FilterGraph::new().chain(
        FilterChain::new()
            .filter(
                Filter::new("scale")
                    .arg(w)
                    .arg(h)
                    .opt("force_original_aspect_ratio", "decrease"),
            )
            .filter(
                Filter::new("pad")
                    .arg(w)
                    .arg(h)
                    .arg("(ow-iw)/2")
                    .arg("(oh-ih)/2"),
            ),
    )
}

/// Extract the frame at `at_seconds` as a JPEG of the preset size.
pub async fn generate_thumbnail(
    config: &MediaConfig,
    video: &Path,
    at_seconds: f64,
    size: (u32, u32),
    output: &Path,
) -> Result<(), FfmpegError> {
    let args = FfmpegArgs::new()
        .arg("-ss")
        .arg(format_float(at_seconds.max(0.0)))
        .input(video)
        .args(["-frames:v", "1", "-update", "1"])
        .arg("-vf")
        .arg(thumbnail_graph(size).to_string())
        .args(["-q:v", "2"])
        .output(output);
    run_ffmpeg(&config.binaries, args.as_slice()).await
}
