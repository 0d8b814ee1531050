//! Per-scene composition: duration reconciliation, muxing and subtitles.

use std::path::{Path, PathBuf};

use storyreel_core::ffmpeg::{media_duration, run_ffmpeg, FfmpegArgs, FfmpegError};
use storyreel_core::filter_graph::{format_float, Filter, FilterChain, FilterGraph, FilterValue};
use storyreel_core::reconcile::Reconciliation;
use storyreel_core::subtitles::{sanitize_subtitle_text, WordTimestamp};

use crate::media::MediaConfig;

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// Stretch or trim the video track to the narration length and normalise
/// it to the output frame size and rate.
pub fn reconcile_graph(plan: &Reconciliation, fps: u32, size: (u32, u32)) -> FilterGraph {
    let (w, h) = size;
    FilterGraph::new().chain(
        FilterChain::new()
            .input("0:v")
            .filter(Filter::new("setpts").arg(format!(
                "{}*PTS",
                format_float(plan.stretch_factor)
            )))
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
            )
            .filter(Filter::new("setsar").arg(1u32))
            .filter(Filter::new("fps").arg(fps))
            .filter(Filter::new("trim").opt("duration", plan.output_duration))
            .filter(Filter::new("setpts").arg("PTS-STARTPTS"))
            .output("v"),
    )
}

/// Mux narration into a generated clip.
///
/// Audio length is authoritative: a shorter clip is slowed down to span the
/// narration, a longer one is cut. The output is always re-encoded.
pub async fn add_audio_to_video(
    config: &MediaConfig,
    video: &Path,
    audio: &Path,
    output: &Path,
    size: (u32, u32),
) -> Result<Reconciliation, FfmpegError> {
    let video_duration = media_duration(&config.binaries, video).await?;
    let audio_duration = media_duration(&config.binaries, audio).await?;
    let plan = Reconciliation::plan(video_duration, audio_duration)
        .map_err(|e| FfmpegError::ParseError(e.to_string()))?;

    let graph = reconcile_graph(&plan, config.fps, size);
    tracing::debug!(
        video = %video.display(),
        video_duration,
        audio_duration,
        stretch_factor = plan.stretch_factor,
        filter = %graph,
        "Reconciling scene clip",
    );

    let args = FfmpegArgs::new()
        .input(video)
        .input(audio)
        .filter_complex(&graph)
        .map("[v]")
        .map("1:a:0")
        .args(config.video_codec_args())
        .args(config.audio_codec_args())
        .arg("-t")
        .arg(format_float(plan.output_duration))
        .output(output);
    run_ffmpeg(&config.binaries, args.as_slice()).await?;
    Ok(plan)
}

// ---------------------------------------------------------------------------
// Subtitles
// ---------------------------------------------------------------------------

/// Vertical anchor of burned-in subtitles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubtitlePosition {
    Top,
    Center,
    #[default]
    Bottom,
}

impl SubtitlePosition {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "top" => Some(Self::Top),
            "center" | "middle" => Some(Self::Center),
            "bottom" => Some(Self::Bottom),
            _ => None,
        }
    }

    /// drawtext `y` expression.
    fn y_expr(self) -> &'static str {
        match self {
            Self::Top => "h*0.1",
            Self::Center => "(h-text_h)/2",
            Self::Bottom => "h-text_h-h*0.12",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleStyle {
    pub font_size: u32,
    pub font_color: String,
    pub border_color: String,
    pub border_width: u32,
    pub position: SubtitlePosition,
    pub font_file: Option<PathBuf>,
}

impl Default for SubtitleStyle {
    fn default() -> Self {
        Self {
            font_size: 56,
            font_color: "white".to_string(),
            border_color: "black".to_string(),
            border_width: 4,
            position: SubtitlePosition::Bottom,
            font_file: None,
        }
    }
}

/// One drawtext filter visible during `[start, end]`, centred horizontally.
pub fn drawtext_filter(word: &WordTimestamp, style: &SubtitleStyle) -> Filter {
    let mut filter = Filter::new("drawtext");
    if let Some(font) = &style.font_file {
        filter = filter.opt(
            "fontfile",
            FilterValue::Text(font.to_string_lossy().to_string()),
        );
    }
    filter
        .opt("text", FilterValue::Text(word.word.clone()))
        .opt("fontsize", style.font_size)
        .opt("fontcolor", style.font_color.as_str())
        .opt("borderw", style.border_width)
        .opt("bordercolor", style.border_color.as_str())
        .opt("x", "(w-text_w)/2")
        .opt("y", style.position.y_expr())
        .opt(
            "enable",
            FilterValue::Expr(format!(
                "between(t,{},{})",
                format_float(word.start),
                format_float(word.end)
            )),
        )
}

/// Sanitise words for embedding; words left empty are dropped.
pub fn prepare_subtitle_words(words: &[WordTimestamp]) -> Vec<WordTimestamp> {
    words
        .iter()
        .filter_map(|w| {
            let text = sanitize_subtitle_text(&w.word);
            (!text.is_empty()).then(|| WordTimestamp::new(text, w.start, w.end))
        })
        .collect()
}

/// Graph drawing every word of `words` onto `[0:v]`, output `[v]`.
pub fn subtitle_graph(words: &[WordTimestamp], style: &SubtitleStyle) -> FilterGraph {
    let chain = words
        .iter()
        .fold(FilterChain::new().input("0:v"), |chain, word| {
            chain.filter(drawtext_filter(word, style))
        })
        .output("v");
    FilterGraph::new().chain(chain)
}

/// Burn timed subtitles into `video`.
///
/// Words are drawn in batches of `config.subtitle_batch_size`, each batch
/// rendering onto the previous batch's output. Every filter uses absolute
/// timestamps, so the batch size has no effect on the result.
pub async fn add_subtitles_to_video(
    config: &MediaConfig,
    video: &Path,
    words: &[WordTimestamp],
    style: &SubtitleStyle,
    output: &Path,
) -> Result<(), FfmpegError> {
    let words = prepare_subtitle_words(words);
    if words.is_empty() {
        tokio::fs::copy(video, output).await?;
        return Ok(());
    }

    let batch_size = config.subtitle_batch_size.max(1);
    let batches: Vec<&[WordTimestamp]> = words.chunks(batch_size).collect();
    let last = batches.len() - 1;
    let mut current = video.to_path_buf();

    for (i, batch) in batches.iter().enumerate() {
        let target = if i == last {
            output.to_path_buf()
        } else {
            intermediate_path(output, i)
        };
        let graph = subtitle_graph(batch, style);
        tracing::debug!(
            batch = i,
            words = batch.len(),
            filter = %graph,
            "Rendering subtitle batch",
        );

        let args = FfmpegArgs::new()
            .input(&current)
            .filter_complex(&graph)
            .map("[v]")
            .map("0:a?")
            .args(config.video_codec_args())
            .args(["-c:a", "copy"])
            .output(&target);
        run_ffmpeg(&config.binaries, args.as_slice()).await?;

        if current != video {
            let _ = tokio::fs::remove_file(&current).await;
        }
        current = target;
    }
    Ok(())
}

fn intermediate_path(output: &Path, batch: usize) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "subtitled".to_string());
    output.with_file_name(format!("{stem}.batch-{batch}.mp4"))
}
