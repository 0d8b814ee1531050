//! Timestamped narration synthesis.
//!
//! Each scene's narration is synthesized with character-level alignment,
//! turned into subtitle-ready word units, and padded with silence on both
//! ends. Word timings are shifted by the leading pad so they stay aligned
//! with the padded audio.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use storyreel_core::capabilities::SpeechProvider;
use storyreel_core::ffmpeg::{run_ffmpeg, FfmpegArgs, FfmpegError};
use storyreel_core::filter_graph::{Filter, FilterChain, FilterGraph};
use storyreel_core::subtitles::{
    extract_words, optimize_words_for_subtitles, shift_words, WordTimestamp,
};

use crate::error::PipelineError;
use crate::media::{MediaConfig, MediaEngine};

/// Silence added around narration, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NarrationPadding {
    pub lead: f64,
    pub tail: f64,
}

impl Default for NarrationPadding {
    fn default() -> Self {
        Self {
            lead: 0.25,
            tail: 0.5,
        }
    }
}

impl NarrationPadding {
    /// Widen both pads to at least `overlap` seconds, so a cross-transition
    /// of that length only blends silence and never fades speech.
    pub fn covering(self, overlap: f64) -> Self {
        let overlap = if overlap.is_finite() { overlap.max(0.0) } else { 0.0 };
        Self {
            lead: self.lead.max(overlap),
            tail: self.tail.max(overlap),
        }
    }

    pub fn graph(&self) -> FilterGraph {
        let lead_ms = (self.lead.max(0.0) * 1000.0).round() as i64;
        FilterGraph::new().chain(
            FilterChain::new()
                .input("0:a")
                .filter(Filter::new("adelay").opt("delays", lead_ms).opt("all", 1i64))
                .filter(Filter::new("apad").opt("pad_dur", self.tail.max(0.0)))
                .output("a"),
        )
    }
}

/// Write `input` to `output` with `padding` of silence around it.
pub async fn pad_audio(
    config: &MediaConfig,
    input: &Path,
    output: &Path,
    padding: &NarrationPadding,
) -> Result<(), FfmpegError> {
    let args = FfmpegArgs::new()
        .input(input)
        .filter_complex(&padding.graph())
        .map("[a]")
        .args(config.audio_codec_args())
        .output(output);
    run_ffmpeg(&config.binaries, args.as_slice()).await
}

/// Narration of one scene, ready for composition.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNarration {
    pub order: i32,
    /// Padded narration audio.
    pub audio_path: PathBuf,
    /// Subtitle units, relative to the start of the padded audio.
    pub words: Vec<WordTimestamp>,
    /// Padded audio length in seconds.
    pub duration: f64,
}

pub struct NarrationSynthesizer {
    speech: Arc<dyn SpeechProvider>,
    media: Arc<dyn MediaEngine>,
    padding: NarrationPadding,
}

impl NarrationSynthesizer {
    pub fn new(
        speech: Arc<dyn SpeechProvider>,
        media: Arc<dyn MediaEngine>,
        padding: NarrationPadding,
    ) -> Self {
        Self {
            speech,
            media,
            padding,
        }
    }

    /// Synthesize, pad and time one scene's narration into `dir`.
    pub async fn synthesize(
        &self,
        order: i32,
        text: &str,
        voice_id: &str,
        dir: &Path,
    ) -> Result<SceneNarration, PipelineError> {
        let speech = self
            .speech
            .synthesize(text, voice_id)
            .await
            .map_err(|e| PipelineError::Provider(format!("Narration failed for scene {order}: {e}")))?;

        let words = extract_words(&speech.alignment).map_err(|e| {
            PipelineError::Provider(format!("Invalid alignment for scene {order}: {e}"))
        })?;
        let units = optimize_words_for_subtitles(&words);

        let raw = dir.join(format!(
            "scene-{order}-narration-raw.{}",
            audio_extension(&speech.content_type)
        ));
        tokio::fs::write(&raw, &speech.audio).await?;

        let padded = dir.join(format!("scene-{order}-narration.m4a"));
        self.media.pad_audio(&raw, &padded, &self.padding).await?;
        let duration = self.media.media_duration(&padded).await?;

        tracing::debug!(
            scene_order = order,
            words = units.len(),
            duration,
            "Narration synthesized",
        );

        Ok(SceneNarration {
            order,
            audio_path: padded,
            words: shift_words(&units, self.padding.lead),
            duration,
        })
    }
}

fn audio_extension(content_type: &str) -> &'static str {
    match content_type.split(';').next().unwrap_or("").trim() {
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/ogg" => "ogg",
        "audio/aac" | "audio/mp4" => "m4a",
        _ => "mp3",
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use storyreel_core::capabilities::{ProviderError, SpeechSynthesis};
    use storyreel_core::reconcile::Reconciliation;
    use storyreel_core::resolution::AspectRatio;
    use storyreel_core::subtitles::CharacterAlignment;

    use super::*;
    use crate::assembly::Transition;
    use crate::compositor::SubtitleStyle;

    struct FixedSpeech {
        alignment: CharacterAlignment,
    }

    #[async_trait]
    impl SpeechProvider for FixedSpeech {
        async fn synthesize(&self, _text: &str, _voice_id: &str) -> Result<SpeechSynthesis, ProviderError> {
            Ok(SpeechSynthesis {
                audio: b"ID3".to_vec(),
                content_type: "audio/mpeg".into(),
                alignment: self.alignment.clone(),
            })
        }
    }

    /// Copies inputs and reports a fixed duration.
    struct CopyEngine {
        duration: f64,
        padded: Mutex<Vec<(PathBuf, PathBuf)>>,
    }

    #[async_trait]
    impl MediaEngine for CopyEngine {
        async fn media_duration(&self, _path: &Path) -> Result<f64, FfmpegError> {
            Ok(self.duration)
        }

        async fn pad_audio(&self, input: &Path, output: &Path, _padding: &NarrationPadding) -> Result<(), FfmpegError> {
            tokio::fs::copy(input, output).await?;
            self.padded
                .lock()
                .unwrap()
                .push((input.to_path_buf(), output.to_path_buf()));
            Ok(())
        }

        async fn add_audio_to_video(&self, _v: &Path, _a: &Path, _o: &Path, _r: AspectRatio) -> Result<Reconciliation, FfmpegError> {
            unreachable!()
        }

        async fn add_subtitles_to_video(&self, _v: &Path, _w: &[WordTimestamp], _s: &SubtitleStyle, _o: &Path) -> Result<(), FfmpegError> {
            unreachable!()
        }

        async fn combine_videos(&self, _c: &[PathBuf], _t: &Transition, _o: &Path) -> Result<f64, FfmpegError> {
            unreachable!()
        }

        async fn add_music_to_video(&self, _v: &Path, _m: &Path, _o: &Path, _vol: f64) -> Result<(), FfmpegError> {
            unreachable!()
        }

        async fn generate_thumbnail(&self, _v: &Path, _at: f64, _r: AspectRatio, _o: &Path) -> Result<(), FfmpegError> {
            unreachable!()
        }
    }

    fn alignment(text: &str, step: f64) -> CharacterAlignment {
        let n = text.chars().count();
        CharacterAlignment {
            characters: text.chars().map(String::from).collect(),
            start_times: (0..n).map(|i| i as f64 * step).collect(),
            end_times: (0..n).map(|i| (i + 1) as f64 * step).collect(),
        }
    }

    #[tokio::test]
    async fn words_are_merged_and_shifted_by_lead_padding() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(CopyEngine {
            duration: 4.0,
            padded: Mutex::new(Vec::new()),
        });
        let synth = NarrationSynthesizer::new(
            Arc::new(FixedSpeech {
                alignment: alignment("A dog.", 0.1),
            }),
            engine.clone(),
            NarrationPadding::default(),
        );

        let narration = synth.synthesize(2, "A dog.", "voice", dir.path()).await.unwrap();

        assert_eq!(narration.order, 2);
        assert_eq!(narration.duration, 4.0);
        assert_eq!(narration.words.len(), 1);
        assert_eq!(narration.words[0].word, "A dog");
        assert!((narration.words[0].start - 0.25).abs() < 1e-9);
        assert!((narration.words[0].end - 0.75).abs() < 1e-9);
        assert_eq!(
            narration.audio_path,
            dir.path().join("scene-2-narration.m4a")
        );
        let padded = engine.padded.lock().unwrap();
        assert_eq!(padded[0].0, dir.path().join("scene-2-narration-raw.mp3"));
    }

    #[tokio::test]
    async fn mismatched_alignment_is_a_provider_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut bad = alignment("hi", 0.1);
        bad.end_times.pop();
        let synth = NarrationSynthesizer::new(
            Arc::new(FixedSpeech { alignment: bad }),
            Arc::new(CopyEngine {
                duration: 1.0,
                padded: Mutex::new(Vec::new()),
            }),
            NarrationPadding::default(),
        );

        let err = synth.synthesize(1, "hi", "voice", dir.path()).await.unwrap_err();
        assert_matches!(err, PipelineError::Provider(msg) if msg.contains("scene 1"));
    }

    #[test]
    fn covering_widens_short_pads_only() {
        let padding = NarrationPadding::default().covering(1.0);
        assert_eq!(padding, NarrationPadding { lead: 1.0, tail: 1.0 });

        let wide = NarrationPadding { lead: 1.5, tail: 2.0 };
        assert_eq!(wide.covering(1.0), wide);
        assert_eq!(NarrationPadding::default().covering(f64::NAN), NarrationPadding::default());
    }

    #[test]
    fn padding_graph() {
        assert_eq!(
            NarrationPadding::default().graph().to_string(),
            "[0:a]adelay=delays=250:all=1,apad=pad_dur=0.5[a]"
        );
    }

    #[test]
    fn extension_from_content_type() {
        assert_eq!(audio_extension("audio/mpeg"), "mp3");
        assert_eq!(audio_extension("audio/wav; codecs=1"), "wav");
        assert_eq!(audio_extension(""), "mp3");
    }
}
