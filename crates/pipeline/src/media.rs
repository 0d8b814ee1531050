//! The media-tool seam.
//!
//! The orchestrator drives every audio/video transformation through
//! [`MediaEngine`]. [`FfmpegEngine`] is the production implementation;
//! tests substitute an engine that writes placeholder files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use storyreel_core::ffmpeg::{self, FfmpegError, MediaBinaries};
use storyreel_core::reconcile::Reconciliation;
use storyreel_core::resolution::AspectRatio;
use storyreel_core::subtitles::WordTimestamp;

use crate::assembly::{self, Transition};
use crate::compositor::{self, SubtitleStyle};
use crate::narration::{self, NarrationPadding};

/// Output frame rate of every composed clip.
pub const OUTPUT_FPS: u32 = 24;

/// Words drawn per ffmpeg invocation when burning in subtitles.
pub const DEFAULT_SUBTITLE_BATCH_SIZE: usize = 40;

#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub binaries: MediaBinaries,
    pub fps: u32,
    pub subtitle_batch_size: usize,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            binaries: MediaBinaries::default(),
            fps: OUTPUT_FPS,
            subtitle_batch_size: DEFAULT_SUBTITLE_BATCH_SIZE,
        }
    }
}

impl MediaConfig {
    /// H.264 preset shared by every re-encode.
    pub fn video_codec_args(&self) -> [&'static str; 8] {
        [
            "-c:v", "libx264", "-preset", "veryfast", "-crf", "23", "-pix_fmt", "yuv420p",
        ]
    }

    pub fn audio_codec_args(&self) -> [&'static str; 8] {
        ["-c:a", "aac", "-b:a", "192k", "-ar", "44100", "-ac", "2"]
    }
}

#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Duration of a media file in seconds.
    async fn media_duration(&self, path: &Path) -> Result<f64, FfmpegError>;

    /// Surround narration audio with silence.
    async fn pad_audio(
        &self,
        input: &Path,
        output: &Path,
        padding: &NarrationPadding,
    ) -> Result<(), FfmpegError>;

    /// Mux narration into a clip, stretching or trimming the video to the
    /// narration length.
    async fn add_audio_to_video(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        aspect: AspectRatio,
    ) -> Result<Reconciliation, FfmpegError>;

    async fn add_subtitles_to_video(
        &self,
        video: &Path,
        words: &[WordTimestamp],
        style: &SubtitleStyle,
        output: &Path,
    ) -> Result<(), FfmpegError>;

    /// Join clips in order; returns the combined duration.
    async fn combine_videos(
        &self,
        clips: &[PathBuf],
        transition: &Transition,
        output: &Path,
    ) -> Result<f64, FfmpegError>;

    async fn add_music_to_video(
        &self,
        video: &Path,
        music: &Path,
        output: &Path,
        volume: f64,
    ) -> Result<(), FfmpegError>;

    async fn generate_thumbnail(
        &self,
        video: &Path,
        at_seconds: f64,
        aspect: AspectRatio,
        output: &Path,
    ) -> Result<(), FfmpegError>;
}

/// [`MediaEngine`] backed by the ffmpeg and ffprobe executables.
#[derive(Debug, Clone, Default)]
pub struct FfmpegEngine {
    config: MediaConfig,
}

impl FfmpegEngine {
    pub fn new(config: MediaConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MediaConfig {
        &self.config
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn media_duration(&self, path: &Path) -> Result<f64, FfmpegError> {
        ffmpeg::media_duration(&self.config.binaries, path).await
    }

    async fn pad_audio(
        &self,
        input: &Path,
        output: &Path,
        padding: &NarrationPadding,
    ) -> Result<(), FfmpegError> {
        narration::pad_audio(&self.config, input, output, padding).await
    }

    async fn add_audio_to_video(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        aspect: AspectRatio,
    ) -> Result<Reconciliation, FfmpegError> {
        compositor::add_audio_to_video(&self.config, video, audio, output, aspect.resolution()).await
    }

    async fn add_subtitles_to_video(
        &self,
        video: &Path,
        words: &[WordTimestamp],
        style: &SubtitleStyle,
        output: &Path,
    ) -> Result<(), FfmpegError> {
        compositor::add_subtitles_to_video(&self.config, video, words, style, output).await
    }

    async fn combine_videos(
        &self,
        clips: &[PathBuf],
        transition: &Transition,
        output: &Path,
    ) -> Result<f64, FfmpegError> {
        assembly::combine_videos(&self.config, clips, transition, output).await
    }

    async fn add_music_to_video(
        &self,
        video: &Path,
        music: &Path,
        output: &Path,
        volume: f64,
    ) -> Result<(), FfmpegError> {
        assembly::add_music_to_video(&self.config, video, music, output, volume).await
    }

    async fn generate_thumbnail(
        &self,
        video: &Path,
        at_seconds: f64,
        aspect: AspectRatio,
        output: &Path,
    ) -> Result<(), FfmpegError> {
        assembly::generate_thumbnail(&self.config, video, at_seconds, aspect.resolution(), output)
            .await
    }
}
