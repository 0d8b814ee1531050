//! Media assembly pipeline for narrated videos.
//!
//! Stages run strictly in order; per-scene work within a stage is fanned
//! out concurrently and joined before the next stage starts.
//!
//! - [`poller`]: submit and poll long-running generation jobs.
//! - [`narration`]: timestamped narration synthesis and padding.
//! - [`compositor`]: per-scene audio/video reconciliation and subtitles.
//! - [`assembly`]: transitions, background music and thumbnails.
//! - [`orchestrator`]: drives the stages, owns progress and failure.

pub mod assembly;
pub mod clock;
pub mod compositor;
pub mod error;
pub mod media;
pub mod narration;
pub mod orchestrator;
pub mod poller;
pub mod progress;
pub mod workspace;

pub use error::PipelineError;
pub use media::{FfmpegEngine, MediaConfig, MediaEngine};
pub use orchestrator::{PipelineConfig, PipelineDeps, VideoJobRequest, VideoOutcome, VideoPipeline};
