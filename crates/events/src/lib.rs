//! In-process lifecycle events for pipeline runs.
//!
//! - [`EventBus`]: publish/subscribe hub backed by `tokio::sync::broadcast`.
//! - [`PipelineEvent`]: progress, completion and failure of one job.
//! - [`EventLogger`]: background subscriber writing every event to the log.

pub mod bus;
pub mod logger;

pub use bus::{EventBus, PipelineEvent, PipelineEventKind};
pub use logger::EventLogger;
