//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is shared via `Arc<EventBus>` between the worker pool and
//! every pipeline invocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storyreel_core::types::{DbId, JobId};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// PipelineEvent
// ---------------------------------------------------------------------------

/// What happened to a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEventKind {
    /// Overall progress moved forward.
    Progress { percent: u8, stage: String },
    /// The final video was stored and recorded on the project.
    Completed {
        video_url: String,
        thumbnail_url: String,
        duration_secs: f64,
    },
    /// The run failed; `error_kind` is the stable error label.
    Failed { error_kind: String, message: String },
}

/// A lifecycle event of one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub job_id: JobId,
    pub project_id: DbId,
    pub user_id: DbId,
    pub kind: PipelineEventKind,
    pub timestamp: DateTime<Utc>,
}

impl PipelineEvent {
    pub fn new(job_id: JobId, project_id: DbId, user_id: DbId, kind: PipelineEventKind) -> Self {
        Self {
            job_id,
            project_id,
            user_id,
            kind,
            timestamp: Utc::now(),
        }
    }

    /// Dot-separated event name, e.g. `"video.progress"`.
    pub fn event_type(&self) -> &'static str {
        match self.kind {
            PipelineEventKind::Progress { .. } => "video.progress",
            PipelineEventKind::Completed { .. } => "video.completed",
            PipelineEventKind::Failed { .. } => "video.failed",
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// ```rust
/// use storyreel_events::bus::{EventBus, PipelineEvent, PipelineEventKind};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(PipelineEvent::new(
///     uuid::Uuid::nil(),
///     1,
///     1,
///     PipelineEventKind::Progress { percent: 10, stage: "video_generation".into() },
/// ));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: PipelineEvent) {
        // Ignore the SendError: it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
