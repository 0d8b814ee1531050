//! Structured logging of pipeline lifecycle events.
//!
//! [`EventLogger`] subscribes to the [`EventBus`](crate::bus::EventBus) and
//! writes every event to `tracing`. It runs as a long-lived background task
//! and exits when the bus is dropped.

use tokio::sync::broadcast;

use crate::bus::{PipelineEvent, PipelineEventKind};

pub struct EventLogger;

impl EventLogger {
    /// Run the logging loop until the channel closes.
    pub async fn run(mut receiver: broadcast::Receiver<PipelineEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => Self::log(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event logger lagged, some events were not logged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::debug!("Event bus closed, event logger shutting down");
                    break;
                }
            }
        }
    }

    fn log(event: &PipelineEvent) {
        match &event.kind {
            PipelineEventKind::Progress { percent, stage } => tracing::debug!(
                job_id = %event.job_id,
                project_id = event.project_id,
                percent,
                stage = %stage,
                "{}", event.event_type()
            ),
            PipelineEventKind::Completed {
                video_url,
                duration_secs,
                ..
            } => tracing::info!(
                job_id = %event.job_id,
                project_id = event.project_id,
                video_url = %video_url,
                duration_secs,
                "{}", event.event_type()
            ),
            PipelineEventKind::Failed {
                error_kind,
                message,
            } => tracing::error!(
                job_id = %event.job_id,
                project_id = event.project_id,
                error_kind = %error_kind,
                error = %message,
                "{}", event.event_type()
            ),
        }
    }
}
