//! Persisted, monotonically increasing progress of one pipeline run.

use std::sync::Arc;

use async_trait::async_trait;
use storyreel_core::capabilities::ProjectStore;
use storyreel_core::progress::{MonotonicProgress, PipelineStage};
use storyreel_core::project::{JobRecordStatus, Project};
use storyreel_core::types::{DbId, JobId};
use storyreel_events::{EventBus, PipelineEvent, PipelineEventKind};
use tokio::sync::Mutex;

use crate::clock::Clock;
use crate::error::PipelineError;

/// Receives the completed fraction (`0..=1`) of a unit of work.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, fraction: f64) -> Result<(), PipelineError>;
}

/// Writes progress into `history[job_id]` of the project record.
///
/// All project writes of one run go through [`ProgressReporter::modify`],
/// which holds a lock across the load-modify-save cycle so the run's own
/// concurrent scene tasks never overwrite each other. Writers outside this
/// run are not coordinated with: the store is last-writer-wins.
pub struct ProgressReporter {
    store: Arc<dyn ProjectStore>,
    events: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    job_id: JobId,
    project_id: DbId,
    user_id: DbId,
    progress: Mutex<MonotonicProgress>,
}

impl ProgressReporter {
    pub fn new(
        store: Arc<dyn ProjectStore>,
        events: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        job_id: JobId,
        project_id: DbId,
        user_id: DbId,
    ) -> Self {
        Self {
            store,
            events,
            clock,
            job_id,
            project_id,
            user_id,
            progress: Mutex::new(MonotonicProgress::new()),
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Load, mutate and save the project while holding the run's lock.
    pub async fn modify<F>(&self, f: F) -> Result<Project, PipelineError>
    where
        F: FnOnce(&mut Project) -> Result<(), PipelineError> + Send,
    {
        let _guard = self.progress.lock().await;
        self.modify_locked(f).await
    }

    async fn modify_locked<F>(&self, f: F) -> Result<Project, PipelineError>
    where
        F: FnOnce(&mut Project) -> Result<(), PipelineError> + Send,
    {
        let mut project = self.store.load_project(self.project_id).await?;
        f(&mut project)?;
        self.store.save_project(&project).await?;
        Ok(project)
    }

    /// Record `fraction` of `stage`. Writes only when the overall
    /// percentage increases.
    pub async fn stage(&self, stage: PipelineStage, fraction: f64) -> Result<(), PipelineError> {
        let mut progress = self.progress.lock().await;
        let percent = stage.percent_at(fraction);
        if percent <= progress.current() {
            return Ok(());
        }

        let job_id = self.job_id;
        let now = self.clock.now();
        self.modify_locked(|project| {
            project.record_job(job_id, JobRecordStatus::Processing, percent, None, now);
            Ok(())
        })
        .await?;
        progress.advance(percent);
        drop(progress);

        tracing::debug!(job_id = %self.job_id, stage = stage.name(), percent, "Progress");
        self.events.publish(PipelineEvent::new(
            self.job_id,
            self.project_id,
            self.user_id,
            PipelineEventKind::Progress {
                percent,
                stage: stage.name().to_string(),
            },
        ));
        Ok(())
    }

    /// A [`ProgressSink`] mapping fractions into `stage`'s band.
    pub fn sink(&self, stage: PipelineStage) -> StageProgress<'_> {
        StageProgress {
            reporter: self,
            stage,
        }
    }
}

pub struct StageProgress<'a> {
    reporter: &'a ProgressReporter,
    stage: PipelineStage,
}

#[async_trait]
impl ProgressSink for StageProgress<'_> {
    async fn report(&self, fraction: f64) -> Result<(), PipelineError> {
        self.reporter.stage(self.stage, fraction).await
    }
}
