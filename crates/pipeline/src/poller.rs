//! Submit/poll/download for long-running generation jobs.
//!
//! Jobs are submitted up front and then polled together at a fixed
//! interval. A finished job's result is streamed into durable storage at
//! the job's storage key. The batch is fail-fast: the first job reported
//! as failed aborts the whole batch.

use std::sync::Arc;

use storyreel_core::capabilities::{GenerationProvider, ObjectStorage};
use storyreel_core::generation::{
    GenerationJob, GenerationKind, GenerationRequest, GenerationStatus,
};
use storyreel_core::poll::{transition, PollPolicy, PollState};

use crate::clock::Clock;
use crate::error::PipelineError;
use crate::progress::ProgressSink;

/// What to render and where its result goes.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub model_id: String,
    pub kind: GenerationKind,
    pub request: GenerationRequest,
    pub storage_key: String,
    /// Owner label used in errors and logs, e.g. `scene 3`.
    pub label: String,
    /// Carried onto the submitted job so results can be matched by scene.
    pub scene_order: Option<i32>,
}

pub struct GenerationPoller {
    provider: Arc<dyn GenerationProvider>,
    storage: Arc<dyn ObjectStorage>,
    clock: Arc<dyn Clock>,
    policy: PollPolicy,
}

impl GenerationPoller {
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        storage: Arc<dyn ObjectStorage>,
        clock: Arc<dyn Clock>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            provider,
            storage,
            clock,
            policy,
        }
    }

    /// Submit one job. The returned job is `processing`.
    pub async fn submit(&self, spec: &JobSpec) -> Result<GenerationJob, PipelineError> {
        let request_id = self
            .provider
            .submit(&spec.model_id, &spec.request)
            .await
            .map_err(|e| PipelineError::Provider(format!("Submission failed for {}: {e}", spec.label)))?;

        tracing::info!(
            model_id = %spec.model_id,
            request_id = %request_id,
            kind = spec.kind.as_str(),
            label = %spec.label,
            "Generation job submitted",
        );

        let mut job = GenerationJob::submitted(
            request_id,
            spec.storage_key.clone(),
            spec.model_id.clone(),
            spec.kind,
            spec.label.clone(),
        );
        job.scene_order = spec.scene_order;
        Ok(job)
    }

    /// Submit every spec concurrently, preserving input order.
    pub async fn submit_all(&self, specs: &[JobSpec]) -> Result<Vec<GenerationJob>, PipelineError> {
        futures::future::try_join_all(specs.iter().map(|spec| self.submit(spec))).await
    }

    /// Poll `jobs` until all complete, one fails, or attempts run out.
    ///
    /// `on_progress` receives `completed / total` once per iteration.
    pub async fn poll_batch(
        &self,
        jobs: &mut [GenerationJob],
        on_progress: &dyn ProgressSink,
    ) -> Result<(), PipelineError> {
        let total = jobs.len();
        if total == 0 {
            return Ok(());
        }

        let mut states: Vec<PollState> = jobs
            .iter()
            .map(|job| match job.status {
                GenerationStatus::Completed => PollState::Completed {
                    result_url: job.result_url.clone().unwrap_or_default(),
                },
                _ => PollState::Submitted,
            })
            .collect();

        loop {
            self.clock.sleep(self.policy.interval).await;

            for (job, state) in jobs.iter_mut().zip(states.iter_mut()) {
                if state.is_terminal() {
                    continue;
                }

                let observed = self
                    .provider
                    .check_status(&job.model_id, &job.request_id)
                    .await
                    .map_err(|e| {
                        PipelineError::Provider(format!("Status check failed for {}: {e}", job.label))
                    })?;
                *state = transition(state, &observed, &self.policy);

                match state {
                    PollState::Completed { result_url } => {
                        let stored = self.store_result(job, result_url).await?;
                        job.result_url = Some(stored);
                        job.status = GenerationStatus::Completed;
                        tracing::info!(
                            request_id = %job.request_id,
                            label = %job.label,
                            "Generation job completed",
                        );
                    }
                    PollState::Failed { reason } => {
                        job.status = GenerationStatus::Failed;
                        job.error = Some(reason.clone());
                        tracing::warn!(
                            request_id = %job.request_id,
                            label = %job.label,
                            reason = %reason,
                            "Generation job failed",
                        );
                        return Err(PipelineError::Provider(format!(
                            "Generation failed for {}: {reason}",
                            job.label
                        )));
                    }
                    PollState::Polling { attempts } => {
                        tracing::debug!(
                            request_id = %job.request_id,
                            label = %job.label,
                            attempts = *attempts,
                            "Generation job pending",
                        );
                    }
                    PollState::Submitted | PollState::TimedOut { .. } => {}
                }
            }

            let completed = jobs
                .iter()
                .filter(|j| j.status == GenerationStatus::Completed)
                .count();
            on_progress.report(completed as f64 / total as f64).await?;

            if completed == total {
                return Ok(());
            }

            if let Some(attempts) = states.iter().find_map(|s| match s {
                PollState::TimedOut { attempts } => Some(*attempts),
                _ => None,
            }) {
                let pending: Vec<&str> = jobs
                    .iter()
                    .filter(|j| j.status != GenerationStatus::Completed)
                    .map(|j| j.label.as_str())
                    .collect();
                return Err(PipelineError::Timeout {
                    attempts,
                    pending: pending.join(", "),
                });
            }
        }
    }

    /// Download a finished result and store it at the job's storage key.
    async fn store_result(&self, job: &GenerationJob, result_url: &str) -> Result<String, PipelineError> {
        let bytes = self
            .provider
            .fetch_result(result_url)
            .await
            .map_err(|e| PipelineError::Provider(format!("Download failed for {}: {e}", job.label)))?;
        let url = self
            .storage
            .upload_buffer(bytes, &job.storage_key, job.kind.content_type())
            .await?;
        Ok(url)
    }
}
