//! Queue consumer.
//!
//! Claims queued video jobs with `SELECT FOR UPDATE SKIP LOCKED` via
//! [`VideoJobRepo::claim_next`] and runs up to `concurrency` pipeline
//! invocations at once. Each claimed job is processed exactly once; the
//! pipeline's error message becomes the job's failure reason.

use std::sync::Arc;
use std::time::Duration;

use storyreel_db::models::video_job::VideoJob;
use storyreel_db::repositories::VideoJobRepo;
use storyreel_db::DbPool;
use storyreel_pipeline::{VideoJobRequest, VideoPipeline};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;

pub struct WorkerPool {
    pool: DbPool,
    pipeline: Arc<VideoPipeline>,
    queue: String,
    concurrency: usize,
    poll_interval: Duration,
}

impl WorkerPool {
    pub fn new(pool: DbPool, pipeline: Arc<VideoPipeline>, config: &WorkerConfig) -> Self {
        Self {
            pool,
            pipeline,
            queue: config.queue_name.clone(),
            concurrency: config.concurrency.max(1),
            poll_interval: config.queue_poll_interval,
        }
    }

    /// Claim and run jobs until `cancel` fires, then wait for in-flight
    /// jobs to finish. No new job is claimed after cancellation.
    pub async fn run(&self, cancel: CancellationToken) {
        let slots = Arc::new(Semaphore::new(self.concurrency));
        let mut running: JoinSet<()> = JoinSet::new();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(
            queue = %self.queue,
            concurrency = self.concurrency,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Worker pool started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Worker pool shutting down");
                    break;
                }
                Some(joined) = running.join_next(), if !running.is_empty() => {
                    log_join(joined);
                }
                _ = ticker.tick() => {
                    self.fill_slots(&slots, &mut running).await;
                }
            }
        }

        if !running.is_empty() {
            tracing::info!(in_flight = running.len(), "Waiting for in-flight jobs");
        }
        while let Some(joined) = running.join_next().await {
            log_join(joined);
        }
        tracing::info!("Worker pool stopped");
    }

    /// Claim jobs while a slot is free and the queue is not empty.
    async fn fill_slots(&self, slots: &Arc<Semaphore>, running: &mut JoinSet<()>) {
        loop {
            let Ok(permit) = Arc::clone(slots).try_acquire_owned() else {
                return;
            };

            let job = match VideoJobRepo::claim_next(&self.pool, &self.queue).await {
                Ok(Some(job)) => job,
                Ok(None) => return,
                Err(e) => {
                    tracing::error!(error = %e, queue = %self.queue, "Failed to claim job");
                    return;
                }
            };

            tracing::info!(
                job_id = %job.id,
                project_id = job.project_id,
                user_id = job.user_id,
                "Job claimed",
            );

            let pool = self.pool.clone();
            let pipeline = Arc::clone(&self.pipeline);
            running.spawn(async move {
                let _permit = permit;
                process_job(&pool, &pipeline, job).await;
            });
        }
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "Pipeline task aborted");
    }
}

/// Run the pipeline for one claimed job and settle the queue row.
pub async fn process_job(pool: &DbPool, pipeline: &VideoPipeline, job: VideoJob) {
    let request = VideoJobRequest {
        job_id: job.id,
        project_id: job.project_id,
        user_id: job.user_id,
    };

    match pipeline.process_video(&request).await {
        Ok(outcome) => {
            tracing::info!(
                job_id = %job.id,
                video_url = %outcome.video_url,
                duration = outcome.duration,
                "Job completed",
            );
            if let Err(e) = VideoJobRepo::complete(pool, job.id).await {
                tracing::error!(job_id = %job.id, error = %e, "Failed to mark job completed");
            }
        }
        Err(err) => {
            tracing::warn!(job_id = %job.id, error = %err, "Job failed");
            if let Err(e) = VideoJobRepo::fail(pool, job.id, &err.to_string()).await {
                tracing::error!(job_id = %job.id, error = %e, "Failed to mark job failed");
            }
        }
    }
}
