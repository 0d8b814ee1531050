//! Repository for the `video_jobs` queue table.
//!
//! Every job is delivered at most once: `max_attempts` is fixed at 1 and a
//! failed job stays failed. Resubmission means enqueueing a new job for the
//! same project.

use sqlx::PgPool;
use storyreel_core::types::{DbId, JobId};

use crate::models::status::VideoJobStatus;
use crate::models::video_job::VideoJob;

/// Column list for `video_jobs` queries.
const COLUMNS: &str = "\
    id, queue, project_id, user_id, status_id, attempts, max_attempts, \
    error_message, created_at, claimed_at, finished_at, updated_at";

/// Delivery attempts per job. No automatic retry.
pub const MAX_ATTEMPTS: i32 = 1;

pub struct VideoJobRepo;

impl VideoJobRepo {
    /// Enqueue a pipeline invocation for a project.
    pub async fn enqueue(
        pool: &PgPool,
        queue: &str,
        project_id: DbId,
        user_id: DbId,
    ) -> Result<VideoJob, sqlx::Error> {
        let query = format!(
            "INSERT INTO video_jobs (id, queue, project_id, user_id, status_id, max_attempts) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, VideoJob>(&query)
            .bind(uuid::Uuid::now_v7())
            .bind(queue)
            .bind(project_id)
            .bind(user_id)
            .bind(VideoJobStatus::Queued.id())
            .bind(MAX_ATTEMPTS)
            .fetch_one(pool)
            .await
    }

    /// Atomically claim the oldest queued job on `queue`.
    ///
    /// Uses `SELECT FOR UPDATE SKIP LOCKED` so concurrent workers never
    /// receive the same job. Claiming consumes an attempt.
    pub async fn claim_next(pool: &PgPool, queue: &str) -> Result<Option<VideoJob>, sqlx::Error> {
        let query = format!(
            "UPDATE video_jobs \
             SET status_id = $2, attempts = attempts + 1, claimed_at = NOW(), updated_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM video_jobs \
                 WHERE queue = $1 AND status_id = $3 AND attempts < max_attempts \
                 ORDER BY created_at ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, VideoJob>(&query)
            .bind(queue)
            .bind(VideoJobStatus::Active.id())
            .bind(VideoJobStatus::Queued.id())
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: JobId) -> Result<Option<VideoJob>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM video_jobs WHERE id = $1");
        sqlx::query_as::<_, VideoJob>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Mark a job as completed.
    pub async fn complete(pool: &PgPool, id: JobId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE video_jobs \
             SET status_id = $2, finished_at = NOW(), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(VideoJobStatus::Completed.id())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mark a job as failed with the error message (the queue failure event).
    pub async fn fail(pool: &PgPool, id: JobId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE video_jobs \
             SET status_id = $2, error_message = $3, finished_at = NOW(), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(VideoJobStatus::Failed.id())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }
}
