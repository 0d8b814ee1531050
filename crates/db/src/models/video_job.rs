//! Queue row model for the `video_jobs` table.

use sqlx::FromRow;
use storyreel_core::types::{DbId, JobId, Timestamp};

use super::status::{StatusId, VideoJobStatus};

/// A row from the `video_jobs` table: one queued pipeline invocation.
#[derive(Debug, Clone, FromRow)]
pub struct VideoJob {
    pub id: JobId,
    pub queue: String,
    pub project_id: DbId,
    pub user_id: DbId,
    pub status_id: StatusId,
    pub attempts: i32,
    pub max_attempts: i32,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub claimed_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl VideoJob {
    pub fn status(&self) -> Option<VideoJobStatus> {
        VideoJobStatus::from_id(self.status_id)
    }
}
