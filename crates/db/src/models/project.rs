//! Project row model.
//!
//! Breakdown, settings, history and the final video are stored as JSONB
//! documents in their camelCase wire shape.

use std::collections::BTreeMap;

use sqlx::types::Json;
use sqlx::FromRow;
use storyreel_core::error::CoreError;
use storyreel_core::project::{
    Breakdown, JobRecord, Project, ProjectSettings, ProjectStatus, VideoInfo,
};
use storyreel_core::types::{DbId, JobId, Timestamp};

/// A row from the `projects` table.
#[derive(Debug, Clone, FromRow)]
pub struct ProjectRow {
    pub id: DbId,
    pub user_id: DbId,
    pub status: String,
    pub breakdown: Option<Json<Breakdown>>,
    pub settings: Option<Json<ProjectSettings>>,
    pub history: Json<BTreeMap<JobId, JobRecord>>,
    pub video: Option<Json<VideoInfo>>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<ProjectRow> for Project {
    type Error = CoreError;

    fn try_from(row: ProjectRow) -> Result<Self, Self::Error> {
        Ok(Project {
            id: row.id,
            user_id: row.user_id,
            status: ProjectStatus::from_name(&row.status)?,
            breakdown: row.breakdown.map(|j| j.0),
            settings: row.settings.map(|j| j.0),
            history: row.history.0,
            video: row.video.map(|j| j.0),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// DTO for inserting a project.
#[derive(Debug, Clone)]
pub struct CreateProject {
    pub user_id: DbId,
    pub status: ProjectStatus,
    pub breakdown: Option<Breakdown>,
    pub settings: Option<ProjectSettings>,
}
