//! Repository for the `projects` table.

use sqlx::types::Json;
use sqlx::PgPool;
use storyreel_core::project::Project;
use storyreel_core::types::DbId;

use crate::models::project::{CreateProject, ProjectRow};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str =
    "id, user_id, status, breakdown, settings, history, video, created_at, updated_at";

/// Provides read and whole-record write access to projects.
pub struct ProjectRepo;

impl ProjectRepo {
    /// Insert a new project with an empty history, returning the created row.
    pub async fn create(pool: &PgPool, input: &CreateProject) -> Result<ProjectRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO projects (user_id, status, breakdown, settings)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProjectRow>(&query)
            .bind(input.user_id)
            .bind(input.status.as_str())
            .bind(input.breakdown.as_ref().map(Json))
            .bind(input.settings.as_ref().map(Json))
            .fetch_one(pool)
            .await
    }

    /// Find a project by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<ProjectRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM projects WHERE id = $1");
        sqlx::query_as::<_, ProjectRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Overwrite every mutable column of a project.
    ///
    /// There is no version check: concurrent writers to the same project
    /// overwrite each other and the last write wins. Returns `false` when
    /// no row with the project's id exists.
    pub async fn save(pool: &PgPool, project: &Project) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE projects SET
                status = $2,
                breakdown = $3,
                settings = $4,
                history = $5,
                video = $6,
                updated_at = $7
             WHERE id = $1",
        )
        .bind(project.id)
        .bind(project.status.as_str())
        .bind(project.breakdown.as_ref().map(Json))
        .bind(project.settings.as_ref().map(Json))
        .bind(Json(&project.history))
        .bind(project.video.as_ref().map(Json))
        .bind(project.updated_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
