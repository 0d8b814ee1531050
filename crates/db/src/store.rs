//! `ProjectStore` backed by the `projects` table.

use async_trait::async_trait;
use sqlx::PgPool;
use storyreel_core::capabilities::{ProjectStore, StoreError};
use storyreel_core::project::Project;
use storyreel_core::types::DbId;

use crate::repositories::ProjectRepo;

#[derive(Debug, Clone)]
pub struct PgProjectStore {
    pool: PgPool,
}

impl PgProjectStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectStore for PgProjectStore {
    async fn load_project(&self, project_id: DbId) -> Result<Project, StoreError> {
        let row = ProjectRepo::find_by_id(&self.pool, project_id)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .ok_or(StoreError::NotFound(project_id))?;
        Project::try_from(row).map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn save_project(&self, project: &Project) -> Result<(), StoreError> {
        let updated = ProjectRepo::save(&self.pool, project)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if !updated {
            return Err(StoreError::NotFound(project.id));
        }
        tracing::debug!(project_id = project.id, status = project.status.as_str(), "Project saved");
        Ok(())
    }
}
