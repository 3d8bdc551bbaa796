//! Project aggregate store operations
//!
//! `users`, `api_keys`, and `alarms` live as JSONB inside the project row
//! and are only written through `with_project`, a versioned
//! read-modify-write that re-reads on conflict.

use tokio_postgres::Row;
use tracing::{info, warn};

use crate::domain::Project;

use super::pool::{DbError, DbPool};

const PROJECT_COLUMNS: &str =
    "id, project_id, owner_id, users, api_keys, alarms, version, created_at, updated_at";

const RMW_ATTEMPTS: usize = 3;

/// Repository for project aggregates
#[derive(Clone)]
pub struct ProjectRepository {
    pool: DbPool,
}

impl ProjectRepository {
    pub fn new(pool: DbPool) -> Self {
        ProjectRepository { pool }
    }

    /// Look up a project by its slug.
    pub async fn find_by_project_id(&self, project_id: &str) -> Result<Option<Project>, DbError> {
        let client = self.pool.get().await?;
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE project_id = $1");
        let row = client.query_opt(sql.as_str(), &[&project_id]).await?;
        row.map(row_to_project).transpose()
    }

    /// Look up the project owning an API-key token.
    pub async fn find_by_api_key(&self, token: &str) -> Result<Option<Project>, DbError> {
        let client = self.pool.get().await?;
        let sql = format!(
            r#"
            SELECT {PROJECT_COLUMNS} FROM projects
            WHERE EXISTS (
                SELECT 1 FROM jsonb_array_elements(api_keys) AS k
                WHERE k->>'key' = $1
            )
            "#
        );
        let row = client.query_opt(sql.as_str(), &[&token]).await?;
        row.map(row_to_project).transpose()
    }

    /// Apply a mutation to the aggregate under optimistic concurrency.
    ///
    /// `apply` runs against a fresh read each attempt; its `Err` aborts
    /// without writing. Version conflicts re-read up to a bounded number
    /// of attempts, then surface as `DbError::Conflict`.
    pub async fn with_project<T, E, F>(
        &self,
        project_id: &str,
        mut apply: F,
    ) -> Result<Result<T, E>, DbError>
    where
        F: FnMut(&mut Project) -> Result<T, E>,
    {
        for attempt in 1..=RMW_ATTEMPTS {
            let mut project = self
                .find_by_project_id(project_id)
                .await?
                .ok_or_else(|| DbError::NotFound(format!("project {project_id}")))?;

            let outcome = match apply(&mut project) {
                Ok(v) => v,
                Err(e) => return Ok(Err(e)),
            };

            if self.try_update(&project).await? {
                return Ok(Ok(outcome));
            }
            warn!(
                project_id = %project_id,
                attempt,
                "project version conflict, re-reading"
            );
        }
        Err(DbError::Conflict)
    }

    /// Write the aggregate's owned collections guarded by its version.
    /// Returns false when another writer won the race.
    async fn try_update(&self, project: &Project) -> Result<bool, DbError> {
        let client = self.pool.get().await?;

        let users = serde_json::to_value(&project.users)
            .map_err(|e| DbError::Decode(e.to_string()))?;
        let api_keys = serde_json::to_value(&project.api_keys)
            .map_err(|e| DbError::Decode(e.to_string()))?;
        let alarms = serde_json::to_value(&project.alarms)
            .map_err(|e| DbError::Decode(e.to_string()))?;

        let updated = client
            .execute(
                r#"
                UPDATE projects
                SET users = $2, api_keys = $3, alarms = $4,
                    version = version + 1, updated_at = NOW()
                WHERE project_id = $1 AND version = $5
                "#,
                &[
                    &project.project_id,
                    &users,
                    &api_keys,
                    &alarms,
                    &project.version,
                ],
            )
            .await?;

        if updated > 0 {
            info!(project_id = %project.project_id, version = project.version + 1, "project updated");
        }
        Ok(updated > 0)
    }
}

fn row_to_project(row: Row) -> Result<Project, DbError> {
    let users: serde_json::Value = row.get("users");
    let api_keys: serde_json::Value = row.get("api_keys");
    let alarms: serde_json::Value = row.get("alarms");

    Ok(Project {
        id: row.get("id"),
        project_id: row.get("project_id"),
        owner_id: row.get("owner_id"),
        users: serde_json::from_value(users).map_err(|e| DbError::Decode(e.to_string()))?,
        api_keys: serde_json::from_value(api_keys).map_err(|e| DbError::Decode(e.to_string()))?,
        alarms: serde_json::from_value(alarms).map_err(|e| DbError::Decode(e.to_string()))?,
        version: row.get("version"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
