//! User and subscription read contracts
//!
//! The core never writes these tables; registration and plan management
//! belong to external controllers.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::pool::{DbError, DbPool};

/// A platform user, as the core sees one
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub user_id: String,
    pub email: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The read-through join of user + enrollment + plan consumed by the
/// quota engine
#[derive(Debug, Clone)]
pub struct OwnerUsageMeta {
    pub user_created_at: DateTime<Utc>,
    pub email: String,
    pub subscription_plan_id: Option<Uuid>,
    /// `None` means an unlimited plan
    pub log_limit: Option<i64>,
    pub project_limit: Option<i32>,
}

/// Repository for user and subscription reads
#[derive(Clone)]
pub struct UserRepository {
    pool: DbPool,
}

impl UserRepository {
    pub fn new(pool: DbPool) -> Self {
        UserRepository { pool }
    }

    pub async fn find_by_user_id(&self, user_id: &str) -> Result<Option<User>, DbError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT id, user_id, email, name, created_at FROM users WHERE user_id = $1",
                &[&user_id],
            )
            .await?;
        Ok(row.map(|r| User {
            id: r.get("id"),
            user_id: r.get("user_id"),
            email: r.get("email"),
            name: r.get("name"),
            created_at: r.get("created_at"),
        }))
    }

    /// Resolve the usage metadata for a project owner.
    ///
    /// A user without an enrollment resolves with no plan and no limit;
    /// only a missing user is unresolvable.
    pub async fn usage_meta(&self, owner_id: &str) -> Result<Option<OwnerUsageMeta>, DbError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT u.created_at, u.email, p.id AS plan_id, p.log_limit, p.project_limit
                FROM users u
                LEFT JOIN enrollments e ON e.user_id = u.id
                LEFT JOIN subscription_plans p ON p.id = e.plan_id
                WHERE u.user_id = $1
                "#,
                &[&owner_id],
            )
            .await?;

        Ok(row.map(|r| OwnerUsageMeta {
            user_created_at: r.get("created_at"),
            email: r.get("email"),
            subscription_plan_id: r.get("plan_id"),
            log_limit: r.get("log_limit"),
            project_limit: r.get("project_limit"),
        }))
    }
}
