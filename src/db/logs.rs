//! Log store operations

use tokio_postgres::Row;
use tracing::info;
use uuid::Uuid;

use crate::domain::log::{LogRecord, LogType};
use crate::purge::PurgeFilter;

use super::pool::{DbError, DbPool};

const LOG_COLUMNS: &str = "id, project_id, project_object_id, level, environment, category, \
     log_type, hostname, message, stack_trace, raw_stack_trace, details, detail_string, \
     timestamp_ms, created_at";

/// Repository for the primary log store
#[derive(Clone)]
pub struct LogRepository {
    pool: DbPool,
}

impl LogRepository {
    pub fn new(pool: DbPool) -> Self {
        LogRepository { pool }
    }

    /// Persist a log record. Idempotent on the record id so redelivered
    /// ingestion messages do not duplicate rows.
    pub async fn create_log(&self, log: &LogRecord) -> Result<(), DbError> {
        let client = self.pool.get().await?;

        client
            .execute(
                r#"
                INSERT INTO logs (
                    id, project_id, project_object_id, level, environment, category,
                    log_type, hostname, message, stack_trace, raw_stack_trace,
                    details, detail_string, timestamp_ms, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                ON CONFLICT (id) DO NOTHING
                "#,
                &[
                    &log.id,
                    &log.project_id,
                    &log.project_object_id,
                    &log.level,
                    &log.environment,
                    &log.category,
                    &log.log_type.as_str(),
                    &log.hostname,
                    &log.message,
                    &serde_json::Value::Array(log.stack_trace.clone()),
                    &log.raw_stack_trace,
                    &serde_json::Value::Object(log.details.clone()),
                    &log.detail_string,
                    &log.timestamp_ms,
                    &log.created_at,
                ],
            )
            .await?;

        Ok(())
    }

    /// Fetch one log scoped to its project.
    pub async fn find_by_id(
        &self,
        project_id: &str,
        log_id: Uuid,
    ) -> Result<Option<LogRecord>, DbError> {
        let client = self.pool.get().await?;

        let sql = format!("SELECT {LOG_COLUMNS} FROM logs WHERE project_id = $1 AND id = $2");
        let row = client
            .query_opt(sql.as_str(), &[&project_id, &log_id])
            .await?;

        row.map(row_to_log).transpose()
    }

    /// Delete the listed logs when they belong to the project. Returns the
    /// number of rows removed.
    pub async fn delete_by_ids(&self, project_id: &str, ids: &[Uuid]) -> Result<u64, DbError> {
        let client = self.pool.get().await?;

        let deleted = client
            .execute(
                "DELETE FROM logs WHERE project_id = $1 AND id = ANY($2)",
                &[&project_id, &ids],
            )
            .await?;

        info!(project_id = %project_id, deleted, "purged logs by id list");
        Ok(deleted)
    }

    /// Delete logs matching a compiled purge filter.
    pub async fn delete_by_filter(
        &self,
        project_id: &str,
        filter: &PurgeFilter,
    ) -> Result<u64, DbError> {
        let client = self.pool.get().await?;

        let mut sql = String::from(
            "DELETE FROM logs WHERE project_id = $1 AND timestamp_ms >= $2 AND timestamp_ms <= $3",
        );
        let mut params: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> =
            vec![&project_id, &filter.min_timestamp_ms, &filter.max_timestamp_ms];

        if let Some(environment) = &filter.environment {
            params.push(environment);
            sql.push_str(&format!(" AND environment = ${}", params.len()));
        }
        if let Some(level) = &filter.level {
            params.push(level);
            sql.push_str(&format!(" AND level = ${}", params.len()));
        }

        let deleted = client.execute(sql.as_str(), &params).await?;
        info!(project_id = %project_id, deleted, "purged logs by filter");
        Ok(deleted)
    }
}

/// Shared row mapping; the index table mirrors the store's columns.
pub(crate) fn row_to_log(row: Row) -> Result<LogRecord, DbError> {
    let log_type: String = row.get("log_type");
    let stack_trace: serde_json::Value = row.get("stack_trace");
    let details: serde_json::Value = row.get("details");

    Ok(LogRecord {
        id: row.get("id"),
        project_id: row.get("project_id"),
        project_object_id: row.get("project_object_id"),
        level: row.get("level"),
        environment: row.get("environment"),
        category: row.get("category"),
        log_type: LogType::parse(&log_type)
            .ok_or_else(|| DbError::Decode(format!("unknown log_type {log_type}")))?,
        hostname: row.get("hostname"),
        message: row.get("message"),
        stack_trace: match stack_trace {
            serde_json::Value::Array(a) => a,
            _ => vec![],
        },
        raw_stack_trace: row.get("raw_stack_trace"),
        details: match details {
            serde_json::Value::Object(m) => m,
            _ => Default::default(),
        },
        detail_string: row.get("detail_string"),
        timestamp_ms: row.get("timestamp_ms"),
        created_at: row.get("created_at"),
    })
}
