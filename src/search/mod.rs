//! Search index contract
//!
//! The query and facet surface reads from the index, never the primary
//! store; ingestion mirrors every persisted log into it. The default
//! implementation is Postgres-backed; the trait matches what a dedicated
//! search engine would offer so one can be substituted.

pub mod pg;

pub use pg::PgSearchIndex;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::db::DbError;
use crate::domain::log::{LogRecord, LogType};
use crate::domain::QuerySpec;
use crate::purge::PurgeFilter;

/// Errors from the search index
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("index store error: {0}")]
    Store(#[from] DbError),
}

/// Facet fields exposed by the index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacetField {
    Environment,
    Category,
    Hostname,
}

impl FacetField {
    pub fn column(&self) -> &'static str {
        match self {
            FacetField::Environment => "environment",
            FacetField::Category => "category",
            FacetField::Hostname => "hostname",
        }
    }
}

/// One distinct facet value with its document count
#[derive(Debug, Clone, Serialize)]
pub struct FacetCount {
    pub value: String,
    pub count: i64,
}

/// One page of search hits plus the unpaginated total
#[derive(Debug, Clone)]
pub struct SearchPage {
    pub logs: Vec<LogRecord>,
    pub total: i64,
}

/// Secondary index over log documents
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Mirror a persisted log into the index. Idempotent on the log id.
    async fn index_log(&self, log: &LogRecord) -> Result<(), SearchError>;

    /// Execute a compiled query scoped to one project.
    async fn search(&self, project_id: &str, spec: &QuerySpec) -> Result<SearchPage, SearchError>;

    /// Enumerate distinct values with counts for one facet field.
    async fn facet(
        &self,
        project_id: &str,
        log_type: LogType,
        field: FacetField,
    ) -> Result<Vec<FacetCount>, SearchError>;

    /// Remove the identified documents when they belong to the project.
    async fn delete_by_ids(&self, project_id: &str, ids: &[Uuid]) -> Result<u64, SearchError>;

    /// Remove documents matching a purge filter.
    async fn delete_by_query(
        &self,
        project_id: &str,
        filter: &PurgeFilter,
    ) -> Result<u64, SearchError>;
}
