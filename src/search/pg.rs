//! Postgres-backed search index
//!
//! Compiles a [`QuerySpec`] into a filter clause over the `log_index`
//! table. Scalar filters become `= ANY(...)` predicates, `contains`
//! becomes an escaped `ILIKE`, and `startsWith`/`endsWith` anchor at word
//! boundaries through the `\m`/`\M` regex classes.

use async_trait::async_trait;
use tokio_postgres::types::ToSql;
use tracing::debug;
use uuid::Uuid;

use crate::db::{logs::row_to_log, DbPool};
use crate::domain::log::{LogRecord, LogType};
use crate::domain::query::{
    FieldFilter, FilterOperator, MatchType, SortOrder, TextCondition, TextQuery,
};
use crate::domain::QuerySpec;
use crate::purge::PurgeFilter;

use super::{FacetCount, FacetField, SearchError, SearchIndex, SearchPage};

const INDEX_COLUMNS: &str = "id, project_id, project_object_id, level, environment, category, \
     log_type, hostname, message, stack_trace, raw_stack_trace, details, detail_string, \
     timestamp_ms, created_at";

type SqlParam = Box<dyn ToSql + Sync + Send>;

/// Accumulates WHERE conditions and their positional parameters
#[derive(Default)]
struct SqlBuilder {
    conditions: Vec<String>,
    params: Vec<SqlParam>,
}

impl SqlBuilder {
    /// Register a parameter, returning its 1-based position.
    fn bind(&mut self, param: SqlParam) -> usize {
        self.params.push(param);
        self.params.len()
    }

    fn where_clause(&self) -> String {
        self.conditions.join(" AND ")
    }

    fn param_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect()
    }
}

/// Escape `%`, `_`, and `\` for use inside an ILIKE pattern.
fn like_escape(phrase: &str) -> String {
    phrase
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// One predicate over one column for a text condition.
fn text_predicate(builder: &mut SqlBuilder, column: &str, condition: &TextCondition) -> String {
    match condition.match_type {
        MatchType::Contains => {
            let n = builder.bind(Box::new(format!("%{}%", like_escape(&condition.phrase))));
            format!("{column} ILIKE ${n}")
        }
        MatchType::StartsWith => {
            let n = builder.bind(Box::new(format!(r"\m{}", regex::escape(&condition.phrase))));
            format!("{column} ~* ${n}")
        }
        MatchType::EndsWith => {
            let n = builder.bind(Box::new(format!(r"{}\M", regex::escape(&condition.phrase))));
            format!("{column} ~* ${n}")
        }
    }
}

/// A document-wide predicate: the condition must hold on any of the
/// searchable columns.
fn document_predicate(builder: &mut SqlBuilder, condition: &TextCondition) -> String {
    let per_column: Vec<String> = ["message", "raw_stack_trace", "detail_string"]
        .iter()
        .map(|column| text_predicate(builder, column, condition))
        .collect();
    format!("({})", per_column.join(" OR "))
}

/// A compound field filter: conditions joined by the filter's operator.
fn field_predicate(builder: &mut SqlBuilder, column: &str, filter: &FieldFilter) -> String {
    let joiner = match filter.operator {
        FilterOperator::And => " AND ",
        FilterOperator::Or => " OR ",
    };
    let parts: Vec<String> = filter
        .conditions
        .iter()
        .map(|c| text_predicate(builder, column, c))
        .collect();
    format!("({})", parts.join(joiner))
}

/// Compile the scalar, time, and text filters of a query.
fn compile_filters(project_id: &str, spec: &QuerySpec) -> SqlBuilder {
    let mut builder = SqlBuilder::default();

    let n = builder.bind(Box::new(project_id.to_string()));
    builder.conditions.push(format!("project_id = ${n}"));

    if let Some(log_type) = spec.log_type {
        let n = builder.bind(Box::new(log_type.as_str().to_string()));
        builder.conditions.push(format!("log_type = ${n}"));
    }

    for (column, values) in [
        ("level", &spec.levels),
        ("environment", &spec.environments),
        ("category", &spec.categories),
        ("hostname", &spec.hostnames),
    ] {
        if !values.is_empty() {
            let n = builder.bind(Box::new(values.clone()));
            builder.conditions.push(format!("{column} = ANY(${n})"));
        }
    }

    if let Some(start) = spec.start_time_ms {
        let n = builder.bind(Box::new(start));
        builder.conditions.push(format!("timestamp_ms >= ${n}"));
    }
    if let Some(end) = spec.end_time_ms {
        let n = builder.bind(Box::new(end));
        builder.conditions.push(format!("timestamp_ms <= ${n}"));
    }

    match &spec.text {
        None => {}
        Some(TextQuery::Document(condition)) => {
            let predicate = document_predicate(&mut builder, condition);
            builder.conditions.push(predicate);
        }
        Some(TextQuery::Fields(fields)) => {
            for (column, filter) in [
                ("message", &fields.message),
                ("raw_stack_trace", &fields.stack_trace),
                ("detail_string", &fields.details),
            ] {
                if let Some(filter) = filter {
                    let predicate = field_predicate(&mut builder, column, filter);
                    builder.conditions.push(predicate);
                }
            }
        }
    }

    builder
}

/// Postgres implementation of [`SearchIndex`]
#[derive(Clone)]
pub struct PgSearchIndex {
    pool: DbPool,
}

impl PgSearchIndex {
    pub fn new(pool: DbPool) -> Self {
        PgSearchIndex { pool }
    }
}

#[async_trait]
impl SearchIndex for PgSearchIndex {
    async fn index_log(&self, log: &LogRecord) -> Result<(), SearchError> {
        let client = self.pool.get().await.map_err(SearchError::Store)?;
        client
            .execute(
                r#"
                INSERT INTO log_index (
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
            .await
            .map_err(|e| SearchError::Store(e.into()))?;
        Ok(())
    }

    async fn search(&self, project_id: &str, spec: &QuerySpec) -> Result<SearchPage, SearchError> {
        let mut builder = compile_filters(project_id, spec);
        let where_clause = builder.where_clause();

        let client = self.pool.get().await.map_err(SearchError::Store)?;

        let count_sql = format!("SELECT COUNT(*) AS total FROM log_index WHERE {where_clause}");
        let total: i64 = client
            .query_one(count_sql.as_str(), &builder.param_refs())
            .await
            .map_err(|e| SearchError::Store(e.into()))?
            .get("total");

        let order = match spec.sort {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        let limit = builder.bind(Box::new(spec.page_size as i64));
        let offset = builder.bind(Box::new((spec.page as i64 - 1) * spec.page_size as i64));
        let page_sql = format!(
            "SELECT {INDEX_COLUMNS} FROM log_index WHERE {where_clause} \
             ORDER BY timestamp_ms {order} LIMIT ${limit} OFFSET ${offset}"
        );
        debug!(sql = %page_sql, "compiled search query");

        let rows = client
            .query(page_sql.as_str(), &builder.param_refs())
            .await
            .map_err(|e| SearchError::Store(e.into()))?;

        let logs = rows
            .into_iter()
            .map(row_to_log)
            .collect::<Result<Vec<_>, _>>()
            .map_err(SearchError::Store)?;

        Ok(SearchPage { logs, total })
    }

    async fn facet(
        &self,
        project_id: &str,
        log_type: LogType,
        field: FacetField,
    ) -> Result<Vec<FacetCount>, SearchError> {
        let client = self.pool.get().await.map_err(SearchError::Store)?;
        let column = field.column();
        let sql = format!(
            "SELECT {column} AS value, COUNT(*) AS count FROM log_index \
             WHERE project_id = $1 AND log_type = $2 AND {column} IS NOT NULL \
             GROUP BY 1 ORDER BY 2 DESC, 1 ASC"
        );
        let rows = client
            .query(sql.as_str(), &[&project_id, &log_type.as_str()])
            .await
            .map_err(|e| SearchError::Store(e.into()))?;

        Ok(rows
            .iter()
            .map(|r| FacetCount {
                value: r.get("value"),
                count: r.get("count"),
            })
            .collect())
    }

    async fn delete_by_ids(&self, project_id: &str, ids: &[Uuid]) -> Result<u64, SearchError> {
        let client = self.pool.get().await.map_err(SearchError::Store)?;
        client
            .execute(
                "DELETE FROM log_index WHERE project_id = $1 AND id = ANY($2)",
                &[&project_id, &ids],
            )
            .await
            .map_err(|e| SearchError::Store(e.into()))
    }

    async fn delete_by_query(
        &self,
        project_id: &str,
        filter: &PurgeFilter,
    ) -> Result<u64, SearchError> {
        let client = self.pool.get().await.map_err(SearchError::Store)?;

        let mut sql = String::from(
            "DELETE FROM log_index WHERE project_id = $1 \
             AND timestamp_ms >= $2 AND timestamp_ms <= $3",
        );
        let mut params: Vec<&(dyn ToSql + Sync)> =
            vec![&project_id, &filter.min_timestamp_ms, &filter.max_timestamp_ms];
        if let Some(environment) = &filter.environment {
            params.push(environment);
            sql.push_str(&format!(" AND environment = ${}", params.len()));
        }
        if let Some(level) = &filter.level {
            params.push(level);
            sql.push_str(&format!(" AND level = ${}", params.len()));
        }

        client
            .execute(sql.as_str(), &params)
            .await
            .map_err(|e| SearchError::Store(e.into()))
    }
}
