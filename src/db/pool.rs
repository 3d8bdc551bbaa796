//! Database connection pool management

use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use thiserror::Error;
use tokio_postgres::NoTls;
use tracing::info;

/// Database-related errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::CreatePoolError),
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),
    #[error("Pool get error: {0}")]
    PoolGet(#[from] deadpool_postgres::PoolError),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Row decode error: {0}")]
    Decode(String),
    #[error("Concurrent modification, retries exhausted")]
    Conflict,
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Connection pool wrapper shared by all repositories
#[derive(Clone)]
pub struct DbPool {
    pool: Pool,
}

impl DbPool {
    /// Create a pool from a `postgres://` connection URL.
    pub fn new(database_url: &str) -> Result<Self, DbError> {
        let url = url::Url::parse(database_url)
            .map_err(|e| DbError::Config(format!("Invalid database URL: {}", e)))?;

        let host = url
            .host_str()
            .ok_or_else(|| DbError::Config("Missing host in DATABASE_URL".to_string()))?;

        let mut cfg = Config::new();
        cfg.host = Some(host.to_string());
        cfg.port = Some(url.port().unwrap_or(5432));
        cfg.user = Some(url.username().to_string());
        cfg.password = Some(url.password().unwrap_or("").to_string());
        cfg.dbname = Some(url.path().trim_start_matches('/').to_string());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls)?;

        info!(
            host = %host,
            dbname = %url.path().trim_start_matches('/'),
            "Database pool created"
        );

        Ok(DbPool { pool })
    }

    /// Get a connection from the pool.
    pub async fn get(&self) -> Result<deadpool_postgres::Object, DbError> {
        Ok(self.pool.get().await?)
    }

    /// Test the database connection.
    pub async fn test_connection(&self) -> Result<(), DbError> {
        let client = self.get().await?;
        client.query_one("SELECT 1", &[]).await?;
        Ok(())
    }

    /// Apply the schema; every statement is idempotent.
    pub async fn ensure_schema(&self) -> Result<(), DbError> {
        let client = self.get().await?;
        client.batch_execute(super::schema::SCHEMA).await?;
        info!("Database schema ensured");
        Ok(())
    }
}
