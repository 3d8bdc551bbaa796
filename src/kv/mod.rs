//! Counter / cache store contract
//!
//! The quota engine and the limit-email notifier speak to an ephemeral
//! key-value store through this trait. The Redis implementation is the
//! production default; `MemoryKv` backs tests and Redis-less deployments.

mod memory;
mod redis_store;

pub use memory::MemoryKv;
pub use redis_store::RedisKv;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from the counter store
#[derive(Debug, Error)]
pub enum KvError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of an atomic counter reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterVerdict {
    pub allowed: bool,
    /// Counter value after the operation (unchanged when denied)
    pub current: i64,
}

/// Ephemeral key-value store with an atomic guarded counter.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Atomically add `n` to the counter at `key` unless that would push it
    /// past `limit`. Sets `ttl_secs` when the key is created. Denials do
    /// not mutate state.
    async fn check_and_increment(
        &self,
        key: &str,
        n: i64,
        limit: i64,
        ttl_secs: i64,
    ) -> Result<CounterVerdict, KvError>;

    /// Read a value; `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Write a value with a TTL.
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: i64) -> Result<(), KvError>;

    /// Delete a key.
    async fn del(&self, key: &str) -> Result<(), KvError>;
}
