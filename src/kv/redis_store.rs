//! Redis-backed counter store
//!
//! The guarded increment runs as a single server-side Lua script so that
//! concurrent callers against the same counter key serialize inside Redis.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tracing::info;

use super::{CounterVerdict, KvError, KvStore};

/// Check the counter against a limit, increment on success, and set the
/// TTL when the key is freshly created. Returns `{allowed, current}`.
const CHECK_AND_INCREMENT: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
local n = tonumber(ARGV[1])
local limit = tonumber(ARGV[2])
local ttl = tonumber(ARGV[3])
if current + n > limit then
  return {0, current}
end
current = redis.call('INCRBY', KEYS[1], n)
if redis.call('TTL', KEYS[1]) < 0 then
  redis.call('EXPIRE', KEYS[1], ttl)
end
return {1, current}
"#;

/// Redis implementation of [`KvStore`]
pub struct RedisKv {
    conn: ConnectionManager,
    script: Script,
}

impl RedisKv {
    /// Connect to Redis and prepare the counter script.
    pub async fn connect(redis_url: &str) -> Result<Self, KvError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("Redis connection manager initialized");
        Ok(RedisKv {
            conn,
            script: Script::new(CHECK_AND_INCREMENT),
        })
    }
}

#[async_trait]
impl KvStore for RedisKv {
    async fn check_and_increment(
        &self,
        key: &str,
        n: i64,
        limit: i64,
        ttl_secs: i64,
    ) -> Result<CounterVerdict, KvError> {
        let mut conn = self.conn.clone();
        let (allowed, current): (i64, i64) = self
            .script
            .key(key)
            .arg(n)
            .arg(limit)
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await?;
        Ok(CounterVerdict {
            allowed: allowed == 1,
            current,
        })
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: i64) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        Ok(conn.set_ex(key, value, ttl_secs.max(1) as u64).await?)
    }

    async fn del(&self, key: &str) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        Ok(conn.del(key).await?)
    }
}
