//! In-process counter store
//!
//! A mutex over a single map gives the same atomicity guarantee as the
//! Redis script for callers within one process. Used when Redis is not
//! configured, and by tests.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CounterVerdict, KvError, KvStore};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live(&self) -> bool {
        self.expires_at.map_or(true, |at| at > Instant::now())
    }
}

/// Mutex-guarded implementation of [`KvStore`]
#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys; test helper.
    pub async fn len(&self) -> usize {
        let entries = self.entries.lock().await;
        entries.values().filter(|e| e.live()).count()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn check_and_increment(
        &self,
        key: &str,
        n: i64,
        limit: i64,
        ttl_secs: i64,
    ) -> Result<CounterVerdict, KvError> {
        let mut entries = self.entries.lock().await;

        let current = entries
            .get(key)
            .filter(|e| e.live())
            .and_then(|e| e.value.parse::<i64>().ok())
            .unwrap_or(0);

        if current + n > limit {
            return Ok(CounterVerdict {
                allowed: false,
                current,
            });
        }

        let expires_at = entries
            .get(key)
            .filter(|e| e.live())
            .map(|e| e.expires_at)
            .unwrap_or_else(|| Some(Instant::now() + Duration::from_secs(ttl_secs.max(1) as u64)));

        let next = current + n;
        entries.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(CounterVerdict {
            allowed: true,
            current: next,
        })
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let entries = self.entries.lock().await;
        Ok(entries
            .get(key)
            .filter(|e| e.live())
            .map(|e| e.value.clone()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: i64) -> Result<(), KvError> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs.max(1) as u64)),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), KvError> {
        let mut entries = self.entries.lock().await;
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn denies_without_mutating() {
        let kv = MemoryKv::new();
        let v = kv.check_and_increment("k", 1, 0, 60).await.unwrap();
        assert!(!v.allowed);
        assert_eq!(v.current, 0);
        assert_eq!(kv.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn concurrent_reservations_admit_exactly_the_limit() {
        let kv = Arc::new(MemoryKv::new());
        let limit = 10i64;
        let mut handles = Vec::new();
        for _ in 0..100 {
            let kv = kv.clone();
            handles.push(tokio::spawn(async move {
                kv.check_and_increment("usage:logging:owner:u1:period:20240601", 1, limit, 60)
                    .await
                    .unwrap()
                    .allowed
            }));
        }
        let mut allowed = 0;
        for h in handles {
            if h.await.unwrap() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, limit);
    }

    #[tokio::test]
    async fn set_ex_and_get_round_trip() {
        let kv = MemoryKv::new();
        kv.set_ex("flag", "1", 60).await.unwrap();
        assert_eq!(kv.get("flag").await.unwrap().as_deref(), Some("1"));
        kv.del("flag").await.unwrap();
        assert_eq!(kv.get("flag").await.unwrap(), None);
    }
}
