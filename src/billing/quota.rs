//! Quota engine
//!
//! Reserves ingestion units against the owner's monthly counter. The
//! counter lives in the KV store under a period-scoped key and is only
//! mutated through the store's atomic guarded increment.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::kv::KvStore;

use super::window::{billing_window, BillingWindow};

/// Slack added to the counter TTL past the window end
const TTL_SLACK_SECS: i64 = 60;

/// Outcome of a quota reservation
#[derive(Debug, Clone)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub current: i64,
    pub window: BillingWindow,
}

/// Counter key for an owner and billing period
pub fn counter_key(owner_id: &str, period_key: &str) -> String {
    format!("usage:logging:owner:{owner_id}:period:{period_key}")
}

/// Billing-anchored quota reservations
pub struct QuotaEngine {
    kv: Arc<dyn KvStore>,
}

impl QuotaEngine {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        QuotaEngine { kv }
    }

    /// Reserve `n` units for the owner's current window.
    ///
    /// An absent limit means an unlimited plan: the reservation is granted
    /// without touching the counter store. A zero limit denies every
    /// submission. When the store is unreachable the reservation is
    /// granted and the degradation logged (counter loss is recoverable;
    /// rejected ingress is not).
    pub async fn check_and_reserve(
        &self,
        owner_id: &str,
        user_created_at: DateTime<Utc>,
        limit: Option<i64>,
        n: i64,
        now: DateTime<Utc>,
    ) -> QuotaDecision {
        let window = billing_window(user_created_at, now);

        let limit = match limit {
            None => {
                return QuotaDecision {
                    allowed: true,
                    current: 0,
                    window,
                }
            }
            Some(l) => l,
        };

        let key = counter_key(owner_id, &window.period_key);
        let ttl_secs = (window.end - now).num_seconds() + TTL_SLACK_SECS;

        match self.kv.check_and_increment(&key, n, limit, ttl_secs).await {
            Ok(verdict) => QuotaDecision {
                allowed: verdict.allowed,
                current: verdict.current,
                window,
            },
            Err(e) => {
                warn!(
                    event = "quota_fail_open",
                    owner_id = %owner_id,
                    error = %e,
                    "counter store unavailable, admitting submission"
                );
                QuotaDecision {
                    allowed: true,
                    current: 0,
                    window,
                }
            }
        }
    }

    /// Read the owner's current window usage without reserving.
    pub async fn current_usage(
        &self,
        owner_id: &str,
        user_created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> (i64, BillingWindow) {
        let window = billing_window(user_created_at, now);
        let key = counter_key(owner_id, &window.period_key);
        let current = match self.kv.get(&key).await {
            Ok(v) => v.and_then(|s| s.parse().ok()).unwrap_or(0),
            Err(e) => {
                warn!(owner_id = %owner_id, error = %e, "counter store read failed");
                0
            }
        };
        (current, window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{CounterVerdict, KvError, MemoryKv};
    use async_trait::async_trait;
    use chrono::TimeZone;

    struct DownKv;

    #[async_trait]
    impl KvStore for DownKv {
        async fn check_and_increment(
            &self,
            _key: &str,
            _n: i64,
            _limit: i64,
            _ttl_secs: i64,
        ) -> Result<CounterVerdict, KvError> {
            Err(KvError::Unavailable("connection refused".into()))
        }

        async fn get(&self, _key: &str) -> Result<Option<String>, KvError> {
            Err(KvError::Unavailable("connection refused".into()))
        }

        async fn set_ex(&self, _key: &str, _value: &str, _ttl: i64) -> Result<(), KvError> {
            Err(KvError::Unavailable("connection refused".into()))
        }

        async fn del(&self, _key: &str) -> Result<(), KvError> {
            Err(KvError::Unavailable("connection refused".into()))
        }
    }

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 3, 15, 9, 0, 0).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 20, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn unlimited_plan_never_touches_the_counter() {
        let kv = Arc::new(MemoryKv::new());
        let engine = QuotaEngine::new(kv.clone());

        for _ in 0..5 {
            let d = engine
                .check_and_reserve("owner-1", created(), None, 1, now())
                .await;
            assert!(d.allowed);
        }
        assert_eq!(kv.len().await, 0);
    }

    #[tokio::test]
    async fn zero_limit_denies_everything() {
        let engine = QuotaEngine::new(Arc::new(MemoryKv::new()));
        let d = engine
            .check_and_reserve("owner-1", created(), Some(0), 1, now())
            .await;
        assert!(!d.allowed);
        assert_eq!(d.current, 0);
    }

    #[tokio::test]
    async fn denial_reports_current_without_incrementing() {
        let kv = Arc::new(MemoryKv::new());
        let engine = QuotaEngine::new(kv.clone());

        for _ in 0..3 {
            assert!(
                engine
                    .check_and_reserve("owner-1", created(), Some(3), 1, now())
                    .await
                    .allowed
            );
        }
        let denied = engine
            .check_and_reserve("owner-1", created(), Some(3), 1, now())
            .await;
        assert!(!denied.allowed);
        assert_eq!(denied.current, 3);

        let (current, _) = engine.current_usage("owner-1", created(), now()).await;
        assert_eq!(current, 3);
    }

    #[tokio::test]
    async fn store_outage_fails_open() {
        let engine = QuotaEngine::new(Arc::new(DownKv));
        let d = engine
            .check_and_reserve("owner-1", created(), Some(1), 1, now())
            .await;
        assert!(d.allowed);
    }

    #[tokio::test]
    async fn windows_isolate_counters_by_period() {
        let kv = Arc::new(MemoryKv::new());
        let engine = QuotaEngine::new(kv.clone());

        let june = now();
        let july = Utc.with_ymd_and_hms(2024, 7, 20, 12, 0, 0).unwrap();

        assert!(
            engine
                .check_and_reserve("owner-1", created(), Some(1), 1, june)
                .await
                .allowed
        );
        // Same owner, next window: fresh counter.
        assert!(
            engine
                .check_and_reserve("owner-1", created(), Some(1), 1, july)
                .await
                .allowed
        );
    }
}
