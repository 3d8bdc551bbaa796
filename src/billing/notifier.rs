//! Limit-reached email notifier
//!
//! At most one email per owner per billing period in the happy path,
//! enforced by a sent-flag in the KV store. Mail and flag errors are
//! swallowed; a lost flag only risks a duplicate email inside a short
//! race window, bounded by upstream retries.

use std::sync::Arc;

use tracing::{info, warn};

use crate::kv::KvStore;
use crate::mail::MailSink;

use super::window::BillingWindow;

/// The flag outlives the longest possible window by a few days
const FLAG_TTL_SECS: i64 = 35 * 24 * 60 * 60;

fn flag_key(owner_id: &str, period_key: &str) -> String {
    format!("usage:logging:owner:{owner_id}:period:{period_key}:email-sent")
}

/// Idempotent quota-limit email dispatch
pub struct QuotaNotifier {
    kv: Arc<dyn KvStore>,
    mailer: Arc<dyn MailSink>,
}

impl QuotaNotifier {
    pub fn new(kv: Arc<dyn KvStore>, mailer: Arc<dyn MailSink>) -> Self {
        QuotaNotifier { kv, mailer }
    }

    /// Send the limit-reached email once per owner per period.
    pub async fn notify_limit_reached(
        &self,
        owner_id: &str,
        owner_email: &str,
        limit: i64,
        window: &BillingWindow,
    ) {
        let key = flag_key(owner_id, &window.period_key);

        match self.kv.get(&key).await {
            Ok(Some(_)) => return,
            Ok(None) => {}
            Err(e) => {
                warn!(owner_id = %owner_id, error = %e, "sent-flag read failed, skipping limit email");
                return;
            }
        }

        let subject = "Monthly log limit reached";
        let body = format!(
            "Your projects have reached the monthly log limit of {limit} entries.\n\
             Submissions are rejected until the current billing period ends on {end}.\n\
             Upgrade your plan to raise the limit.",
            end = window.end.format("%Y-%m-%d")
        );

        if let Err(e) = self
            .mailer
            .send(&[owner_email.to_string()], subject, &body)
            .await
        {
            warn!(owner_id = %owner_id, error = %e, "limit email send failed");
            return;
        }

        info!(owner_id = %owner_id, period = %window.period_key, "limit email sent");

        if let Err(e) = self.kv.set_ex(&key, "1", FLAG_TTL_SECS).await {
            warn!(owner_id = %owner_id, error = %e, "sent-flag write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::window::billing_window;
    use crate::kv::MemoryKv;
    use crate::mail::MailError;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingMailer {
        sent: AtomicUsize,
    }

    #[async_trait]
    impl MailSink for CountingMailer {
        async fn send(&self, _to: &[String], _subject: &str, _body: &str) -> Result<(), MailError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn window() -> BillingWindow {
        billing_window(
            Utc.with_ymd_and_hms(2023, 3, 15, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 20, 12, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn sends_at_most_once_per_period() {
        let mailer = Arc::new(CountingMailer::default());
        let notifier = QuotaNotifier::new(Arc::new(MemoryKv::new()), mailer.clone());

        let w = window();
        notifier
            .notify_limit_reached("owner-1", "owner@example.com", 10_000, &w)
            .await;
        notifier
            .notify_limit_reached("owner-1", "owner@example.com", 10_000, &w)
            .await;

        assert_eq!(mailer.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn preexisting_flag_suppresses_the_email() {
        let kv = Arc::new(MemoryKv::new());
        let mailer = Arc::new(CountingMailer::default());
        let notifier = QuotaNotifier::new(kv.clone(), mailer.clone());

        let w = window();
        kv.set_ex(&flag_key("owner-1", &w.period_key), "1", 60)
            .await
            .unwrap();
        notifier
            .notify_limit_reached("owner-1", "owner@example.com", 10_000, &w)
            .await;

        assert_eq!(mailer.sent.load(Ordering::SeqCst), 0);
    }
}
