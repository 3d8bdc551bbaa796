//! Alarm delivery sinks
//!
//! Email, Slack, and generic webhook delivery for a triggered alarm. One
//! sink failing never aborts the others; delivery is at-least-once and
//! receivers are expected to dedupe downstream.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::{DeliveryMethod, LogRecord, ProjectAlarm};
use crate::mail::MailSink;

/// Digest header attached to webhook deliveries
const PAYLOAD_DIGEST_HEADER: &str = "X-Payload-Digest";

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("sink rejected delivery: {status}")]
    Rejected { status: u16 },

    #[error("mail error: {0}")]
    Mail(#[from] crate::mail::MailError),
}

/// Fans a triggered alarm out to its configured delivery methods
pub struct AlarmDispatcher {
    mailer: Arc<dyn MailSink>,
    http: reqwest::Client,
}

impl AlarmDispatcher {
    pub fn new(mailer: Arc<dyn MailSink>) -> Self {
        AlarmDispatcher {
            mailer,
            http: reqwest::Client::new(),
        }
    }

    /// Deliver to every configured method; failures are logged per sink.
    pub async fn dispatch(&self, alarm: &ProjectAlarm, log: &LogRecord) {
        for method in &alarm.delivery_methods {
            let outcome = match method {
                DeliveryMethod::Email { addresses } => self.send_email(addresses, log).await,
                DeliveryMethod::Slack { webhook_url } => self.post_slack(webhook_url, log).await,
                DeliveryMethod::Webhook { url } => self.post_webhook(url, alarm, log).await,
            };
            match outcome {
                Ok(()) => info!(
                    alarm_id = %alarm.id,
                    log_id = %log.id,
                    "alarm delivered"
                ),
                Err(e) => warn!(
                    alarm_id = %alarm.id,
                    log_id = %log.id,
                    error = %e,
                    "alarm delivery failed"
                ),
            }
        }
    }

    async fn send_email(&self, addresses: &[String], log: &LogRecord) -> Result<(), SinkError> {
        let subject = format!(
            "[{}] {} alarm in {}",
            log.level, log.project_id, log.environment
        );
        let body = format!(
            "Project: {}\nEnvironment: {}\nLevel: {}\nCategory: {}\n\n{}",
            log.project_id, log.environment, log.level, log.category, log.message
        );
        self.mailer.send(addresses, &subject, &body).await?;
        Ok(())
    }

    async fn post_slack(&self, webhook_url: &str, log: &LogRecord) -> Result<(), SinkError> {
        let text = format!(
            "*{}* `{}`/{}: {}",
            log.level, log.project_id, log.environment, log.message
        );
        let response = self
            .http
            .post(webhook_url)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SinkError::Rejected {
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }

    async fn post_webhook(
        &self,
        url: &str,
        alarm: &ProjectAlarm,
        log: &LogRecord,
    ) -> Result<(), SinkError> {
        let payload = serde_json::json!({ "alarmId": alarm.id, "log": log });
        let body = payload.to_string();
        let digest = hex::encode(Sha256::digest(body.as_bytes()));

        let response = self
            .http
            .post(url)
            .header("Content-Type", "application/json")
            .header(PAYLOAD_DIGEST_HEADER, digest)
            .body(body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SinkError::Rejected {
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}
