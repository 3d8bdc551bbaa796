//! Outbound mail contract
//!
//! Mail is strictly best-effort in this service: callers log failures and
//! move on. The default sink posts JSON to an HTTP mail API; deployments
//! without one get the no-op sink.

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

/// Errors from a mail sink
#[derive(Debug, Error)]
pub enum MailError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("mail API error: {status} - {message}")]
    Api { status: u16, message: String },
}

/// Outbound mail sink
#[async_trait]
pub trait MailSink: Send + Sync {
    async fn send(&self, to: &[String], subject: &str, body: &str) -> Result<(), MailError>;
}

/// Mail sink posting to an HTTP mail API
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn new(endpoint: String, api_key: Option<String>, from: String) -> Self {
        HttpMailer {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            from,
        }
    }
}

#[async_trait]
impl MailSink for HttpMailer {
    async fn send(&self, to: &[String], subject: &str, body: &str) -> Result<(), MailError> {
        let mut request = self.client.post(&self.endpoint).json(&json!({
            "from": self.from,
            "to": to,
            "subject": subject,
            "text": body,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(MailError::Api {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

/// Mail sink that drops messages; used when mail is unconfigured
pub struct NoopMailer;

#[async_trait]
impl MailSink for NoopMailer {
    async fn send(&self, to: &[String], subject: &str, _body: &str) -> Result<(), MailError> {
        debug!(recipients = to.len(), subject = %subject, "mail sink disabled, dropping message");
        Ok(())
    }
}
