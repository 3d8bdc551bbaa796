//! Message bus contract
//!
//! Ingestion and alarm evaluation ride on an at-least-once bus: a
//! published message is delivered to the topic's consumer one or more
//! times, so consumers must be idempotent. The in-process implementation
//! is the deployment default; the trait boundary admits external brokers.

mod local;

pub use local::LocalBus;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Topic carrying accepted log submissions to the persistence worker
pub const TOPIC_LOG_INGESTION: &str = "log-ingestion";

/// Topic carrying persisted-log events to the alarm worker
pub const TOPIC_LOG_ALARM: &str = "log-alarm";

/// Errors from the bus
#[derive(Debug, Error)]
pub enum BusError {
    #[error("topic {0} has no live consumer channel")]
    TopicClosed(String),

    #[error("topic {0} already has a subscriber")]
    AlreadySubscribed(String),
}

/// A delivered message
#[derive(Debug, Clone)]
pub struct BusEnvelope {
    pub message_id: String,
    pub topic: String,
    pub payload: Value,
    /// 1 on first delivery, incremented on each redelivery
    pub delivery_count: u32,
}

/// Boxed future returned by a message handler
pub type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// A topic consumer. Returning `Err` requests redelivery.
pub type Handler = Arc<dyn Fn(BusEnvelope) -> HandlerFuture + Send + Sync>;

/// At-least-once publish/subscribe bus
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish a payload; returns the assigned message id once the bus has
    /// acknowledged the message.
    async fn publish(&self, topic: &str, payload: Value) -> Result<String, BusError>;

    /// Attach the topic's consumer. One subscriber per topic.
    async fn subscribe(&self, topic: &str, handler: Handler) -> Result<(), BusError>;
}
