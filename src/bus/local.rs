//! In-process message bus
//!
//! One unbounded tokio channel per topic. Messages published before the
//! consumer attaches queue in the channel. A failing handler gets the
//! message redelivered with backoff up to a bounded attempt count.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{BusEnvelope, BusError, Handler, MessageBus};

const DEFAULT_MAX_DELIVERIES: u32 = 3;
const REDELIVERY_BACKOFF: Duration = Duration::from_millis(200);

struct TopicChannel {
    tx: UnboundedSender<BusEnvelope>,
    rx: Mutex<Option<UnboundedReceiver<BusEnvelope>>>,
}

impl TopicChannel {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        TopicChannel {
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }
}

/// Tokio-channel implementation of [`MessageBus`]
pub struct LocalBus {
    topics: DashMap<String, TopicChannel>,
    max_deliveries: u32,
}

impl LocalBus {
    pub fn new() -> Self {
        LocalBus {
            topics: DashMap::new(),
            max_deliveries: DEFAULT_MAX_DELIVERIES,
        }
    }

    fn sender(&self, topic: &str) -> UnboundedSender<BusEnvelope> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(TopicChannel::new)
            .tx
            .clone()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for LocalBus {
    async fn publish(&self, topic: &str, payload: Value) -> Result<String, BusError> {
        let message_id = Uuid::new_v4().to_string();
        let envelope = BusEnvelope {
            message_id: message_id.clone(),
            topic: topic.to_string(),
            payload,
            delivery_count: 1,
        };
        self.sender(topic)
            .send(envelope)
            .map_err(|_| BusError::TopicClosed(topic.to_string()))?;
        Ok(message_id)
    }

    async fn subscribe(&self, topic: &str, handler: Handler) -> Result<(), BusError> {
        let (redeliver, mut rx) = {
            let channel = self
                .topics
                .entry(topic.to_string())
                .or_insert_with(TopicChannel::new);
            let mut rx_slot = channel.rx.lock().expect("bus receiver lock poisoned");
            let rx = rx_slot
                .take()
                .ok_or_else(|| BusError::AlreadySubscribed(topic.to_string()))?;
            (channel.tx.clone(), rx)
        };

        let topic = topic.to_string();
        let max_deliveries = self.max_deliveries;

        tokio::spawn(async move {
            info!(topic = %topic, "bus consumer attached");
            while let Some(envelope) = rx.recv().await {
                let message_id = envelope.message_id.clone();
                let delivery_count = envelope.delivery_count;
                match handler(envelope.clone()).await {
                    Ok(()) => {}
                    Err(e) if delivery_count < max_deliveries => {
                        warn!(
                            topic = %topic,
                            message_id = %message_id,
                            delivery_count,
                            error = %e,
                            "handler failed, scheduling redelivery"
                        );
                        let redeliver = redeliver.clone();
                        let mut retry = envelope;
                        retry.delivery_count += 1;
                        tokio::spawn(async move {
                            tokio::time::sleep(REDELIVERY_BACKOFF * delivery_count).await;
                            let _ = redeliver.send(retry);
                        });
                    }
                    Err(e) => {
                        error!(
                            topic = %topic,
                            message_id = %message_id,
                            delivery_count,
                            error = %e,
                            "handler failed on final delivery, dropping message"
                        );
                    }
                }
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn delivers_published_messages_once_on_success() {
        let bus = LocalBus::new();
        let seen = Arc::new(AtomicU32::new(0));

        let counter = seen.clone();
        bus.subscribe(
            "t",
            Arc::new(move |_env| {
                let counter = counter.clone();
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
        )
        .await
        .unwrap();

        let id = bus.publish("t", json!({"n": 1})).await.unwrap();
        assert!(!id.is_empty());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn buffers_messages_published_before_subscribe() {
        let bus = LocalBus::new();
        bus.publish("t", json!({"n": 1})).await.unwrap();
        bus.publish("t", json!({"n": 2})).await.unwrap();

        let seen = Arc::new(AtomicU32::new(0));
        let counter = seen.clone();
        bus.subscribe(
            "t",
            Arc::new(move |_env| {
                let counter = counter.clone();
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
        )
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn redelivers_until_the_handler_succeeds() {
        let bus = LocalBus::new();
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        bus.subscribe(
            "t",
            Arc::new(move |env| {
                let counter = counter.clone();
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if env.delivery_count < 2 {
                        anyhow::bail!("transient failure");
                    }
                    Ok(())
                })
            }),
        )
        .await
        .unwrap();

        bus.publish("t", json!({})).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn second_subscriber_is_rejected() {
        let bus = LocalBus::new();
        let noop: Handler = Arc::new(|_env| Box::pin(async { Ok(()) }));
        bus.subscribe("t", noop.clone()).await.unwrap();
        assert!(matches!(
            bus.subscribe("t", noop).await,
            Err(BusError::AlreadySubscribed(_))
        ));
    }
}
