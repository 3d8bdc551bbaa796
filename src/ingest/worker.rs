//! Ingestion consumer
//!
//! Persists each accepted submission to the store, mirrors it to the
//! search index, and publishes the alarm-evaluation event. The bus
//! delivers at-least-once, so both writes are idempotent on the log id.
//! The index is secondary: its failure is logged, not retried through the
//! bus; a store failure fails the message so the bus redelivers.

use std::sync::Arc;

use tracing::{info, warn};

use crate::bus::{BusEnvelope, BusError, Handler, TOPIC_LOG_ALARM, TOPIC_LOG_INGESTION};
use crate::domain::LogRecord;
use crate::services::Services;

/// Consumer for the `log-ingestion` topic
pub struct IngestWorker;

impl IngestWorker {
    /// Attach the worker to the bus.
    pub async fn start(services: Arc<Services>) -> Result<(), BusError> {
        let bus = services.bus.clone();
        let handler: Handler = Arc::new(move |envelope| {
            let services = services.clone();
            Box::pin(async move { handle(services, envelope).await })
        });
        bus.subscribe(TOPIC_LOG_INGESTION, handler).await
    }
}

async fn handle(services: Arc<Services>, envelope: BusEnvelope) -> anyhow::Result<()> {
    let log: LogRecord = serde_json::from_value(envelope.payload)?;

    let (store_result, index_result) =
        tokio::join!(services.logs.create_log(&log), services.index.index_log(&log));

    // The store write is authoritative; bubbling the error hands the
    // message back to the bus for redelivery.
    store_result?;

    if let Err(e) = index_result {
        warn!(
            log_id = %log.id,
            project_id = %log.project_id,
            error = %e,
            "search index mirror failed, log persisted without it"
        );
    }

    services
        .bus
        .publish(
            TOPIC_LOG_ALARM,
            serde_json::json!({ "logId": log.id, "logData": log }),
        )
        .await?;

    info!(
        log_id = %log.id,
        project_id = %log.project_id,
        delivery_count = envelope.delivery_count,
        "log persisted"
    );
    Ok(())
}
