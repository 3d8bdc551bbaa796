//! Alarm worker
//!
//! Consumes alarm-evaluation events, matches the persisted log against
//! the project's configured alarms, and fans out matches through the
//! dispatcher. A missing project is treated as deleted, not an error, so
//! the bus does not redeliver.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::bus::{BusEnvelope, BusError, Handler, TOPIC_LOG_ALARM};
use crate::domain::LogRecord;
use crate::services::Services;

use super::sinks::AlarmDispatcher;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlarmEvent {
    log_data: LogRecord,
}

/// Consumer for the `log-alarm` topic
pub struct AlarmWorker;

impl AlarmWorker {
    /// Attach the worker to the bus.
    pub async fn start(
        services: Arc<Services>,
        dispatcher: Arc<AlarmDispatcher>,
    ) -> Result<(), BusError> {
        let bus = services.bus.clone();
        let handler: Handler = Arc::new(move |envelope| {
            let services = services.clone();
            let dispatcher = dispatcher.clone();
            Box::pin(async move { handle(services, dispatcher, envelope).await })
        });
        bus.subscribe(TOPIC_LOG_ALARM, handler).await
    }
}

async fn handle(
    services: Arc<Services>,
    dispatcher: Arc<AlarmDispatcher>,
    envelope: BusEnvelope,
) -> anyhow::Result<()> {
    let event: AlarmEvent = serde_json::from_value(envelope.payload)?;
    let log = event.log_data;

    let project = match services.projects.find_by_project_id(&log.project_id).await? {
        Some(project) => project,
        None => {
            warn!(
                project_id = %log.project_id,
                log_id = %log.id,
                "project gone, skipping alarm evaluation"
            );
            return Ok(());
        }
    };

    let mut matched = 0usize;
    for alarm in &project.alarms {
        if alarm.matches(&log) {
            matched += 1;
            dispatcher.dispatch(alarm, &log).await;
        }
    }

    if matched > 0 {
        info!(
            project_id = %log.project_id,
            log_id = %log.id,
            matched,
            "alarms evaluated"
        );
    } else {
        debug!(project_id = %log.project_id, log_id = %log.id, "no alarms matched");
    }
    Ok(())
}
