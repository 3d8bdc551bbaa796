//! Log submission endpoint
//!
//! The producer pipeline: authenticate the API key, validate and
//! normalize the payload, evaluate key constraints, reserve quota, then
//! publish to the ingestion topic. A 202 means the bus has acknowledged
//! the message; persistence happens asynchronously.

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::api::error::ApiError;
use crate::api::middleware::{build_envelope, extract_api_key, resolve_api_key};
use crate::bus::TOPIC_LOG_INGESTION;
use crate::domain::LogSubmission;
use crate::AppState;

/// Body of a 202 response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub message: &'static str,
    pub message_id: String,
    pub log_level: String,
    pub log_message: String,
    pub category: String,
    pub environment: String,
    pub hostname: Option<String>,
}

/// POST /api/v1/logs - submit a log record
pub async fn submit_log(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<LogSubmission>,
) -> Result<HttpResponse, ApiError> {
    let services = &state.services;
    let now = Utc::now();

    let token = extract_api_key(&req)
        .ok_or_else(|| ApiError::Unauthorized("API key required in X-API-Key header".into()))?;
    let resolved = resolve_api_key(services, &token).await?;

    let log = body.into_inner().normalize(resolved.project.id, now)?;

    if log.project_id != resolved.project.project_id {
        return Err(ApiError::Forbidden(
            "API key does not belong to the submitted project".into(),
        ));
    }

    let envelope = build_envelope(&req, &log.environment);
    if let Err(constraint) = resolved.compiled.evaluate(&envelope, now) {
        info!(
            project_id = %log.project_id,
            key_id = %resolved.key_id,
            constraint = %constraint,
            "submission blocked by API key constraint"
        );
        return Err(ApiError::Constraint(constraint));
    }

    let owner_id = resolved.project.owner_id.clone();
    let meta = match services.usage_cache.get(&owner_id) {
        Some(meta) => meta,
        None => {
            let meta = services
                .users
                .usage_meta(&owner_id)
                .await?
                .ok_or_else(|| ApiError::Internal(format!("owner {owner_id} unresolvable")))?;
            services.usage_cache.insert(owner_id.clone(), meta.clone());
            meta
        }
    };

    let decision = services
        .quota
        .check_and_reserve(&owner_id, meta.user_created_at, meta.log_limit, 1, now)
        .await;

    if !decision.allowed {
        let limit = meta.log_limit.unwrap_or(0);
        warn!(
            owner_id = %owner_id,
            project_id = %log.project_id,
            current = decision.current,
            limit,
            "submission rejected, monthly limit reached"
        );

        let notifier = services.notifier.clone();
        let owner_email = meta.email.clone();
        let window = decision.window.clone();
        tokio::spawn(async move {
            notifier
                .notify_limit_reached(&owner_id, &owner_email, limit, &window)
                .await;
        });

        return Err(ApiError::QuotaExceeded {
            limit,
            current: decision.current,
            period_start: decision.window.start,
            period_end: decision.window.end,
        });
    }

    let payload = serde_json::to_value(&log)
        .map_err(|e| ApiError::Internal(format!("payload encode failed: {e}")))?;
    let message_id = services.bus.publish(TOPIC_LOG_INGESTION, payload).await?;

    info!(
        project_id = %log.project_id,
        log_id = %log.id,
        message_id = %message_id,
        level = %log.level,
        "log accepted for ingestion"
    );

    Ok(HttpResponse::Accepted().json(SubmitResponse {
        message: "Log accepted for ingestion",
        message_id,
        log_level: log.level,
        log_message: log.message,
        category: log.category,
        environment: log.environment,
        hostname: log.hostname,
    }))
}
