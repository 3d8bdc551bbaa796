//! Quota usage endpoint

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::middleware::CurrentUser;
use crate::AppState;

/// Current-window quota status for the calling owner
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaResponse {
    /// `null` for unlimited plans
    pub limit: Option<i64>,
    pub current: i64,
    pub remaining: Option<i64>,
    pub period_start: String,
    pub period_end: String,
    pub subscription_plan_id: Option<Uuid>,
}

/// GET /api/v1/usage/quota - the caller's current quota window
pub async fn quota_status(
    state: web::Data<AppState>,
    current: CurrentUser,
) -> Result<HttpResponse, ApiError> {
    let services = &state.services;
    let user_id = &current.user.user_id;

    let meta = services
        .users
        .usage_meta(user_id)
        .await?
        .ok_or_else(|| ApiError::Internal(format!("owner {user_id} unresolvable")))?;

    let (current_usage, window) = services
        .quota
        .current_usage(user_id, meta.user_created_at, Utc::now())
        .await;

    Ok(HttpResponse::Ok().json(QuotaResponse {
        limit: meta.log_limit,
        current: current_usage,
        remaining: meta.log_limit.map(|l| (l - current_usage).max(0)),
        period_start: window.start.to_rfc3339(),
        period_end: window.end.to_rfc3339(),
        subscription_plan_id: meta.subscription_plan_id,
    }))
}
