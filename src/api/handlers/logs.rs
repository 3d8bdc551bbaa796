//! Single-log fetch endpoint

use actix_web::{web, HttpResponse};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::middleware::{require_member, CurrentUser};
use crate::AppState;

/// GET /api/v1/logs/{projectId}/{logId} - fetch one log record
pub async fn get_log(
    state: web::Data<AppState>,
    path: web::Path<(String, Uuid)>,
    current: CurrentUser,
) -> Result<HttpResponse, ApiError> {
    let (project_id, log_id) = path.into_inner();
    let services = &state.services;

    let project = services
        .projects
        .find_by_project_id(&project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("project {project_id}")))?;
    require_member(&project, &current.user.user_id)?;

    let log = services
        .logs
        .find_by_id(&project.project_id, log_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("log {log_id}")))?;

    Ok(HttpResponse::Ok().json(log))
}
