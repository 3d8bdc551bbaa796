//! Facet enumeration endpoints
//!
//! Distinct values with counts for one scalar field, scoped to a
//! `(projectId, logType)` pair. Unpaginated; bounded by facet cardinality.

use actix_web::{web, HttpResponse};
use chrono::Utc;

use crate::api::error::ApiError;
use crate::api::middleware::{require_member, CurrentUser};
use crate::domain::log::LogType;
use crate::domain::ValidationFault;
use crate::search::FacetField;
use crate::AppState;

async fn facet_response(
    state: &AppState,
    current: &CurrentUser,
    project_id: &str,
    raw_log_type: &str,
    field: FacetField,
) -> Result<HttpResponse, ApiError> {
    let log_type = LogType::parse(raw_log_type).ok_or(ValidationFault {
        field: "logType",
        message: "logType must be one of: application, system",
    })?;

    let project = state
        .services
        .projects
        .find_by_project_id(project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("project {project_id}")))?;
    require_member(&project, &current.user.user_id)?;

    let values = state
        .services
        .index
        .facet(&project.project_id, log_type, field)
        .await?;

    let facet = match field {
        FacetField::Environment => "environments",
        FacetField::Category => "categories",
        FacetField::Hostname => "hostnames",
    };
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "projectId": project.project_id,
        "logType": log_type,
        "facet": facet,
        "values": values,
        "generatedAt": Utc::now().to_rfc3339(),
    })))
}

/// GET /api/v1/logs/{projectId}/{logType}/environments
pub async fn environments(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    current: CurrentUser,
) -> Result<HttpResponse, ApiError> {
    let (project_id, log_type) = path.into_inner();
    facet_response(&state, &current, &project_id, &log_type, FacetField::Environment).await
}

/// GET /api/v1/logs/{projectId}/{logType}/categories
pub async fn categories(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    current: CurrentUser,
) -> Result<HttpResponse, ApiError> {
    let (project_id, log_type) = path.into_inner();
    facet_response(&state, &current, &project_id, &log_type, FacetField::Category).await
}

/// GET /api/v1/logs/{projectId}/{logType}/hostnames
pub async fn hostnames(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    current: CurrentUser,
) -> Result<HttpResponse, ApiError> {
    let (project_id, log_type) = path.into_inner();
    facet_response(&state, &current, &project_id, &log_type, FacetField::Hostname).await
}
