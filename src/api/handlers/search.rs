//! Log search endpoint

use actix_web::{web, HttpResponse};
use serde::Serialize;
use tracing::warn;

use crate::api::error::ApiError;
use crate::api::middleware::{require_member, CurrentUser};
use crate::domain::{LogRecord, QueryRequest};
use crate::AppState;

/// Pagination block of a search response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub logs: Vec<LogRecord>,
    pub pagination: Pagination,
}

/// POST /api/v1/logs/{projectId}/search - query a project's logs
pub async fn search_logs(
    state: web::Data<AppState>,
    path: web::Path<String>,
    current: CurrentUser,
    body: web::Json<QueryRequest>,
) -> Result<HttpResponse, ApiError> {
    let project_id = path.into_inner();
    let services = &state.services;

    let project = services
        .projects
        .find_by_project_id(&project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("project {project_id}")))?;
    require_member(&project, &current.user.user_id)?;

    let request = body.into_inner();
    if request.doc_filter.is_some() && request.has_field_filters() {
        warn!(
            project_id = %project_id,
            "docFilter present, ignoring per-field compound filters"
        );
    }
    let spec = request.validate()?;

    let page = services.index.search(&project.project_id, &spec).await?;

    let total_pages = (page.total + spec.page_size as i64 - 1) / spec.page_size as i64;
    Ok(HttpResponse::Ok().json(SearchResponse {
        logs: page.logs,
        pagination: Pagination {
            page: spec.page,
            page_size: spec.page_size,
            total: page.total,
            total_pages,
        },
    }))
}
