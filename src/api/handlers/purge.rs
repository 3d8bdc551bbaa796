//! Log purge endpoint
//!
//! Admin-only, two mutually exclusive modes: an explicit id list in the
//! body, or a time filter in the query string. Deletes propagate to the
//! search index; an index failure is logged and the response reports the
//! store's deletion count.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use tracing::{error, info};

use crate::api::error::ApiError;
use crate::api::middleware::{require_role, CurrentUser};
use crate::domain::{Role, ValidationFault};
use crate::purge::{validate_log_ids, PurgeParams};
use crate::AppState;

/// Optional body for purge-by-ids
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeBody {
    pub log_ids: Option<Vec<String>>,
}

/// DELETE /api/v1/logs/{projectId} - purge logs
pub async fn purge_logs(
    state: web::Data<AppState>,
    path: web::Path<String>,
    current: CurrentUser,
    params: web::Query<PurgeParams>,
    body: Option<web::Json<PurgeBody>>,
) -> Result<HttpResponse, ApiError> {
    let project_id = path.into_inner();
    let services = &state.services;

    let project = services
        .projects
        .find_by_project_id(&project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("project {project_id}")))?;
    require_role(&project, &current.user.user_id, Role::Admin)?;

    let log_ids = body.and_then(|b| b.into_inner().log_ids);

    let deleted = match log_ids {
        Some(ids) => {
            if params.has_time_selector() {
                return Err(ValidationFault {
                    field: "logIds",
                    message: "logIds and time selectors are mutually exclusive",
                }
                .into());
            }
            let ids = validate_log_ids(&ids)?;
            let deleted = services.logs.delete_by_ids(&project.project_id, &ids).await?;
            if let Err(e) = services
                .index
                .delete_by_ids(&project.project_id, &ids)
                .await
            {
                error!(project_id = %project.project_id, error = %e, "index purge failed");
            }
            deleted
        }
        None => {
            let filter = params.plan(Utc::now())?;
            let deleted = services
                .logs
                .delete_by_filter(&project.project_id, &filter)
                .await?;
            if let Err(e) = services
                .index
                .delete_by_query(&project.project_id, &filter)
                .await
            {
                error!(project_id = %project.project_id, error = %e, "index purge failed");
            }
            deleted
        }
    };

    info!(
        project_id = %project.project_id,
        user_id = %current.user.user_id,
        deleted,
        "purge completed"
    );
    Ok(HttpResponse::Ok().json(serde_json::json!({ "deletedCount": deleted })))
}
