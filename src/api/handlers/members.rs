//! Project membership role endpoint
//!
//! Admin-only. A member can never move their own role away from admin,
//! and a project always retains at least one admin.

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::info;

use crate::api::error::ApiError;
use crate::api::middleware::{require_role, CurrentUser};
use crate::domain::{Role, ValidationFault};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: String,
}

/// PUT /api/v1/projects/{projectId}/users/{userId}/role - change a role
pub async fn change_role(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    current: CurrentUser,
    body: web::Json<ChangeRoleRequest>,
) -> Result<HttpResponse, ApiError> {
    let (project_id, target_id) = path.into_inner();
    let caller_id = current.user.user_id.clone();

    let new_role = Role::parse(&body.role).ok_or(ValidationFault {
        field: "role",
        message: "role must be one of: viewer, editor, admin",
    })?;

    state
        .services
        .projects
        .with_project(&project_id, |project| {
            require_role(project, &caller_id, Role::Admin)?;

            if target_id == caller_id && new_role != Role::Admin {
                return Err(ApiError::Forbidden(
                    "cannot remove your own admin role".into(),
                ));
            }

            let admin_count = project.admin_count();
            let member = project
                .users
                .iter_mut()
                .find(|u| u.id == target_id)
                .ok_or_else(|| ApiError::NotFound(format!("member {target_id}")))?;

            if member.role == Role::Admin && new_role != Role::Admin && admin_count <= 1 {
                return Err(ValidationFault {
                    field: "role",
                    message: "project must retain at least one admin",
                }
                .into());
            }

            member.role = new_role;
            Ok::<_, ApiError>(())
        })
        .await??;

    info!(
        project_id = %project_id,
        target_id = %target_id,
        role = %new_role.as_str(),
        changed_by = %caller_id,
        "member role changed"
    );

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "userId": target_id,
        "role": new_role,
    })))
}
