//! API key management endpoints
//!
//! Admin or editor membership required. All mutations go through the
//! project aggregate's versioned read-modify-write and invalidate the
//! key resolution cache.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::middleware::{require_role, CurrentUser};
use crate::domain::project::{ApiKey, ApiKeyConstraints};
use crate::domain::Role;
use crate::AppState;

/// Request to create a new API key
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateKeyRequest {
    #[serde(default)]
    pub constraints: Option<ApiKeyConstraints>,
}

/// A key as returned to operators
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyView {
    pub id: Uuid,
    pub key: String,
    pub created_at: String,
    pub constraints: ApiKeyConstraints,
}

impl From<&ApiKey> for KeyView {
    fn from(key: &ApiKey) -> Self {
        KeyView {
            id: key.id,
            key: key.key.clone(),
            created_at: key.created_at.to_rfc3339(),
            constraints: key.constraints.clone(),
        }
    }
}

/// POST /api/v1/projects/{projectId}/api-keys - mint a key
pub async fn create_key(
    state: web::Data<AppState>,
    path: web::Path<String>,
    current: CurrentUser,
    body: web::Json<CreateKeyRequest>,
) -> Result<HttpResponse, ApiError> {
    let project_id = path.into_inner();
    let services = &state.services;
    let constraints = body.into_inner().constraints.unwrap_or_default();
    let user_id = current.user.user_id.clone();

    let created: ApiKey = services
        .projects
        .with_project(&project_id, |project| {
            require_role(project, &user_id, Role::Editor)?;
            let mut key = ApiKey::generate(Utc::now());
            key.constraints = constraints.clone();
            project.api_keys.push(key.clone());
            Ok::<_, ApiError>(key)
        })
        .await??;

    services.key_cache.invalidate_project(&project_id);
    info!(
        project_id = %project_id,
        key_id = %created.id,
        user_id = %user_id,
        "API key created"
    );

    Ok(HttpResponse::Created().json(KeyView::from(&created)))
}

/// GET /api/v1/projects/{projectId}/api-keys - list keys
pub async fn list_keys(
    state: web::Data<AppState>,
    path: web::Path<String>,
    current: CurrentUser,
) -> Result<HttpResponse, ApiError> {
    let project_id = path.into_inner();

    let project = state
        .services
        .projects
        .find_by_project_id(&project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("project {project_id}")))?;
    require_role(&project, &current.user.user_id, Role::Editor)?;

    let keys: Vec<KeyView> = project.api_keys.iter().map(KeyView::from).collect();
    Ok(HttpResponse::Ok().json(serde_json::json!({ "apiKeys": keys })))
}

/// DELETE /api/v1/projects/{projectId}/api-keys/{keyId} - delete a key
pub async fn delete_key(
    state: web::Data<AppState>,
    path: web::Path<(String, Uuid)>,
    current: CurrentUser,
) -> Result<HttpResponse, ApiError> {
    let (project_id, key_id) = path.into_inner();
    let services = &state.services;
    let user_id = current.user.user_id.clone();

    services
        .projects
        .with_project(&project_id, |project| {
            require_role(project, &user_id, Role::Editor)?;
            let position = project
                .api_keys
                .iter()
                .position(|k| k.id == key_id)
                .ok_or_else(|| ApiError::NotFound(format!("API key {key_id}")))?;
            project.api_keys.remove(position);
            Ok::<_, ApiError>(())
        })
        .await??;

    services.key_cache.invalidate_project(&project_id);
    info!(
        project_id = %project_id,
        key_id = %key_id,
        user_id = %user_id,
        "API key deleted"
    );

    Ok(HttpResponse::Ok().json(serde_json::json!({ "deleted": true, "id": key_id })))
}
