//! Operator authentication: bearer-token guard
//!
//! `CurrentUser` extracts and verifies the `Authorization: Bearer` token,
//! then resolves the caller through the user store. Membership and role
//! checks run against the target project aggregate per route.

use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use futures::future::LocalBoxFuture;

use crate::api::error::ApiError;
use crate::db::User;
use crate::domain::{Project, Role};
use crate::AppState;

/// The authenticated operator
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
}

impl FromRequest for CurrentUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            let bearer = BearerAuth::extract(&req)
                .await
                .map_err(|_| ApiError::Unauthorized("bearer token required".into()))?;

            let state = req
                .app_data::<web::Data<AppState>>()
                .ok_or_else(|| ApiError::Internal("application state missing".into()))?;

            let token = state
                .services
                .verifier
                .verify(bearer.token())
                .await
                .ok_or_else(|| ApiError::Unauthorized("invalid bearer token".into()))?;

            let user = state
                .services
                .users
                .find_by_user_id(&token.user_id)
                .await?
                .ok_or_else(|| ApiError::Unauthorized("unknown user".into()))?;

            Ok(CurrentUser { user })
        })
    }
}

/// Require any membership; returns the member's role.
pub fn require_member(project: &Project, user_id: &str) -> Result<Role, ApiError> {
    project
        .role_of(user_id)
        .ok_or_else(|| ApiError::Forbidden("not a member of this project".into()))
}

/// Require at least `min_role` membership.
pub fn require_role(project: &Project, user_id: &str, min_role: Role) -> Result<Role, ApiError> {
    let role = require_member(project, user_id)?;
    if role < min_role {
        return Err(ApiError::Forbidden(format!(
            "requires {} access",
            min_role.as_str()
        )));
    }
    Ok(role)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProjectUser;
    use chrono::Utc;
    use uuid::Uuid;

    fn project() -> Project {
        Project {
            id: Uuid::new_v4(),
            project_id: "acme-api".into(),
            owner_id: "owner-1".into(),
            users: vec![
                ProjectUser {
                    id: "owner-1".into(),
                    role: Role::Admin,
                },
                ProjectUser {
                    id: "dev-1".into(),
                    role: Role::Editor,
                },
                ProjectUser {
                    id: "viewer-1".into(),
                    role: Role::Viewer,
                },
            ],
            api_keys: vec![],
            alarms: vec![],
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn non_members_are_rejected() {
        let p = project();
        assert!(require_member(&p, "stranger").is_err());
        assert_eq!(require_member(&p, "viewer-1").unwrap(), Role::Viewer);
    }

    #[test]
    fn role_floor_is_enforced() {
        let p = project();
        assert!(require_role(&p, "viewer-1", Role::Editor).is_err());
        assert!(require_role(&p, "dev-1", Role::Editor).is_ok());
        assert!(require_role(&p, "dev-1", Role::Admin).is_err());
        assert!(require_role(&p, "owner-1", Role::Admin).is_ok());
    }
}
