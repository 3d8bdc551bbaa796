//! HTTP error mapping
//!
//! One error enum covers the whole operator and producer surface so every
//! handler returns the same stable JSON bodies: validation errors name
//! the offending field, constraint denials name the failing predicate,
//! and quota denials carry the billing window.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::error;

use crate::bus::BusError;
use crate::db::DbError;
use crate::domain::ValidationFault;
use crate::search::SearchError;

/// Request-level errors with stable wire shapes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(ValidationFault),

    #[error("{0}")]
    Unauthorized(String),

    /// C1 denial carrying the first failing predicate's name
    #[error("request blocked by API key constraint {0}")]
    Constraint(&'static str),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("monthly log limit reached")]
    QuotaExceeded {
        limit: i64,
        current: i64,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    },

    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    #[error("store error: {0}")]
    Store(DbError),

    #[error("search error: {0}")]
    Search(#[from] SearchError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ValidationFault> for ApiError {
    fn from(fault: ValidationFault) -> Self {
        ApiError::Validation(fault)
    }
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound(what) => ApiError::NotFound(what),
            other => ApiError::Store(other),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Constraint(_) | ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Bus(_)
            | ApiError::Store(_)
            | ApiError::Search(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            error!(error = %self, "request failed");
        }

        let body = match self {
            ApiError::Validation(fault) => serde_json::json!({
                "error": "validation_error",
                "field": fault.field,
                "message": fault.to_string(),
            }),
            ApiError::Unauthorized(message) => serde_json::json!({
                "error": "unauthorized",
                "message": message,
            }),
            ApiError::Constraint(name) => serde_json::json!({
                "error": "forbidden",
                "message": "request blocked by an API key constraint",
                "constraint": name,
            }),
            ApiError::Forbidden(message) => serde_json::json!({
                "error": "forbidden",
                "message": message,
            }),
            ApiError::NotFound(what) => serde_json::json!({
                "error": "not_found",
                "message": format!("{what} not found"),
            }),
            ApiError::QuotaExceeded {
                limit,
                current,
                period_start,
                period_end,
            } => serde_json::json!({
                "error": "monthly log limit reached",
                "limit": limit,
                "current": current,
                "periodStart": period_start.to_rfc3339(),
                "periodEnd": period_end.to_rfc3339(),
            }),
            ApiError::Bus(_) | ApiError::Store(_) | ApiError::Search(_) | ApiError::Internal(_) => {
                serde_json::json!({
                    "error": "internal_error",
                    "message": "an internal error occurred",
                })
            }
        };

        HttpResponse::build(self.status_code()).json(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn statuses_follow_the_error_kind() {
        assert_eq!(
            ApiError::Validation(ValidationFault::missing("level")).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Unauthorized("API key required".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Constraint("ipRestrictions").status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::NotFound("log".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        let quota = ApiError::QuotaExceeded {
            limit: 10_000,
            current: 10_000,
            period_start: Utc.with_ymd_and_hms(2024, 6, 15, 0, 0, 0).unwrap(),
            period_end: Utc.with_ymd_and_hms(2024, 7, 15, 0, 0, 0).unwrap(),
        };
        assert_eq!(quota.status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn store_not_found_maps_to_404() {
        let err: ApiError = DbError::NotFound("project acme".into()).into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
