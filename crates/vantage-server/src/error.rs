//! Error-to-HTTP mapping.
//!
//! Authentication failures collapse to generic messages: the response
//! never reveals whether the email or the password was wrong. Storage
//! failures surface as 500 without detail; the detail goes to the log.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use vantage_auth::AuthError;
use vantage_pipeline::PipelineError;
use vantage_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{error}")]
    Forbidden { error: String, details: String },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    LimitExceeded(String),

    #[error("internal server error")]
    Internal(String),
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials => Self::Unauthorized("Invalid credentials".to_string()),
            AuthError::TenantInactive { status } => Self::Forbidden {
                error: format!("Subscription {status}"),
                details: format!("This account's subscription is {status}"),
            },
            AuthError::TokenInvalid(_) | AuthError::TokenExpired => {
                Self::Unauthorized("Invalid or expired token".to_string())
            }
            AuthError::Crypto(detail) => Self::Internal(detail),
            AuthError::Store(e) => e.into(),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::InvalidEvent(reason) => Self::BadRequest(reason),
            PipelineError::TenantInactive { status } => Self::Forbidden {
                error: format!("Subscription {status}"),
                details: format!("This account's subscription is {status}"),
            },
            PipelineError::LimitExceeded { used, limit } => {
                Self::LimitExceeded(format!("monthly event limit exceeded: {used} of {limit}"))
            }
            PipelineError::Store(e) => e.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => Self::NotFound(what),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<vantage_core::scope::MissingTenantScope> for ApiError {
    fn from(e: vantage_core::scope::MissingTenantScope) -> Self {
        Self::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg })),
            Self::Forbidden { error, details } => (
                StatusCode::FORBIDDEN,
                json!({ "error": error, "details": details }),
            ),
            Self::NotFound(what) => {
                (StatusCode::NOT_FOUND, json!({ "error": format!("not found: {what}") }))
            }
            Self::LimitExceeded(msg) => (StatusCode::TOO_MANY_REQUESTS, json!({ "error": msg })),
            Self::Internal(detail) => {
                error!(detail = %detail, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_credentials_is_generic_401() {
        let api: ApiError = AuthError::InvalidCredentials.into();
        match api {
            ApiError::Unauthorized(msg) => assert_eq!(msg, "Invalid credentials"),
            other => panic!("expected Unauthorized, got {other:?}"),
        }
    }

    #[test]
    fn suspended_tenant_mentions_status() {
        let api: ApiError = AuthError::TenantInactive {
            status: "suspended".to_string(),
        }
        .into();
        match api {
            ApiError::Forbidden { error, details } => {
                assert!(error.contains("suspended"));
                assert!(details.contains("suspended"));
            }
            other => panic!("expected Forbidden, got {other:?}"),
        }
    }

    #[test]
    fn token_errors_share_one_message() {
        let invalid: ApiError = AuthError::TokenInvalid("bad signature".to_string()).into();
        let expired: ApiError = AuthError::TokenExpired.into();
        assert_eq!(invalid.to_string(), expired.to_string());
    }

    #[test]
    fn storage_errors_hide_detail() {
        let api: ApiError = StoreError::Unavailable("pool timed out".to_string()).into();
        assert!(matches!(api, ApiError::Internal(_)));
    }

    #[test]
    fn store_not_found_maps_to_404() {
        let api: ApiError = StoreError::NotFound("session sess_x".to_string()).into();
        assert!(matches!(api, ApiError::NotFound(_)));
    }
}
