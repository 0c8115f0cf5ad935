//! Bearer-token extraction.
//!
//! Handlers that need tenant data take an [`Authenticated`] parameter;
//! the claims inside are the only source of a tenant scope. No handler
//! accepts a raw tenant identifier from the request.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use vantage_auth::Claims;

use crate::error::ApiError;
use crate::server::AppState;

/// Verified claims of the calling user.
pub struct Authenticated(pub Claims);

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing authorization token".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::Unauthorized("Missing authorization token".to_string()))?;

        let claims = state.gate.authorize(token)?;
        Ok(Self(claims))
    }
}
