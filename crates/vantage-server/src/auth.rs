//! Login endpoint.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use vantage_core::ids::TenantId;

use crate::error::ApiError;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub tenant_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: UserView,
    pub tenant: TenantView,
    pub token: String,
    pub expires_in: u64,
}

/// Public projection of a user. The credential hash never leaves the
/// store layer.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub role: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantView {
    pub id: String,
    pub name: String,
    pub status: String,
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let email = request
        .email
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let password = request.password.as_deref().filter(|v| !v.is_empty());

    let (Some(email), Some(password)) = (email, password) else {
        return Err(ApiError::BadRequest("Email and password are required".to_string()));
    };

    let hint = request.tenant_id.map(TenantId::from_raw);
    let success = state.gate.authenticate(email, password, hint.as_ref())?;

    Ok(Json(LoginResponse {
        user: UserView {
            id: success.user.id.to_string(),
            email: success.user.email,
            role: success.user.role.to_string(),
        },
        tenant: TenantView {
            id: success.tenant.id.to_string(),
            name: success.tenant.name,
            status: success.tenant.status.to_string(),
        },
        token: success.token,
        expires_in: success.expires_in,
    }))
}
