//! Signed, time-limited bearer tokens (HS256 JWT).
//!
//! The signing secret is process-wide configuration validated at
//! startup; it is never taken from request input and has no compiled
//! default.

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use vantage_core::ids::{TenantId, UserId};
use vantage_core::scope::{MissingTenantScope, TenantScope};

use crate::errors::AuthError;

/// Token issuance configuration.
#[derive(Clone, Debug)]
pub struct TokenConfig {
    pub secret: String,
    /// Token lifetime in seconds (default configuration: 7 days).
    pub ttl_secs: u64,
}

/// Verified token claims. Downstream components receive these, never a
/// raw tenant identifier from an unauthenticated caller.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject — user id.
    pub sub: String,
    pub tenant_id: String,
    pub email: String,
    pub role: String,
    /// Issued-at (Unix timestamp).
    pub iat: i64,
    /// Expiration (Unix timestamp).
    pub exp: i64,
}

impl Claims {
    pub fn user_id(&self) -> UserId {
        UserId::from_raw(self.sub.clone())
    }

    /// The only way request handlers obtain a tenant scope.
    pub fn scope(&self) -> Result<TenantScope, MissingTenantScope> {
        TenantScope::try_new(TenantId::from_raw(self.tenant_id.clone()))
    }
}

/// Issue a signed token binding `{userId, tenantId, email, role}`.
pub fn issue_token(
    user_id: &UserId,
    tenant_id: &TenantId,
    email: &str,
    role: &str,
    config: &TokenConfig,
) -> Result<String, AuthError> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.as_str().to_string(),
        tenant_id: tenant_id.as_str().to_string(),
        email: email.to_string(),
        role: role.to_string(),
        iat: now,
        exp: now + config.ttl_secs as i64,
    };

    let key = EncodingKey::from_secret(config.secret.as_bytes());
    jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &key)
        .map_err(|e| AuthError::Crypto(format!("JWT encode: {e}")))
}

/// Decode and verify a token: signature, expiry, required claims.
pub fn decode_token(token: &str, config: &TokenConfig) -> Result<Claims, AuthError> {
    let key = DecodingKey::from_secret(config.secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_required_spec_claims(&["exp", "iat"]);

    jsonwebtoken::decode::<Claims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::TokenInvalid(e.to_string()),
        })
}
