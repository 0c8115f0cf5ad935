use vantage_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Wrong email and wrong password are indistinguishable by design.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("tenant subscription is {status}")]
    TenantInactive { status: String },

    #[error("token invalid: {0}")]
    TokenInvalid(String),

    #[error("token expired")]
    TokenExpired,

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
