use vantage_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The only event-shape rejection: a missing event name or an
    /// unresolvable customer key. Malformed optional fields never land
    /// here.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("tenant subscription is {status}")]
    TenantInactive { status: String },

    #[error("monthly event limit exceeded: {used} of {limit}")]
    LimitExceeded { used: i64, limit: i64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}
