//! Persistence layer: pooled SQLite plus tenant-scoped repositories.
//!
//! Every read or write that touches sessions, users, or usage counters
//! takes a [`vantage_core::scope::TenantScope`]; the only unscoped
//! lookups are tenant resolution itself (by id or public site key) and
//! cross-tenant identity resolution during login.

pub mod error;
pub mod pool;
pub mod row_helpers;
pub mod schema;
pub mod sessions;
pub mod tenants;
pub mod users;

pub use error::StoreError;
pub use pool::{PoolConfig, Store};
pub use sessions::{EventRow, SessionRepo, SessionRow, SessionState};
pub use tenants::{SubscriptionStatus, TenantRepo, TenantRow};
pub use users::{Role, UserRepo, UserRow};
