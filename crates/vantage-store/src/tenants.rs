use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use vantage_core::ids::TenantId;
use vantage_core::scope::TenantScope;
use vantage_core::time::format_ts;

use crate::error::StoreError;
use crate::pool::Store;
use crate::row_helpers;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Suspended,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Suspended => write!(f, "suspended"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "suspended" => Ok(Self::Suspended),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown subscription status: {other}")),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TenantRow {
    pub id: TenantId,
    pub name: String,
    /// Public key embedded in tracking snippets (`customerId` on the wire).
    pub site_key: String,
    pub status: SubscriptionStatus,
    /// 0 means unlimited.
    pub max_monthly_events: i64,
    pub max_users: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone)]
pub struct TenantRepo {
    store: Store,
}

impl TenantRepo {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Create a tenant at onboarding. Starts `active`.
    #[instrument(skip(self), fields(name, site_key))]
    pub fn create(
        &self,
        name: &str,
        site_key: &str,
        max_monthly_events: i64,
        max_users: i64,
    ) -> Result<TenantRow, StoreError> {
        let id = TenantId::new();
        let now = format_ts(&Utc::now());

        self.store.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tenants (id, name, site_key, status, max_monthly_events, max_users, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 'active', ?4, ?5, ?6, ?7)",
                rusqlite::params![id.as_str(), name, site_key, max_monthly_events, max_users, now, now],
            )?;

            Ok(TenantRow {
                id,
                name: name.to_string(),
                site_key: site_key.to_string(),
                status: SubscriptionStatus::Active,
                max_monthly_events,
                max_users,
                created_at: now.clone(),
                updated_at: now,
            })
        })
    }

    /// Get a tenant by ID.
    #[instrument(skip(self), fields(tenant_id = %id))]
    pub fn get(&self, id: &TenantId) -> Result<TenantRow, StoreError> {
        self.store.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, site_key, status, max_monthly_events, max_users, created_at, updated_at
                 FROM tenants WHERE id = ?1",
            )?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_tenant(row),
                None => Err(StoreError::NotFound(format!("tenant {id}"))),
            }
        })
    }

    /// Resolve a tenant by its public site key. This is the ingest
    /// path's entry point; the returned row is what grants a scope.
    #[instrument(skip(self), fields(site_key))]
    pub fn get_by_site_key(&self, site_key: &str) -> Result<TenantRow, StoreError> {
        self.store.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, site_key, status, max_monthly_events, max_users, created_at, updated_at
                 FROM tenants WHERE site_key = ?1",
            )?;
            let mut rows = stmt.query([site_key])?;
            match rows.next()? {
                Some(row) => row_to_tenant(row),
                None => Err(StoreError::NotFound(format!("site key {site_key}"))),
            }
        })
    }

    /// Change subscription status. Tenants are never hard-deleted.
    #[instrument(skip(self), fields(tenant_id = %id, status = %status))]
    pub fn set_status(
        &self,
        id: &TenantId,
        status: SubscriptionStatus,
    ) -> Result<(), StoreError> {
        self.store.with_conn(|conn| {
            let now = format_ts(&Utc::now());
            conn.execute(
                "UPDATE tenants SET status = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![status.to_string(), now, id.as_str()],
            )?;
            Ok(())
        })
    }

    /// Count one ingested event against the tenant's monthly usage and
    /// return the new total. Single atomic upsert, no read-modify-write.
    #[instrument(skip(self), fields(tenant_id = %scope.tenant_id(), month))]
    pub fn record_event_usage(
        &self,
        scope: &TenantScope,
        month: &str,
    ) -> Result<i64, StoreError> {
        self.store.with_conn(|conn| {
            let used: i64 = conn.query_row(
                "INSERT INTO tenant_usage (tenant_id, month, events) VALUES (?1, ?2, 1)
                 ON CONFLICT (tenant_id, month) DO UPDATE SET events = events + 1
                 RETURNING events",
                rusqlite::params![scope.tenant_id().as_str(), month],
                |row| row.get(0),
            )?;
            Ok(used)
        })
    }

    /// Events ingested for the tenant in the given month.
    #[instrument(skip(self), fields(tenant_id = %scope.tenant_id(), month))]
    pub fn monthly_usage(&self, scope: &TenantScope, month: &str) -> Result<i64, StoreError> {
        self.store.with_conn(|conn| {
            let used: i64 = conn
                .query_row(
                    "SELECT events FROM tenant_usage WHERE tenant_id = ?1 AND month = ?2",
                    rusqlite::params![scope.tenant_id().as_str(), month],
                    |row| row.get(0),
                )
                .unwrap_or(0);
            Ok(used)
        })
    }
}

fn row_to_tenant(row: &rusqlite::Row<'_>) -> Result<TenantRow, StoreError> {
    let status_str: String = row_helpers::get(row, 3, "tenants", "status")?;

    Ok(TenantRow {
        id: TenantId::from_raw(row_helpers::get::<String>(row, 0, "tenants", "id")?),
        name: row_helpers::get(row, 1, "tenants", "name")?,
        site_key: row_helpers::get(row, 2, "tenants", "site_key")?,
        status: row_helpers::parse_enum(&status_str, "tenants", "status")?,
        max_monthly_events: row_helpers::get(row, 4, "tenants", "max_monthly_events")?,
        max_users: row_helpers::get(row, 5, "tenants", "max_users")?,
        created_at: row_helpers::get(row, 6, "tenants", "created_at")?,
        updated_at: row_helpers::get(row, 7, "tenants", "updated_at")?,
    })
}
