use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use vantage_core::event::TrackingEvent;
use vantage_core::ids::{EventId, SessionId, TenantId};
use vantage_core::scope::TenantScope;
use vantage_core::time::format_ts;

use crate::error::StoreError;
use crate::pool::Store;
use crate::row_helpers;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Open,
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

impl std::str::FromStr for SessionState {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            other => Err(format!("unknown session state: {other}")),
        }
    }
}

/// A visitor session. Tenant id is immutable after creation; events are
/// append-only and read back in timestamp order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionRow {
    pub id: SessionId,
    pub tenant_id: TenantId,
    pub session_key: String,
    pub day_bucket: String,
    pub fingerprint_hash: String,
    pub state: SessionState,
    pub first_seen: String,
    pub last_seen: String,
    pub page_count: i64,
    pub event_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// A stored event row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventRow {
    pub id: EventId,
    pub session_id: SessionId,
    pub tenant_id: TenantId,
    pub name: String,
    pub domain: String,
    pub url: String,
    pub timestamp: String,
    pub payload: serde_json::Value,
}

#[derive(Clone)]
pub struct SessionRepo {
    store: Store,
}

const SESSION_COLUMNS: &str = "id, tenant_id, session_key, day_bucket, fingerprint_hash, state, \
     first_seen, last_seen, page_count, event_count, created_at, updated_at";

impl SessionRepo {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Create a new open session for a (key, bucket) pair.
    ///
    /// The partial unique index on open sessions makes this fail with
    /// `Conflict` when another writer created one concurrently; the
    /// caller re-queries and appends to the survivor.
    #[instrument(skip(self), fields(tenant_id = %scope.tenant_id(), session_key, day_bucket))]
    pub fn create_open(
        &self,
        scope: &TenantScope,
        session_key: &str,
        day_bucket: &str,
        fingerprint_hash: &str,
        seen_at: &str,
    ) -> Result<SessionRow, StoreError> {
        let id = SessionId::new();
        let now = format_ts(&Utc::now());

        self.store.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, tenant_id, session_key, day_bucket, fingerprint_hash,
                                       state, first_seen, last_seen, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'open', ?6, ?6, ?7, ?7)",
                rusqlite::params![
                    id.as_str(),
                    scope.tenant_id().as_str(),
                    session_key,
                    day_bucket,
                    fingerprint_hash,
                    seen_at,
                    now,
                ],
            )?;

            Ok(SessionRow {
                id,
                tenant_id: scope.tenant_id().clone(),
                session_key: session_key.to_string(),
                day_bucket: day_bucket.to_string(),
                fingerprint_hash: fingerprint_hash.to_string(),
                state: SessionState::Open,
                first_seen: seen_at.to_string(),
                last_seen: seen_at.to_string(),
                page_count: 0,
                event_count: 0,
                created_at: now.clone(),
                updated_at: now,
            })
        })
    }

    /// Find the open session for a (key, bucket) pair, if any.
    #[instrument(skip(self), fields(tenant_id = %scope.tenant_id(), session_key, day_bucket))]
    pub fn find_open(
        &self,
        scope: &TenantScope,
        session_key: &str,
        day_bucket: &str,
    ) -> Result<Option<SessionRow>, StoreError> {
        self.store.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE tenant_id = ?1 AND session_key = ?2 AND day_bucket = ?3 AND state = 'open'"
            ))?;
            let mut rows = stmt.query(rusqlite::params![
                scope.tenant_id().as_str(),
                session_key,
                day_bucket
            ])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_session(row)?)),
                None => Ok(None),
            }
        })
    }

    /// Get a session by ID, within the caller's tenant only.
    #[instrument(skip(self), fields(tenant_id = %scope.tenant_id(), session_id = %id))]
    pub fn get(&self, scope: &TenantScope, id: &SessionId) -> Result<SessionRow, StoreError> {
        self.store.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1 AND tenant_id = ?2"
            ))?;
            let mut rows = stmt.query(rusqlite::params![id.as_str(), scope.tenant_id().as_str()])?;
            match rows.next()? {
                Some(row) => row_to_session(row),
                None => Err(StoreError::NotFound(format!("session {id}"))),
            }
        })
    }

    /// Append an event and fold it into the session aggregates.
    ///
    /// `first_seen`/`last_seen` are min/max over event timestamps, so a
    /// late-arriving earlier event widens the window instead of
    /// corrupting it. Duplicate deliveries append twice by design.
    #[instrument(skip(self, event), fields(tenant_id = %scope.tenant_id(), session_id = %session_id, event_name = %event.name))]
    pub fn append_event(
        &self,
        scope: &TenantScope,
        session_id: &SessionId,
        event: &TrackingEvent,
    ) -> Result<EventRow, StoreError> {
        let id = EventId::new();
        let ts = format_ts(&event.timestamp);
        let now = format_ts(&Utc::now());
        let page_increment: i64 = if event.is_pageview() { 1 } else { 0 };

        self.store.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            tx.execute(
                "INSERT INTO events (id, session_id, tenant_id, name, domain, url, timestamp, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    id.as_str(),
                    session_id.as_str(),
                    scope.tenant_id().as_str(),
                    event.name,
                    event.domain,
                    event.url,
                    ts,
                    serde_json::to_string(&event.payload)?,
                ],
            )?;

            let changed = tx.execute(
                "UPDATE sessions SET
                    first_seen = MIN(first_seen, ?1),
                    last_seen = MAX(last_seen, ?1),
                    event_count = event_count + 1,
                    page_count = page_count + ?2,
                    updated_at = ?3
                 WHERE id = ?4 AND tenant_id = ?5",
                rusqlite::params![ts, page_increment, now, session_id.as_str(), scope.tenant_id().as_str()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("session {session_id}")));
            }

            tx.commit()?;

            Ok(EventRow {
                id,
                session_id: session_id.clone(),
                tenant_id: scope.tenant_id().clone(),
                name: event.name.clone(),
                domain: event.domain.clone(),
                url: event.url.clone(),
                timestamp: ts,
                payload: event.payload.clone(),
            })
        })
    }

    /// Close a session; it stops accepting merges and becomes eligible
    /// for scoring.
    #[instrument(skip(self), fields(tenant_id = %scope.tenant_id(), session_id = %id))]
    pub fn close(&self, scope: &TenantScope, id: &SessionId) -> Result<(), StoreError> {
        self.store.with_conn(|conn| {
            let now = format_ts(&Utc::now());
            conn.execute(
                "UPDATE sessions SET state = 'closed', updated_at = ?1
                 WHERE id = ?2 AND tenant_id = ?3",
                rusqlite::params![now, id.as_str(), scope.tenant_id().as_str()],
            )?;
            Ok(())
        })
    }

    /// List sessions for the tenant, most recently active first.
    #[instrument(skip(self), fields(tenant_id = %scope.tenant_id(), limit, offset))]
    pub fn list_recent(
        &self,
        scope: &TenantScope,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<SessionRow>, StoreError> {
        self.store.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions WHERE tenant_id = ?1
                 ORDER BY last_seen DESC LIMIT ?2 OFFSET ?3"
            ))?;
            let mut rows = stmt.query(rusqlite::params![scope.tenant_id().as_str(), limit, offset])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_session(row)?);
            }
            Ok(results)
        })
    }

    /// Events for a session in timestamp order (insertion order breaks
    /// ties via the monotonic event id).
    #[instrument(skip(self), fields(tenant_id = %scope.tenant_id(), session_id = %id))]
    pub fn events_for(
        &self,
        scope: &TenantScope,
        id: &SessionId,
    ) -> Result<Vec<EventRow>, StoreError> {
        self.store.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, tenant_id, name, domain, url, timestamp, payload
                 FROM events WHERE session_id = ?1 AND tenant_id = ?2
                 ORDER BY timestamp ASC, id ASC",
            )?;
            let mut rows = stmt.query(rusqlite::params![id.as_str(), scope.tenant_id().as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_event(row)?);
            }
            Ok(results)
        })
    }

    /// How many sessions this fingerprint has produced for the tenant.
    /// Scoring input: visit frequency.
    #[instrument(skip(self), fields(tenant_id = %scope.tenant_id()))]
    pub fn count_for_fingerprint(
        &self,
        scope: &TenantScope,
        fingerprint_hash: &str,
    ) -> Result<i64, StoreError> {
        self.store.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sessions WHERE tenant_id = ?1 AND fingerprint_hash = ?2",
                rusqlite::params![scope.tenant_id().as_str(), fingerprint_hash],
                |row| row.get(0),
            )?;
            Ok(n)
        })
    }

    /// Distinct event names within a session. Scoring input: diversity.
    #[instrument(skip(self), fields(tenant_id = %scope.tenant_id(), session_id = %id))]
    pub fn distinct_event_names(
        &self,
        scope: &TenantScope,
        id: &SessionId,
    ) -> Result<i64, StoreError> {
        self.store.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(DISTINCT name) FROM events WHERE session_id = ?1 AND tenant_id = ?2",
                rusqlite::params![id.as_str(), scope.tenant_id().as_str()],
                |row| row.get(0),
            )?;
            Ok(n)
        })
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> Result<SessionRow, StoreError> {
    let state_str: String = row_helpers::get(row, 5, "sessions", "state")?;

    Ok(SessionRow {
        id: SessionId::from_raw(row_helpers::get::<String>(row, 0, "sessions", "id")?),
        tenant_id: TenantId::from_raw(row_helpers::get::<String>(row, 1, "sessions", "tenant_id")?),
        session_key: row_helpers::get(row, 2, "sessions", "session_key")?,
        day_bucket: row_helpers::get(row, 3, "sessions", "day_bucket")?,
        fingerprint_hash: row_helpers::get(row, 4, "sessions", "fingerprint_hash")?,
        state: row_helpers::parse_enum(&state_str, "sessions", "state")?,
        first_seen: row_helpers::get(row, 6, "sessions", "first_seen")?,
        last_seen: row_helpers::get(row, 7, "sessions", "last_seen")?,
        page_count: row_helpers::get(row, 8, "sessions", "page_count")?,
        event_count: row_helpers::get(row, 9, "sessions", "event_count")?,
        created_at: row_helpers::get(row, 10, "sessions", "created_at")?,
        updated_at: row_helpers::get(row, 11, "sessions", "updated_at")?,
    })
}

fn row_to_event(row: &rusqlite::Row<'_>) -> Result<EventRow, StoreError> {
    let payload_raw: String = row_helpers::get(row, 7, "events", "payload")?;

    Ok(EventRow {
        id: EventId::from_raw(row_helpers::get::<String>(row, 0, "events", "id")?),
        session_id: SessionId::from_raw(row_helpers::get::<String>(row, 1, "events", "session_id")?),
        tenant_id: TenantId::from_raw(row_helpers::get::<String>(row, 2, "events", "tenant_id")?),
        name: row_helpers::get(row, 3, "events", "name")?,
        domain: row_helpers::get(row, 4, "events", "domain")?,
        url: row_helpers::get(row, 5, "events", "url")?,
        timestamp: row_helpers::get(row, 6, "events", "timestamp")?,
        payload: row_helpers::parse_json(&payload_raw, "events", "payload")?,
    })
}
