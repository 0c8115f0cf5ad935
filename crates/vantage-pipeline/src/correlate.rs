//! Session correlation.
//!
//! Events are grouped by a session key derived from (normalized
//! fingerprint, UTC day bucket). The lookup-or-create step is guarded
//! two ways: a per-key mutex serializes concurrent ingests in-process,
//! and the store's partial unique index on open sessions catches races
//! across processes — the losing creator retries against the surviving
//! session (at-least-once creation, last-writer-wins merge).

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, instrument};

use vantage_core::event::TrackingEvent;
use vantage_core::fingerprint::{day_bucket, session_key};
use vantage_core::ids::{EventId, SessionId};
use vantage_core::scope::TenantScope;
use vantage_core::time::{format_ts, parse_ts};
use vantage_store::{SessionRepo, SessionRow, StoreError};

use crate::error::PipelineError;

/// A session stops accepting merges once the gap to its window exceeds
/// this.
pub const INACTIVITY_THRESHOLD_SECS: i64 = 30 * 60;

/// Outcome of correlating one event.
#[derive(Clone, Debug)]
pub struct CorrelationOutcome {
    pub session_id: SessionId,
    pub event_id: EventId,
    /// Whether this event opened a new session.
    pub created_session: bool,
}

pub struct SessionCorrelator {
    sessions: SessionRepo,
    key_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionCorrelator {
    pub fn new(sessions: SessionRepo) -> Self {
        Self {
            sessions,
            key_locks: DashMap::new(),
        }
    }

    /// Append an event to its session, creating the session if needed.
    ///
    /// Duplicate deliveries append twice by design: session identity is
    /// stable, event-level idempotence is not promised.
    #[instrument(skip(self, event), fields(tenant_id = %scope.tenant_id(), event_name = %event.name))]
    pub fn correlate(
        &self,
        scope: &TenantScope,
        event: &TrackingEvent,
    ) -> Result<CorrelationOutcome, PipelineError> {
        let bucket = day_bucket(&event.timestamp);
        let key = session_key(&event.fingerprint, &bucket);
        let fingerprint_hash = event.fingerprint.hash();
        let seen_at = format_ts(&event.timestamp);

        let lock = self
            .key_locks
            .entry(format!("{}:{}", scope.tenant_id(), key))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock();

        // Two passes: the second runs only after losing a create race,
        // when the surviving session is guaranteed to exist.
        for attempt in 0..2 {
            if let Some(open) = self.sessions.find_open(scope, &key, &bucket)? {
                if within_window(&open, &event.timestamp) {
                    let row = self.sessions.append_event(scope, &open.id, event)?;
                    return Ok(CorrelationOutcome {
                        session_id: open.id,
                        event_id: row.id,
                        created_session: false,
                    });
                }
                // Inactivity threshold passed: the old session is done,
                // the same key gets a fresh one.
                debug!(session_id = %open.id, "closing stale session");
                self.sessions.close(scope, &open.id)?;
            }

            match self
                .sessions
                .create_open(scope, &key, &bucket, &fingerprint_hash, &seen_at)
            {
                Ok(session) => {
                    let row = self.sessions.append_event(scope, &session.id, event)?;
                    return Ok(CorrelationOutcome {
                        session_id: session.id,
                        event_id: row.id,
                        created_session: true,
                    });
                }
                Err(StoreError::Conflict(_)) if attempt == 0 => {
                    debug!("lost session-create race, retrying against survivor");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(PipelineError::Store(StoreError::Conflict(
            "session create retry exhausted".to_string(),
        )))
    }
}

/// An event merges into a session unless it lands more than the
/// inactivity threshold after `last_seen`. Events at or before
/// `last_seen` always merge: a late-arriving earlier event in the same
/// bucket must never spuriously start a new session.
fn within_window(session: &SessionRow, ts: &DateTime<Utc>) -> bool {
    let Some(last_seen) = parse_ts(&session.last_seen) else {
        return false;
    };
    *ts <= last_seen + Duration::seconds(INACTIVITY_THRESHOLD_SECS)
}
