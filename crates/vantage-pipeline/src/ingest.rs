//! Event ingestion boundary.
//!
//! Validates the raw wire shape once, resolves the tenant from its
//! public site key, and hands a typed envelope to the correlator.
//! Ingestion never touches the scoring path.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{instrument, warn};

use vantage_core::event::{RawTrackingEvent, TrackingEvent};
use vantage_core::fingerprint::Fingerprint;
use vantage_core::ids::{EventId, SessionId};
use vantage_core::scope::TenantScope;
use vantage_core::time::parse_ts;
use vantage_store::{StoreError, TenantRepo};

use crate::correlate::SessionCorrelator;
use crate::error::PipelineError;

/// Acknowledgement returned to the caller.
#[derive(Clone, Debug)]
pub struct IngestAck {
    pub event_id: EventId,
    pub session_id: SessionId,
    pub event: String,
    pub customer_id: String,
    pub timestamp: DateTime<Utc>,
}

pub struct EventIngestor {
    tenants: TenantRepo,
    correlator: SessionCorrelator,
}

impl EventIngestor {
    pub fn new(tenants: TenantRepo, correlator: SessionCorrelator) -> Self {
        Self {
            tenants,
            correlator,
        }
    }

    /// Ingest one raw event.
    ///
    /// Rejections are limited to an absent event name and an
    /// unresolvable/inactive customer; every optional field tolerates
    /// garbage. Caller-supplied timestamps are preserved when they
    /// parse, so replays and out-of-order beacons land where they
    /// happened, not when they arrived.
    #[instrument(skip(self, raw), fields(event = raw.event.as_deref().unwrap_or("")))]
    pub fn ingest(
        &self,
        raw: &RawTrackingEvent,
        client_ip: Option<&str>,
        received_at: DateTime<Utc>,
    ) -> Result<IngestAck, PipelineError> {
        let name = raw
            .event
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| PipelineError::InvalidEvent("missing event name".to_string()))?;

        let site_key = raw
            .customer_id
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| PipelineError::InvalidEvent("missing customerId".to_string()))?;

        let tenant = match self.tenants.get_by_site_key(site_key) {
            Ok(tenant) => tenant,
            Err(StoreError::NotFound(_)) => {
                return Err(PipelineError::InvalidEvent(format!(
                    "unknown customerId {site_key}"
                )));
            }
            Err(e) => return Err(e.into()),
        };

        if !tenant.status.is_active() {
            return Err(PipelineError::TenantInactive {
                status: tenant.status.to_string(),
            });
        }

        let scope = TenantScope::try_new(tenant.id.clone()).map_err(StoreError::from)?;

        let used = self
            .tenants
            .record_event_usage(&scope, &received_at.format("%Y-%m").to_string())?;
        if tenant.max_monthly_events > 0 && used > tenant.max_monthly_events {
            warn!(
                tenant_id = %tenant.id,
                used,
                limit = tenant.max_monthly_events,
                "event dropped: monthly limit exceeded"
            );
            return Err(PipelineError::LimitExceeded {
                used,
                limit: tenant.max_monthly_events,
            });
        }

        let timestamp = raw
            .timestamp
            .as_deref()
            .and_then(parse_ts)
            .unwrap_or(received_at);

        let payload = match &raw.data {
            Some(Value::Null) | None => Value::Object(serde_json::Map::new()),
            Some(v) => v.clone(),
        };

        let envelope = TrackingEvent {
            name: name.to_string(),
            domain: raw.domain.clone().unwrap_or_default(),
            url: raw.url.clone().unwrap_or_default(),
            fingerprint: Fingerprint::new(raw.user_agent.as_deref().unwrap_or(""), client_ip),
            timestamp,
            payload,
        };

        let outcome = self.correlator.correlate(&scope, &envelope)?;

        Ok(IngestAck {
            event_id: outcome.event_id,
            session_id: outcome.session_id,
            event: name.to_string(),
            customer_id: site_key.to_string(),
            timestamp,
        })
    }
}
