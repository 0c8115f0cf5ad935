//! The tracking-event envelope.
//!
//! [`RawTrackingEvent`] is the lenient boundary shape accepted from
//! third-party pages (POST body or the beacon's `data` query param).
//! [`TrackingEvent`] is the validated envelope handed to the
//! correlator: a fixed required-field header plus an opaque JSON
//! payload. Validation happens once at the boundary; downstream code
//! never re-checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fingerprint::Fingerprint;

/// Wire shape of an incoming event. Every field except `event` is
/// optional; malformed optional fields never cause rejection.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawTrackingEvent {
    /// Event name, e.g. `"pageview"`. The only required field.
    pub event: Option<String>,
    /// The tenant's public site key embedded in the tracking snippet.
    pub customer_id: Option<String>,
    pub domain: Option<String>,
    pub url: Option<String>,
    /// Caller-supplied RFC 3339 timestamp, preserved when parseable to
    /// support replay/backfill and out-of-order beacon delivery.
    pub timestamp: Option<String>,
    pub user_agent: Option<String>,
    /// Free-form payload; missing or null becomes `{}`.
    pub data: Option<Value>,
}

/// An immutable, validated visitor event. Owned by the session it is
/// appended to; never mutated afterwards.
#[derive(Clone, Debug)]
pub struct TrackingEvent {
    pub name: String,
    pub domain: String,
    pub url: String,
    pub fingerprint: Fingerprint,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
}

impl TrackingEvent {
    /// Whether this event counts toward a session's page count.
    pub fn is_pageview(&self) -> bool {
        self.name == "pageview"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_event_tolerates_missing_fields() {
        let raw: RawTrackingEvent = serde_json::from_str(r#"{"event":"pageview"}"#).unwrap();
        assert_eq!(raw.event.as_deref(), Some("pageview"));
        assert!(raw.customer_id.is_none());
        assert!(raw.data.is_none());
    }

    #[test]
    fn raw_event_ignores_unknown_fields() {
        let raw: RawTrackingEvent =
            serde_json::from_str(r#"{"event":"signup","extra":{"nested":true}}"#).unwrap();
        assert_eq!(raw.event.as_deref(), Some("signup"));
    }

    #[test]
    fn raw_event_camel_case_fields() {
        let raw: RawTrackingEvent = serde_json::from_str(
            r#"{"event":"pageview","customerId":"c1","userAgent":"mozilla/5.0"}"#,
        )
        .unwrap();
        assert_eq!(raw.customer_id.as_deref(), Some("c1"));
        assert_eq!(raw.user_agent.as_deref(), Some("mozilla/5.0"));
    }

    #[test]
    fn pageview_detection() {
        let event = TrackingEvent {
            name: "pageview".into(),
            domain: "example.com".into(),
            url: "/".into(),
            fingerprint: Fingerprint::new("ua", None),
            timestamp: Utc::now(),
            payload: serde_json::json!({}),
        };
        assert!(event.is_pageview());
    }
}
