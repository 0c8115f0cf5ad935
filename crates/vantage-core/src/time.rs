//! Timestamp formatting helpers.
//!
//! All timestamps are persisted as RFC 3339 UTC with millisecond
//! precision and a `Z` suffix. The fixed width makes lexicographic
//! comparison in SQL (`ORDER BY timestamp`, `MIN`/`MAX`) agree with
//! chronological order.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a timestamp for storage.
pub fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored or caller-supplied RFC 3339 timestamp.
pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
