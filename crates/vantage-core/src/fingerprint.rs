//! Client fingerprinting and session-key derivation.
//!
//! A session key is a stable hash of (normalized fingerprint, calendar
//! day bucket). Repeated events from the same client on the same day
//! map to the same key; the correlator decides whether they land in the
//! same session based on the 30-minute inactivity window.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Best-effort client identity: user-agent plus optional IP.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fingerprint {
    user_agent: String,
    ip: Option<String>,
}

impl Fingerprint {
    /// Normalizes the user-agent (trim + lowercase) so that cosmetic
    /// differences in beacon delivery do not split sessions.
    pub fn new(user_agent: &str, ip: Option<&str>) -> Self {
        Self {
            user_agent: user_agent.trim().to_lowercase(),
            ip: ip.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()),
        }
    }

    /// Canonical string form used for hashing.
    pub fn normalized(&self) -> String {
        match &self.ip {
            Some(ip) => format!("{}|{}", self.user_agent, ip),
            None => self.user_agent.clone(),
        }
    }

    /// Hex SHA-256 of the normalized fingerprint. Stored on sessions so
    /// visit counts can be aggregated per visitor without keeping the
    /// raw user-agent queryable.
    pub fn hash(&self) -> String {
        hex_sha256(self.normalized().as_bytes())
    }
}

/// UTC calendar-day bucket (`YYYY-MM-DD`). Sessions never span buckets:
/// a visitor active at 23:59 and 00:01 produces two sessions.
pub fn day_bucket(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d").to_string()
}

/// Derive the session key for a fingerprint within a day bucket.
pub fn session_key(fingerprint: &Fingerprint, bucket: &str) -> String {
    let mut input = fingerprint.normalized();
    input.push('\n');
    input.push_str(bucket);
    hex_sha256(input.as_bytes())
}

fn hex_sha256(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
