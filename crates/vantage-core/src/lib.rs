//! Core types shared across the Vantage pipeline: branded identifiers,
//! the tenant scope, the tracking-event envelope, fingerprint/session-key
//! derivation, and timestamp formatting.

pub mod event;
pub mod fingerprint;
pub mod ids;
pub mod scope;
pub mod time;
