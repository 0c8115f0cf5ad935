//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`Settings::default()`]
//! 2. If a settings file exists at the given path, deep-merge its values
//!    over the defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate — a missing token secret fails startup
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::Settings;

/// Load settings from an optional file path, with env overrides and
/// validation applied.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let defaults = serde_json::to_value(Settings::default())?;

    let merged = match path {
        Some(path) if path.exists() => {
            debug!(?path, "loading settings from file");
            let content = std::fs::read_to_string(path)?;
            let user: Value = serde_json::from_str(&content)?;
            deep_merge(defaults, user)
        }
        Some(path) => {
            debug!(?path, "settings file not found, using defaults");
            defaults
        }
        None => defaults,
    };

    let mut settings: Settings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are silently ignored (fall back to file/default).
pub fn apply_env_overrides(settings: &mut Settings) {
    if let Some(v) = read_env_string("VANTAGE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_u16("VANTAGE_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = read_env_string("VANTAGE_DB_PATH") {
        settings.database.path = v;
    }
    if let Some(v) = read_env_u32("VANTAGE_POOL_SIZE", 1, 128) {
        settings.database.pool_size = v;
    }
    if let Some(v) = read_env_string("VANTAGE_TOKEN_SECRET") {
        settings.auth.token_secret = v;
    }
    if let Some(v) = read_env_u64("VANTAGE_TOKEN_TTL_SECS", 60, 31_536_000) {
        settings.auth.token_ttl_secs = v;
    }
}

/// Startup-time validation. The token secret is mandatory configuration;
/// there is no hardcoded fallback.
pub fn validate(settings: &Settings) -> Result<()> {
    if settings.auth.token_secret.trim().is_empty() {
        return Err(SettingsError::MissingTokenSecret);
    }
    if settings.scoring.hot_threshold < settings.scoring.warm_threshold {
        return Err(SettingsError::Invalid(
            "scoring.hot_threshold must be >= scoring.warm_threshold".to_string(),
        ));
    }
    if settings.scoring.recency_half_life_hours <= 0.0 {
        return Err(SettingsError::Invalid(
            "scoring.recency_half_life_hours must be positive".to_string(),
        ));
    }
    Ok(())
}

// ── Pure parsing helpers ─────────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    read_env_string(name)?
        .parse::<u16>()
        .ok()
        .filter(|v| (min..=max).contains(v))
}

fn read_env_u32(name: &str, min: u32, max: u32) -> Option<u32> {
    read_env_string(name)?
        .parse::<u32>()
        .ok()
        .filter(|v| (min..=max).contains(v))
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    read_env_string(name)?
        .parse::<u64>()
        .ok()
        .filter(|v| (min..=max).contains(v))
}
