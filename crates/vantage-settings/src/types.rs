use serde::{Deserialize, Serialize};

/// Root settings object. Compiled defaults are the base layer; a JSON
/// settings file and environment variables are merged over them.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub scoring: ScoringSettings,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: String,
    pub pool_size: u32,
    pub busy_timeout_ms: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: "vantage.db".to_string(),
            pool_size: 16,
            busy_timeout_ms: 30_000,
        }
    }
}

/// Token issuance settings. `token_secret` has no compiled default on
/// purpose: startup fails unless it is configured explicitly.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub token_secret: String,
    pub token_ttl_secs: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            token_secret: String::new(),
            // 7 days
            token_ttl_secs: 604_800,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringSettings {
    pub visit_weight: f64,
    pub recency_weight: f64,
    pub diversity_weight: f64,
    pub warm_threshold: f64,
    pub hot_threshold: f64,
    pub recency_half_life_hours: f64,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            visit_weight: 2.0,
            recency_weight: 3.0,
            diversity_weight: 1.0,
            warm_threshold: 4.0,
            hot_threshold: 7.0,
            recency_half_life_hours: 24.0,
        }
    }
}
