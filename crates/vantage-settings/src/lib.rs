//! Layered configuration for the Vantage service.
//!
//! Compiled defaults → optional JSON settings file → environment
//! variable overrides, validated at startup. The token signing secret
//! is mandatory; a process with no secret refuses to start.

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::SettingsError;
pub use loader::{apply_env_overrides, deep_merge, load_settings, validate};
pub use types::{AuthSettings, DatabaseSettings, ScoringSettings, ServerSettings, Settings};
