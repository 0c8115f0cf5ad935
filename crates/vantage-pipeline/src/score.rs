//! Lead-engagement scoring.
//!
//! Scoring is pure: the same session, aggregate inputs, and clock value
//! always produce the same score. Nothing here touches storage or holds
//! mutable state, so concurrent callers need no coordination. Scores
//! are recomputed on demand and never stored as the source of truth.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vantage_core::time::parse_ts;
use vantage_store::SessionRow;

/// Weights and thresholds. Mirrored by the settings layer; defaults
/// here keep tests deterministic.
#[derive(Clone, Debug)]
pub struct ScoringConfig {
    pub visit_weight: f64,
    pub recency_weight: f64,
    pub diversity_weight: f64,
    pub warm_threshold: f64,
    pub hot_threshold: f64,
    /// Hours for the recency term to halve.
    pub recency_half_life_hours: f64,
}

impl Default for ScoringConfig {
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

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreBucket {
    Cold,
    Warm,
    Hot,
}

impl std::fmt::Display for ScoreBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cold => write!(f, "cold"),
            Self::Warm => write!(f, "warm"),
            Self::Hot => write!(f, "hot"),
        }
    }
}

/// The inputs a score was derived from, reported alongside the value so
/// it is always re-derivable from the session's event history.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScoreInputs {
    pub sessions_for_fingerprint: i64,
    pub hours_since_last_seen: f64,
    pub distinct_event_types: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Score {
    pub value: f64,
    pub bucket: ScoreBucket,
    pub inputs: ScoreInputs,
}

pub struct ScoringEngine {
    config: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Score a session from its aggregates.
    ///
    /// `value = visit_weight * ln(1 + sessions_for_fingerprint)
    ///        + recency_weight * 2^(-hours_since_last_seen / half_life)
    ///        + diversity_weight * distinct_event_types`
    ///
    /// A session with no events scores 0 / cold; a single-event session
    /// never divides by zero anywhere in the log or decay terms.
    pub fn score(
        &self,
        session: &SessionRow,
        sessions_for_fingerprint: i64,
        distinct_event_types: i64,
        now: DateTime<Utc>,
    ) -> Score {
        if session.event_count == 0 {
            return Score {
                value: 0.0,
                bucket: ScoreBucket::Cold,
                inputs: ScoreInputs {
                    sessions_for_fingerprint,
                    hours_since_last_seen: 0.0,
                    distinct_event_types: 0,
                },
            };
        }

        let hours_since_last_seen = parse_ts(&session.last_seen)
            .map(|last_seen| {
                let ms = now.signed_duration_since(last_seen).num_milliseconds();
                (ms.max(0) as f64) / 3_600_000.0
            })
            .unwrap_or(0.0);

        let visit_term =
            self.config.visit_weight * (1.0 + sessions_for_fingerprint.max(0) as f64).ln();
        let recency_term = self.config.recency_weight
            * 0.5_f64.powf(hours_since_last_seen / self.config.recency_half_life_hours);
        let diversity_term = self.config.diversity_weight * distinct_event_types.max(0) as f64;

        let value = visit_term + recency_term + diversity_term;

        Score {
            value,
            bucket: self.bucket_for(value),
            inputs: ScoreInputs {
                sessions_for_fingerprint,
                hours_since_last_seen,
                distinct_event_types,
            },
        }
    }

    fn bucket_for(&self, value: f64) -> ScoreBucket {
        if value >= self.config.hot_threshold {
            ScoreBucket::Hot
        } else if value >= self.config.warm_threshold {
            ScoreBucket::Warm
        } else {
            ScoreBucket::Cold
        }
    }
}
