//! The visitor-behavior pipeline: ingestion → correlation → scoring.
//!
//! Ingestion and correlation share a write path; scoring is read-only
//! and computed on demand. No background scheduler exists here.

pub mod correlate;
pub mod error;
pub mod ingest;
pub mod score;

pub use correlate::{CorrelationOutcome, SessionCorrelator, INACTIVITY_THRESHOLD_SECS};
pub use error::PipelineError;
pub use ingest::{EventIngestor, IngestAck};
pub use score::{Score, ScoreBucket, ScoreInputs, ScoringConfig, ScoringEngine};
