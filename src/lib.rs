//! pulsewatch -- statistical aggregation and anomaly detection for API
//! request telemetry.
//!
//! The core is pure and synchronous: summary statistics, Z-score anomaly
//! verdicts, and dense time bucketing over caller-supplied samples. Around it
//! sit the ingestion model, an injectable rate limiter, alert evaluation, and
//! configuration.

pub mod analysis;
pub mod config;
pub mod detect;
pub mod format;
pub mod ingest;
