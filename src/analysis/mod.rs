//! Aggregation over request telemetry: statistics, time bucketing, and
//! project summaries.

pub mod overview;
pub mod period;
pub mod stats;
pub mod timeseries;
