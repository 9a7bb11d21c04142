//! Anomaly detection and alert evaluation.

pub mod alert;
pub mod anomaly;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum DetectError {
    #[error("invalid z-score threshold {0}: must be finite and positive")]
    InvalidThreshold(f64),
    #[error("invalid minimum history {0}: must be at least 1")]
    InvalidMinHistory(usize),
    #[error("invalid alert rule: {0}")]
    InvalidRule(String),
}

/// Severity levels for triggered alert events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}
