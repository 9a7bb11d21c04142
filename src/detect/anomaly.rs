use crate::analysis::stats;
use crate::config::DetectionConfig;
use crate::detect::DetectError;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Baselines shorter than this never produce an anomaly.
pub const MIN_HISTORY: usize = 5;

pub const DEFAULT_Z_THRESHOLD: f64 = 2.5;
pub const RESPONSE_TIME_Z_THRESHOLD: f64 = 2.5;
/// Error spikes matter at smaller deviations.
pub const ERROR_RATE_Z_THRESHOLD: f64 = 2.0;
/// Traffic is naturally bursty.
pub const TRAFFIC_Z_THRESHOLD: f64 = 3.0;

/// Relative spread below which a baseline counts as constant. Absorbs the
/// rounding left in the mean and std dev of identical values.
const CONSTANT_BASELINE_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    High,
    Low,
    Normal,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::High => write!(f, "high"),
            Direction::Low => write!(f, "low"),
            Direction::Normal => write!(f, "normal"),
        }
    }
}

/// Outcome of a single detection call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyVerdict {
    pub is_anomaly: bool,
    /// Severity proxy in `[0, 1]`, not a probability.
    pub score: f64,
    pub direction: Direction,
    pub threshold: f64,
    pub message: String,
}

impl AnomalyVerdict {
    fn normal(threshold: f64, message: impl Into<String>) -> Self {
        Self {
            is_anomaly: false,
            score: 0.0,
            direction: Direction::Normal,
            threshold,
            message: message.into(),
        }
    }
}

/// Metric families with their own sensitivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricFamily {
    ResponseTime,
    ErrorRate,
    Traffic,
}

impl MetricFamily {
    pub fn default_threshold(self) -> f64 {
        match self {
            MetricFamily::ResponseTime => RESPONSE_TIME_Z_THRESHOLD,
            MetricFamily::ErrorRate => ERROR_RATE_Z_THRESHOLD,
            MetricFamily::Traffic => TRAFFIC_Z_THRESHOLD,
        }
    }
}

impl std::str::FromStr for MetricFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "response-time" | "response_time" => Ok(MetricFamily::ResponseTime),
            "error-rate" | "error_rate" => Ok(MetricFamily::ErrorRate),
            "traffic" => Ok(MetricFamily::Traffic),
            other => Err(format!("unknown metric family: {}", other)),
        }
    }
}

/// Z-score detection against a historical baseline.
///
/// Fewer than `min_history` baseline points short-circuits to a normal
/// verdict. A constant baseline flags any deviation with score 1. Otherwise
/// the value is anomalous when `|z|` is strictly greater than `z_threshold`.
///
/// A threshold that is not finite and positive yields a normal verdict with
/// score 0; use [`ZScoreDetector::new`] to reject it up front instead.
pub fn detect_anomaly_zscore(current: f64, historical: &[f64], z_threshold: f64) -> AnomalyVerdict {
    detect_with_min_history(current, historical, z_threshold, MIN_HISTORY)
}

fn detect_with_min_history(
    current: f64,
    historical: &[f64],
    z_threshold: f64,
    min_history: usize,
) -> AnomalyVerdict {
    if !current.is_finite() {
        debug!(current, "non-finite observation, skipping detection");
        return AnomalyVerdict::normal(z_threshold, "Non-finite observation ignored");
    }
    if !z_threshold.is_finite() || z_threshold <= 0.0 {
        debug!(z_threshold, "invalid threshold, skipping detection");
        return AnomalyVerdict::normal(
            z_threshold,
            format!("Invalid z-score threshold {}: must be finite and positive", z_threshold),
        );
    }

    let baseline: Vec<f64> = historical.iter().copied().filter(|v| v.is_finite()).collect();
    if baseline.len() < min_history {
        debug!(have = baseline.len(), needed = min_history, "insufficient baseline");
        return AnomalyVerdict::normal(
            z_threshold,
            "Insufficient historical data for anomaly detection",
        );
    }

    let mean = stats::mean(&baseline);
    let std_dev = stats::population_std_dev(&baseline);

    let tolerance = mean.abs() * CONSTANT_BASELINE_TOLERANCE;
    if std_dev <= tolerance {
        if (current - mean).abs() <= tolerance {
            return AnomalyVerdict::normal(z_threshold, "Value matches constant baseline");
        }
        let direction = if current > mean { Direction::High } else { Direction::Low };
        info!(current, mean, %direction, "deviation from constant baseline");
        return AnomalyVerdict {
            is_anomaly: true,
            score: 1.0,
            direction,
            threshold: z_threshold,
            message: format!("Value {} differs from constant baseline {}", current, mean),
        };
    }

    let z_score = (current - mean) / std_dev;
    let abs_z = z_score.abs();
    let score = (abs_z / (z_threshold * 2.0)).min(1.0);
    let is_anomaly = abs_z > z_threshold;

    let direction = if z_score > z_threshold {
        Direction::High
    } else if z_score < -z_threshold {
        Direction::Low
    } else {
        Direction::Normal
    };

    let message = if is_anomaly {
        format!(
            "Anomaly detected: Z-score {:.2} exceeds threshold ±{}",
            z_score, z_threshold
        )
    } else {
        format!(
            "Normal: Z-score {:.2} within threshold ±{}",
            z_score, z_threshold
        )
    };

    if is_anomaly {
        info!(current, mean, std_dev, z_score, %direction, "anomaly detected");
    } else {
        debug!(current, mean, std_dev, z_score, "within baseline");
    }

    AnomalyVerdict {
        is_anomaly,
        score,
        direction,
        threshold: z_threshold,
        message,
    }
}

pub fn detect_response_time_anomaly(current_avg_ms: f64, historical_avgs_ms: &[f64]) -> AnomalyVerdict {
    detect_anomaly_zscore(current_avg_ms, historical_avgs_ms, RESPONSE_TIME_Z_THRESHOLD)
}

pub fn detect_error_rate_anomaly(current_rate: f64, historical_rates: &[f64]) -> AnomalyVerdict {
    detect_anomaly_zscore(current_rate, historical_rates, ERROR_RATE_Z_THRESHOLD)
}

pub fn detect_traffic_anomaly(current_count: f64, historical_counts: &[f64]) -> AnomalyVerdict {
    detect_anomaly_zscore(current_count, historical_counts, TRAFFIC_Z_THRESHOLD)
}

/// Detector with a validated threshold and a tunable minimum baseline size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZScoreDetector {
    threshold: f64,
    min_history: usize,
}

impl ZScoreDetector {
    pub fn new(threshold: f64) -> Result<Self, DetectError> {
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(DetectError::InvalidThreshold(threshold));
        }
        Ok(Self {
            threshold,
            min_history: MIN_HISTORY,
        })
    }

    pub fn with_min_history(mut self, min_history: usize) -> Result<Self, DetectError> {
        if min_history == 0 {
            return Err(DetectError::InvalidMinHistory(min_history));
        }
        self.min_history = min_history;
        Ok(self)
    }

    /// Build the detector for a metric family from configuration.
    pub fn for_family(config: &DetectionConfig, family: MetricFamily) -> Result<Self, DetectError> {
        let threshold = match family {
            MetricFamily::ResponseTime => config.response_time_threshold,
            MetricFamily::ErrorRate => config.error_rate_threshold,
            MetricFamily::Traffic => config.traffic_threshold,
        };
        Self::new(threshold)?.with_min_history(config.min_history)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn min_history(&self) -> usize {
        self.min_history
    }

    pub fn detect(&self, current: f64, historical: &[f64]) -> AnomalyVerdict {
        detect_with_min_history(current, historical, self.threshold, self.min_history)
    }
}

impl Default for ZScoreDetector {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_Z_THRESHOLD,
            min_history: MIN_HISTORY,
        }
    }
}
