//! Dense, epoch-aligned time series from irregular samples.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::analysis::period::Period;
use crate::analysis::stats;

#[derive(Debug, Error, PartialEq)]
pub enum BucketError {
    #[error("bucket width must be at least one minute")]
    ZeroWidth,
    #[error("bucket boundary {0}ms is outside the representable time range")]
    OutOfRange(i64),
}

/// One observation with its timestamp. `is_error` only matters for
/// [`Metric::ErrorRate`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimedSample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub is_error: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Per-bucket reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Count,
    Average,
    ErrorRate,
    P95,
}

impl Metric {
    /// Accepts both the short names and the dashboard names
    /// (`requests`, `avg_response_time`, `p95_response_time`).
    /// Anything unrecognized counts samples.
    pub fn parse(label: &str) -> Self {
        match label {
            "count" | "requests" => Metric::Count,
            "average" | "avg_response_time" => Metric::Average,
            "error_rate" => Metric::ErrorRate,
            "p95" | "p95_response_time" => Metric::P95,
            _ => Metric::Count,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Metric::Count => "count",
            Metric::Average => "average",
            Metric::ErrorRate => "error_rate",
            Metric::P95 => "p95",
        }
    }

    /// Reduce one bucket to a scalar. Empty buckets are 0 for every metric.
    pub fn reduce(self, bucket: &[&TimedSample]) -> f64 {
        if bucket.is_empty() {
            return 0.0;
        }
        match self {
            Metric::Count => bucket.len() as f64,
            Metric::Average => {
                let values: Vec<f64> = bucket.iter().map(|s| s.value).collect();
                stats::mean(&values).round()
            }
            Metric::ErrorRate => {
                let errors = bucket.iter().filter(|s| s.is_error).count();
                error_rate_percent(errors, bucket.len())
            }
            Metric::P95 => {
                let values: Vec<f64> = bucket.iter().map(|s| s.value).collect();
                stats::percentile(&stats::sorted_finite(&values), 95.0)
            }
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// `errors / total` as a percentage with two decimals. 0 when `total` is 0.
pub fn error_rate_percent(errors: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    ((errors as f64 / total as f64) * 10_000.0).round() / 100.0
}

/// Group `samples` into fixed-width buckets and reduce each to one value.
///
/// Buckets are aligned to the Unix epoch, not to `start`. The series begins
/// at the boundary at or before `start` and includes every boundary up to and
/// including `end`, whether or not any sample fell into it. Samples with a
/// non-finite value are ignored.
pub fn bucketize(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    bucket_minutes: u32,
    metric: Metric,
    samples: &[TimedSample],
) -> Result<Vec<SeriesPoint>, BucketError> {
    if bucket_minutes == 0 {
        return Err(BucketError::ZeroWidth);
    }
    if end < start {
        return Ok(Vec::new());
    }

    let bucket_ms = i64::from(bucket_minutes) * 60_000;
    let align = |ms: i64| ms.div_euclid(bucket_ms) * bucket_ms;

    let mut buckets: HashMap<i64, Vec<&TimedSample>> = HashMap::new();
    for sample in samples.iter().filter(|s| s.value.is_finite()) {
        buckets
            .entry(align(sample.timestamp.timestamp_millis()))
            .or_default()
            .push(sample);
    }

    let end_ms = end.timestamp_millis();
    let mut current = align(start.timestamp_millis());
    let mut points = Vec::new();

    while current <= end_ms {
        let bucket = buckets.get(&current).map(Vec::as_slice).unwrap_or(&[]);
        let timestamp =
            DateTime::from_timestamp_millis(current).ok_or(BucketError::OutOfRange(current))?;
        points.push(SeriesPoint {
            timestamp,
            value: metric.reduce(bucket),
        });
        current += bucket_ms;
    }

    debug!(
        metric = %metric,
        bucket_minutes,
        samples = samples.len(),
        points = points.len(),
        "bucketized series"
    );
    Ok(points)
}

/// Chart-ready series for a named period.
#[derive(Debug, Clone, Serialize)]
pub struct Timeseries {
    pub metric: Metric,
    pub period: Period,
    pub points: Vec<SeriesPoint>,
}

impl Timeseries {
    /// Bucketize the samples inside `period` ending at `now`.
    pub fn build(
        period: Period,
        metric: Metric,
        now: DateTime<Utc>,
        samples: &[TimedSample],
    ) -> Result<Self, BucketError> {
        let window = period.window(now);
        let in_window: Vec<TimedSample> = samples
            .iter()
            .filter(|s| s.timestamp >= window.start && s.timestamp <= window.end)
            .copied()
            .collect();
        let points = bucketize(window.start, window.end, window.bucket_minutes, metric, &in_window)?;
        Ok(Self { metric, period, points })
    }

    /// Bucket values in time order, suitable as an anomaly baseline.
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }
}
