//! Summary statistics over finite numeric samples.
//!
//! Every function here is pure: no caching, no interior state, and sums are
//! reduced left-to-right over the input slice so results are reproducible.

use serde::{Deserialize, Serialize};

/// Derived snapshot of a sample set. Always recomputed from source samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSummary {
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
}

/// Linear-interpolation percentile over values already sorted ascending.
///
/// Returns 0 for an empty slice. `p` is clamped into `[0, 100]`; a NaN `p`
/// is treated as 0.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 100.0) };

    let index = (p / 100.0) * (sorted.len() - 1) as f64;
    let lower = index.floor() as usize;
    let upper = index.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }

    let weight = index - lower as f64;
    sorted[lower] * (1.0 - weight) + sorted[upper] * weight
}

/// Arithmetic mean, 0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance (divisor N).
pub fn population_variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = mean(values);
    let sum_sq_diff: f64 = values.iter().map(|&x| (x - mean).powi(2)).sum();
    sum_sq_diff / values.len() as f64
}

pub fn population_std_dev(values: &[f64]) -> f64 {
    population_variance(values).sqrt()
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Sorted copy of the finite values in `values`. The input is left untouched.
pub fn sorted_finite(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Compute the full summary for an unordered sample set.
///
/// Non-finite values are ignored. An empty (or entirely non-finite) input
/// yields the all-zero summary.
pub fn calculate_stats(values: &[f64]) -> StatsSummary {
    let sorted = sorted_finite(values);
    if sorted.is_empty() {
        return StatsSummary::default();
    }

    // Sum in input order, not over the sorted copy.
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let p50 = percentile(&sorted, 50.0);

    StatsSummary {
        mean: round_to(mean(&finite), 2),
        median: p50,
        std_dev: round_to(population_std_dev(&finite), 2),
        p50,
        p95: percentile(&sorted, 95.0),
        p99: percentile(&sorted, 99.0),
        min: sorted[0],
        max: sorted[sorted.len() - 1],
    }
}
