//! Project-level summaries: period-over-period overview and per-endpoint
//! breakdown.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::analysis::stats;
use crate::analysis::timeseries::error_rate_percent;
use crate::ingest::{ApiEvent, HttpMethod};

/// Change of the current period relative to the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Changes {
    /// Percent change in request count, 0 when the previous period is empty.
    pub requests: f64,
    /// Absolute change in error-rate percentage points.
    pub error_rate: f64,
    /// Percent change in average response time, 0 without a previous average.
    pub avg_response_time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub total_requests: usize,
    pub error_rate: f64,
    pub avg_response_time: f64,
    pub p95_response_time: f64,
    pub changes: Changes,
}

struct PeriodTotals {
    count: usize,
    error_rate: f64,
    avg_response_time: f64,
}

impl PeriodTotals {
    fn of(events: &[ApiEvent]) -> Self {
        let count = events.len();
        if count == 0 {
            return Self { count, error_rate: 0.0, avg_response_time: 0.0 };
        }
        let errors = events.iter().filter(|e| e.is_error()).count();
        Self {
            count,
            error_rate: errors as f64 / count as f64 * 100.0,
            avg_response_time: stats::mean(&latencies(events)),
        }
    }
}

fn latencies(events: &[ApiEvent]) -> Vec<f64> {
    events.iter().map(|e| e.response_time_ms as f64).collect()
}

fn percent_change(current: f64, previous: f64) -> f64 {
    if previous > 0.0 {
        ((current - previous) / previous * 100.0).round()
    } else {
        0.0
    }
}

impl Overview {
    /// Summarize `current` and compare it with `previous`.
    pub fn compute(current: &[ApiEvent], previous: &[ApiEvent]) -> Self {
        let now = PeriodTotals::of(current);
        let before = PeriodTotals::of(previous);
        let sorted = stats::sorted_finite(&latencies(current));

        Self {
            total_requests: now.count,
            error_rate: stats::round_to(now.error_rate, 2),
            avg_response_time: now.avg_response_time.round(),
            p95_response_time: stats::percentile(&sorted, 95.0),
            changes: Changes {
                requests: percent_change(now.count as f64, before.count as f64),
                error_rate: stats::round_to(now.error_rate - before.error_rate, 2),
                avg_response_time: percent_change(now.avg_response_time, before.avg_response_time),
            },
        }
    }

    /// Last 24 hours up to `now` against the 24 hours before that.
    pub fn for_last_day(events: &[ApiEvent], now: DateTime<Utc>) -> Self {
        let day_ago = now - Duration::hours(24);
        let two_days_ago = now - Duration::hours(48);

        let (current, previous): (Vec<ApiEvent>, Vec<ApiEvent>) = events
            .iter()
            .filter(|e| e.timestamp >= two_days_ago && e.timestamp <= now)
            .cloned()
            .partition(|e| e.timestamp >= day_ago);

        Self::compute(&current, &previous)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointStats {
    pub method: HttpMethod,
    pub path: String,
    pub total_requests: usize,
    pub error_rate: f64,
    pub avg_response_time: f64,
    pub p95_response_time: f64,
}

/// Per `method path` statistics, busiest endpoint first.
pub fn endpoint_breakdown(events: &[ApiEvent]) -> Vec<EndpointStats> {
    let mut groups: HashMap<(HttpMethod, &str), Vec<&ApiEvent>> = HashMap::new();
    for event in events {
        groups.entry((event.method, event.path.as_str())).or_default().push(event);
    }

    let mut endpoints: Vec<EndpointStats> = groups
        .into_iter()
        .map(|((method, path), group)| {
            let times: Vec<f64> = group.iter().map(|e| e.response_time_ms as f64).collect();
            let errors = group.iter().filter(|e| e.is_error()).count();
            EndpointStats {
                method,
                path: path.to_string(),
                total_requests: group.len(),
                error_rate: error_rate_percent(errors, group.len()),
                avg_response_time: stats::mean(&times).round(),
                p95_response_time: stats::percentile(&stats::sorted_finite(&times), 95.0),
            }
        })
        .collect();

    endpoints.sort_by(|a, b| {
        b.total_requests
            .cmp(&a.total_requests)
            .then_with(|| a.path.cmp(&b.path))
            .then_with(|| a.method.to_string().cmp(&b.method.to_string()))
    });
    endpoints
}
