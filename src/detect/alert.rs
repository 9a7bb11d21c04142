//! Threshold and anomaly based alert rules.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::analysis::timeseries::{bucketize, Metric, TimedSample};
use crate::config::{AnalyticsConfig, DetectionConfig};
use crate::detect::anomaly::{AnomalyVerdict, Direction, MetricFamily, ZScoreDetector};
use crate::detect::{DetectError, Severity};
use crate::ingest::ApiEvent;

const MAX_RULE_NAME_LEN: usize = 200;
/// How far back the baseline series reaches behind the evaluation window.
const BASELINE_SPAN_HOURS: i64 = 24;
/// Longest evaluation window accepted from configuration.
const MAX_WINDOW_MINUTES: i64 = 365 * 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    ResponseTimeAvg,
    ErrorRate,
    RequestCount,
    P95Latency,
}

impl ConditionType {
    pub fn metric(self) -> Metric {
        match self {
            ConditionType::ResponseTimeAvg => Metric::Average,
            ConditionType::ErrorRate => Metric::ErrorRate,
            ConditionType::RequestCount => Metric::Count,
            ConditionType::P95Latency => Metric::P95,
        }
    }

    pub fn family(self) -> MetricFamily {
        match self {
            ConditionType::ResponseTimeAvg | ConditionType::P95Latency => MetricFamily::ResponseTime,
            ConditionType::ErrorRate => MetricFamily::ErrorRate,
            ConditionType::RequestCount => MetricFamily::Traffic,
        }
    }

    /// Value of this condition over a set of events.
    pub fn current_value(self, events: &[ApiEvent]) -> f64 {
        let samples: Vec<TimedSample> = events.iter().map(ApiEvent::to_sample).collect();
        let refs: Vec<&TimedSample> = samples.iter().collect();
        self.metric().reduce(&refs)
    }

    fn describe(self, value: f64) -> String {
        match self {
            ConditionType::ResponseTimeAvg => format!("Avg response time {}ms", value),
            ConditionType::ErrorRate => format!("Error rate {}%", value),
            ConditionType::RequestCount => format!("Request count {}", value),
            ConditionType::P95Latency => format!("P95 latency {}ms", value),
        }
    }

    fn unit(self) -> &'static str {
        match self {
            ConditionType::ResponseTimeAvg | ConditionType::P95Latency => "ms",
            ConditionType::ErrorRate => "%",
            ConditionType::RequestCount => "",
        }
    }

    /// Traffic drops matter as much as spikes; for the others only a rise is bad.
    fn alerts_on(self, direction: Direction) -> bool {
        match self {
            ConditionType::RequestCount => direction != Direction::Normal,
            _ => direction == Direction::High,
        }
    }
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRule {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    pub condition_type: ConditionType,
    pub threshold: f64,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl AlertRule {
    pub fn new(name: impl Into<String>, condition_type: ConditionType, threshold: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            condition_type,
            threshold,
            is_active: true,
        }
    }

    pub fn validate(&self) -> Result<(), DetectError> {
        if self.name.is_empty() || self.name.len() > MAX_RULE_NAME_LEN {
            return Err(DetectError::InvalidRule(format!(
                "name must be 1..={} characters",
                MAX_RULE_NAME_LEN
            )));
        }
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(DetectError::InvalidRule(format!(
                "threshold must be positive, got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

/// A triggered rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    pub id: Uuid,
    pub alert_id: Uuid,
    pub alert_name: String,
    pub condition_type: ConditionType,
    pub value: f64,
    pub threshold: f64,
    pub severity: Severity,
    pub message: String,
    pub anomaly: Option<AnomalyVerdict>,
    pub resolved: bool,
    pub triggered_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl AlertEvent {
    pub fn resolve(&mut self, at: DateTime<Utc>) {
        self.resolved = true;
        self.resolved_at = Some(at);
    }
}

fn severity_for(breach: bool, value: f64, threshold: f64, verdict: &AnomalyVerdict) -> Severity {
    let strong_anomaly = verdict.is_anomaly && verdict.score >= 0.8;
    if breach {
        if value >= threshold * 1.5 || strong_anomaly {
            Severity::Critical
        } else {
            Severity::Warning
        }
    } else if strong_anomaly {
        Severity::Critical
    } else {
        Severity::Warning
    }
}

/// Evaluates rules against a recent window and a historical baseline.
#[derive(Debug, Clone)]
pub struct AlertEvaluator {
    detection: DetectionConfig,
    window: Duration,
}

impl AlertEvaluator {
    pub fn new(detection: DetectionConfig, analytics: &AnalyticsConfig) -> Self {
        Self {
            detection,
            window: Duration::minutes(analytics.alert_window_minutes.clamp(1, MAX_WINDOW_MINUTES)),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Check one rule.
    ///
    /// Fires when the window value exceeds the rule's threshold, or when the
    /// family detector flags it against `baseline` in an alerting direction.
    pub fn evaluate(
        &self,
        rule: &AlertRule,
        window_events: &[ApiEvent],
        baseline: &[f64],
        now: DateTime<Utc>,
    ) -> Result<Option<AlertEvent>, DetectError> {
        if !rule.is_active {
            debug!(rule = %rule.name, "rule inactive, skipping");
            return Ok(None);
        }
        rule.validate()?;

        let condition = rule.condition_type;
        let value = condition.current_value(window_events);
        let detector = ZScoreDetector::for_family(&self.detection, condition.family())?;
        let verdict = detector.detect(value, baseline);

        let breach = value > rule.threshold;
        let anomalous = verdict.is_anomaly && condition.alerts_on(verdict.direction);
        if !breach && !anomalous {
            debug!(rule = %rule.name, value, threshold = rule.threshold, "rule ok");
            return Ok(None);
        }

        let severity = severity_for(breach, value, rule.threshold, &verdict);
        let message = if breach {
            format!(
                "{} exceeds threshold of {}{}",
                condition.describe(value),
                rule.threshold,
                condition.unit()
            )
        } else {
            format!(
                "{} is anomalous ({}): {}",
                condition.describe(value),
                verdict.direction,
                verdict.message
            )
        };

        info!(rule = %rule.name, %severity, value, threshold = rule.threshold, "alert triggered");

        Ok(Some(AlertEvent {
            id: Uuid::new_v4(),
            alert_id: rule.id,
            alert_name: rule.name.clone(),
            condition_type: condition,
            value,
            threshold: rule.threshold,
            severity,
            message,
            anomaly: verdict.is_anomaly.then_some(verdict),
            resolved: false,
            triggered_at: now,
            resolved_at: None,
        }))
    }

    /// Check one rule over a raw event stream.
    ///
    /// The window is `[now - window, now]`. The baseline is the rule's metric
    /// over the preceding 24 hours in window-sized buckets; buckets only
    /// partly inside that span are left out.
    pub fn evaluate_events(
        &self,
        rule: &AlertRule,
        events: &[ApiEvent],
        now: DateTime<Utc>,
    ) -> Result<Option<AlertEvent>, DetectError> {
        let window_start = now - self.window;
        let baseline_start = window_start - Duration::hours(BASELINE_SPAN_HOURS);

        let window_events: Vec<ApiEvent> = events
            .iter()
            .filter(|e| e.timestamp >= window_start && e.timestamp <= now)
            .cloned()
            .collect();
        let baseline = self.baseline(rule.condition_type.metric(), events, baseline_start, window_start);

        self.evaluate(rule, &window_events, &baseline, now)
    }

    fn baseline(
        &self,
        metric: Metric,
        events: &[ApiEvent],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<f64> {
        let samples: Vec<TimedSample> = events
            .iter()
            .filter(|e| e.timestamp >= start && e.timestamp < end)
            .map(ApiEvent::to_sample)
            .collect();

        let width_minutes = u32::try_from(self.window.num_minutes()).unwrap_or(u32::MAX);
        match bucketize(start, end, width_minutes, metric, &samples) {
            Ok(points) => points
                .into_iter()
                .filter(|p| p.timestamp >= start && p.timestamp + self.window <= end)
                .map(|p| p.value)
                .collect(),
            Err(e) => {
                debug!(error = %e, "baseline unavailable");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::HttpMethod;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    fn evaluator() -> AlertEvaluator {
        AlertEvaluator::new(DetectionConfig::default(), &AnalyticsConfig::default())
    }

    fn ev(status: u16, ms: u64, minutes_ago: i64) -> ApiEvent {
        ApiEvent::new(HttpMethod::Get, "/api/users", status, ms, now() - Duration::minutes(minutes_ago))
    }

    #[test]
    fn test_static_threshold_breach_message() {
        let rule = AlertRule::new("High Response Time", ConditionType::ResponseTimeAvg, 500.0);
        let window = vec![ev(200, 600, 5), ev(200, 646, 10)];

        let event = evaluator().evaluate(&rule, &window, &[], now()).unwrap().unwrap();
        assert_eq!(event.message, "Avg response time 623ms exceeds threshold of 500ms");
        assert_eq!(event.severity, Severity::Warning);
        assert_eq!(event.alert_id, rule.id);
        assert!(!event.resolved);
        assert!(event.anomaly.is_none());
    }

    #[test]
    fn test_large_breach_is_critical() {
        let rule = AlertRule::new("Error Rate Spike", ConditionType::ErrorRate, 5.0);
        let mut window: Vec<ApiEvent> = (0..9).map(|i| ev(200, 10, i)).collect();
        window.push(ev(500, 10, 1));

        let event = evaluator().evaluate(&rule, &window, &[], now()).unwrap().unwrap();
        assert_eq!(event.value, 10.0);
        assert_eq!(event.severity, Severity::Critical);
        assert_eq!(event.message, "Error rate 10% exceeds threshold of 5%");
    }

    #[test]
    fn test_below_threshold_and_normal_does_not_fire() {
        let rule = AlertRule::new("latency", ConditionType::ResponseTimeAvg, 500.0);
        let window = vec![ev(200, 100, 5)];
        let baseline = [95.0, 105.0, 100.0, 98.0, 102.0, 101.0];
        assert!(evaluator().evaluate(&rule, &window, &baseline, now()).unwrap().is_none());
    }

    #[test]
    fn test_anomaly_below_threshold_fires() {
        let rule = AlertRule::new("latency", ConditionType::ResponseTimeAvg, 5_000.0);
        let window = vec![ev(200, 400, 5)];
        let baseline = [95.0, 105.0, 100.0, 98.0, 102.0, 101.0];

        let event = evaluator().evaluate(&rule, &window, &baseline, now()).unwrap().unwrap();
        assert_eq!(event.severity, Severity::Critical);
        let verdict = event.anomaly.expect("anomaly attached");
        assert_eq!(verdict.direction, Direction::High);
        assert!(event.message.contains("is anomalous (high)"));
    }

    #[test]
    fn test_moderate_anomaly_is_warning() {
        let rule = AlertRule::new("latency", ConditionType::ResponseTimeAvg, 5_000.0);
        // Mean 101, std dev 1: 104ms is z = 3, score 3 / 5.
        let baseline = [100.0, 102.0, 100.0, 102.0, 100.0, 102.0];
        let window = vec![ev(200, 104, 5)];

        let event = evaluator().evaluate(&rule, &window, &baseline, now()).unwrap().unwrap();
        assert_eq!(event.severity, Severity::Warning);
        let verdict = event.anomaly.expect("anomaly attached");
        assert!((verdict.score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_low_latency_is_not_alerted_but_traffic_drop_is() {
        let baseline = [100.0, 104.0, 96.0, 102.0, 98.0, 100.0];

        let latency = AlertRule::new("latency", ConditionType::ResponseTimeAvg, 5_000.0);
        let fast = vec![ev(200, 1, 5)];
        assert!(evaluator().evaluate(&latency, &fast, &baseline, now()).unwrap().is_none());

        let traffic = AlertRule::new("traffic", ConditionType::RequestCount, 10_000.0);
        let event = evaluator().evaluate(&traffic, &fast, &baseline, now()).unwrap().unwrap();
        assert_eq!(event.anomaly.map(|v| v.direction), Some(Direction::Low));
    }

    #[test]
    fn test_inactive_rule_never_fires() {
        let mut rule = AlertRule::new("latency", ConditionType::ResponseTimeAvg, 1.0);
        rule.is_active = false;
        let window = vec![ev(200, 600, 5)];
        assert!(evaluator().evaluate(&rule, &window, &[], now()).unwrap().is_none());
    }

    #[test]
    fn test_invalid_rule_is_rejected() {
        let rule = AlertRule::new("", ConditionType::ErrorRate, 5.0);
        assert!(matches!(rule.validate(), Err(DetectError::InvalidRule(_))));

        let rule = AlertRule::new("x", ConditionType::ErrorRate, -1.0);
        assert!(evaluator().evaluate(&rule, &[], &[], now()).is_err());
    }

    #[test]
    fn test_resolve() {
        let rule = AlertRule::new("latency", ConditionType::P95Latency, 100.0);
        let window = vec![ev(200, 900, 5)];
        let mut event = evaluator().evaluate(&rule, &window, &[], now()).unwrap().unwrap();
        event.resolve(now() + Duration::minutes(30));
        assert!(event.resolved);
        assert_eq!(event.resolved_at, Some(now() + Duration::minutes(30)));
    }

    #[test]
    fn test_evaluate_events_builds_hourly_baseline() {
        // Ten requests in each of the 24 preceding hours, then a burst.
        let mut events = Vec::new();
        for hour in 1..=24 {
            for i in 0..10 {
                events.push(ev(200, 50, hour * 60 + i + 1));
            }
        }
        for i in 0..100 {
            events.push(ev(200, 50, i % 50));
        }

        let rule = AlertRule::new("traffic", ConditionType::RequestCount, 1_000.0);
        let event = evaluator().evaluate_events(&rule, &events, now()).unwrap().unwrap();
        assert_eq!(event.value, 100.0);
        assert_eq!(event.severity, Severity::Critical);
    }

    #[test]
    fn test_window_is_clamped() {
        let huge = AnalyticsConfig {
            alert_window_minutes: i64::MAX,
            ..AnalyticsConfig::default()
        };
        let evaluator = AlertEvaluator::new(DetectionConfig::default(), &huge);
        assert_eq!(evaluator.window(), Duration::minutes(MAX_WINDOW_MINUTES));

        let rule = AlertRule::new("latency", ConditionType::ResponseTimeAvg, 500.0);
        assert!(evaluator.evaluate_events(&rule, &[ev(200, 600, 5)], now()).unwrap().is_some());

        let zero = AnalyticsConfig {
            alert_window_minutes: 0,
            ..AnalyticsConfig::default()
        };
        let evaluator = AlertEvaluator::new(DetectionConfig::default(), &zero);
        assert_eq!(evaluator.window(), Duration::minutes(1));
    }

    #[test]
    fn test_rule_deserializes_with_defaults() {
        let json = r#"{"name":"Error Rate Spike","conditionType":"error_rate","threshold":5}"#;
        let rule: AlertRule = serde_json::from_str(json).unwrap();
        assert!(rule.is_active);
        assert_eq!(rule.condition_type, ConditionType::ErrorRate);
    }
}
