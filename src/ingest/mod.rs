//! Request telemetry as received from instrumented APIs.

pub mod ratelimit;

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::analysis::timeseries::TimedSample;
use self::ratelimit::RateLimiter;

pub const MAX_PATH_LEN: usize = 2048;
pub const MAX_IP_LEN: usize = 45;
pub const MAX_USER_AGENT_LEN: usize = 512;
pub const MAX_BATCH_SIZE: usize = 1000;

#[derive(Debug, Error, PartialEq)]
pub enum IngestError {
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("batch must contain between 1 and {max} events, got {got}", max = MAX_BATCH_SIZE)]
    BatchSize { got: usize },
    #[error("rate limit exceeded, resets at {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        };
        f.write_str(s)
    }
}

/// One recorded API request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEvent {
    pub method: HttpMethod,
    pub path: String,
    pub status_code: u16,
    pub response_time_ms: u64,
    #[serde(default)]
    pub request_size: u64,
    #[serde(default)]
    pub response_size: u64,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub user_agent: String,
    /// Defaults to the time of ingestion when omitted.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ApiEvent {
    pub fn new(method: HttpMethod, path: impl Into<String>, status_code: u16, response_time_ms: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            method,
            path: path.into(),
            status_code,
            response_time_ms,
            request_size: 0,
            response_size: 0,
            ip_address: String::new(),
            user_agent: String::new(),
            timestamp,
        }
    }

    /// Client and server errors both count.
    pub fn is_error(&self) -> bool {
        self.status_code >= 400
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.path.is_empty() || self.path.len() > MAX_PATH_LEN {
            return Err(IngestError::Invalid {
                field: "path",
                reason: format!("length must be 1..={}, got {}", MAX_PATH_LEN, self.path.len()),
            });
        }
        if !(100..=599).contains(&self.status_code) {
            return Err(IngestError::Invalid {
                field: "statusCode",
                reason: format!("{} is not in 100..=599", self.status_code),
            });
        }
        if self.ip_address.len() > MAX_IP_LEN {
            return Err(IngestError::Invalid {
                field: "ipAddress",
                reason: format!("longer than {} characters", MAX_IP_LEN),
            });
        }
        if self.user_agent.len() > MAX_USER_AGENT_LEN {
            return Err(IngestError::Invalid {
                field: "userAgent",
                reason: format!("longer than {} characters", MAX_USER_AGENT_LEN),
            });
        }
        Ok(())
    }

    /// Latency sample for bucketing.
    pub fn to_sample(&self) -> TimedSample {
        TimedSample {
            timestamp: self.timestamp,
            value: self.response_time_ms as f64,
            is_error: self.is_error(),
        }
    }
}

/// A batch upload: `{ "events": [...] }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBatch {
    pub events: Vec<ApiEvent>,
}

impl EventBatch {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.events.is_empty() || self.events.len() > MAX_BATCH_SIZE {
            return Err(IngestError::BatchSize { got: self.events.len() });
        }
        self.events.iter().try_for_each(ApiEvent::validate)
    }
}

/// Admission gate in front of the analytics core: the rate limit decision
/// comes first, then validation.
pub fn admit(limiter: &dyn RateLimiter, key: &str, batch: EventBatch) -> Result<Vec<ApiEvent>, IngestError> {
    let decision = limiter.check(key);
    if !decision.allowed {
        debug!(key, reset_at = %decision.reset_at, "ingestion rate limited");
        return Err(IngestError::RateLimited { reset_at: decision.reset_at });
    }
    batch.validate()?;
    Ok(batch.events)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EventFile {
    Batch(EventBatch),
    List(Vec<ApiEvent>),
}

/// Read events from a JSON file holding either an array or a batch object.
/// Every event is validated; file size is not limited to one batch.
pub fn load_events(path: &Path) -> Result<Vec<ApiEvent>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read events file: {}", path.display()))?;
    let parsed: EventFile = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse events file: {}", path.display()))?;
    let events = match parsed {
        EventFile::Batch(batch) => batch.events,
        EventFile::List(events) => events,
    };

    for (i, event) in events.iter().enumerate() {
        event
            .validate()
            .with_context(|| format!("event {} in {} is invalid", i, path.display()))?;
    }

    info!(path = %path.display(), count = events.len(), "loaded events");
    Ok(events)
}

/// Events with `start <= timestamp < end`.
pub fn in_range(events: &[ApiEvent], start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<ApiEvent> {
    events
        .iter()
        .filter(|e| e.timestamp >= start && e.timestamp < end)
        .cloned()
        .collect()
}
