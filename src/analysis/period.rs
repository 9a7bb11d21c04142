//! Query periods and their chart resolution.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
}

/// Resolved query range plus the bucket width to chart it with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub bucket_minutes: u32,
}

impl Period {
    /// Unknown labels resolve to the 24h configuration.
    pub fn parse(label: &str) -> Self {
        match label {
            "1h" => Period::OneHour,
            "6h" => Period::SixHours,
            "24h" => Period::Day,
            "7d" => Period::Week,
            "30d" => Period::Month,
            _ => Period::Day,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Period::OneHour => "1h",
            Period::SixHours => "6h",
            Period::Day => "24h",
            Period::Week => "7d",
            Period::Month => "30d",
        }
    }

    pub fn span(self) -> Duration {
        match self {
            Period::OneHour => Duration::hours(1),
            Period::SixHours => Duration::hours(6),
            Period::Day => Duration::hours(24),
            Period::Week => Duration::days(7),
            Period::Month => Duration::days(30),
        }
    }

    pub fn bucket_minutes(self) -> u32 {
        match self {
            Period::OneHour => 5,
            Period::SixHours => 15,
            Period::Day => 60,
            Period::Week => 360,
            Period::Month => 1440,
        }
    }

    /// The window ending at `now`.
    pub fn window(self, now: DateTime<Utc>) -> TimeWindow {
        TimeWindow {
            start: now - self.span(),
            end: now,
            bucket_minutes: self.bucket_minutes(),
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Resolve a period label into its window ending at `now`.
pub fn time_period(label: &str, now: DateTime<Utc>) -> TimeWindow {
    Period::parse(label).window(now)
}
