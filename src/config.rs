//! TOML configuration for pulsewatch.
//!
//! Every section has compiled-in defaults, so a partial (or empty) file is
//! valid. The file path may be overridden through `PULSEWATCH_CONFIG`.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::detect::anomaly::{
    DEFAULT_Z_THRESHOLD, ERROR_RATE_Z_THRESHOLD, MIN_HISTORY, RESPONSE_TIME_Z_THRESHOLD,
    TRAFFIC_Z_THRESHOLD,
};

pub const CONFIG_ENV_VAR: &str = "PULSEWATCH_CONFIG";
pub const SYSTEM_CONFIG_PATH: &str = "/etc/pulsewatch/pulsewatch.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PulseConfig {
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PulseConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Try, in order: `PULSEWATCH_CONFIG`, the system path, then defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "PULSEWATCH_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new(SYSTEM_CONFIG_PATH);
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Z-score thresholds per metric family and the minimum baseline size.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub min_history: usize,
    pub default_threshold: f64,
    pub response_time_threshold: f64,
    pub error_rate_threshold: f64,
    pub traffic_threshold: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_history: MIN_HISTORY,
            default_threshold: DEFAULT_Z_THRESHOLD,
            response_time_threshold: RESPONSE_TIME_Z_THRESHOLD,
            error_rate_threshold: ERROR_RATE_Z_THRESHOLD,
            traffic_threshold: TRAFFIC_Z_THRESHOLD,
        }
    }
}

// ---------------------------------------------------------------------------
// Analytics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Period label used when none is given (`1h`, `6h`, `24h`, `7d`, `30d`).
    pub default_period: String,
    /// Lookback window for alert evaluation, in minutes.
    pub alert_window_minutes: i64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            default_period: "24h".to_string(),
            alert_window_minutes: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed per window for authenticated API calls.
    pub max_requests: u32,
    /// Requests allowed per window for API-key event ingestion.
    pub ingest_max_requests: u32,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            ingest_max_requests: 1000,
            window_secs: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
