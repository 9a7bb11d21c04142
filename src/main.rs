use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};

use pulsewatch::analysis::overview::{endpoint_breakdown, Overview};
use pulsewatch::analysis::period::Period;
use pulsewatch::analysis::stats::calculate_stats;
use pulsewatch::analysis::timeseries::{Metric, Timeseries, TimedSample};
use pulsewatch::config::PulseConfig;
use pulsewatch::detect::alert::{AlertEvaluator, AlertRule};
use pulsewatch::detect::anomaly::{MetricFamily, ZScoreDetector};
use pulsewatch::format::{format_duration, format_number};
use pulsewatch::ingest::{in_range, load_events};

#[derive(Parser)]
#[command(
    name = "pulsewatch",
    about = "Statistical aggregation and anomaly detection for API request telemetry",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file (default: $PULSEWATCH_CONFIG, then /etc/pulsewatch/pulsewatch.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summary statistics (mean, std dev, percentiles) for a list of values
    Stats {
        #[arg(required = true, allow_negative_numbers = true)]
        values: Vec<f64>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Z-score anomaly check of one value against a history
    Detect {
        /// Current observation
        #[arg(long, allow_negative_numbers = true)]
        current: f64,

        /// Comma-separated historical values
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
        history: Vec<f64>,

        /// Metric family: response-time, error-rate or traffic
        #[arg(long)]
        family: Option<MetricFamily>,

        /// Explicit Z-score threshold (overrides the family threshold)
        #[arg(long)]
        threshold: Option<f64>,

        #[arg(long)]
        json: bool,
    },

    /// Bucketed time series from an events file
    Timeseries {
        /// JSON file with an event array or an `{"events": [...]}` batch
        #[arg(long)]
        events: PathBuf,

        /// requests, avg_response_time, error_rate or p95_response_time
        #[arg(long, default_value = "requests")]
        metric: String,

        /// 1h, 6h, 24h, 7d or 30d
        #[arg(long)]
        period: Option<String>,

        /// End of the window, RFC 3339 (default: now)
        #[arg(long)]
        now: Option<DateTime<Utc>>,

        #[arg(long)]
        json: bool,
    },

    /// Last 24h overview compared with the previous 24h
    Overview {
        #[arg(long)]
        events: PathBuf,

        #[arg(long)]
        now: Option<DateTime<Utc>>,

        #[arg(long)]
        json: bool,
    },

    /// Per-endpoint statistics over the last 24h
    Endpoints {
        #[arg(long)]
        events: PathBuf,

        #[arg(long)]
        now: Option<DateTime<Utc>>,

        /// Show at most this many endpoints
        #[arg(long, default_value = "10")]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// Evaluate alert rules against recent events
    Alerts {
        #[arg(long)]
        events: PathBuf,

        /// JSON file with an array of alert rules
        #[arg(long)]
        rules: PathBuf,

        #[arg(long)]
        now: Option<DateTime<Utc>>,

        #[arg(long)]
        json: bool,
    },
}

fn env_filter(level: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level))
}

fn init_tracing(level: &str, json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Load configuration under a scoped subscriber, since the global one
/// depends on the configured log level.
fn load_config(path: Option<&Path>, json: bool) -> Result<PulseConfig> {
    let load = || match path {
        Some(path) => PulseConfig::load(path),
        None => Ok(PulseConfig::load_or_default()),
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter("info"))
        .with_writer(std::io::stderr);
    if json {
        tracing::subscriber::with_default(builder.json().finish(), load)
    } else {
        tracing::subscriber::with_default(builder.finish(), load)
    }
}

fn load_rules(path: &Path) -> Result<Vec<AlertRule>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read rules file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse rules file: {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref(), cli.log_json)?;
    init_tracing(&config.logging.level, cli.log_json || config.logging.json);

    match cli.command {
        Commands::Stats { values, json } => {
            tracing::debug!(count = values.len(), "computing statistics");
            let stats = calculate_stats(&values);
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("{:<8} | Value", "Stat");
                println!("{:-<8}-|-{:-<12}", "", "");
                for (name, value) in [
                    ("mean", stats.mean),
                    ("median", stats.median),
                    ("std_dev", stats.std_dev),
                    ("p50", stats.p50),
                    ("p95", stats.p95),
                    ("p99", stats.p99),
                    ("min", stats.min),
                    ("max", stats.max),
                ] {
                    println!("{:<8} | {:.2}", name, value);
                }
            }
        }
        Commands::Detect {
            current,
            history,
            family,
            threshold,
            json,
        } => {
            let detector = match (threshold, family) {
                (Some(t), _) => ZScoreDetector::new(t)?.with_min_history(config.detection.min_history)?,
                (None, Some(family)) => ZScoreDetector::for_family(&config.detection, family)?,
                (None, None) => ZScoreDetector::new(config.detection.default_threshold)?
                    .with_min_history(config.detection.min_history)?,
            };
            tracing::info!(current, history = history.len(), threshold = detector.threshold(), "running detection");
            let verdict = detector.detect(current, &history);
            if json {
                println!("{}", serde_json::to_string_pretty(&verdict)?);
            } else {
                println!("Anomaly:   {}", if verdict.is_anomaly { "yes" } else { "no" });
                println!("Direction: {}", verdict.direction);
                println!("Score:     {:.2}", verdict.score);
                println!("Threshold: ±{}", verdict.threshold);
                println!("{}", verdict.message);
            }
        }
        Commands::Timeseries {
            events,
            metric,
            period,
            now,
            json,
        } => {
            let events = load_events(&events)?;
            let period = Period::parse(period.as_deref().unwrap_or(&config.analytics.default_period));
            let metric = Metric::parse(&metric);
            let now = now.unwrap_or_else(Utc::now);

            let samples: Vec<TimedSample> = events.iter().map(|e| e.to_sample()).collect();
            let series = Timeseries::build(period, metric, now, &samples)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&series)?);
            } else {
                println!("{} over {} ({} buckets)", metric, period, series.points.len());
                for point in &series.points {
                    println!("{}  {}", point.timestamp.to_rfc3339(), point.value);
                }
            }
        }
        Commands::Overview { events, now, json } => {
            let events = load_events(&events)?;
            let overview = Overview::for_last_day(&events, now.unwrap_or_else(Utc::now));
            if json {
                println!("{}", serde_json::to_string_pretty(&overview)?);
            } else {
                println!("\n=== Last 24h ===");
                println!(
                    "Requests:      {} ({:+}%)",
                    format_number(overview.total_requests as f64),
                    overview.changes.requests
                );
                println!(
                    "Error rate:    {}% ({:+} pts)",
                    overview.error_rate, overview.changes.error_rate
                );
                println!(
                    "Avg response:  {} ({:+}%)",
                    format_duration(overview.avg_response_time),
                    overview.changes.avg_response_time
                );
                println!("P95 response:  {}", format_duration(overview.p95_response_time));
                println!();
            }
        }
        Commands::Endpoints {
            events,
            now,
            limit,
            json,
        } => {
            let events = load_events(&events)?;
            let now = now.unwrap_or_else(Utc::now);
            let recent = in_range(&events, now - Duration::hours(24), now + Duration::milliseconds(1));
            let endpoints: Vec<_> = endpoint_breakdown(&recent).into_iter().take(limit).collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&endpoints)?);
            } else if endpoints.is_empty() {
                println!("No requests in the last 24h.");
            } else {
                println!(
                    "{:<8} | {:<30} | {:>8} | {:>7} | {:>8} | {:>8}",
                    "Method", "Path", "Requests", "Errors", "Avg", "P95"
                );
                println!("{:-<8}-|-{:-<30}-|-{:->8}-|-{:->7}-|-{:->8}-|-{:->8}", "", "", "", "", "", "");
                for ep in &endpoints {
                    println!(
                        "{:<8} | {:<30} | {:>8} | {:>6}% | {:>8} | {:>8}",
                        ep.method.to_string(),
                        ep.path,
                        format_number(ep.total_requests as f64),
                        ep.error_rate,
                        format_duration(ep.avg_response_time),
                        format_duration(ep.p95_response_time)
                    );
                }
            }
        }
        Commands::Alerts {
            events,
            rules,
            now,
            json,
        } => {
            let events = load_events(&events)?;
            let rules = load_rules(&rules)?;
            let now = now.unwrap_or_else(Utc::now);
            let evaluator = AlertEvaluator::new(config.detection.clone(), &config.analytics);

            let mut triggered = Vec::new();
            for rule in &rules {
                if let Some(event) = evaluator.evaluate_events(rule, &events, now)? {
                    triggered.push(event);
                }
            }
            tracing::info!(rules = rules.len(), triggered = triggered.len(), "alert evaluation finished");

            if json {
                println!("{}", serde_json::to_string_pretty(&triggered)?);
            } else if triggered.is_empty() {
                println!("No alerts triggered.");
            } else {
                for event in &triggered {
                    println!("[{}] {}: {}", event.severity, event.alert_name, event.message);
                }
            }
        }
    }

    Ok(())
}
