//! Smoke tests -- verify the binary runs and each subcommand is wired up.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

fn pulsewatch() -> Command {
    let mut cmd = Command::cargo_bin("pulsewatch").unwrap();
    cmd.env_remove("PULSEWATCH_CONFIG").env_remove("RUST_LOG");
    cmd
}

fn events_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"[
          {{"method": "GET", "path": "/api/users", "statusCode": 200, "responseTimeMs": 780, "timestamp": "2024-03-10T12:05:00Z"}},
          {{"method": "GET", "path": "/api/users", "statusCode": 500, "responseTimeMs": 820, "timestamp": "2024-03-10T12:10:00Z"}},
          {{"method": "POST", "path": "/api/orders", "statusCode": 201, "responseTimeMs": 800, "timestamp": "2024-03-10T12:20:00Z"}}
        ]"#
    )
    .unwrap();
    file
}

#[test]
fn test_cli_help() {
    pulsewatch()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Statistical aggregation"));
}

#[test]
fn test_cli_version() {
    pulsewatch()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("pulsewatch"));
}

#[test]
fn test_stats_table() {
    pulsewatch()
        .args(["stats", "10", "20", "30", "40", "50"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mean     | 30.00"))
        .stdout(predicate::str::contains("std_dev  | 14.14"));
}

#[test]
fn test_stats_requires_values() {
    pulsewatch().arg("stats").assert().failure();
}

#[test]
fn test_detect_json_flags_spike() {
    pulsewatch()
        .args([
            "detect",
            "--current",
            "400",
            "--history",
            "100,102,98,101,99,100,103,97",
            "--family",
            "response-time",
            "--json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"is_anomaly\": true"))
        .stdout(predicate::str::contains("\"direction\": \"high\""));
}

#[test]
fn test_detect_short_history_is_normal() {
    pulsewatch()
        .args(["detect", "--current", "400", "--history", "100,101"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Anomaly:   no"))
        .stdout(predicate::str::contains("Insufficient historical data"));
}

#[test]
fn test_detect_rejects_bad_threshold() {
    pulsewatch()
        .args(["detect", "--current", "1", "--history", "1,2,3,4,5", "--threshold", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid z-score threshold"));
}

#[test]
fn test_unreadable_config_env_is_reported() {
    pulsewatch()
        .env("PULSEWATCH_CONFIG", "/nonexistent/pulsewatch.toml")
        .args(["stats", "1", "2", "3"])
        .assert()
        .success()
        .stderr(predicate::str::contains("PULSEWATCH_CONFIG set but file could not be loaded"));
}

#[test]
fn test_timeseries_from_events_file() {
    let file = events_file();
    pulsewatch()
        .args(["timeseries", "--period", "1h", "--now", "2024-03-10T12:30:00Z", "--events"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("count over 1h (13 buckets)"))
        .stdout(predicate::str::contains("2024-03-10T12:05:00+00:00  1"));
}

#[test]
fn test_endpoints_busiest_first() {
    let file = events_file();
    pulsewatch()
        .args(["endpoints", "--now", "2024-03-10T12:30:00Z", "--json", "--events"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"path\": \"/api/users\""))
        .stdout(predicate::str::contains("\"errorRate\": 50.0"));
}

#[test]
fn test_alerts_static_breach() {
    let events = events_file();
    let mut rules = NamedTempFile::new().unwrap();
    write!(
        rules,
        r#"[{{"name": "Slow API", "conditionType": "response_time_avg", "threshold": 500}}]"#
    )
    .unwrap();

    pulsewatch()
        .args(["alerts", "--now", "2024-03-10T12:30:00Z", "--events"])
        .arg(events.path())
        .arg("--rules")
        .arg(rules.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "[critical] Slow API: Avg response time 800ms exceeds threshold of 500ms",
        ));
}

#[test]
fn test_missing_events_file_fails() {
    pulsewatch()
        .args(["overview", "--events", "/nonexistent/events.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read events file"));
}
