//! CLI integration tests.

use std::io::Write;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

fn wsmux() -> Command {
    let mut cmd = cargo_bin_cmd!("wsmux");
    for key in [
        "WS_POOL_MIN_CONNECTIONS",
        "WS_POOL_MAX_CONNECTIONS",
        "WS_MAX_CONNECTIONS_PER_CLIENT",
        "WS_IDLE_TIMEOUT",
        "WS_HEALTH_CHECK_INTERVAL",
    ] {
        cmd.env_remove(key);
    }
    cmd
}

fn write_temp_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp config");
    file.write_all(contents.as_bytes()).expect("write temp config");
    file
}

const VALID: &str = r#"
[upstream]
url = "ws://127.0.0.1:9001/feed"

[pool]
name = "cli-test"
min_connections = 2
max_connections = 8
"#;

#[test]
fn test_help() {
    wsmux()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("wsmux"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("check"));
}

#[test]
fn test_version() {
    wsmux()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("wsmux"));
}

#[test]
fn test_check_prints_effective_settings() {
    let file = write_temp_config(VALID);
    wsmux()
        .args(["check", "--config"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration OK"))
        .stdout(predicate::str::contains("ws://127.0.0.1:9001/feed"))
        .stdout(predicate::str::contains("cli-test"))
        .stdout(predicate::str::contains("2..8"));
}

#[test]
fn test_check_json() {
    let file = write_temp_config(VALID);
    let output = wsmux()
        .args(["check", "--json", "--config"])
        .arg(file.path())
        .output()
        .expect("run wsmux");
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(report["upstream"], "ws://127.0.0.1:9001/feed");
    assert_eq!(report["pool"]["name"], "cli-test");
    assert_eq!(report["pool"]["max_connections"], 8);
    assert_eq!(report["circuit_breaker"]["failure_threshold"], 5);
}

#[test]
fn test_check_rejects_invalid_config() {
    let file = write_temp_config(
        r#"
[pool]
min_connections = 9
max_connections = 3
"#,
    );
    wsmux()
        .args(["check", "--config"])
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid configuration"))
        .stderr(predicate::str::contains("min_connections"));
}

#[test]
fn test_check_missing_file_fails() {
    wsmux()
        .args(["check", "--config", "/nonexistent/wsmux.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read config file"));
}

#[test]
fn test_run_requires_upstream_url() {
    let file = write_temp_config("[pool]\nmin_connections = 0\n");
    wsmux()
        .args(["run", "--config"])
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing required field: url"));
}
