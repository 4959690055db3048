//! CLI integration tests for the steadfast binary
//!
//! These tests verify that the CLI commands work correctly by running
//! the actual compiled binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a Command instance for the steadfast binary
#[allow(deprecated)]
fn steadfast_cmd() -> Command {
    let mut cmd = Command::cargo_bin("steadfast").expect("Failed to find steadfast binary");
    cmd.env_remove("RUST_LOG");
    cmd
}

// ============================================================================
// --version / --help
// ============================================================================

#[test]
fn test_version_flag() {
    steadfast_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_help_lists_commands() {
    steadfast_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("classify"))
        .stdout(predicate::str::contains("simulate"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_missing_subcommand_fails() {
    steadfast_cmd().assert().failure();
}

// ============================================================================
// classify
// ============================================================================

#[test]
fn test_classify_database_not_found() {
    steadfast_cmd()
        .args([
            "classify",
            r#"{"code":"PGRST116","message":"The result contains 0 rows"}"#,
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""kind": "NOT_FOUND""#))
        .stdout(predicate::str::contains(r#""code": "PGRST116""#))
        .stdout(predicate::str::contains(r#""retryable": false"#));
}

#[test]
fn test_classify_plain_text_timeout() {
    steadfast_cmd()
        .args(["classify", "Request timeout after 30s"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""kind": "NETWORK""#))
        .stdout(predicate::str::contains("Request timed out"))
        .stdout(predicate::str::contains(r#""retryable": true"#));
}

#[test]
fn test_classify_reads_stdin() {
    steadfast_cmd()
        .arg("classify")
        .write_stdin(r#"{"issues":[{"path":["email"],"message":"Invalid email"}]}"#)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""kind": "VALIDATION""#))
        .stdout(predicate::str::contains("Invalid input data"))
        .stdout(predicate::str::contains("Invalid email"));
}

#[test]
fn test_classify_http_status() {
    steadfast_cmd()
        .args(["classify", "-"])
        .write_stdin(r#"{"status":429,"message":"slow down"}"#)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""kind": "RATE_LIMIT""#))
        .stdout(predicate::str::contains(r#""code": "429""#));
}

#[test]
fn test_classify_unrecognized_value() {
    steadfast_cmd()
        .args(["classify", "42"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""kind": "UNKNOWN""#))
        .stdout(predicate::str::contains("An unexpected error occurred"));
}

#[test]
fn test_classify_json_string_is_opaque_value() {
    steadfast_cmd()
        .args(["classify", r#""boom""#])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""kind": "UNKNOWN""#))
        .stdout(predicate::str::contains("An unexpected error occurred"))
        .stdout(predicate::str::contains(r#""details": "boom""#));
}

#[test]
fn test_classify_bare_not_found_code() {
    steadfast_cmd()
        .args(["classify", r#"{"code":"PGRST116"}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""kind": "NOT_FOUND""#))
        .stdout(predicate::str::contains("Resource not found"));
}

// ============================================================================
// simulate
// ============================================================================

#[test]
fn test_simulate_retries_until_success() {
    steadfast_cmd()
        .args([
            "simulate",
            "--outcomes",
            "network,network,ok",
            "--max-attempts",
            "3",
            "--base-delay-ms",
            "10",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""attempts":3"#))
        .stdout(predicate::str::contains(r#""success":true"#))
        .stdout(predicate::str::contains(r#""state":"closed""#));
}

#[test]
fn test_simulate_non_retryable_stops_immediately() {
    steadfast_cmd()
        .args(["simulate", "--outcomes", "auth,ok", "--base-delay-ms", "0"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains(r#""attempts":1"#))
        .stdout(predicate::str::contains(r#""kind":"AUTHENTICATION""#));
}

#[test]
fn test_simulate_exhausts_attempts() {
    steadfast_cmd()
        .args([
            "simulate",
            "--outcomes",
            "timeout,timeout,timeout",
            "--max-attempts",
            "2",
            "--base-delay-ms",
            "0",
        ])
        .assert()
        .code(1)
        .stdout(predicate::str::contains(r#""attempts":2"#))
        .stdout(predicate::str::contains("Request timed out"));
}

#[test]
fn test_simulate_breaker_opens_and_rejects() {
    steadfast_cmd()
        .args([
            "simulate",
            "--outcomes",
            "fail,fail,fail",
            "--calls",
            "3",
            "--max-attempts",
            "1",
            "--threshold",
            "2",
            "--cooldown-ms",
            "60000",
        ])
        .assert()
        .code(1)
        .stdout(predicate::str::contains(r#""attempts":0"#))
        .stdout(predicate::str::contains(r#""code":"CIRCUIT_OPEN""#))
        .stdout(predicate::str::contains(r#""state":"open""#))
        .stdout(predicate::str::contains(r#""failures":2"#));
}

#[test]
fn test_simulate_custom_dependency() {
    steadfast_cmd()
        .args([
            "simulate",
            "--outcomes",
            "ok",
            "--dependency",
            "payments",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""name":"payments""#));
}

#[test]
fn test_simulate_log_file_line_flag() {
    steadfast_cmd()
        .args([
            "simulate",
            "--outcomes",
            "network,ok",
            "--base-delay-ms",
            "0",
            "--log-file-line",
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("Retryable failure, backing off"))
        .stderr(predicate::str::contains("retry/mod.rs"));
}

#[test]
fn test_simulate_logs_without_file_line_by_default() {
    steadfast_cmd()
        .args([
            "simulate",
            "--outcomes",
            "network,ok",
            "--base-delay-ms",
            "0",
            "--log-no-target",
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("Retryable failure, backing off"))
        .stderr(predicate::str::contains("retry/mod.rs").not())
        .stderr(predicate::str::contains("steadfast::retry").not());
}

#[test]
fn test_simulate_rejects_unknown_outcome() {
    steadfast_cmd()
        .args(["simulate", "--outcomes", "explode"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("explode"));
}

// ============================================================================
// config
// ============================================================================

#[test]
fn test_config_prints_defaults() {
    steadfast_cmd()
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("[retry]"))
        .stdout(predicate::str::contains("max_attempts = 3"))
        .stdout(predicate::str::contains("[breakers.database]"))
        .stdout(predicate::str::contains("[breakers.ai_generation]"));
}

#[test]
fn test_config_environment_override() {
    steadfast_cmd()
        .arg("config")
        .env("STEADFAST__RETRY__MAX_ATTEMPTS", "7")
        .assert()
        .success()
        .stdout(predicate::str::contains("max_attempts = 7"));
}

#[test]
fn test_config_from_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "[breakers.database]\nfailure_threshold = 9").unwrap();

    steadfast_cmd()
        .args(["config", "--config"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("failure_threshold = 9"));
}

#[test]
fn test_config_missing_file() {
    steadfast_cmd()
        .args(["config", "--config", "/nonexistent/steadfast.toml"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Configuration file not found"));
}
