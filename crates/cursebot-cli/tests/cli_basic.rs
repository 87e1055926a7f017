//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run and verify outputs. The dev
//! data directory keeps them away from a real installation.

use std::process::Command;

/// Run a CLI command and return output.
fn run_cli(args: &[&str]) -> (String, String, i32) {
    let output = Command::new("cargo")
        .args(["run", "-p", "cursebot-cli", "--"])
        .args(args)
        .env("CURSEBOT_ENV", "dev")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

#[test]
fn test_help() {
    let (stdout, _, code) = run_cli(&["--help"]);
    assert_eq!(code, 0, "Help failed");
    assert!(stdout.contains("simulate"));
    assert!(stdout.contains("waits"));
    assert!(stdout.contains("config"));
}

#[test]
fn test_config_validate() {
    let (stdout, _, code) = run_cli(&["config", "validate"]);
    assert_eq!(code, 0, "Config validate failed");
    assert!(stdout.contains("ok"));
}

#[test]
fn test_config_path() {
    let (stdout, _, code) = run_cli(&["config", "path"]);
    assert_eq!(code, 0, "Config path failed");
    assert!(stdout.trim().ends_with("config.toml"));
}

#[test]
fn test_config_show() {
    let (stdout, _, code) = run_cli(&["config", "show"]);
    assert_eq!(code, 0, "Config show failed");
    assert!(stdout.contains("[scheduler]"));
    assert!(stdout.contains("execution_buffer"));
}

#[test]
fn test_waits_report() {
    let (stdout, _, code) = run_cli(&["waits", "report"]);
    assert_eq!(code, 0, "Waits report failed");
    assert!(stdout.contains("OPERATION"));
    assert!(stdout.contains("template_click"));
}

#[test]
fn test_waits_path() {
    let (stdout, _, code) = run_cli(&["waits", "path"]);
    assert_eq!(code, 0, "Waits path failed");
    assert!(stdout.trim().ends_with(".json"));
}

#[test]
fn test_simulate_virtual_run() {
    let (stdout, _, code) = run_cli(&["simulate", "--stations", "1", "--dispatches", "4"]);
    assert_eq!(code, 0, "Simulate failed");
    assert!(stdout.contains("dispatches: 4"));
    assert!(stdout.contains("expedited:"));
}

#[test]
fn test_simulate_two_stations() {
    let (stdout, _, code) = run_cli(&["simulate", "--stations", "2", "--dispatches", "2"]);
    assert_eq!(code, 0, "Simulate failed");
    assert!(stdout.contains("dispatches: 2"));
}
