//! Basic CLI E2E tests.
//!
//! Each test runs the binary against its own temporary HOME so the config
//! file and SQLite store are isolated.

use std::path::Path;
use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_donext"))
        .args(args)
        .env("HOME", home)
        .env_remove("DONEXT_ENV")
        .env_remove("DONEXT_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn seed(home: &Path) {
    let file = home.join("seed.json");
    std::fs::write(
        &file,
        r#"{
            "user_id": "u1",
            "candidates": [
                {"id": "report", "title": "Finish report", "priority": "urgent",
                 "due_at": "2099-01-01T00:00:00Z", "tags": ["work"]},
                {"id": "laundry", "title": "Laundry", "priority": "low", "tags": ["maintenance"]},
                {"id": "api", "title": "Wait for API keys", "priority": "high", "status": "blocked"}
            ]
        }"#,
    )
    .unwrap();
    let (stdout, stderr, code) = run_cli(home, &["seed", file.to_str().unwrap()]);
    assert_eq!(code, 0, "seed failed: {stderr}");
    assert!(stdout.contains("seeded 3 candidates for u1"));
}

fn parse(stdout: &str) -> serde_json::Value {
    serde_json::from_str(stdout).expect("stdout should be a JSON envelope")
}

#[test]
fn test_config_path() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["config", "path"]);
    assert_eq!(code, 0);
    assert!(stdout.trim().ends_with("config.toml"));
    assert!(stdout.contains("donext"));
}

#[test]
fn test_config_get_set() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["config", "get", "generative.enabled"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "false");

    let (_, _, code) = run_cli(
        home.path(),
        &["config", "set", "checkin.default_available_minutes", "60"],
    );
    assert_eq!(code, 0);
    let (stdout, _, _) = run_cli(
        home.path(),
        &["config", "get", "checkin.default_available_minutes"],
    );
    assert_eq!(stdout.trim(), "60");
}

#[test]
fn test_config_rejects_unknown_key() {
    let home = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["config", "get", "no.such.key"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("unknown key"));

    let (_, _, code) = run_cli(home.path(), &["config", "set", "stuck.nope", "3"]);
    assert_eq!(code, 1);
}

#[test]
fn test_config_show() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["config", "show"]);
    assert_eq!(code, 0);
    let config = parse(&stdout);
    assert_eq!(config["stuck"]["elapsed_threshold_minutes"], 45);
}

#[test]
fn test_unknown_event_kind() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["event", r#"{"type": "TELEPORT", "user_id": "u1"}"#]);
    assert_eq!(code, 1);
    let resp = parse(&stdout);
    assert_eq!(resp["success"], false);
    assert_eq!(resp["error"], "unknown event kind");
}

#[test]
fn test_checkin_then_complete() {
    let home = tempfile::tempdir().unwrap();
    seed(home.path());

    let (stdout, stderr, code) = run_cli(
        home.path(),
        &[
            "event",
            r#"{"type": "CHECKIN_SUBMITTED", "user_id": "u1", "energy_level": 6,
                "focus_areas": ["work"], "available_minutes": 90,
                "timestamp": "2026-03-02T09:00:00Z"}"#,
        ],
    );
    assert_eq!(code, 0, "check-in failed: {stderr}");
    let resp = parse(&stdout);
    assert_eq!(resp["success"], true);
    assert_eq!(resp["data"]["selection"]["chosen_id"], "report");

    let event_file = home.path().join("complete.json");
    std::fs::write(
        &event_file,
        r#"{"type": "DO_ACTION", "user_id": "u1", "task_id": "report", "action": "complete",
            "timestamp": "2026-03-02T10:00:00Z", "actual_duration": 50}"#,
    )
    .unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["event", "--file", event_file.to_str().unwrap()]);
    assert_eq!(code, 0);
    let resp = parse(&stdout);
    assert_eq!(resp["data"]["progression"]["experience_gained"], 50);
    assert_eq!(resp["data"]["next"]["selection"]["chosen_id"], "laundry");

    // The completed item is gone from the store; the stored check-in still applies.
    let (stdout, _, code) = run_cli(
        home.path(),
        &["event", r#"{"type": "DO_NEXT", "user_id": "u1", "timestamp": "2026-03-02T11:00:00Z"}"#],
    );
    assert_eq!(code, 0);
    let resp = parse(&stdout);
    assert_eq!(resp["data"]["selection"]["chosen_id"], "laundry");
    assert_eq!(resp["data"]["constraints"]["max_minutes"], 90);
}

#[test]
fn test_day_end_for_new_user() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(
        home.path(),
        &["event", r#"{"type": "DAY_END", "user_id": "ghost", "timestamp": "2026-03-02T22:00:00Z"}"#],
    );
    // DAY_END only reads progression, so an unseen user just has none yet.
    assert_eq!(code, 0);
    let resp = parse(&stdout);
    assert_eq!(resp["data"]["gamification"]["experience"], 0);
    assert_eq!(resp["data"]["streak_alive"], false);
}
