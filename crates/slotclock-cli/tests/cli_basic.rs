//! Basic CLI E2E tests.
//!
//! Each test runs the built binary against its own temporary data directory.

use std::path::Path;
use std::process::Command;

/// Run a CLI command and return (exit code, stdout, stderr).
fn run_cli(data_dir: &Path, args: &[&str]) -> (i32, String, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_slotclock"))
        .args(args)
        .env("SLOTCLOCK_DATA_DIR", data_dir)
        .env_remove("SLOTCLOCK_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (code, stdout, stderr)
}

fn json_lines(stdout: &str) -> Vec<serde_json::Value> {
    stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).expect("each line is JSON"))
        .collect()
}

#[test]
fn test_timer_status_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run_cli(dir.path(), &["timer", "status"]);
    assert_eq!(code, 0);

    let snapshot: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(snapshot["type"], "state_snapshot");
    assert_eq!(snapshot["mode"], "working");
    assert_eq!(snapshot["remaining_seconds"], 1500);
    assert_eq!(snapshot["is_active"], false);
}

#[test]
fn test_timer_start_persists_between_runs() {
    let dir = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run_cli(dir.path(), &["timer", "start", "--minutes", "10"]);
    assert_eq!(code, 0);
    let started: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(started["type"], "timer_started");
    assert_eq!(started["duration_secs"], 600);

    let (_, stdout, _) = run_cli(dir.path(), &["timer", "status"]);
    let snapshot: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(snapshot["is_active"], true);
    let remaining = snapshot["remaining_seconds"].as_u64().unwrap();
    assert!(remaining <= 600 && remaining > 500, "remaining = {remaining}");

    let (code, stdout, _) = run_cli(dir.path(), &["timer", "reset"]);
    assert_eq!(code, 0);
    assert!(json_lines(&stdout).iter().any(|e| e["type"] == "timer_reset"));

    let (_, stdout, _) = run_cli(dir.path(), &["timer", "status"]);
    let snapshot: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(snapshot["is_active"], false);
    assert_eq!(snapshot["remaining_seconds"], 1500);
}

#[test]
fn test_timer_configure_falls_back_per_field() {
    let dir = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run_cli(
        dir.path(),
        &["timer", "configure", "--work", "50", "--break", "abc"],
    );
    assert_eq!(code, 0);
    let durations: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(durations["work_minutes"], 50);
    assert_eq!(durations["break_minutes"], 5);

    let (_, stdout, _) = run_cli(dir.path(), &["config", "get", "timer.work_minutes"]);
    assert_eq!(stdout.trim(), "50");

    let (_, stdout, _) = run_cli(dir.path(), &["timer", "start"]);
    let started: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(started["duration_secs"], 3000);
}

#[test]
fn test_timer_commands_publish_state_for_running_instances() {
    let dir = tempfile::tempdir().unwrap();
    run_cli(dir.path(), &["timer", "start", "--minutes", "10"]);
    run_cli(dir.path(), &["timer", "pause"]);

    let db = slotclock_core::Database::open_at(&dir.path().join("slotclock.db")).unwrap();
    let states: Vec<_> = db
        .sync_messages_after(0)
        .unwrap()
        .into_iter()
        .map(|(_, message)| message.state)
        .collect();
    assert_eq!(states.len(), 2);
    assert!(states[0].is_active);
    assert_eq!(states[0].remaining_seconds, 600);
    assert!(!states[1].is_active);
}

#[test]
fn test_sync_disabled_publishes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(run_cli(dir.path(), &["config", "set", "sync.enabled", "false"]).0, 0);
    assert_eq!(run_cli(dir.path(), &["timer", "start"]).0, 0);

    let db = slotclock_core::Database::open_at(&dir.path().join("slotclock.db")).unwrap();
    assert!(db.sync_messages_after(0).unwrap().is_empty());
}

#[test]
fn test_task_switching() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(run_cli(dir.path(), &["task", "register", "a", "60", "Write"]).0, 0);
    assert_eq!(run_cli(dir.path(), &["task", "register", "b", "30", "Review"]).0, 0);

    let (code, stdout, _) = run_cli(dir.path(), &["task", "start", "a"]);
    assert_eq!(code, 0);
    let types: Vec<_> = json_lines(&stdout).iter().map(|e| e["type"].clone()).collect();
    assert_eq!(types, vec!["task_started", "timer_started"]);

    let (code, stdout, _) = run_cli(dir.path(), &["task", "start", "b"]);
    assert_eq!(code, 0);
    let events = json_lines(&stdout);
    assert_eq!(events[0]["type"], "timer_paused");
    assert_eq!(events[1]["type"], "task_paused");
    assert_eq!(events[1]["task_id"], "a");
    assert_eq!(events.last().unwrap()["type"], "timer_started");

    let (_, stdout, _) = run_cli(dir.path(), &["task", "list", "--json"]);
    let tasks: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let tasks = tasks.as_array().unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0]["id"], "a");
    assert!(tasks[0]["segment_started_at"].is_null());
    assert!(!tasks[1]["segment_started_at"].is_null());
}

#[test]
fn test_task_pause_rejects_idle_task() {
    let dir = tempfile::tempdir().unwrap();
    run_cli(dir.path(), &["task", "register", "a", "60", "Write"]);

    let (code, _, stderr) = run_cli(dir.path(), &["task", "pause", "a"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"), "stderr = {stderr}");

    let (code, _, _) = run_cli(dir.path(), &["task", "pause", "missing"]);
    assert_eq!(code, 1);
}

#[test]
fn test_task_complete_and_report() {
    let dir = tempfile::tempdir().unwrap();
    run_cli(dir.path(), &["task", "register", "a", "20", "Write"]);
    run_cli(dir.path(), &["task", "start", "a"]);

    let (code, stdout, _) = run_cli(dir.path(), &["task", "complete", "a"]);
    assert_eq!(code, 0);
    let events = json_lines(&stdout);
    assert_eq!(events.last().unwrap()["type"], "task_completed");

    let (code, stdout, _) = run_cli(dir.path(), &["task", "report", "a"]);
    assert_eq!(code, 0);
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["status"], "completed");
    assert_eq!(report["label"], "0/20");

    let (code, _, _) = run_cli(dir.path(), &["task", "complete", "a"]);
    assert_eq!(code, 1);
}

#[test]
fn test_task_book_slot() {
    let dir = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run_cli(
        dir.path(),
        &["task", "book", "--start", "14:00", "--end", "14:45", "Planning"],
    );
    assert_eq!(code, 0);
    let record: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(record["allotted_minutes"], 45);
    assert_eq!(record["status"], "not_started");
    assert!(record["id"].as_str().unwrap().starts_with("task-"));

    let (code, _, _) = run_cli(
        dir.path(),
        &["task", "book", "--start", "15:00", "--end", "14:00", "Backwards"],
    );
    assert_eq!(code, 1);

    let (_, stdout, _) = run_cli(dir.path(), &["task", "list"]);
    assert!(stdout.contains("Planning"));
    assert!(stdout.contains("14:00 - 14:45"));
    assert!(!stdout.contains("Backwards"));
}

#[test]
fn test_config_set_get_reset() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(run_cli(dir.path(), &["config", "set", "sync.reconnect_delay_ms", "2500"]).0, 0);
    let (_, stdout, _) = run_cli(dir.path(), &["config", "get", "sync.reconnect_delay_ms"]);
    assert_eq!(stdout.trim(), "2500");

    let (code, _, _) = run_cli(dir.path(), &["config", "get", "no.such.key"]);
    assert_eq!(code, 1);
    let (code, _, _) = run_cli(dir.path(), &["config", "set", "timer.work_minutes", "many"]);
    assert_eq!(code, 1);

    assert_eq!(run_cli(dir.path(), &["config", "reset"]).0, 0);
    let (_, stdout, _) = run_cli(dir.path(), &["config", "get", "sync.reconnect_delay_ms"]);
    assert_eq!(stdout.trim(), "1000");
}
