//! CLI tests: spawn the `warden` binary and check output and exit codes.

use std::path::Path;
use std::process::{Command, Output};

use warden::exit_codes;
use warden::test_support::TestWorkspace;

fn run_warden(ws: &TestWorkspace, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_warden"))
        .current_dir(ws.root())
        .env_remove("WARDEN_AGENT_MAX_STEPS")
        .env_remove("WARDEN_MODEL_BACKEND")
        .env_remove("WARDEN_SAFETY_PERMISSION_MODE")
        .args(args)
        .output()
        .expect("spawn warden")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn configured() -> TestWorkspace {
    let ws = TestWorkspace::new().expect("workspace");
    ws.write_config(&ws.config()).expect("config");
    ws
}

#[test]
fn init_writes_config_once() {
    let ws = TestWorkspace::new().expect("workspace");
    let output = run_warden(&ws, &["init"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(ws.config_path().is_file());

    let again = run_warden(&ws, &["init"]);
    assert_eq!(again.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&again.stderr).contains("--force"));

    let forced = run_warden(&ws, &["init", "--force"]);
    assert_eq!(forced.status.code(), Some(exit_codes::OK));
}

#[test]
fn tools_lists_enabled_tools() {
    let ws = configured();
    let output = run_warden(&ws, &["tools"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let text = stdout(&output);
    assert!(text.contains("- echo: "), "{text}");
    assert!(text.contains("- file_read: "), "{text}");
    assert!(!text.contains("- shell: "), "{text}");
}

#[test]
fn respond_prints_answer() {
    let ws = configured();
    let output = run_warden(&ws, &["respond", "please use_tool now"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout(&output), "Tool returned: hi");
}

#[test]
fn respond_honors_env_override() {
    let ws = configured();
    let output = Command::new(env!("CARGO_BIN_EXE_warden"))
        .current_dir(ws.root())
        .env_remove("WARDEN_AGENT_MAX_STEPS")
        .env_remove("WARDEN_MODEL_BACKEND")
        .env("WARDEN_SAFETY_PERMISSION_MODE", "auto")
        .args(["respond", "file_write please"])
        .output()
        .expect("spawn warden");
    assert_eq!(stdout(&output), "Write completed.");
    assert!(ws.workspace().join("demo.txt").is_file());
}

#[test]
fn exec_reports_blocked_commands() {
    let ws = configured();
    let output = run_warden(&ws, &["exec", "--", "bash", "-c", "echo hi"]);
    assert_eq!(output.status.code(), Some(exit_codes::BLOCKED));
    let outcome: serde_json::Value = serde_json::from_str(&stdout(&output)).expect("json");
    assert_eq!(outcome["blocked"], true);
    assert_eq!(outcome["error"], "command not in allowlist");
}

#[cfg(unix)]
#[test]
fn exec_runs_allowed_commands() {
    let ws = configured();
    std::fs::write(ws.workspace().join("listed.txt"), "").expect("write");
    let output = run_warden(&ws, &["exec", "--", "ls"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let outcome: serde_json::Value = serde_json::from_str(&stdout(&output)).expect("json");
    assert!(outcome["stdout"].as_str().expect("stdout").contains("listed.txt"));
}

#[test]
fn resolve_confines_paths() {
    let ws = configured();
    let inside = run_warden(&ws, &["resolve", "notes/a.txt"]);
    assert_eq!(inside.status.code(), Some(exit_codes::OK));
    assert!(Path::new(&stdout(&inside)).ends_with("workspace/notes/a.txt"));

    let outside = run_warden(&ws, &["resolve", "../warden.toml", "--write"]);
    assert_eq!(outside.status.code(), Some(exit_codes::BLOCKED));
    assert!(String::from_utf8_lossy(&outside.stderr).contains("outside allowed roots"));
}

#[test]
fn invalid_config_exits_invalid() {
    let ws = TestWorkspace::new().expect("workspace");
    std::fs::write(ws.config_path(), "[agent]\nmax_steps = 0\n").expect("write");
    let output = run_warden(&ws, &["tools"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("max_steps"));
}
