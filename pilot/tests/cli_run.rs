//! CLI tests for `pilot run`, `pilot replay` and `pilot tools`.
//!
//! Spawns the pilot binary against a temp project whose tools are shell
//! one-liners and checks the exit codes.

#![cfg(unix)]

use std::path::Path;
use std::process::{Command, Output};

use pilot::exit_codes;
use pilot::io::config::{PilotConfig, ToolConfig};
use pilot::test_support::TestProject;
use serde_json::{Value, json};

fn shell_tool(name: &str, read_only: bool, script: &str) -> ToolConfig {
    ToolConfig {
        name: name.to_string(),
        description: format!("{name} via sh"),
        read_only,
        argv: vec![
            "sh".to_string(),
            "-c".to_string(),
            script.to_string(),
            "{{ app_name }}".to_string(),
        ],
        timeout_secs: 5,
        ..ToolConfig::default()
    }
}

fn project_with(tools: Vec<ToolConfig>) -> TestProject {
    let project = TestProject::new().expect("project");
    project
        .write_config(&PilotConfig {
            tools,
            ..PilotConfig::default()
        })
        .expect("config");
    project
}

fn single_step_plan(project: &TestProject) -> std::path::PathBuf {
    project
        .write_plan_file(
            "plan.json",
            &json!({
                "target_app": "notepad",
                "summary": "Open Notepad",
                "steps": [{
                    "tool_name": "start_app",
                    "arguments": [],
                    "description": "Start Notepad",
                    "verification": ""
                }],
                "check": null
            }),
        )
        .expect("plan")
}

fn pilot(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pilot"))
        .arg("--root")
        .arg(root)
        .args(args)
        .output()
        .expect("run pilot")
}

#[test]
fn completed_run_exits_ok_and_replays() {
    let project = project_with(vec![shell_tool("start_app", false, "echo \"Started '$0'.\"")]);
    let plan = single_step_plan(&project);

    let output = pilot(
        project.path(),
        &[
            "run",
            "open notepad",
            "--plan-file",
            plan.to_str().expect("utf-8 path"),
            "--json",
        ],
    );
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let report: Value = serde_json::from_slice(&output.stdout).expect("json report");
    assert_eq!(report["status"], "complete");
    assert_eq!(report["history"][0]["raw_result"], "Started 'notepad'.");
    assert_eq!(report["verification"]["outcome"], "inconclusive");

    let run_id = report["run_id"].as_str().expect("run id");
    let replay = pilot(project.path(), &["replay", run_id]);
    assert_eq!(replay.status.code(), Some(exit_codes::OK));
    assert!(String::from_utf8_lossy(&replay.stdout).contains("replay matches checkpoint"));
}

#[test]
fn failing_step_exits_with_step_failed() {
    let project = project_with(vec![shell_tool("start_app", false, "exit 1")]);
    let plan = single_step_plan(&project);

    let output = pilot(
        project.path(),
        &["run", "open notepad", "--plan-file", plan.to_str().expect("utf-8 path")],
    );
    assert_eq!(output.status.code(), Some(exit_codes::STEP_FAILED));
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.contains("status:       failed"));
    assert!(text.contains("step_retries_exhausted at step 0"));
}

#[test]
fn unknown_tool_in_plan_exits_with_planning_failed() {
    let project = project_with(vec![shell_tool("type_text", false, "true")]);
    let plan = single_step_plan(&project);

    let output = pilot(
        project.path(),
        &["run", "open notepad", "--plan-file", plan.to_str().expect("utf-8 path")],
    );
    assert_eq!(output.status.code(), Some(exit_codes::PLANNING_FAILED));
    assert!(String::from_utf8_lossy(&output.stdout).contains("unknown tool 'start_app'"));
}

#[test]
fn invalid_config_exits_invalid() {
    let project = TestProject::new().expect("project");
    std::fs::create_dir_all(&project.paths().pilot_dir).expect("pilot dir");
    std::fs::write(&project.paths().config_path, "[limits]\nmax_iterations = 99\n")
        .expect("config");

    let output = pilot(project.path(), &["tools"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("limits.max_iterations"));
}

#[test]
fn tools_lists_default_registry() {
    let project = TestProject::new().expect("project");
    let init = pilot(project.path(), &["init"]);
    assert_eq!(init.status.code(), Some(exit_codes::OK));

    let output = pilot(project.path(), &["tools"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.contains("get_window_info  read-only"));
    assert!(text.contains("start_app"));
}
