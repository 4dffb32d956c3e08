//! Canonical locations under `.pilot/` and run identifiers.

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use chrono::Utc;
use rand::Rng;
use rand::distributions::Alphanumeric;

/// All canonical paths within `.pilot/` for a project root.
#[derive(Debug, Clone)]
pub struct PilotPaths {
    pub root: PathBuf,
    pub pilot_dir: PathBuf,
    pub config_path: PathBuf,
    pub runs_dir: PathBuf,
}

impl PilotPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let pilot_dir = root.join(".pilot");
        Self {
            root: root.clone(),
            pilot_dir: pilot_dir.clone(),
            config_path: pilot_dir.join("config.toml"),
            runs_dir: pilot_dir.join("runs"),
        }
    }

    pub fn run(&self, run_id: &str) -> RunPaths {
        RunPaths::new(&self.runs_dir, run_id)
    }
}

/// Files owned by one run (`.pilot/runs/<run_id>/`).
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub dir: PathBuf,
    /// Checkpoint, rewritten after every turn.
    pub state_path: PathBuf,
    pub turns_dir: PathBuf,
    /// Plan JSON schema handed to the codex planner.
    pub plan_schema_path: PathBuf,
    /// Last message written by the codex planner.
    pub planner_output_path: PathBuf,
}

impl RunPaths {
    pub fn new(runs_dir: &Path, run_id: &str) -> Self {
        let dir = runs_dir.join(run_id);
        Self {
            state_path: dir.join("state.json"),
            turns_dir: dir.join("turns"),
            plan_schema_path: dir.join("plan.schema.json"),
            planner_output_path: dir.join("planner.json"),
            dir,
        }
    }
}

/// `run-<YYYYmmdd_HHMMSS>-<6 lowercase alphanumerics>`.
pub fn new_run_id() -> String {
    build_run_id(&generate_timestamp(), &generate_short_id())
}

pub fn build_run_id(timestamp: &str, short_id: &str) -> String {
    format!("run-{timestamp}-{short_id}")
}

fn generate_timestamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

fn generate_short_id() -> String {
    let mut rng = rand::thread_rng();
    std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(6)
        .collect::<String>()
        .to_lowercase()
}

/// Validate that a run id is safe to use as a single path component.
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(anyhow!("id must not be empty"));
    }
    if id.contains('/') {
        return Err(anyhow!("id must not contain '/'"));
    }
    if id == "." || id == ".." {
        return Err(anyhow!("id must not be '{id}'"));
    }
    if id
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'))
    {
        return Err(anyhow!("id must be [A-Za-z0-9._-] only (got '{id}')"));
    }
    Ok(())
}
