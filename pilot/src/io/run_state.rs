//! Checkpoint storage for run state (`.pilot/runs/<run_id>/state.json`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::state::RunState;
use crate::io::config::write_atomic;

/// Load a checkpoint from disk.
pub fn load_run_state(path: &Path) -> Result<RunState> {
    debug!(path = %path.display(), "loading checkpoint");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read checkpoint {}", path.display()))?;
    let state: RunState = serde_json::from_str(&contents)
        .with_context(|| format!("parse checkpoint {}", path.display()))?;
    debug!(
        run_id = %state.run_id,
        iteration = state.iteration_count,
        status = state.status.as_str(),
        "checkpoint loaded"
    );
    Ok(state)
}

/// Atomically write a checkpoint to disk (temp file + rename).
pub fn write_run_state(path: &Path, state: &RunState) -> Result<()> {
    debug!(
        path = %path.display(),
        run_id = %state.run_id,
        iteration = state.iteration_count,
        "writing checkpoint"
    );
    let mut buf = serde_json::to_string_pretty(state).context("serialize checkpoint")?;
    buf.push('\n');
    write_atomic(path, &buf, "json.tmp")
}
