//! Per-turn logs under `.pilot/runs/<run_id>/turns/<n>/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::types::{RunStatus, StepOutcome, VerificationOutcome};

#[derive(Debug, Clone, Serialize)]
pub struct TurnMeta {
    pub run_id: String,
    pub turn: u32,
    pub route: String,
    /// Run status after the transition.
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<StepOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationOutcome>,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct TurnPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub result_path: PathBuf,
}

impl TurnPaths {
    pub fn new(turns_dir: &Path, turn: u32) -> Self {
        let dir = turns_dir.join(turn.to_string());
        Self {
            meta_path: dir.join("meta.json"),
            result_path: dir.join("result.txt"),
            dir,
        }
    }
}

/// Write one turn's logs; `result` is the raw tool text, if the turn produced any.
pub fn write_turn(turns_dir: &Path, meta: &TurnMeta, result: Option<&str>) -> Result<TurnPaths> {
    let paths = TurnPaths::new(turns_dir, meta.turn);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create turn dir {}", paths.dir.display()))?;

    let mut buf = serde_json::to_string_pretty(meta).context("serialize turn meta")?;
    buf.push('\n');
    fs::write(&paths.meta_path, buf)
        .with_context(|| format!("write {}", paths.meta_path.display()))?;
    if let Some(text) = result {
        fs::write(&paths.result_path, text)
            .with_context(|| format!("write {}", paths.result_path.display()))?;
    }
    Ok(paths)
}
