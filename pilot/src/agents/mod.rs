//! Collaborators the supervisor invokes: planner, action executor, verifier.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

pub mod executor;
pub mod planner;
pub mod verifier;

pub(crate) fn write_output_schema(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create schema dir {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write schema {}", path.display()))
}
