//! Backend abstraction for schema-constrained agent calls.
//!
//! The [`Backend`] trait decouples planning from the actual agent process
//! (currently `codex exec`). Tests use scripted backends that write
//! predetermined outputs without spawning processes.

use std::fs;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use crate::io::process::{CommandOutput, run_command_with_timeout};

/// Parameters for a backend invocation.
#[derive(Debug, Clone)]
pub struct BackendRequest {
    /// Working directory for the backend process.
    pub workdir: PathBuf,
    /// Prompt text fed on stdin.
    pub prompt: String,
    /// JSON Schema that constrains the output.
    pub output_schema_path: PathBuf,
    /// Where the backend must write its final JSON message.
    pub output_path: PathBuf,
    /// Backend stdout/stderr log.
    pub log_path: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

pub trait Backend {
    /// Run the agent. Must write its output to `request.output_path`.
    fn exec(&self, request: &BackendRequest) -> Result<()>;
}

/// Backend that spawns `codex exec` in a read-only sandbox.
#[derive(Debug, Clone)]
pub struct CodexBackend {
    program: String,
}

impl CodexBackend {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// `codex exec` arguments; the prompt itself is read from stdin (`-`).
    fn args(request: &BackendRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "exec",
            "-c",
            "model_reasoning_effort=medium",
            "--sandbox",
            "read-only",
            "--skip-git-repo-check",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        args.push("--output-schema".into());
        args.push(request.output_schema_path.clone().into_os_string());
        args.push("--output-last-message".into());
        args.push(request.output_path.clone().into_os_string());
        args.push("-".into());
        args
    }
}

impl Backend for CodexBackend {
    #[instrument(skip_all, fields(program = %self.program, timeout_secs = request.timeout.as_secs()))]
    fn exec(&self, request: &BackendRequest) -> Result<()> {
        if !request.output_schema_path.exists() {
            bail!(
                "missing output schema {}",
                request.output_schema_path.display()
            );
        }
        if let Some(parent) = request.output_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create output dir {}", parent.display()))?;
        }
        // A stale answer from an earlier attempt must not be read back.
        if request.output_path.exists() {
            fs::remove_file(&request.output_path)
                .with_context(|| format!("remove {}", request.output_path.display()))?;
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(Self::args(request)).current_dir(&request.workdir);
        info!(workdir = %request.workdir.display(), "asking codex for a plan");
        let output = run_command_with_timeout(
            cmd,
            Some(request.prompt.as_bytes()),
            request.timeout,
            request.output_limit_bytes,
        )
        .with_context(|| format!("run {} exec", self.program))?;
        write_backend_log(&request.log_path, &output)?;

        if output.timed_out {
            warn!("codex exec timed out");
            bail!("codex exec timed out after {}s", request.timeout.as_secs());
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "codex exec failed");
            bail!(
                "codex exec exited with {:?}; see {}",
                output.status.code(),
                request.log_path.display()
            );
        }
        debug!("codex exec finished");
        Ok(())
    }
}

/// Run the backend and load its output as JSON of type `T`.
#[instrument(skip_all, fields(output_path = %request.output_path.display()))]
pub fn exec_and_load_json<B: Backend, T: DeserializeOwned>(
    backend: &B,
    request: &BackendRequest,
) -> Result<T> {
    backend.exec(request)?;
    if !request.output_path.exists() {
        return Err(anyhow!(
            "missing backend output {}",
            request.output_path.display()
        ));
    }
    let contents = fs::read_to_string(&request.output_path)
        .with_context(|| format!("read backend output {}", request.output_path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("parse {}", request.output_path.display()))
}

fn write_backend_log(path: &Path, output: &CommandOutput) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create backend log dir {}", parent.display()))?;
    }
    let mut buf = format!(
        "=== stdout ===\n{}{}\n=== stderr ===\n{}{}",
        output.stdout.text(),
        output.stdout.notice("codex", "stdout"),
        output.stderr.text(),
        output.stderr.notice("codex", "stderr"),
    );
    if output.timed_out {
        buf.push_str("\n[codex timed out]\n");
    }
    fs::write(path, buf).with_context(|| format!("write backend log {}", path.display()))
}
