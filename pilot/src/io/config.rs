//! Pilot configuration stored under `.pilot/config.toml`.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::classifier::Classifier;
use crate::core::types::{ITERATION_CEILING, Limits, MAX_ATTEMPTS_PER_STEP};

/// Pilot configuration (TOML).
///
/// Intended to be edited by humans. Missing fields default to the values
/// `pilot init` writes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PilotConfig {
    /// Supervisor bounds. May only be tightened below the built-in ceilings.
    pub limits: Limits,
    pub planner: PlannerConfig,
    pub classifier: ClassifierConfig,
    /// The closed tool set steps may reference.
    pub tools: Vec<ToolConfig>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlannerKind {
    /// Ask `codex exec` for a schema-constrained plan.
    Codex,
    /// Read a plan document from `plan_file`.
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlannerConfig {
    pub kind: PlannerKind,
    /// Executable invoked for the codex planner.
    pub program: String,
    pub timeout_secs: u64,
    /// Truncate planner stdout/stderr logs beyond this many bytes.
    pub output_limit_bytes: usize,
    /// Plan document for the `file` planner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_file: Option<PathBuf>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            kind: PlannerKind::Codex,
            program: "codex".to_string(),
            timeout_secs: 300,
            output_limit_bytes: 100_000,
            plan_file: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Extra regex patterns treated as transient failure markers.
    pub extra_retryable_markers: Vec<String>,
}

impl ClassifierConfig {
    pub fn build(&self) -> Result<Classifier> {
        Classifier::with_extra_markers(&self.extra_retryable_markers)
            .context("compile classifier.extra_retryable_markers")
    }
}

/// A tool backed by an external process.
///
/// `argv` entries are minijinja templates rendered against the step
/// arguments; the first entry is the program.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolConfig {
    pub name: String,
    pub description: String,
    /// Inspection-only tools; the verifier may use nothing else.
    pub read_only: bool,
    pub argv: Vec<String>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            read_only: false,
            argv: Vec::new(),
            timeout_secs: 60,
            output_limit_bytes: 100_000,
        }
    }
}

impl ToolConfig {
    fn new(name: &str, description: &str, read_only: bool, argv: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            read_only,
            argv: argv.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }
}

/// X11 desktop tools driven through `xdotool`.
fn default_tools() -> Vec<ToolConfig> {
    vec![
        ToolConfig::new(
            "start_app",
            "Start a new instance of an application (app_name).",
            false,
            &[
                "sh",
                "-c",
                "nohup \"$0\" >/dev/null 2>&1 & sleep 1; echo \"Started '$0'.\"",
                "{{ app_name }}",
            ],
        ),
        ToolConfig::new(
            "type_text",
            "Type text into the focused window of an application (app_name, text).",
            false,
            &[
                "xdotool",
                "search",
                "--onlyvisible",
                "--class",
                "{{ app_name }}",
                "windowactivate",
                "--sync",
                "type",
                "--delay",
                "50",
                "{{ text }}",
            ],
        ),
        ToolConfig::new(
            "press_keys",
            "Press a key combination, e.g. '^s' for Ctrl+S or '{ENTER}' (app_name, keys).",
            false,
            &[
                "xdotool",
                "search",
                "--onlyvisible",
                "--class",
                "{{ app_name }}",
                "windowactivate",
                "--sync",
                "key",
                "{{ keys | xdotool_keys }}",
            ],
        ),
        ToolConfig::new(
            "get_window_info",
            "Report the title of an application's window (app_name).",
            true,
            &[
                "xdotool",
                "search",
                "--onlyvisible",
                "--class",
                "{{ app_name }}",
                "getwindowname",
            ],
        ),
    ]
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            planner: PlannerConfig::default(),
            classifier: ClassifierConfig::default(),
            tools: default_tools(),
        }
    }
}

impl PilotConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=ITERATION_CEILING).contains(&self.limits.max_iterations) {
            return Err(anyhow!(
                "limits.max_iterations must be within 1..={ITERATION_CEILING}"
            ));
        }
        if !(1..=MAX_ATTEMPTS_PER_STEP).contains(&self.limits.max_attempts_per_step) {
            return Err(anyhow!(
                "limits.max_attempts_per_step must be within 1..={MAX_ATTEMPTS_PER_STEP}"
            ));
        }
        if self.planner.timeout_secs == 0 {
            return Err(anyhow!("planner.timeout_secs must be > 0"));
        }
        if self.planner.output_limit_bytes == 0 {
            return Err(anyhow!("planner.output_limit_bytes must be > 0"));
        }
        if self.planner.kind == PlannerKind::Codex && self.planner.program.trim().is_empty() {
            return Err(anyhow!("planner.program must be non-empty"));
        }
        self.classifier.build()?;

        let mut seen = HashSet::new();
        for tool in &self.tools {
            if tool.name.trim().is_empty() {
                return Err(anyhow!("tools: name must be non-empty"));
            }
            if !seen.insert(tool.name.as_str()) {
                return Err(anyhow!("tools: duplicate tool '{}'", tool.name));
            }
            if tool.argv.is_empty() || tool.argv[0].trim().is_empty() {
                return Err(anyhow!("tools.{}: argv must be a non-empty array", tool.name));
            }
            if tool.timeout_secs == 0 {
                return Err(anyhow!("tools.{}: timeout_secs must be > 0", tool.name));
            }
            if tool.output_limit_bytes == 0 {
                return Err(anyhow!("tools.{}: output_limit_bytes must be > 0", tool.name));
            }
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PilotConfig::default()`.
pub fn load_config(path: &Path) -> Result<PilotConfig> {
    if !path.exists() {
        let cfg = PilotConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PilotConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PilotConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf, "toml.tmp")
}

pub(crate) fn write_atomic(path: &Path, contents: &str, tmp_extension: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension(tmp_extension);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
