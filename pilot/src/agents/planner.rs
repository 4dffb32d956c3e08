//! Planners: turn a command into a validated action plan.
//!
//! Every planner speaks the same plan document (see `schemas/plan.schema.json`).
//! Documents are schema-checked, converted to [`Plan`], and repaired with the
//! pure fix-ups before [`plan_checked`] holds them against the tool registry.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use jsonschema::Draft;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::core::invariants::validate_plan_shape;
use crate::core::plan_fixup::apply_fixups;
use crate::core::types::{
    ActionStep, Arguments, Command, Plan, PlanningError, VerificationCheck,
};
use crate::io::codex::{Backend, BackendRequest, exec_and_load_json};
use crate::io::config::PlannerConfig;
use crate::io::paths::RunPaths;
use crate::io::prompt::PromptEngine;
use crate::io::tools::{ToolRegistry, ToolSpec};

use super::write_output_schema;

pub const PLAN_SCHEMA: &str = include_str!("../../schemas/plan.schema.json");

static PLAN_SCHEMA_JSON: LazyLock<Value> =
    LazyLock::new(|| serde_json::from_str(PLAN_SCHEMA).expect("plan schema should be valid json"));

/// Produces a plan for a command. Never retried by the supervisor.
pub trait Planner {
    fn plan(&self, command: &Command) -> Result<Plan, PlanningError>;
}

/// Wire form of a plan. Arguments are name/value string pairs so the schema
/// stays closed for structured-output backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanDocument {
    pub target_app: String,
    pub summary: String,
    pub steps: Vec<StepDocument>,
    pub check: Option<CheckDocument>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDocument {
    pub tool_name: String,
    pub arguments: Vec<ArgumentDocument>,
    pub description: String,
    pub verification: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckDocument {
    pub tool_name: String,
    pub arguments: Vec<ArgumentDocument>,
    pub expect: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentDocument {
    pub name: String,
    pub value: String,
}

impl PlanDocument {
    /// Convert to a [`Plan`], numbering steps by position.
    pub fn into_plan(self) -> Result<Plan, PlanningError> {
        let steps = self
            .steps
            .into_iter()
            .enumerate()
            .map(|(index, step)| -> Result<ActionStep, PlanningError> {
                Ok(ActionStep {
                    index,
                    arguments: to_arguments(step.arguments, &format!("step {index}"))?,
                    tool_name: step.tool_name,
                    description: step.description,
                    verification: Some(step.verification).filter(|v| !v.trim().is_empty()),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let check = self
            .check
            .map(|check| {
                Ok::<_, PlanningError>(VerificationCheck {
                    arguments: to_arguments(check.arguments, "check")?,
                    tool_name: check.tool_name,
                    expect: check.expect.filter(|e| !e.trim().is_empty()),
                })
            })
            .transpose()?;
        Ok(Plan {
            target_app: self.target_app,
            summary: self.summary,
            steps,
            check,
        })
    }
}

fn to_arguments(pairs: Vec<ArgumentDocument>, owner: &str) -> Result<Arguments, PlanningError> {
    let mut arguments = Arguments::new();
    for pair in pairs {
        if pair.name.trim().is_empty() {
            return Err(PlanningError::InvalidPlan(format!(
                "{owner}: argument name is empty"
            )));
        }
        if arguments.contains_key(&pair.name) {
            return Err(PlanningError::InvalidPlan(format!(
                "{owner}: duplicate argument '{}'",
                pair.name
            )));
        }
        arguments.insert(pair.name, Value::String(pair.value));
    }
    Ok(arguments)
}

/// Schema-check a plan document, convert it, and apply fix-ups.
pub fn plan_from_value(value: Value, command: &Command) -> Result<Plan, PlanningError> {
    validate_schema(&value)?;
    let document: PlanDocument = serde_json::from_value(value)
        .map_err(|err| PlanningError::InvalidPlan(format!("decode plan: {err}")))?;
    let mut plan = document.into_plan()?;
    for note in apply_fixups(&mut plan, command) {
        debug!(%note, "plan fixup applied");
    }
    Ok(plan)
}

/// Validate a plan document against the plan schema (Draft 2020-12).
fn validate_schema(instance: &Value) -> Result<(), PlanningError> {
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&PLAN_SCHEMA_JSON)
        .map_err(|err| PlanningError::InvalidPlan(format!("compile plan schema: {err}")))?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(PlanningError::InvalidPlan(format!(
            "schema validation failed: {}",
            messages.join("; ")
        )));
    }
    Ok(())
}

/// Run a planner and hold its plan against the registry.
///
/// Rejects blank commands before the planner runs; rejects empty plans,
/// malformed step indices, unknown tools, and a `check` that is not read-only.
#[instrument(skip_all)]
pub fn plan_checked<P: Planner + ?Sized>(
    planner: &P,
    command: &Command,
    registry: &ToolRegistry,
) -> Result<Plan, PlanningError> {
    if command.is_blank() {
        return Err(PlanningError::EmptyCommand);
    }
    let plan = planner.plan(command)?;
    check_plan(&plan, registry)?;
    info!(steps = plan.len(), target_app = %plan.target_app, "plan accepted");
    Ok(plan)
}

pub fn check_plan(plan: &Plan, registry: &ToolRegistry) -> Result<(), PlanningError> {
    if plan.is_empty() {
        return Err(PlanningError::EmptyPlan);
    }
    let errors = validate_plan_shape(plan);
    if !errors.is_empty() {
        return Err(PlanningError::InvalidPlan(errors.join("; ")));
    }
    if let Some(step) = plan
        .steps
        .iter()
        .find(|step| !registry.is_known(&step.tool_name))
    {
        return Err(PlanningError::UnknownTool {
            index: step.index,
            tool: step.tool_name.clone(),
        });
    }
    if let Some(check) = &plan.check
        && !registry.is_read_only(&check.tool_name)
    {
        return Err(PlanningError::ReadOnlyCheckRequired {
            tool: check.tool_name.clone(),
        });
    }
    Ok(())
}

/// Planner that asks an agent backend for a schema-constrained plan.
pub struct CodexPlanner<B: Backend> {
    backend: B,
    tools: Vec<ToolSpec>,
    prompts: PromptEngine,
    workdir: PathBuf,
    schema_path: PathBuf,
    output_path: PathBuf,
    log_path: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl<B: Backend> CodexPlanner<B> {
    pub fn new(
        backend: B,
        tools: Vec<ToolSpec>,
        workdir: &Path,
        run: &RunPaths,
        config: &PlannerConfig,
    ) -> Self {
        Self {
            backend,
            tools,
            prompts: PromptEngine::new(),
            workdir: workdir.to_path_buf(),
            schema_path: run.plan_schema_path.clone(),
            output_path: run.planner_output_path.clone(),
            log_path: run.dir.join("planner.log"),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        }
    }
}

impl<B: Backend> Planner for CodexPlanner<B> {
    #[instrument(skip_all)]
    fn plan(&self, command: &Command) -> Result<Plan, PlanningError> {
        let backend_err = |err: anyhow::Error| PlanningError::Backend(format!("{err:#}"));
        write_output_schema(&self.schema_path, PLAN_SCHEMA).map_err(backend_err)?;
        let prompt = self
            .prompts
            .render_planner(command, &self.tools)
            .map_err(backend_err)?;

        let request = BackendRequest {
            workdir: self.workdir.clone(),
            prompt,
            output_schema_path: self.schema_path.clone(),
            output_path: self.output_path.clone(),
            log_path: self.log_path.clone(),
            timeout: self.timeout,
            output_limit_bytes: self.output_limit_bytes,
        };
        let value: Value = exec_and_load_json(&self.backend, &request).map_err(backend_err)?;
        plan_from_value(value, command)
    }
}

/// Planner that reads a plan document from disk.
#[derive(Debug, Clone)]
pub struct PlanFilePlanner {
    path: PathBuf,
}

impl PlanFilePlanner {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Planner for PlanFilePlanner {
    fn plan(&self, command: &Command) -> Result<Plan, PlanningError> {
        let contents = fs::read_to_string(&self.path).map_err(|err| {
            PlanningError::Backend(format!("read plan file {}: {err}", self.path.display()))
        })?;
        let value: Value = serde_json::from_str(&contents).map_err(|err| {
            PlanningError::InvalidPlan(format!("parse {}: {err}", self.path.display()))
        })?;
        plan_from_value(value, command)
    }
}
