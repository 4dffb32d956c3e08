//! Test-only helpers: plan builders, scripted collaborators, temp projects.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result};
use tempfile::TempDir;

use crate::agents::planner::Planner;
use crate::agents::verifier::Verifier;
use crate::core::state::RunState;
use crate::core::types::{
    ActionStep, Arguments, Command, ExecutionAttempt, Plan, PlanningError, StepOutcome,
    Verification,
};
use crate::io::config::{PilotConfig, write_config};
use crate::io::paths::PilotPaths;
use crate::io::tools::{ReadOnlyTools, Tool, ToolError};

/// Deterministic step with no arguments.
pub fn step(index: usize, tool_name: &str) -> ActionStep {
    ActionStep {
        index,
        tool_name: tool_name.to_string(),
        arguments: Arguments::new(),
        description: format!("step {index}"),
        verification: None,
    }
}

/// Plan for `notepad` with the given steps and no check.
pub fn plan_of(steps: Vec<ActionStep>) -> Plan {
    Plan {
        target_app: "notepad".to_string(),
        summary: "test plan".to_string(),
        steps,
        check: None,
    }
}

pub fn attempt(
    step_index: usize,
    attempt_number: u32,
    raw_result: &str,
    outcome: StepOutcome,
) -> ExecutionAttempt {
    ExecutionAttempt {
        step_index,
        attempt_number,
        raw_result: raw_result.to_string(),
        outcome,
    }
}

/// Tool that replays queued responses and records every call.
///
/// Clones share the queue and the call log, so a test can keep a handle
/// after registering the tool.
#[derive(Clone)]
pub struct ScriptedTool {
    name: String,
    read_only: bool,
    responses: Rc<RefCell<VecDeque<Result<String, ToolError>>>>,
    fallback: Option<String>,
    calls: Rc<RefCell<Vec<Arguments>>>,
}

impl ScriptedTool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            read_only: false,
            responses: Rc::new(RefCell::new(VecDeque::new())),
            fallback: None,
            calls: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Queue one result text.
    pub fn respond(self, text: &str) -> Self {
        self.responses.borrow_mut().push_back(Ok(text.to_string()));
        self
    }

    /// Queue the same result text `times` times.
    pub fn respond_times(self, text: &str, times: usize) -> Self {
        (0..times).fold(self, |tool, _| tool.respond(text))
    }

    /// Queue one invocation error.
    pub fn fail(self, err: ToolError) -> Self {
        self.responses.borrow_mut().push_back(Err(err));
        self
    }

    /// Result text once the queue is empty.
    pub fn otherwise(mut self, text: &str) -> Self {
        self.fallback = Some(text.to_string());
        self
    }

    pub fn calls(&self) -> Rc<RefCell<Vec<Arguments>>> {
        Rc::clone(&self.calls)
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    /// Panics if queued responses were never consumed.
    pub fn assert_drained(&self) {
        let remaining = self.responses.borrow().len();
        assert_eq!(
            remaining, 0,
            "scripted tool '{}' has {remaining} unused responses",
            self.name
        );
    }
}

impl Tool for ScriptedTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "scripted tool"
    }

    fn read_only(&self) -> bool {
        self.read_only
    }

    fn invoke(&self, arguments: &Arguments) -> Result<String, ToolError> {
        self.calls.borrow_mut().push(arguments.clone());
        if let Some(response) = self.responses.borrow_mut().pop_front() {
            return response;
        }
        match &self.fallback {
            Some(text) => Ok(text.clone()),
            None => panic!("scripted tool '{}' has no response queued", self.name),
        }
    }
}

/// Planner returning a fixed result and counting calls.
pub struct ScriptedPlanner {
    result: Result<Plan, PlanningError>,
    calls: Cell<usize>,
}

impl ScriptedPlanner {
    pub fn new(result: Result<Plan, PlanningError>) -> Self {
        Self {
            result,
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Planner for ScriptedPlanner {
    fn plan(&self, _command: &Command) -> Result<Plan, PlanningError> {
        self.calls.set(self.calls.get() + 1);
        self.result.clone()
    }
}

/// Verifier returning a fixed verification and counting calls.
pub struct ScriptedVerifier {
    verification: Verification,
    calls: Cell<usize>,
}

impl ScriptedVerifier {
    pub fn new(verification: Verification) -> Self {
        Self {
            verification,
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Verifier for ScriptedVerifier {
    fn verify(&self, _state: &RunState, _tools: ReadOnlyTools<'_>) -> Verification {
        self.calls.set(self.calls.get() + 1);
        self.verification.clone()
    }
}

/// Project root in a temp dir; removed on drop.
pub struct TestProject {
    dir: TempDir,
    paths: PilotPaths,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp project")?;
        let paths = PilotPaths::new(dir.path());
        Ok(Self { dir, paths })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn paths(&self) -> &PilotPaths {
        &self.paths
    }

    pub fn write_config(&self, cfg: &PilotConfig) -> Result<()> {
        write_config(&self.paths.config_path, cfg)
    }

    /// Write a plan document (JSON) under the project root.
    pub fn write_plan_file(&self, name: &str, document: &serde_json::Value) -> Result<PathBuf> {
        let path = self.path().join(name);
        fs::write(&path, serde_json::to_string_pretty(document)?)
            .with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}
