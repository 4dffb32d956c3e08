//! Shared deterministic types for the supervisor core.
//!
//! These types define the contracts between the supervisor and its
//! collaborators (planner, executor, verifier). They must not depend on
//! external state or I/O, and they serialize to a stable JSON shape because
//! checkpoints and turn logs are built from them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Hard ceiling on supervisor turns for a single run.
pub const ITERATION_CEILING: u32 = 30;

/// Total attempts allowed per step (one initial attempt plus two retries).
pub const MAX_ATTEMPTS_PER_STEP: u32 = 3;

/// Tool arguments: unique string keys mapped to primitive or nested JSON values.
pub type Arguments = Map<String, Value>;

/// The natural-language request a run was started for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Command(String);

impl Command {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

/// One planned unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionStep {
    /// Position in the plan (0-based, fixed at creation).
    pub index: usize,
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Arguments,
    /// Human-readable intent, for reporting only.
    pub description: String,
    /// Human-readable success criterion, for reporting only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<String>,
}

/// Read-only inspection the verifier performs once execution has resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationCheck {
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Arguments,
    /// Text expected in the inspection result when the plan had its effect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect: Option<String>,
}

/// Ordered action plan produced once per command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub target_app: String,
    pub summary: String,
    pub steps: Vec<ActionStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<VerificationCheck>,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Classification of a single tool result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Success,
    RetryableFailure,
    FatalFailure,
}

impl StepOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            StepOutcome::Success => "success",
            StepOutcome::RetryableFailure => "retryable_failure",
            StepOutcome::FatalFailure => "fatal_failure",
        }
    }
}

/// Raw result of one tool invocation, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttempt {
    pub step_index: usize,
    /// 1-based attempt number for this step.
    pub attempt_number: u32,
    pub raw_result: String,
}

impl RawAttempt {
    pub fn classified(self, outcome: StepOutcome) -> ExecutionAttempt {
        ExecutionAttempt {
            step_index: self.step_index,
            attempt_number: self.attempt_number,
            raw_result: self.raw_result,
            outcome,
        }
    }
}

/// Record of one invocation of a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionAttempt {
    pub step_index: usize,
    pub attempt_number: u32,
    pub raw_result: String,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationOutcome {
    /// Expected end state observed.
    Confirmed,
    /// Could not observe (e.g. target control not found).
    Inconclusive,
    /// Observed state contradicts the plan's intended effect.
    Failed,
}

impl VerificationOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationOutcome::Confirmed => "confirmed",
            VerificationOutcome::Inconclusive => "inconclusive",
            VerificationOutcome::Failed => "failed",
        }
    }
}

/// Immutable outcome of the single verification pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub outcome: VerificationOutcome,
    pub detail: String,
}

impl Verification {
    pub fn new(outcome: VerificationOutcome, detail: impl Into<String>) -> Self {
        Self {
            outcome,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Planning,
    Executing,
    Verifying,
    Complete,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Complete | RunStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Planning => "planning",
            RunStatus::Executing => "executing",
            RunStatus::Verifying => "verifying",
            RunStatus::Complete => "complete",
            RunStatus::Failed => "failed",
        }
    }
}

/// Run-level reason code reported when a run ends `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    PlanningError,
    StepRetriesExhausted,
    FatalStepFailure,
    IterationCeilingExceeded,
}

impl FailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureReason::PlanningError => "planning_error",
            FailureReason::StepRetriesExhausted => "step_retries_exhausted",
            FailureReason::FatalStepFailure => "fatal_step_failure",
            FailureReason::IterationCeilingExceeded => "iteration_ceiling_exceeded",
        }
    }
}

/// Failure recorded on the run: pending while the verifier still has to run,
/// final once the status is `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    pub reason: FailureReason,
    pub detail: String,
    /// Step that could not be resolved, if the failure is tied to one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_index: Option<usize>,
}

/// Bounds enforced by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum supervisor turns; the first turn beyond it fails the run.
    pub max_iterations: u32,
    /// Total attempts per step, initial attempt included.
    pub max_attempts_per_step: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_iterations: ITERATION_CEILING,
            max_attempts_per_step: MAX_ATTEMPTS_PER_STEP,
        }
    }
}

impl Limits {
    /// Number of retries allowed after the initial attempt of a step.
    pub fn retry_budget(&self) -> u32 {
        self.max_attempts_per_step.saturating_sub(1)
    }
}

/// Why a command could not be turned into an executable plan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanningError {
    #[error("command is empty")]
    EmptyCommand,
    #[error("planner returned an empty plan")]
    EmptyPlan,
    #[error("step {index} references unknown tool '{tool}'")]
    UnknownTool { index: usize, tool: String },
    #[error("verification check must use a read-only tool (got '{tool}')")]
    ReadOnlyCheckRequired { tool: String },
    #[error("invalid plan: {0}")]
    InvalidPlan(String),
    #[error("planner backend failed: {0}")]
    Backend(String),
}
