//! Final run report: a text panel for terminals, JSON for scripts.

use std::fmt::Write as _;

use serde::Serialize;

use crate::core::state::RunState;
use crate::core::types::{
    ExecutionAttempt, FailureReason, RunFailure, RunStatus, StepOutcome, Verification,
};
use crate::exit_codes;

/// Longest raw result shown on one execution-log line.
const LOG_LINE_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepResult {
    Done,
    /// Failed attempts, another one scheduled.
    Retrying,
    Failed,
    /// Never attempted.
    Pending,
}

impl StepResult {
    pub fn as_str(self) -> &'static str {
        match self {
            StepResult::Done => "done",
            StepResult::Retrying => "retrying",
            StepResult::Failed => "failed",
            StepResult::Pending => "pending",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRow {
    pub index: usize,
    pub tool_name: String,
    pub description: String,
    pub attempts: usize,
    pub result: StepResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub command: String,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
    pub turns: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_app: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub steps: Vec<StepRow>,
    pub history: Vec<ExecutionAttempt>,
    pub verification: Option<Verification>,
}

impl RunReport {
    pub fn from_state(state: &RunState) -> Self {
        let failed_step = state.failure.as_ref().and_then(|f| f.step_index);
        let steps = state
            .plan
            .iter()
            .flat_map(|plan| plan.steps.iter())
            .map(|step| {
                let attempts: Vec<&ExecutionAttempt> = state.attempts_for(step.index).collect();
                let result = if attempts.iter().any(|a| a.outcome == StepOutcome::Success) {
                    StepResult::Done
                } else if attempts.is_empty() {
                    StepResult::Pending
                } else if failed_step == Some(step.index) || state.is_terminal() {
                    StepResult::Failed
                } else {
                    StepResult::Retrying
                };
                StepRow {
                    index: step.index,
                    tool_name: step.tool_name.clone(),
                    description: step.description.clone(),
                    attempts: attempts.len(),
                    result,
                }
            })
            .collect();

        Self {
            run_id: state.run_id.clone(),
            command: state.command.as_str().to_string(),
            status: state.status,
            failure: state.failure.clone(),
            turns: state.iteration_count,
            target_app: state.plan.as_ref().map(|plan| plan.target_app.clone()),
            summary: state.plan.as_ref().map(|plan| plan.summary.clone()),
            steps,
            history: state.history.clone(),
            verification: state.verification.clone(),
        }
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "run:          {}", self.run_id);
        let _ = writeln!(out, "command:      {}", self.command);
        if let Some(summary) = &self.summary {
            let app = self.target_app.as_deref().unwrap_or("?");
            let _ = writeln!(out, "plan:         {summary} [{app}]");
        }
        let _ = writeln!(out, "status:       {}", self.status.as_str());
        if let Some(failure) = &self.failure {
            let at = failure
                .step_index
                .map(|index| format!(" at step {index}"))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "failure:      {}{at}: {}",
                failure.reason.as_str(),
                one_line(&failure.detail)
            );
        }
        let _ = writeln!(out, "turns:        {}", self.turns);
        match &self.verification {
            Some(verification) => {
                let _ = writeln!(
                    out,
                    "verification: {} ({})",
                    verification.outcome.as_str(),
                    one_line(&verification.detail)
                );
            }
            None => {
                let _ = writeln!(out, "verification: none");
            }
        }

        if !self.steps.is_empty() {
            let tool_width = self
                .steps
                .iter()
                .map(|row| row.tool_name.len())
                .max()
                .unwrap_or(0)
                .max("tool".len());
            let _ = writeln!(out, "\nsteps:");
            let _ = writeln!(
                out,
                "  {:>3}  {:<tool_width$}  {:>8}  {:<8}  description",
                "#", "tool", "attempts", "result"
            );
            for row in &self.steps {
                let _ = writeln!(
                    out,
                    "  {:>3}  {:<tool_width$}  {:>8}  {:<8}  {}",
                    row.index,
                    row.tool_name,
                    row.attempts,
                    row.result.as_str(),
                    row.description
                );
            }
        }

        if !self.history.is_empty() {
            let _ = writeln!(out, "\nexecution log:");
            for attempt in &self.history {
                let _ = writeln!(
                    out,
                    "  [{}.{}] {}: {}",
                    attempt.step_index,
                    attempt.attempt_number,
                    attempt.outcome.as_str(),
                    one_line(&attempt.raw_result)
                );
            }
        }
        out
    }

    pub fn exit_code(&self) -> i32 {
        exit_code_for(self.status, self.failure.as_ref())
    }
}

/// Map a run's final status to a CLI exit code.
pub fn exit_code_for(status: RunStatus, failure: Option<&RunFailure>) -> i32 {
    match (status, failure.map(|f| f.reason)) {
        (RunStatus::Complete, _) => exit_codes::OK,
        (RunStatus::Failed, Some(FailureReason::PlanningError)) => exit_codes::PLANNING_FAILED,
        (
            RunStatus::Failed,
            Some(FailureReason::StepRetriesExhausted | FailureReason::FatalStepFailure),
        ) => exit_codes::STEP_FAILED,
        (RunStatus::Failed, Some(FailureReason::IterationCeilingExceeded)) => {
            exit_codes::CEILING_EXCEEDED
        }
        _ => exit_codes::INVALID,
    }
}

fn one_line(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= LOG_LINE_CHARS {
        return flat;
    }
    let mut cut: String = flat.chars().take(LOG_LINE_CHARS).collect();
    cut.push_str("...");
    cut
}
