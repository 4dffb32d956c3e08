//! The single shared state object a run is driven from.

use serde::{Deserialize, Serialize};

use crate::core::types::{
    ActionStep, Command, ExecutionAttempt, Plan, RunFailure, RunStatus, Verification,
};

/// Shared, versioned state of one run.
///
/// The supervisor is the only writer: collaborators receive `&RunState` and
/// return values that the transition function folds in. `iteration_count`
/// doubles as the state version, since every turn produces exactly one new
/// version. The serialized form is the checkpoint format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub command: Command,
    /// Set exactly once, when the planner succeeds.
    pub plan: Option<Plan>,
    /// Index of the step awaiting execution. Never decreases.
    pub current_step: usize,
    /// Failed attempts on `current_step` since it last advanced.
    pub attempts_for_current_step: u32,
    /// Append-only, totally ordered attempt log.
    pub history: Vec<ExecutionAttempt>,
    pub verification: Option<Verification>,
    pub status: RunStatus,
    /// Pending while the run waits for its verification pass, final once failed.
    pub failure: Option<RunFailure>,
    pub iteration_count: u32,
}

impl RunState {
    pub fn new(run_id: impl Into<String>, command: Command) -> Self {
        Self {
            run_id: run_id.into(),
            command,
            plan: None,
            current_step: 0,
            attempts_for_current_step: 0,
            history: Vec::new(),
            verification: None,
            status: RunStatus::Planning,
            failure: None,
            iteration_count: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// True once a step failure has aborted execution but the run has not
    /// reached its terminal status yet.
    pub fn marked_for_abort(&self) -> bool {
        !self.is_terminal() && self.failure.is_some()
    }

    pub fn plan_len(&self) -> usize {
        self.plan.as_ref().map_or(0, Plan::len)
    }

    pub fn current_action(&self) -> Option<&ActionStep> {
        self.plan.as_ref()?.steps.get(self.current_step)
    }

    /// Attempts recorded for one step, in order.
    pub fn attempts_for(&self, step_index: usize) -> impl Iterator<Item = &ExecutionAttempt> {
        self.history
            .iter()
            .filter(move |attempt| attempt.step_index == step_index)
    }

    pub fn last_attempt(&self) -> Option<&ExecutionAttempt> {
        self.history.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{FailureReason, StepOutcome};

    #[test]
    fn new_state_starts_planning_with_empty_history() {
        let state = RunState::new("run-1", Command::new("open notepad"));
        assert_eq!(state.status, RunStatus::Planning);
        assert!(state.plan.is_none());
        assert!(state.history.is_empty());
        assert_eq!(state.iteration_count, 0);
        assert_eq!(state.plan_len(), 0);
        assert!(state.current_action().is_none());
    }

    #[test]
    fn marked_for_abort_only_before_terminal_status() {
        let mut state = RunState::new("run-1", Command::new("x"));
        state.status = RunStatus::Executing;
        state.failure = Some(RunFailure {
            reason: FailureReason::StepRetriesExhausted,
            detail: "Control not found: Edit1".to_string(),
            step_index: Some(0),
        });
        assert!(state.marked_for_abort());

        state.status = RunStatus::Failed;
        assert!(!state.marked_for_abort());
    }

    #[test]
    fn attempts_for_filters_by_step() {
        let mut state = RunState::new("run-1", Command::new("x"));
        for (step_index, attempt_number) in [(0, 1), (0, 2), (1, 1)] {
            state.history.push(ExecutionAttempt {
                step_index,
                attempt_number,
                raw_result: "ok".to_string(),
                outcome: StepOutcome::Success,
            });
        }
        assert_eq!(state.attempts_for(0).count(), 2);
        assert_eq!(state.attempts_for(1).count(), 1);
        assert_eq!(state.last_attempt().map(|a| a.step_index), Some(1));
    }
}
