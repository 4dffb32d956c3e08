//! Supervisor-owned state transitions.
//!
//! Routing is a pure function of [`RunState`]: a closed table of
//! {state predicate → next component}. A turn is `begin_turn` (count the turn,
//! enforce the ceiling, pick the route) followed by `apply_event` (fold the
//! component's return value into the state). Nothing else writes the state.

use crate::core::invariants::validate_plan_shape;
use crate::core::state::RunState;
use crate::core::types::{
    ExecutionAttempt, FailureReason, Limits, Plan, RunFailure, RunStatus, StepOutcome,
    Verification,
};

/// Component the supervisor invokes for a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Ask the planner for a plan.
    Plan,
    /// Invoke the tool for `step_index` (attempt numbers are 1-based).
    Execute { step_index: usize, attempt_number: u32 },
    /// Run the one-shot verification pass.
    Verify,
    /// Settle the terminal status; no component is invoked.
    Finish,
    /// Run is terminal; nothing to do.
    Halt,
}

impl Route {
    pub fn as_str(self) -> &'static str {
        match self {
            Route::Plan => "plan",
            Route::Execute { .. } => "execute",
            Route::Verify => "verify",
            Route::Finish => "finish",
            Route::Halt => "halt",
        }
    }
}

/// Structured return value of the component invoked for a turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    Planned(Plan),
    PlanningFailed(String),
    Attempted(ExecutionAttempt),
    Verified(Verification),
    Finished,
}

/// Summary of the state change applied for one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionSummary {
    pub route: Route,
    pub status: RunStatus,
    /// `current_step` moved forward.
    pub advanced: bool,
    /// The same step is scheduled again.
    pub retry_scheduled: bool,
    /// Run-level failure recorded during this turn.
    pub failure: Option<FailureReason>,
}

/// Select the next component from the current state.
///
/// Only an `Executing` run reaches the verifier, and only once every step is
/// resolved or the run is marked for abort.
pub fn route(state: &RunState) -> Route {
    if state.is_terminal() {
        return Route::Halt;
    }
    let plan = match (state.status, &state.plan) {
        (RunStatus::Planning, _) | (_, None) => return Route::Plan,
        (RunStatus::Verifying, Some(_)) => return Route::Finish,
        (_, Some(plan)) => plan,
    };
    if state.verification.is_some() {
        return Route::Finish;
    }
    if !state.marked_for_abort() && state.current_step < plan.len() {
        return Route::Execute {
            step_index: state.current_step,
            attempt_number: state.attempts_for_current_step + 1,
        };
    }
    Route::Verify
}

/// Start a turn: count it, enforce the iteration ceiling, and route.
///
/// Once the count exceeds `limits.max_iterations` the run is failed with
/// `IterationCeilingExceeded`, overriding any step or verification in flight.
pub fn begin_turn(state: &mut RunState, limits: &Limits) -> Route {
    if state.is_terminal() {
        return Route::Halt;
    }
    state.iteration_count += 1;
    if state.iteration_count > limits.max_iterations {
        state.status = RunStatus::Failed;
        state.failure = Some(RunFailure {
            reason: FailureReason::IterationCeilingExceeded,
            detail: format!(
                "turn {} exceeds the ceiling of {} turns",
                state.iteration_count, limits.max_iterations
            ),
            step_index: (state.current_step < state.plan_len()).then_some(state.current_step),
        });
        return Route::Halt;
    }
    route(state)
}

/// Fold the event returned for `route` into the state.
///
/// Errors indicate a caller bug (an event that does not answer the route) and
/// leave the state untouched.
pub fn apply_event(
    state: &mut RunState,
    route: Route,
    event: TurnEvent,
    limits: &Limits,
) -> Result<TransitionSummary, String> {
    let mut summary = TransitionSummary {
        route,
        status: state.status,
        advanced: false,
        retry_scheduled: false,
        failure: None,
    };

    match (route, event) {
        (Route::Plan, TurnEvent::Planned(plan)) => {
            let errors = validate_plan_shape(&plan);
            if errors.is_empty() {
                state.plan = Some(plan);
                state.current_step = 0;
                state.attempts_for_current_step = 0;
                state.status = RunStatus::Executing;
            } else {
                fail_planning(state, errors.join("; "));
                summary.failure = Some(FailureReason::PlanningError);
            }
        }
        (Route::Plan, TurnEvent::PlanningFailed(detail)) => {
            fail_planning(state, detail);
            summary.failure = Some(FailureReason::PlanningError);
        }
        (
            Route::Execute {
                step_index,
                attempt_number,
            },
            TurnEvent::Attempted(attempt),
        ) => {
            if attempt.step_index != step_index || attempt.attempt_number != attempt_number {
                return Err(format!(
                    "attempt for step {} #{} does not match route step {} #{}",
                    attempt.step_index, attempt.attempt_number, step_index, attempt_number
                ));
            }
            let outcome = attempt.outcome;
            let detail = attempt.raw_result.clone();
            // Record before the classification takes effect.
            state.history.push(attempt);

            match outcome {
                StepOutcome::Success => {
                    state.current_step += 1;
                    state.attempts_for_current_step = 0;
                    summary.advanced = true;
                }
                StepOutcome::RetryableFailure
                    if state.attempts_for_current_step < limits.retry_budget() =>
                {
                    state.attempts_for_current_step += 1;
                    summary.retry_scheduled = true;
                }
                StepOutcome::RetryableFailure => {
                    mark_for_abort(
                        state,
                        FailureReason::StepRetriesExhausted,
                        step_index,
                        format!("step {step_index} failed after {attempt_number} attempts: {detail}"),
                    );
                    summary.failure = Some(FailureReason::StepRetriesExhausted);
                }
                StepOutcome::FatalFailure => {
                    mark_for_abort(
                        state,
                        FailureReason::FatalStepFailure,
                        step_index,
                        format!("step {step_index} failed fatally: {detail}"),
                    );
                    summary.failure = Some(FailureReason::FatalStepFailure);
                }
            }
        }
        (Route::Verify, TurnEvent::Verified(verification)) => {
            if state.verification.is_some() {
                return Err("verification already recorded".to_string());
            }
            state.verification = Some(verification);
            state.status = RunStatus::Verifying;
        }
        (Route::Finish, TurnEvent::Finished) => {
            // Confirmed and Inconclusive both complete; only a pending failure fails.
            state.status = if state.failure.is_some() {
                RunStatus::Failed
            } else {
                RunStatus::Complete
            };
        }
        (route, event) => {
            return Err(format!(
                "event {} does not answer route {}",
                event_name(&event),
                route.as_str()
            ));
        }
    }

    summary.status = state.status;
    Ok(summary)
}

fn fail_planning(state: &mut RunState, detail: String) {
    state.status = RunStatus::Failed;
    state.failure = Some(RunFailure {
        reason: FailureReason::PlanningError,
        detail,
        step_index: None,
    });
}

/// Remaining steps are skipped; the verifier still runs once before `Failed`.
fn mark_for_abort(state: &mut RunState, reason: FailureReason, step_index: usize, detail: String) {
    state.failure = Some(RunFailure {
        reason,
        detail,
        step_index: Some(step_index),
    });
}

fn event_name(event: &TurnEvent) -> &'static str {
    match event {
        TurnEvent::Planned(_) => "planned",
        TurnEvent::PlanningFailed(_) => "planning_failed",
        TurnEvent::Attempted(_) => "attempted",
        TurnEvent::Verified(_) => "verified",
        TurnEvent::Finished => "finished",
    }
}
