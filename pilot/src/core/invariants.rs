//! Semantic invariants not expressible via JSON Schema.

use std::collections::HashSet;

use crate::core::state::RunState;
use crate::core::types::{Limits, Plan, RunStatus, StepOutcome};

/// Check plan shape:
/// - At least one step
/// - Step indices are exactly `0..len`, in order
/// - Every step names a tool
pub fn validate_plan_shape(plan: &Plan) -> Vec<String> {
    let mut errors = Vec::new();
    if plan.is_empty() {
        errors.push("plan has no steps".to_string());
        return errors;
    }
    for (position, step) in plan.steps.iter().enumerate() {
        if step.index != position {
            errors.push(format!(
                "step at position {} has index {}",
                position, step.index
            ));
        }
        if step.tool_name.trim().is_empty() {
            errors.push(format!("step {}: tool_name is empty", position));
        }
    }
    if let Some(check) = &plan.check
        && check.tool_name.trim().is_empty()
    {
        errors.push("check: tool_name is empty".to_string());
    }
    errors
}

/// Check a (typically reloaded) run state for consistency:
/// - `current_step <= plan length`, and no steps without a plan
/// - Attempt counter within the retry budget
/// - History ordered by step, attempt numbers contiguous from 1
/// - Every step before `current_step` ends in a success
/// - A plan is only held past `Planning`; a verification only from `Verifying` on
/// - Terminal `Failed` carries a failure; `Complete` carries none
pub fn validate_state(state: &RunState, limits: &Limits) -> Vec<String> {
    let mut errors = Vec::new();
    let plan_len = state.plan_len();

    if let Some(plan) = &state.plan {
        errors.extend(validate_plan_shape(plan));
    } else {
        if state.current_step != 0 || !state.history.is_empty() {
            errors.push("execution recorded without a plan".to_string());
        }
        if matches!(state.status, RunStatus::Executing | RunStatus::Verifying) {
            errors.push(format!("status {} requires a plan", state.status.as_str()));
        }
    }

    if state.plan.is_some() && state.status == RunStatus::Planning {
        errors.push("planned run is still in status planning".to_string());
    }
    match (state.status, state.verification.is_some()) {
        (RunStatus::Planning | RunStatus::Executing, true) => errors.push(format!(
            "status {} carries a verification",
            state.status.as_str()
        )),
        (RunStatus::Verifying, false) => {
            errors.push("status verifying has no verification".to_string());
        }
        _ => {}
    }

    if state.current_step > plan_len {
        errors.push(format!(
            "current_step {} exceeds plan length {}",
            state.current_step, plan_len
        ));
    }

    if state.attempts_for_current_step > limits.retry_budget() {
        errors.push(format!(
            "attempts_for_current_step {} exceeds retry budget {}",
            state.attempts_for_current_step,
            limits.retry_budget()
        ));
    }

    let mut previous: Option<(usize, u32)> = None;
    for attempt in &state.history {
        let expected = match previous {
            Some((step, number)) if step == attempt.step_index => number + 1,
            _ => 1,
        };
        if let Some((step, _)) = previous
            && attempt.step_index < step
        {
            errors.push(format!(
                "history goes back from step {} to step {}",
                step, attempt.step_index
            ));
        }
        if attempt.attempt_number != expected {
            errors.push(format!(
                "step {}: attempt {} recorded where {} was expected",
                attempt.step_index, attempt.attempt_number, expected
            ));
        }
        if attempt.step_index >= plan_len {
            errors.push(format!(
                "attempt for step {} outside plan of {} steps",
                attempt.step_index, plan_len
            ));
        }
        previous = Some((attempt.step_index, attempt.attempt_number));
    }

    let resolved: HashSet<usize> = state
        .history
        .iter()
        .filter(|attempt| attempt.outcome == StepOutcome::Success)
        .map(|attempt| attempt.step_index)
        .collect();
    for step in 0..state.current_step.min(plan_len) {
        if !resolved.contains(&step) {
            errors.push(format!("step {} advanced past without a success", step));
        }
    }

    match state.status {
        RunStatus::Failed if state.failure.is_none() => {
            errors.push("failed run has no failure reason".to_string());
        }
        RunStatus::Complete if state.failure.is_some() => {
            errors.push("complete run carries a failure".to_string());
        }
        RunStatus::Complete if state.verification.is_none() => {
            errors.push("complete run has no verification".to_string());
        }
        _ => {}
    }

    errors
}
