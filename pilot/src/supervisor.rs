//! Supervisor: drives a run turn by turn until it reaches a terminal status.
//!
//! Each turn routes from the current state, invokes at most one component
//! (planner, action executor, or verifier), and folds its return value into
//! the state through the transition function. The supervisor is the state's
//! only writer; components see `&RunState` or `&ActionStep`.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::agents::executor::ActionExecutor;
use crate::agents::planner::{Planner, plan_checked};
use crate::agents::verifier::Verifier;
use crate::core::classifier::Classifier;
use crate::core::state::RunState;
use crate::core::transition::{Route, TransitionSummary, TurnEvent, apply_event, begin_turn};
use crate::core::types::{FailureReason, Limits, RunStatus};
use crate::io::tools::ToolRegistry;

/// What one turn did.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnRecord {
    pub turn: u32,
    pub route: Route,
    /// Absent when the turn invoked no component (`Halt`).
    pub summary: Option<TransitionSummary>,
    /// Raw tool text (execute) or verification detail (verify).
    pub result: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl TurnRecord {
    pub fn duration_ms(&self) -> u64 {
        u64::try_from((self.ended_at - self.started_at).num_milliseconds()).unwrap_or(0)
    }
}

pub struct Supervisor<'a, P: Planner + ?Sized, V: Verifier + ?Sized> {
    planner: &'a P,
    verifier: &'a V,
    tools: &'a ToolRegistry,
    classifier: &'a Classifier,
    limits: Limits,
}

impl<'a, P: Planner + ?Sized, V: Verifier + ?Sized> Supervisor<'a, P, V> {
    pub fn new(
        planner: &'a P,
        verifier: &'a V,
        tools: &'a ToolRegistry,
        classifier: &'a Classifier,
        limits: Limits,
    ) -> Self {
        Self {
            planner,
            verifier,
            tools,
            classifier,
            limits,
        }
    }

    /// Run one turn. Errors only on a transition bug; component failures are
    /// part of the state.
    pub fn run_turn(&self, state: &mut RunState) -> Result<TurnRecord> {
        let started_at = Utc::now();
        let route = begin_turn(state, &self.limits);
        let turn = state.iteration_count;
        debug!(turn, route = route.as_str(), "routed");

        let (event, result) = match route {
            Route::Halt => {
                if let Some(failure) = &state.failure
                    && failure.reason == FailureReason::IterationCeilingExceeded
                {
                    warn!(turn, max_iterations = self.limits.max_iterations, "iteration ceiling exceeded");
                }
                return Ok(TurnRecord {
                    turn,
                    route,
                    summary: None,
                    result: None,
                    started_at,
                    ended_at: Utc::now(),
                });
            }
            Route::Plan => {
                let event = match plan_checked(self.planner, &state.command, self.tools) {
                    Ok(plan) => TurnEvent::Planned(plan),
                    Err(err) => {
                        warn!(err = %err, "planning failed");
                        TurnEvent::PlanningFailed(err.to_string())
                    }
                };
                (event, None)
            }
            Route::Execute {
                step_index,
                attempt_number,
            } => {
                let step = state
                    .plan
                    .as_ref()
                    .and_then(|plan| plan.steps.get(step_index))
                    .ok_or_else(|| anyhow!("turn {turn}: no step {step_index} in plan"))?;
                let raw = ActionExecutor::new(self.tools).execute(step, attempt_number);
                let outcome = self.classifier.classify(&raw.raw_result);
                debug!(step_index, attempt_number, outcome = outcome.as_str(), "attempt classified");
                let text = raw.raw_result.clone();
                (TurnEvent::Attempted(raw.classified(outcome)), Some(text))
            }
            Route::Verify => {
                let verification = self.verifier.verify(state, self.tools.read_only());
                debug!(outcome = verification.outcome.as_str(), "verification recorded");
                let detail = verification.detail.clone();
                (TurnEvent::Verified(verification), Some(detail))
            }
            Route::Finish => (TurnEvent::Finished, None),
        };

        let summary = apply_event(state, route, event, &self.limits)
            .map_err(|err| anyhow!("turn {turn}: {err}"))?;
        if let Some(reason) = summary.failure
            && reason != FailureReason::PlanningError
        {
            warn!(
                turn,
                reason = reason.as_str(),
                step = ?state.failure.as_ref().and_then(|f| f.step_index),
                "execution aborted; verifying before failing"
            );
        }
        debug!(
            turn,
            status = summary.status.as_str(),
            advanced = summary.advanced,
            retry = summary.retry_scheduled,
            "transition applied"
        );

        Ok(TurnRecord {
            turn,
            route,
            summary: Some(summary),
            result,
            started_at,
            ended_at: Utc::now(),
        })
    }

    /// Run turns until the state is terminal, calling `on_turn` after each.
    ///
    /// Terminates: every non-terminal turn increments `iteration_count`, and the
    /// ceiling fails the run.
    pub fn run_to_completion<F>(&self, state: &mut RunState, mut on_turn: F) -> Result<()>
    where
        F: FnMut(&RunState, &TurnRecord) -> Result<()>,
    {
        info!(run_id = %state.run_id, from_turn = state.iteration_count, "run started");
        while !state.is_terminal() {
            let record = self.run_turn(state)?;
            on_turn(state, &record)?;
        }
        match state.status {
            RunStatus::Complete => info!(
                run_id = %state.run_id,
                turns = state.iteration_count,
                attempts = state.history.len(),
                "run complete"
            ),
            _ => info!(
                run_id = %state.run_id,
                turns = state.iteration_count,
                reason = state.failure.as_ref().map_or("unknown", |f| f.reason.as_str()),
                "run failed"
            ),
        }
        Ok(())
    }
}
