//! Deterministic replay of a recorded run.
//!
//! A checkpoint holds every component return value the supervisor folded in:
//! the plan (or the planning failure), the attempts in order, and the
//! verification. Feeding them back through [`begin_turn`]/[`apply_event`]
//! must reproduce the recorded state.

use crate::core::state::RunState;
use crate::core::transition::{Route, TurnEvent, apply_event, begin_turn, route};
use crate::core::types::{FailureReason, Limits};

/// Rebuild a run from the events recorded in `recorded`.
///
/// Stops at a terminal status, or where the recording has no event for the
/// next route (a run checkpointed mid-flight).
pub fn replay(recorded: &RunState, limits: &Limits) -> Result<RunState, String> {
    let mut state = RunState::new(recorded.run_id.clone(), recorded.command.clone());
    let mut attempts = recorded.history.iter();

    loop {
        let next = route(&state);
        let event = match next {
            Route::Halt => break,
            Route::Plan => match (&recorded.plan, &recorded.failure) {
                (Some(plan), _) => Some(TurnEvent::Planned(plan.clone())),
                (None, Some(failure)) if failure.reason == FailureReason::PlanningError => {
                    Some(TurnEvent::PlanningFailed(failure.detail.clone()))
                }
                _ => None,
            },
            Route::Execute { .. } => attempts.next().cloned().map(TurnEvent::Attempted),
            Route::Verify => recorded.verification.clone().map(TurnEvent::Verified),
            Route::Finish => recorded.is_terminal().then_some(TurnEvent::Finished),
        };

        let Some(event) = event else {
            // A recorded turn without an event can only be the ceiling trip.
            if state.iteration_count < recorded.iteration_count
                && begin_turn(&mut state, limits) != Route::Halt
            {
                return Err(format!(
                    "turn {} has no recorded event for route {}",
                    state.iteration_count,
                    next.as_str()
                ));
            }
            break;
        };

        let turn = begin_turn(&mut state, limits);
        if turn == Route::Halt {
            break;
        }
        apply_event(&mut state, turn, event, limits)
            .map_err(|err| format!("turn {}: {}", state.iteration_count, err))?;
    }

    Ok(state)
}

/// Fields where a replayed state differs from the recording.
pub fn divergences(recorded: &RunState, replayed: &RunState) -> Vec<String> {
    let mut diffs = Vec::new();
    if recorded.status != replayed.status {
        diffs.push(format!(
            "status: recorded {}, replayed {}",
            recorded.status.as_str(),
            replayed.status.as_str()
        ));
    }
    if recorded.failure != replayed.failure {
        diffs.push(format!(
            "failure: recorded {:?}, replayed {:?}",
            recorded.failure.as_ref().map(|f| f.reason),
            replayed.failure.as_ref().map(|f| f.reason)
        ));
    }
    if recorded.current_step != replayed.current_step {
        diffs.push(format!(
            "current_step: recorded {}, replayed {}",
            recorded.current_step, replayed.current_step
        ));
    }
    if recorded.attempts_for_current_step != replayed.attempts_for_current_step {
        diffs.push(format!(
            "attempts_for_current_step: recorded {}, replayed {}",
            recorded.attempts_for_current_step, replayed.attempts_for_current_step
        ));
    }
    if recorded.history.len() != replayed.history.len() {
        diffs.push(format!(
            "history: recorded {} attempts, replayed {}",
            recorded.history.len(),
            replayed.history.len()
        ));
    }
    if recorded.iteration_count != replayed.iteration_count {
        diffs.push(format!(
            "iteration_count: recorded {}, replayed {}",
            recorded.iteration_count, replayed.iteration_count
        ));
    }
    if recorded.verification != replayed.verification {
        diffs.push("verification differs".to_string());
    }
    diffs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{
        Command, RunFailure, RunStatus, StepOutcome, Verification, VerificationOutcome,
    };
    use crate::test_support::{attempt, plan_of, step};

    fn drive(state: &mut RunState, limits: &Limits, events: Vec<TurnEvent>) {
        for event in events {
            let turn = begin_turn(state, limits);
            if turn == Route::Halt {
                return;
            }
            apply_event(state, turn, event, limits).expect("event applied");
        }
    }

    #[test]
    fn replay_reproduces_completed_run() {
        let limits = Limits::default();
        let mut recorded = RunState::new("run-1", Command::new("open notepad and type hello"));
        drive(
            &mut recorded,
            &limits,
            vec![
                TurnEvent::Planned(plan_of(vec![step(0, "start_app"), step(1, "type_text")])),
                TurnEvent::Attempted(attempt(0, 1, "ok", StepOutcome::Success)),
                TurnEvent::Attempted(attempt(1, 1, "timed out", StepOutcome::RetryableFailure)),
                TurnEvent::Attempted(attempt(1, 2, "typed", StepOutcome::Success)),
                TurnEvent::Verified(Verification::new(VerificationOutcome::Confirmed, "hello")),
                TurnEvent::Finished,
            ],
        );
        assert_eq!(recorded.status, RunStatus::Complete);

        let replayed = replay(&recorded, &limits).expect("replay");
        assert_eq!(replayed, recorded);
        assert!(divergences(&recorded, &replayed).is_empty());
    }

    #[test]
    fn replay_reproduces_planning_failure() {
        let mut recorded = RunState::new("run-1", Command::new("x"));
        recorded.iteration_count = 1;
        recorded.status = RunStatus::Failed;
        recorded.failure = Some(RunFailure {
            reason: FailureReason::PlanningError,
            detail: "planner returned an empty plan".to_string(),
            step_index: None,
        });

        let replayed = replay(&recorded, &Limits::default()).expect("replay");
        assert_eq!(replayed, recorded);
    }

    #[test]
    fn replay_reproduces_ceiling_trip() {
        let limits = Limits {
            max_iterations: 3,
            ..Limits::default()
        };
        let mut recorded = RunState::new("run-1", Command::new("x"));
        drive(
            &mut recorded,
            &limits,
            vec![
                TurnEvent::Planned(plan_of(vec![step(0, "a")])),
                TurnEvent::Attempted(attempt(0, 1, "timed out", StepOutcome::RetryableFailure)),
                TurnEvent::Attempted(attempt(0, 2, "timed out", StepOutcome::RetryableFailure)),
            ],
        );
        assert_eq!(begin_turn(&mut recorded, &limits), Route::Halt);
        assert_eq!(recorded.status, RunStatus::Failed);

        let replayed = replay(&recorded, &limits).expect("replay");
        assert_eq!(replayed, recorded);
    }

    #[test]
    fn replay_stops_at_mid_flight_checkpoint() {
        let limits = Limits::default();
        let mut recorded = RunState::new("run-1", Command::new("x"));
        drive(
            &mut recorded,
            &limits,
            vec![
                TurnEvent::Planned(plan_of(vec![step(0, "a"), step(1, "b")])),
                TurnEvent::Attempted(attempt(0, 1, "ok", StepOutcome::Success)),
            ],
        );

        let replayed = replay(&recorded, &limits).expect("replay");
        assert_eq!(replayed, recorded);
        assert_eq!(replayed.status, RunStatus::Executing);
    }

    #[test]
    fn tampered_history_diverges() {
        let limits = Limits::default();
        let mut recorded = RunState::new("run-1", Command::new("x"));
        drive(
            &mut recorded,
            &limits,
            vec![
                TurnEvent::Planned(plan_of(vec![step(0, "a")])),
                TurnEvent::Attempted(attempt(0, 1, "ok", StepOutcome::Success)),
                TurnEvent::Verified(Verification::new(VerificationOutcome::Confirmed, "ok")),
                TurnEvent::Finished,
            ],
        );
        recorded.status = RunStatus::Failed;

        let replayed = replay(&recorded, &limits).expect("replay");
        let diffs = divergences(&recorded, &replayed);
        assert!(diffs.iter().any(|d| d.starts_with("status:")));
    }
}
