//! End-to-end supervisor scenarios driven through the public API.
//!
//! Tools, planners and verifiers are scripted; the supervisor, transition
//! function, classifier and persistence are the real ones.

use pilot::agents::verifier::CheckVerifier;
use pilot::core::classifier::Classifier;
use pilot::core::invariants::validate_state;
use pilot::core::replay::{divergences, replay};
use pilot::core::state::RunState;
use pilot::core::types::{
    Arguments, Command, FailureReason, ITERATION_CEILING, Limits, Plan, PlanningError,
    RunStatus, StepOutcome, Verification, VerificationCheck, VerificationOutcome,
};
use pilot::io::run_state::{load_run_state, write_run_state};
use pilot::io::tools::ToolRegistry;
use pilot::run::drive_run;
use pilot::supervisor::Supervisor;
use pilot::test_support::{
    ScriptedPlanner, ScriptedTool, ScriptedVerifier, TestProject, plan_of, step,
};
use serde_json::{Value, json};

fn args(value: Value) -> Arguments {
    match value {
        Value::Object(map) => map,
        other => panic!("arguments must be an object, got {other}"),
    }
}

fn registry(tools: Vec<ScriptedTool>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for tool in tools {
        registry.register(tool).expect("register tool");
    }
    registry
}

fn run(
    planner: &ScriptedPlanner,
    verifier: &ScriptedVerifier,
    registry: &ToolRegistry,
    limits: Limits,
) -> RunState {
    let classifier = Classifier::default();
    let supervisor = Supervisor::new(planner, verifier, registry, &classifier, limits);
    let mut state = RunState::new("run-test", Command::new("open notepad and type hello"));
    supervisor
        .run_to_completion(&mut state, |_, _| Ok(()))
        .expect("run to completion");
    state
}

fn notepad_plan() -> Plan {
    let mut start = step(0, "start_app");
    start.arguments = args(json!({"app_name": "notepad"}));
    let mut typing = step(1, "type_text");
    typing.arguments = args(json!({"app_name": "notepad", "text": "hello"}));
    plan_of(vec![start, typing])
}

fn inconclusive(detail: &str) -> ScriptedVerifier {
    ScriptedVerifier::new(Verification::new(VerificationOutcome::Inconclusive, detail))
}

/// Scenario A: both steps succeed, the planned check confirms the end state.
#[test]
fn two_successful_steps_complete_with_verification() {
    let start = ScriptedTool::new("start_app").respond("Started 'notepad'.");
    let typing = ScriptedTool::new("type_text").respond("Typed 'hello'.");
    let window = ScriptedTool::new("get_window_info")
        .read_only()
        .respond("*hello - Notepad");
    let tools = registry(vec![start.clone(), typing.clone(), window.clone()]);

    let mut plan = notepad_plan();
    plan.check = Some(VerificationCheck {
        tool_name: "get_window_info".to_string(),
        arguments: args(json!({"app_name": "notepad"})),
        expect: Some("Hello".to_string()),
    });
    let planner = ScriptedPlanner::new(Ok(plan));
    let classifier = Classifier::default();
    let verifier = CheckVerifier::new(classifier.clone());
    let supervisor = Supervisor::new(&planner, &verifier, &tools, &classifier, Limits::default());

    let mut state = RunState::new("run-a", Command::new("open notepad and type hello"));
    supervisor
        .run_to_completion(&mut state, |_, _| Ok(()))
        .expect("run");

    assert_eq!(state.status, RunStatus::Complete);
    assert_eq!(state.history.len(), 2);
    assert!(
        state
            .history
            .iter()
            .all(|attempt| attempt.outcome == StepOutcome::Success)
    );
    let verification = state.verification.expect("verification");
    assert_eq!(verification.outcome, VerificationOutcome::Confirmed);
    assert_eq!(verification.detail, "*hello - Notepad");
    assert_eq!(typing.calls().borrow()[0]["text"], "hello");
    assert_eq!(window.call_count(), 1);
    start.assert_drained();
    typing.assert_drained();
}

/// Scenario B: two transient failures, then success on the third attempt.
#[test]
fn transient_failures_retry_then_advance() {
    let start = ScriptedTool::new("start_app")
        .respond_times("Control not found: Edit1", 2)
        .respond("Started 'notepad'.");
    let typing = ScriptedTool::new("type_text").respond("Typed 'hello'.");
    let tools = registry(vec![start.clone(), typing.clone()]);
    let planner = ScriptedPlanner::new(Ok(notepad_plan()));
    let verifier = inconclusive("no check");

    let state = run(&planner, &verifier, &tools, Limits::default());

    assert_eq!(state.status, RunStatus::Complete);
    let step_a: Vec<(u32, StepOutcome)> = state
        .attempts_for(0)
        .map(|attempt| (attempt.attempt_number, attempt.outcome))
        .collect();
    assert_eq!(
        step_a,
        vec![
            (1, StepOutcome::RetryableFailure),
            (2, StepOutcome::RetryableFailure),
            (3, StepOutcome::Success),
        ]
    );
    assert_eq!(state.attempts_for(1).count(), 1);
    assert_eq!(state.current_step, 2);
    start.assert_drained();
}

/// Scenario C: a step fails three times; later steps are skipped and the
/// verifier still runs exactly once.
#[test]
fn exhausted_retries_fail_after_one_verification() {
    let start = ScriptedTool::new("start_app").respond_times("Error: window not found", 3);
    let typing = ScriptedTool::new("type_text");
    let tools = registry(vec![start.clone(), typing.clone()]);
    let planner = ScriptedPlanner::new(Ok(notepad_plan()));
    let verifier = inconclusive("nothing to observe");

    let state = run(&planner, &verifier, &tools, Limits::default());

    assert_eq!(state.status, RunStatus::Failed);
    let failure = state.failure.as_ref().expect("failure");
    assert_eq!(failure.reason, FailureReason::StepRetriesExhausted);
    assert_eq!(failure.step_index, Some(0));
    assert_eq!(state.history.len(), 3);
    assert_eq!(verifier.calls(), 1);
    assert_eq!(typing.call_count(), 0);
    assert!(state.verification.is_some());
    start.assert_drained();
}

/// Scenario D: an empty plan fails planning before anything runs.
#[test]
fn empty_plan_is_a_planning_error() {
    let planner = ScriptedPlanner::new(Ok(plan_of(Vec::new())));
    let verifier = inconclusive("unused");
    let tools = registry(vec![ScriptedTool::new("start_app")]);

    let state = run(&planner, &verifier, &tools, Limits::default());

    assert_eq!(state.status, RunStatus::Failed);
    let failure = state.failure.expect("failure");
    assert_eq!(failure.reason, FailureReason::PlanningError);
    assert_eq!(failure.detail, PlanningError::EmptyPlan.to_string());
    assert!(state.history.is_empty());
    assert!(state.verification.is_none());
    assert_eq!(verifier.calls(), 0);
}

/// Scenario E: an inconclusive verification still completes the run.
#[test]
fn inconclusive_verification_completes_with_detail() {
    let tools = registry(vec![
        ScriptedTool::new("start_app").respond("Started 'notepad'."),
        ScriptedTool::new("type_text").respond("Typed 'hello'."),
    ]);
    let planner = ScriptedPlanner::new(Ok(notepad_plan()));
    let verifier = inconclusive("target control not found: Edit1");

    let state = run(&planner, &verifier, &tools, Limits::default());

    assert_eq!(state.status, RunStatus::Complete);
    let verification = state.verification.expect("verification");
    assert_eq!(verification.outcome, VerificationOutcome::Inconclusive);
    assert_eq!(verification.detail, "target control not found: Edit1");
}

#[test]
fn fatal_step_failure_skips_remaining_steps() {
    let start = ScriptedTool::new("start_app").respond("unknown tool 'launch'");
    let typing = ScriptedTool::new("type_text");
    let tools = registry(vec![start, typing.clone()]);
    let planner = ScriptedPlanner::new(Ok(notepad_plan()));
    let verifier = inconclusive("n/a");

    let state = run(&planner, &verifier, &tools, Limits::default());

    assert_eq!(state.status, RunStatus::Failed);
    assert_eq!(
        state.failure.as_ref().map(|f| f.reason),
        Some(FailureReason::FatalStepFailure)
    );
    assert_eq!(state.history.len(), 1);
    assert_eq!(typing.call_count(), 0);
    assert_eq!(verifier.calls(), 1);
}

/// A 30-step plan needs 33 turns; turn 31 trips the ceiling mid-execution.
#[test]
fn iteration_ceiling_fails_long_plans() {
    let steps = (0..30).map(|index| step(index, "noop")).collect();
    let planner = ScriptedPlanner::new(Ok(plan_of(steps)));
    let verifier = inconclusive("unused");
    let noop = ScriptedTool::new("noop").otherwise("ok");
    let tools = registry(vec![noop.clone()]);

    let state = run(&planner, &verifier, &tools, Limits::default());

    assert_eq!(state.status, RunStatus::Failed);
    let failure = state.failure.as_ref().expect("failure");
    assert_eq!(failure.reason, FailureReason::IterationCeilingExceeded);
    assert_eq!(failure.step_index, Some(29));
    assert_eq!(state.iteration_count, ITERATION_CEILING + 1);
    assert_eq!(state.history.len(), 29);
    assert_eq!(noop.call_count(), 29);
    assert_eq!(verifier.calls(), 0);
}

#[test]
fn replay_reproduces_recorded_runs() {
    let tools = registry(vec![
        ScriptedTool::new("start_app")
            .respond("Control not found: Edit1")
            .respond("Started 'notepad'."),
        ScriptedTool::new("type_text").respond_times("timed out", 3),
    ]);
    let planner = ScriptedPlanner::new(Ok(notepad_plan()));
    let verifier = inconclusive("no check");
    let recorded = run(&planner, &verifier, &tools, Limits::default());
    assert_eq!(recorded.status, RunStatus::Failed);

    let replayed = replay(&recorded, &Limits::default()).expect("replay");
    assert!(divergences(&recorded, &replayed).is_empty());
    assert_eq!(replayed, recorded);
}

/// Stopping after any turn and resuming from the checkpoint ends in the same
/// state as an uninterrupted run.
#[test]
fn resumed_run_matches_uninterrupted_run() {
    let script = || {
        registry(vec![
            ScriptedTool::new("start_app")
                .respond("Could not connect to 'notepad'")
                .respond("Started 'notepad'."),
            ScriptedTool::new("type_text").respond("Typed 'hello'."),
        ])
    };
    let planner = ScriptedPlanner::new(Ok(notepad_plan()));
    let verifier = inconclusive("no check");
    let classifier = Classifier::default();
    let limits = Limits::default();

    let tools = script();
    let expected = run(&planner, &verifier, &tools, limits);
    // plan, two start_app attempts, type_text, verify, finish
    assert_eq!(expected.iteration_count, 6);

    for stop_after in 1..expected.iteration_count {
        let project = TestProject::new().expect("project");
        let run_paths = project.paths().run("run-test");
        let tools = script();
        let first = Supervisor::new(&planner, &verifier, &tools, &classifier, limits);
        let mut state = RunState::new("run-test", Command::new("open notepad and type hello"));
        for _ in 0..stop_after {
            first.run_turn(&mut state).expect("turn");
        }
        write_run_state(&run_paths.state_path, &state).expect("checkpoint");
        assert!(!state.is_terminal(), "terminal after {stop_after} turns");

        let mut resumed = load_run_state(&run_paths.state_path).expect("load checkpoint");
        assert!(validate_state(&resumed, &limits).is_empty());
        let second = Supervisor::new(&planner, &verifier, &tools, &classifier, limits);
        drive_run(&second, &run_paths, &mut resumed).expect("resume");

        assert_eq!(resumed, expected, "resumed after {stop_after} turns");
        assert_eq!(
            load_run_state(&run_paths.state_path).expect("final checkpoint"),
            expected
        );
        let next_turn = run_paths.turns_dir.join((stop_after + 1).to_string());
        assert!(next_turn.join("meta.json").exists());
        assert!(!run_paths.turns_dir.join(stop_after.to_string()).exists());
    }
}

const STEP_RESULTS: &[&str] = &[
    "ok",
    "Typed 'hello'.",
    "Control not found: Edit1",
    "Could not connect to 'notepad'",
    "timed out",
    "Error: window missing",
    "unknown tool 'launch'",
];

/// Deterministic generator for scripted run shapes.
struct Lcg(u64);

impl Lcg {
    fn below(&mut self, bound: usize) -> usize {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.0 >> 33) as usize) % bound
    }
}

/// Every checkpoint a run passes through is consistent: the step cursor never
/// moves back, attempts stay within the retry budget, the turn count stops at
/// the ceiling, and the verifier runs at most once.
#[test]
fn every_turn_keeps_state_invariants() {
    let mut rng = Lcg(0x5eed);
    let limits = Limits::default();
    let classifier = Classifier::default();

    for case in 0..200 {
        let plan_len = [1, 2, 3, 4, 7, 15, 30][rng.below(7)];
        let mut tools = Vec::new();
        let mut steps = Vec::new();
        for index in 0..plan_len {
            let name = format!("tool_{index}");
            let scripted = (0..rng.below(4)).fold(ScriptedTool::new(&name), |tool, _| {
                tool.respond(STEP_RESULTS[rng.below(STEP_RESULTS.len())])
            });
            tools.push(scripted.otherwise("ok"));
            steps.push(step(index, &name));
        }
        let tools = registry(tools);
        let planner = ScriptedPlanner::new(Ok(plan_of(steps)));
        let verifier = inconclusive("no check");
        let supervisor = Supervisor::new(&planner, &verifier, &tools, &classifier, limits);

        let mut state = RunState::new("run-invariants", Command::new("do things"));
        let mut last_step = 0;
        supervisor
            .run_to_completion(&mut state, |state, record| {
                assert!(
                    state.current_step >= last_step,
                    "case {case} turn {}: current_step went back",
                    record.turn
                );
                last_step = state.current_step;
                assert!(state.attempts_for_current_step <= 2, "case {case}");
                assert!(state.iteration_count <= ITERATION_CEILING + 1, "case {case}");
                assert_eq!(validate_state(state, &limits), Vec::<String>::new(), "case {case}");
                assert!(verifier.calls() <= 1, "case {case}");
                Ok(())
            })
            .expect("run to completion");

        assert!(state.is_terminal(), "case {case} ended in {:?}", state.status);
        assert!(validate_state(&state, &limits).is_empty(), "case {case}");
    }
}
