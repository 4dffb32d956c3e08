//! Orchestration for `pilot init`, `run`, `resume` and `replay`.
//!
//! A run lives in `.pilot/runs/<run_id>/`. Its checkpoint is written before
//! the first turn and after every turn, so `resume` continues from the last
//! completed turn.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, info};

use crate::agents::planner::{CodexPlanner, PlanFilePlanner, Planner};
use crate::agents::verifier::{CheckVerifier, Verifier};
use crate::core::invariants::validate_state;
use crate::core::replay::{divergences, replay};
use crate::core::state::RunState;
use crate::core::transition::Route;
use crate::core::types::{Command, RunStatus};
use crate::io::codex::CodexBackend;
use crate::io::config::{PilotConfig, PlannerKind, load_config, write_config};
use crate::io::paths::{PilotPaths, RunPaths, new_run_id, validate_id};
use crate::io::run_state::{load_run_state, write_run_state};
use crate::io::tools::ToolRegistry;
use crate::io::turn_log::{TurnMeta, write_turn};
use crate::report::RunReport;
use crate::supervisor::{Supervisor, TurnRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOutcome {
    pub config_path: PathBuf,
    /// False when an existing config was kept.
    pub wrote_config: bool,
}

/// Create `.pilot/` with a default config. Existing config is kept unless `force`.
pub fn init_project(root: &Path, force: bool) -> Result<InitOutcome> {
    let paths = PilotPaths::new(root);
    fs::create_dir_all(&paths.pilot_dir)
        .with_context(|| format!("create {}", paths.pilot_dir.display()))?;

    let wrote_config = force || !paths.config_path.exists();
    if wrote_config {
        write_config(&paths.config_path, &PilotConfig::default())?;
        info!(path = %paths.config_path.display(), "wrote default config");
    }
    ensure_gitignore(&paths.pilot_dir.join(".gitignore"))?;
    Ok(InitOutcome {
        config_path: paths.config_path,
        wrote_config,
    })
}

fn ensure_gitignore(path: &Path) -> Result<()> {
    const REQUIRED: &str = "runs/";

    let existing = if path.exists() {
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?
    } else {
        String::new()
    };
    if existing.lines().any(|line| line.trim() == REQUIRED) {
        return Ok(());
    }
    let mut out = existing;
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(REQUIRED);
    out.push('\n');
    fs::write(path, out).with_context(|| format!("write {}", path.display()))
}

/// Final state of a run and where its record lives.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_dir: PathBuf,
    pub state: RunState,
}

impl RunOutcome {
    pub fn report(&self) -> RunReport {
        RunReport::from_state(&self.state)
    }
}

/// Start a new run for `command` and drive it to a terminal status.
///
/// `plan_file` overrides the configured planner with a plan document on disk.
pub fn start_run(root: &Path, command: &str, plan_file: Option<&Path>) -> Result<RunOutcome> {
    let paths = PilotPaths::new(root);
    let config = load_config(&paths.config_path)?;
    let registry = ToolRegistry::from_config(&config.tools)?;

    let run_id = new_run_id();
    let run = paths.run(&run_id);
    let mut state = RunState::new(run_id, Command::new(command));
    write_run_state(&run.state_path, &state)?;
    info!(run_id = %state.run_id, dir = %run.dir.display(), "run created");

    drive_with_config(root, &config, &registry, &run, plan_file, &mut state)?;
    Ok(RunOutcome {
        run_dir: run.dir,
        state,
    })
}

/// Continue a checkpointed run. A terminal run is returned unchanged.
pub fn resume_run(root: &Path, run_id: &str, plan_file: Option<&Path>) -> Result<RunOutcome> {
    validate_id(run_id)?;
    let paths = PilotPaths::new(root);
    let run = paths.run(run_id);
    if !run.state_path.exists() {
        bail!("no checkpoint for run {run_id} at {}", run.state_path.display());
    }
    let mut state = load_run_state(&run.state_path)?;
    if state.run_id != run_id {
        bail!(
            "checkpoint {} belongs to run {}",
            run.state_path.display(),
            state.run_id
        );
    }

    let config = load_config(&paths.config_path)?;
    let problems = validate_state(&state, &config.limits);
    if !problems.is_empty() {
        bail!(
            "checkpoint {} is inconsistent:\n- {}",
            run.state_path.display(),
            problems.join("\n- ")
        );
    }

    if state.is_terminal() {
        info!(run_id, status = state.status.as_str(), "run already finished");
    } else {
        let registry = ToolRegistry::from_config(&config.tools)?;
        drive_with_config(root, &config, &registry, &run, plan_file, &mut state)?;
    }
    Ok(RunOutcome {
        run_dir: run.dir,
        state,
    })
}

fn drive_with_config(
    root: &Path,
    config: &PilotConfig,
    registry: &ToolRegistry,
    run: &RunPaths,
    plan_file: Option<&Path>,
    state: &mut RunState,
) -> Result<()> {
    let classifier = config.classifier.build()?;
    let planner = build_planner(root, config, registry, run, plan_file)?;
    let verifier = CheckVerifier::new(classifier.clone());
    let supervisor = Supervisor::new(
        &*planner,
        &verifier,
        registry,
        &classifier,
        config.limits,
    );
    drive_run(&supervisor, run, state)
}

fn build_planner(
    root: &Path,
    config: &PilotConfig,
    registry: &ToolRegistry,
    run: &RunPaths,
    plan_file: Option<&Path>,
) -> Result<Box<dyn Planner>> {
    if let Some(path) = plan_file {
        debug!(path = %path.display(), "planning from plan file");
        return Ok(Box::new(PlanFilePlanner::new(path)));
    }
    match config.planner.kind {
        PlannerKind::File => {
            let path = config
                .planner
                .plan_file
                .as_ref()
                .context("planner.kind = \"file\" requires planner.plan_file")?;
            Ok(Box::new(PlanFilePlanner::new(root.join(path))))
        }
        PlannerKind::Codex => Ok(Box::new(CodexPlanner::new(
            CodexBackend::new(config.planner.program.as_str()),
            registry.specs(),
            root,
            run,
            &config.planner,
        ))),
    }
}

/// Drive `state` to a terminal status, logging each turn and checkpointing
/// after it.
pub fn drive_run<P: Planner + ?Sized, V: Verifier + ?Sized>(
    supervisor: &Supervisor<'_, P, V>,
    run: &RunPaths,
    state: &mut RunState,
) -> Result<()> {
    supervisor.run_to_completion(state, |state, record| {
        write_turn(
            &run.turns_dir,
            &turn_meta(state, record),
            record.result.as_deref(),
        )?;
        write_run_state(&run.state_path, state)
    })
}

fn turn_meta(state: &RunState, record: &TurnRecord) -> TurnMeta {
    let (step_index, attempt_number, outcome) = match record.route {
        Route::Execute {
            step_index,
            attempt_number,
        } => (
            Some(step_index),
            Some(attempt_number),
            state.last_attempt().map(|attempt| attempt.outcome),
        ),
        _ => (None, None, None),
    };
    let verification = match record.route {
        Route::Verify => state.verification.as_ref().map(|v| v.outcome),
        _ => None,
    };
    TurnMeta {
        run_id: state.run_id.clone(),
        turn: record.turn,
        route: record.route.as_str().to_string(),
        status: state.status,
        step_index,
        attempt_number,
        outcome,
        verification,
        started_at: Some(record.started_at.to_rfc3339()),
        ended_at: Some(record.ended_at.to_rfc3339()),
        duration_ms: Some(record.duration_ms()),
    }
}

/// Result of re-applying a recorded run through the transition function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayOutcome {
    pub run_id: String,
    pub recorded: RunStatus,
    pub replayed: RunStatus,
    pub divergences: Vec<String>,
}

impl ReplayOutcome {
    pub fn is_faithful(&self) -> bool {
        self.divergences.is_empty()
    }
}

/// Replay a checkpointed run and compare the result with the checkpoint.
pub fn replay_run(root: &Path, run_id: &str) -> Result<ReplayOutcome> {
    validate_id(run_id)?;
    let paths = PilotPaths::new(root);
    let run = paths.run(run_id);
    let recorded = load_run_state(&run.state_path)?;
    let config = load_config(&paths.config_path)?;
    let replayed =
        replay(&recorded, &config.limits).map_err(|err| anyhow!("replay {run_id}: {err}"))?;
    let divergences = divergences(&recorded, &replayed);
    debug!(run_id, divergences = divergences.len(), "replay finished");
    Ok(ReplayOutcome {
        run_id: run_id.to_string(),
        recorded: recorded.status,
        replayed: replayed.status,
        divergences,
    })
}
