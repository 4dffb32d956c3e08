//! `pilot` CLI: plan, execute and verify a desktop command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use pilot::exit_codes;
use pilot::io::config::load_config;
use pilot::io::paths::PilotPaths;
use pilot::io::tools::ToolRegistry;
use pilot::logging;
use pilot::run::{RunOutcome, init_project, replay_run, resume_run, start_run};

#[derive(Parser)]
#[command(
    name = "pilot",
    version,
    about = "Deterministic command-to-action automation runner"
)]
struct Cli {
    /// Project root holding `.pilot/`.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    /// Log pilot progress to stderr (`RUST_LOG` overrides).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default `.pilot/config.toml`.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Plan, execute and verify a command.
    Run {
        command: String,
        /// Use this plan document instead of the configured planner.
        #[arg(long)]
        plan_file: Option<PathBuf>,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Continue a checkpointed run.
    Resume {
        run_id: String,
        /// Plan document, if the run has not been planned yet.
        #[arg(long)]
        plan_file: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Re-apply a run's recorded events and compare the outcome.
    Replay { run_id: String },
    /// List configured tools.
    Tools,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let root = cli.root;
    match cli.command {
        Command::Init { force } => cmd_init(&root, force),
        Command::Run {
            command,
            plan_file,
            json,
        } => {
            let outcome = start_run(&root, &command, plan_file.as_deref())?;
            print_outcome(&outcome, json)
        }
        Command::Resume {
            run_id,
            plan_file,
            json,
        } => {
            let outcome = resume_run(&root, &run_id, plan_file.as_deref())?;
            print_outcome(&outcome, json)
        }
        Command::Replay { run_id } => cmd_replay(&root, &run_id),
        Command::Tools => cmd_tools(&root),
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let outcome = init_project(root, force)?;
    if outcome.wrote_config {
        println!("wrote {}", outcome.config_path.display());
    } else {
        println!(
            "kept {} (use --force to overwrite)",
            outcome.config_path.display()
        );
    }
    Ok(exit_codes::OK)
}

fn print_outcome(outcome: &RunOutcome, json: bool) -> Result<i32> {
    let report = outcome.report();
    if json {
        let payload = serde_json::to_string_pretty(&report).context("serialize report")?;
        println!("{payload}");
    } else {
        print!("{}", report.render_text());
        println!("\nrecord: {}", outcome.run_dir.display());
    }
    Ok(report.exit_code())
}

fn cmd_replay(root: &Path, run_id: &str) -> Result<i32> {
    let outcome = replay_run(root, run_id)?;
    println!("recorded: {}", outcome.recorded.as_str());
    println!("replayed: {}", outcome.replayed.as_str());
    if outcome.is_faithful() {
        println!("replay matches checkpoint");
        return Ok(exit_codes::OK);
    }
    for divergence in &outcome.divergences {
        println!("diverged: {divergence}");
    }
    Ok(exit_codes::INVALID)
}

fn cmd_tools(root: &Path) -> Result<i32> {
    let paths = PilotPaths::new(root);
    let config = load_config(&paths.config_path)?;
    let registry = ToolRegistry::from_config(&config.tools)?;
    let width = registry
        .specs()
        .iter()
        .map(|spec| spec.name.len())
        .max()
        .unwrap_or(0);
    for spec in registry.specs() {
        let access = if spec.read_only { "read-only" } else { "acts" };
        println!("{:<width$}  {:<9}  {}", spec.name, access, spec.description);
    }
    Ok(exit_codes::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["pilot", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
        assert_eq!(cli.root, PathBuf::from("."));
    }

    #[test]
    fn parse_run_with_plan_file_and_global_root() {
        let cli = Cli::parse_from([
            "pilot",
            "run",
            "open notepad and type hello",
            "--plan-file",
            "plan.json",
            "--json",
            "--root",
            "/tmp/project",
        ]);
        assert_eq!(cli.root, PathBuf::from("/tmp/project"));
        match cli.command {
            Command::Run {
                command,
                plan_file,
                json,
            } => {
                assert_eq!(command, "open notepad and type hello");
                assert_eq!(plan_file, Some(PathBuf::from("plan.json")));
                assert!(json);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn parse_resume_and_replay() {
        let cli = Cli::parse_from(["pilot", "-v", "resume", "run-20260101_000000-abc123"]);
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Command::Resume { ref run_id, plan_file: None, json: false }
                if run_id == "run-20260101_000000-abc123"
        ));

        let cli = Cli::parse_from(["pilot", "replay", "run-x"]);
        assert!(matches!(cli.command, Command::Replay { ref run_id } if run_id == "run-x"));
    }

    #[test]
    fn run_requires_a_command() {
        assert!(Cli::try_parse_from(["pilot", "run"]).is_err());
    }
}
