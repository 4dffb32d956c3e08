//! Deterministic command-to-action automation runner.
//!
//! A natural-language command is planned into an ordered list of tool steps,
//! each step is executed with bounded retries, and the end state is checked
//! once. A single supervisor owns the run state and drives it through a
//! closed routing table:
//!
//! - **[`core`]**: Pure, deterministic logic (types, routing, transitions,
//!   classification, invariants, replay). No I/O.
//! - **[`io`]**: Side effects (config, tool processes, checkpoints, turn logs,
//!   the planner backend).
//! - **[`agents`]**: The collaborators a turn invokes: planner, action
//!   executor, verifier.
//!
//! [`supervisor`] runs turns; [`run`] wires config, tools and persistence
//! into the CLI commands; [`report`] renders the outcome.

pub mod agents;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod report;
pub mod run;
pub mod supervisor;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
