//! I/O helpers for pilot commands.

pub mod codex;
pub mod config;
pub mod paths;
pub mod process;
pub mod prompt;
pub mod run_state;
pub mod tools;
pub mod turn_log;
