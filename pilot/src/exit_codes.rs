//! Stable exit codes for pilot CLI commands.

/// Run completed (verification may still be inconclusive).
pub const OK: i32 = 0;
/// Invalid usage, config, or checkpoint; or any infrastructure error.
pub const INVALID: i32 = 1;
/// The command could not be turned into an executable plan.
pub const PLANNING_FAILED: i32 = 2;
/// A step exhausted its retries or failed fatally.
pub const STEP_FAILED: i32 = 3;
/// The run hit the iteration ceiling.
pub const CEILING_EXCEEDED: i32 = 4;
