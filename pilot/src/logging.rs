//! Diagnostic tracing for pilot.
//!
//! Tracing goes to stderr and is filtered by `RUST_LOG`; it is not part of a
//! run's record. The record lives in `.pilot/runs/<run_id>/` (checkpoint plus
//! `turns/<n>/` logs, see `io/turn_log`) and is written regardless of the
//! filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset.
fn default_directive(verbose: bool) -> &'static str {
    if verbose { "warn,pilot=info" } else { "warn" }
}

/// Install the stderr subscriber (compact format).
///
/// `RUST_LOG` wins over `verbose`:
/// ```bash
/// RUST_LOG=pilot=debug pilot run "open notepad and type hello"
/// ```
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_raises_only_pilot_targets() {
        assert_eq!(default_directive(false), "warn");
        assert_eq!(default_directive(true), "warn,pilot=info");
    }
}
