//! One-shot verification of a run's end state.

use tracing::{debug, instrument};

use crate::core::classifier::Classifier;
use crate::core::state::RunState;
use crate::core::types::{StepOutcome, Verification, VerificationOutcome};
use crate::io::tools::ReadOnlyTools;

/// Inspects the end state through read-only tools. Runs at most once per run
/// and never fails: anything it cannot observe is `Inconclusive`.
pub trait Verifier {
    fn verify(&self, state: &RunState, tools: ReadOnlyTools<'_>) -> Verification;
}

/// Runs the plan's `check` and compares the result with its `expect` text.
#[derive(Debug, Clone, Default)]
pub struct CheckVerifier {
    classifier: Classifier,
}

impl CheckVerifier {
    pub fn new(classifier: Classifier) -> Self {
        Self { classifier }
    }
}

impl Verifier for CheckVerifier {
    #[instrument(skip_all, fields(run_id = %state.run_id))]
    fn verify(&self, state: &RunState, tools: ReadOnlyTools<'_>) -> Verification {
        let Some(check) = state.plan.as_ref().and_then(|plan| plan.check.as_ref()) else {
            return Verification::new(
                VerificationOutcome::Inconclusive,
                "no verification check planned",
            );
        };
        let text = match tools.invoke(&check.tool_name, &check.arguments) {
            Ok(text) => text,
            Err(err) => {
                debug!(err = %err, "check could not run");
                return Verification::new(VerificationOutcome::Inconclusive, format!("Error: {err}"));
            }
        };
        if self.classifier.classify(&text) != StepOutcome::Success {
            return Verification::new(VerificationOutcome::Inconclusive, text);
        }
        match &check.expect {
            // Case-insensitive substring.
            Some(expected) if !text.to_lowercase().contains(&expected.to_lowercase()) => {
                Verification::new(
                    VerificationOutcome::Failed,
                    format!("expected '{expected}' in: {text}"),
                )
            }
            _ => Verification::new(VerificationOutcome::Confirmed, text),
        }
    }
}
