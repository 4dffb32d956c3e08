//! Deterministic classification of raw tool results.

use std::sync::LazyLock;

use regex::RegexSet;

use crate::core::types::StepOutcome;

/// Transient-failure markers: connection not established, element not found,
/// timeout, and the generic failure prefix.
const RETRYABLE_MARKERS: &[&str] = &[
    r"(?i)\bis not connected\b",
    r"(?i)\bcould not connect\b",
    r"(?i)\bnot found\b",
    r"(?i)\bno window reference\b",
    r"(?i)\btimed out\b",
    r"(?i)\btimeout\b",
    r"(?i)^\s*error\b",
    r"(?i)\bfailed\b",
];

/// Markers for results where another attempt cannot change the outcome.
const FATAL_MARKERS: &[&str] = &[r"(?i)\bunknown tool\b"];

static BUILTIN_RETRYABLE: LazyLock<RegexSet> =
    LazyLock::new(|| RegexSet::new(RETRYABLE_MARKERS).unwrap());
static BUILTIN_FATAL: LazyLock<RegexSet> = LazyLock::new(|| RegexSet::new(FATAL_MARKERS).unwrap());

/// Maps raw tool text to a [`StepOutcome`].
///
/// The policy is optimistic: text without a known failure marker is a
/// success. Fatal markers win over retryable ones.
#[derive(Debug, Clone)]
pub struct Classifier {
    retryable: RegexSet,
    extra_retryable: Option<RegexSet>,
    fatal: RegexSet,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            retryable: BUILTIN_RETRYABLE.clone(),
            extra_retryable: None,
            fatal: BUILTIN_FATAL.clone(),
        }
    }
}

impl Classifier {
    /// Builtin markers plus extra retryable patterns (regex syntax).
    pub fn with_extra_markers<S: AsRef<str>>(patterns: &[S]) -> Result<Self, regex::Error> {
        let extra_retryable = if patterns.is_empty() {
            None
        } else {
            Some(RegexSet::new(patterns)?)
        };
        Ok(Self {
            extra_retryable,
            ..Self::default()
        })
    }

    pub fn classify(&self, raw_result: &str) -> StepOutcome {
        if self.fatal.is_match(raw_result) {
            return StepOutcome::FatalFailure;
        }
        if self.has_failure_marker(raw_result) {
            return StepOutcome::RetryableFailure;
        }
        StepOutcome::Success
    }

    /// True if the text carries any retryable failure marker.
    pub fn has_failure_marker(&self, raw_result: &str) -> bool {
        self.retryable.is_match(raw_result)
            || self
                .extra_retryable
                .as_ref()
                .is_some_and(|set| set.is_match(raw_result))
    }
}
