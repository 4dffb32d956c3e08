//! Action executor: one tool call per turn.

use tracing::{debug, instrument};

use crate::core::types::{ActionStep, RawAttempt};
use crate::io::tools::ToolRegistry;

/// Invokes the tool named by a step with the step's arguments.
#[derive(Clone, Copy)]
pub struct ActionExecutor<'a> {
    registry: &'a ToolRegistry,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(registry: &'a ToolRegistry) -> Self {
        Self { registry }
    }

    /// Exactly one invocation. Registry errors become `Error: <message>`
    /// result text and are classified like any other result.
    #[instrument(skip_all, fields(step = step.index, attempt = attempt_number, tool = %step.tool_name))]
    pub fn execute(&self, step: &ActionStep, attempt_number: u32) -> RawAttempt {
        let raw_result = match self.registry.invoke(&step.tool_name, &step.arguments) {
            Ok(text) => text,
            Err(err) => format!("Error: {err}"),
        };
        debug!(bytes = raw_result.len(), "tool returned");
        RawAttempt {
            step_index: step.index,
            attempt_number,
            raw_result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedTool, step};
    use serde_json::json;

    #[test]
    fn passes_step_arguments_and_keeps_text() {
        let tool = ScriptedTool::new("type_text").respond("Typed 'hello'");
        let calls = tool.calls();
        let mut registry = ToolRegistry::new();
        registry.register(tool).expect("register");

        let mut action = step(1, "type_text");
        action.arguments.insert("text".to_string(), json!("hello"));
        let attempt = ActionExecutor::new(&registry).execute(&action, 2);

        assert_eq!(
            attempt,
            RawAttempt {
                step_index: 1,
                attempt_number: 2,
                raw_result: "Typed 'hello'".to_string(),
            }
        );
        assert_eq!(calls.borrow().len(), 1);
        assert_eq!(calls.borrow()[0].get("text"), Some(&json!("hello")));
    }

    #[test]
    fn registry_error_becomes_error_text() {
        let registry = ToolRegistry::new();
        let attempt = ActionExecutor::new(&registry).execute(&step(0, "fly_to_moon"), 1);
        assert_eq!(attempt.raw_result, "Error: unknown tool 'fly_to_moon'");
    }
}
