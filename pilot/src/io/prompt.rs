//! Planner prompt rendering.

use anyhow::Result;
use minijinja::{Environment, context};

use crate::core::types::Command;
use crate::io::tools::ToolSpec;

const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");

/// Shown only when the registry has the tools it uses.
const NOTEPAD_EXAMPLE: &str = r#"{"target_app": "notepad", "summary": "Open Notepad and type hello", "steps": [
  {"tool_name": "start_app", "arguments": [{"name": "app_name", "value": "notepad"}], "description": "Start Notepad", "verification": "A Notepad window is open"},
  {"tool_name": "type_text", "arguments": [{"name": "app_name", "value": "notepad"}, {"name": "text", "value": "hello"}], "description": "Type 'hello'", "verification": "The editor shows hello"}
], "check": null}"#;

const EXAMPLE_TOOLS: [&str; 2] = ["start_app", "type_text"];

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("planner", PLANNER_TEMPLATE)
            .expect("planner template should be valid");
        Self { env }
    }

    pub fn render_planner(&self, command: &Command, tools: &[ToolSpec]) -> Result<String> {
        let has_example_tools = EXAMPLE_TOOLS
            .iter()
            .all(|name| tools.iter().any(|tool| tool.name == *name));
        let template = self.env.get_template("planner")?;
        let rendered = template.render(context! {
            command => command.as_str().trim(),
            tools => tools,
            example => has_example_tools.then_some(NOTEPAD_EXAMPLE),
        })?;
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, read_only: bool) -> ToolSpec {
        ToolSpec {
            name: name.to_string(),
            description: format!("{name} description"),
            read_only,
        }
    }

    #[test]
    fn lists_command_and_tools() {
        let prompt = PromptEngine::new()
            .render_planner(
                &Command::new("  open notepad and type hello  "),
                &[spec("get_window_info", true), spec("type_text", false)],
            )
            .expect("render");

        assert!(prompt.contains("## Command\n\nopen notepad and type hello\n"));
        assert!(prompt.contains("- `get_window_info` (read-only): get_window_info description"));
        assert!(prompt.contains("- `type_text`: type_text description"));
    }

    #[test]
    fn example_requires_its_tools() {
        let engine = PromptEngine::new();
        let without = engine
            .render_planner(&Command::new("x"), &[spec("type_text", false)])
            .expect("render");
        assert!(!without.contains("## Example"));

        let with = engine
            .render_planner(
                &Command::new("x"),
                &[spec("start_app", false), spec("type_text", false)],
            )
            .expect("render");
        assert!(with.contains("## Example"));
        assert!(with.contains("\"target_app\": \"notepad\""));
    }
}
