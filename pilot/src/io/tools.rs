//! Tool registry: the closed set of capabilities a plan may invoke.

use std::collections::BTreeMap;
use std::process::Command;
use std::time::Duration;

use anyhow::{Result, anyhow};
use minijinja::{Environment, UndefinedBehavior, Value};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::core::types::Arguments;
use crate::io::config::ToolConfig;
use crate::io::process::run_command_with_timeout;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),
    #[error("tool '{0}' is not read-only")]
    NotReadOnly(String),
    #[error("render arguments for '{tool}': {message}")]
    Render { tool: String, message: String },
    #[error("spawn '{tool}': {message}")]
    Spawn { tool: String, message: String },
}

/// A synchronous capability invoked with named arguments.
pub trait Tool {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// Inspection-only; never changes the target application.
    fn read_only(&self) -> bool;
    /// Returns the tool's result text. Failures the tool can describe are
    /// reported in the text; `Err` is for invocations that never ran.
    fn invoke(&self, arguments: &Arguments) -> Result<String, ToolError>;
}

/// Name, flag and description of a registered tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub read_only: bool,
}

/// Tools keyed by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build process-backed tools from config.
    pub fn from_config(tools: &[ToolConfig]) -> Result<Self> {
        let mut registry = Self::new();
        for tool in tools {
            registry.register(ProcessTool::new(tool.clone()))?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<()> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(anyhow!("tool '{name}' registered twice"));
        }
        self.tools.insert(name, Box::new(tool));
        Ok(())
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn is_read_only(&self, name: &str) -> bool {
        self.tools.get(name).is_some_and(|tool| tool.read_only())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .values()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                read_only: tool.read_only(),
            })
            .collect()
    }

    #[instrument(skip_all, fields(tool = name))]
    pub fn invoke(&self, name: &str, arguments: &Arguments) -> Result<String, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.invoke(arguments)
    }

    /// View restricted to read-only tools.
    pub fn read_only(&self) -> ReadOnlyTools<'_> {
        ReadOnlyTools { registry: self }
    }
}

/// Registry view that refuses tools not flagged `read_only`.
#[derive(Clone, Copy)]
pub struct ReadOnlyTools<'a> {
    registry: &'a ToolRegistry,
}

impl ReadOnlyTools<'_> {
    pub fn invoke(&self, name: &str, arguments: &Arguments) -> Result<String, ToolError> {
        if !self.registry.is_known(name) {
            return Err(ToolError::UnknownTool(name.to_string()));
        }
        if !self.registry.is_read_only(name) {
            return Err(ToolError::NotReadOnly(name.to_string()));
        }
        self.registry.invoke(name, arguments)
    }
}

/// Tool backed by an external process; `argv` entries are minijinja templates.
pub struct ProcessTool {
    config: ToolConfig,
    env: Environment<'static>,
}

impl ProcessTool {
    pub fn new(config: ToolConfig) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.add_filter("xdotool_keys", |keys: String| xdotool_keys(&keys));
        Self { config, env }
    }

    fn render_argv(&self, arguments: &Arguments) -> Result<Vec<String>, ToolError> {
        let ctx = Value::from_serialize(arguments);
        self.config
            .argv
            .iter()
            .map(|template| {
                self.env
                    .render_str(template, &ctx)
                    .map_err(|err| ToolError::Render {
                        tool: self.config.name.clone(),
                        message: err.to_string(),
                    })
            })
            .collect()
    }
}

impl Tool for ProcessTool {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn description(&self) -> &str {
        &self.config.description
    }

    fn read_only(&self) -> bool {
        self.config.read_only
    }

    fn invoke(&self, arguments: &Arguments) -> Result<String, ToolError> {
        let argv = self.render_argv(arguments)?;
        let Some((program, args)) = argv.split_first() else {
            return Err(ToolError::Render {
                tool: self.config.name.clone(),
                message: "argv is empty".to_string(),
            });
        };
        debug!(tool = %self.config.name, ?argv, "invoking process tool");
        let mut cmd = Command::new(program);
        cmd.args(args);
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let output = run_command_with_timeout(cmd, None, timeout, self.config.output_limit_bytes)
            .map_err(|err| ToolError::Spawn {
                tool: self.config.name.clone(),
                message: format!("{err:#}"),
            })?;
        Ok(output.result_text(&self.config.name, timeout))
    }
}

/// Convert key-press syntax (`^s`, `%{F4}`, `{ENTER}`) to xdotool keysyms.
///
/// Input without `^`, `%` or `{` is passed through unchanged.
pub fn xdotool_keys(keys: &str) -> String {
    if !keys.contains(['^', '%', '{']) {
        return keys.to_string();
    }
    let mut chords = Vec::new();
    let mut modifiers: Vec<&str> = Vec::new();
    let mut chars = keys.chars();
    while let Some(c) = chars.next() {
        let key = match c {
            '^' => {
                modifiers.push("ctrl");
                continue;
            }
            '%' => {
                modifiers.push("alt");
                continue;
            }
            '+' => {
                modifiers.push("shift");
                continue;
            }
            '{' => {
                let name: String = chars.by_ref().take_while(|&c| c != '}').collect();
                named_keysym(&name)
            }
            other => other.to_string(),
        };
        if modifiers.is_empty() {
            chords.push(key);
        } else {
            chords.push(format!("{}+{}", modifiers.join("+"), key));
            modifiers.clear();
        }
    }
    chords.join(" ")
}

fn named_keysym(name: &str) -> String {
    let keysym = match name.to_ascii_uppercase().as_str() {
        "ENTER" => "Return",
        "TAB" => "Tab",
        "DEL" | "DELETE" => "Delete",
        "BACKSPACE" | "BS" => "BackSpace",
        "ESC" | "ESCAPE" => "Escape",
        "HOME" => "Home",
        "END" => "End",
        "SPACE" => "space",
        "UP" => "Up",
        "DOWN" => "Down",
        "LEFT" => "Left",
        "RIGHT" => "Right",
        _ => return name.to_string(),
    };
    keysym.to_string()
}
