//! Pure repairs for plans that omit arguments the planner could have inferred.
//!
//! Planners routinely drop `app_name`, the `keys` of a key press, or the
//! `text` to type while still naming them in the step description. Fix-ups
//! only fill absent arguments; they never overwrite what the planner set.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::core::types::{ActionStep, Command, Plan};

/// Tools whose first argument is the target application.
pub const APP_TOOLS: &[&str] = &[
    "start_app",
    "connect_to_app",
    "click_element",
    "type_text",
    "press_keys",
    "select_item",
    "menu_select",
    "inspect_control_tree",
    "get_control_properties",
    "list_child_controls",
    "take_screenshot",
    "get_window_info",
];

/// Named keys, checked in order (`enter` before `end`).
const NAMED_KEYS: &[(&str, &str)] = &[
    ("enter", "{ENTER}"),
    ("tab", "{TAB}"),
    ("delete", "{DEL}"),
    ("backspace", "{BACKSPACE}"),
    ("escape", "{ESC}"),
    ("esc", "{ESC}"),
    ("home", "{HOME}"),
    ("end", "{END}"),
];

const CALCULATOR_APPS: &[&str] = &["calculator", "calc"];

const DIGIT_BUTTONS: [&str; 10] = [
    "num0Button",
    "num1Button",
    "num2Button",
    "num3Button",
    "num4Button",
    "num5Button",
    "num6Button",
    "num7Button",
    "num8Button",
    "num9Button",
];

/// Calculator button names to `auto_id`, digits first; lookup order matters
/// when matching descriptions.
static CALCULATOR_BUTTONS: LazyLock<Vec<(String, &'static str)>> = LazyLock::new(|| {
    let words = [
        ("zero", DIGIT_BUTTONS[0]),
        ("one", DIGIT_BUTTONS[1]),
        ("two", DIGIT_BUTTONS[2]),
        ("three", DIGIT_BUTTONS[3]),
        ("four", DIGIT_BUTTONS[4]),
        ("five", DIGIT_BUTTONS[5]),
        ("six", DIGIT_BUTTONS[6]),
        ("seven", DIGIT_BUTTONS[7]),
        ("eight", DIGIT_BUTTONS[8]),
        ("nine", DIGIT_BUTTONS[9]),
        ("plus", "plusButton"),
        ("add", "plusButton"),
        ("+", "plusButton"),
        ("minus", "minusButton"),
        ("subtract", "minusButton"),
        ("-", "minusButton"),
        ("multiply", "multiplyButton"),
        ("times", "multiplyButton"),
        ("*", "multiplyButton"),
        ("x", "multiplyButton"),
        ("divide", "divideButton"),
        ("/", "divideButton"),
        ("equals", "equalButton"),
        ("equal", "equalButton"),
        ("=", "equalButton"),
        ("clear", "clearButton"),
        ("c", "clearButton"),
    ];
    DIGIT_BUTTONS
        .iter()
        .enumerate()
        .map(|(digit, id)| (digit.to_string(), *id))
        .chain(words.into_iter().map(|(word, id)| (word.to_string(), id)))
        .collect()
});

/// Operator words looked for anywhere in a description, in order.
static CALCULATOR_OPERATORS: LazyLock<Vec<(&'static str, &'static str)>> = LazyLock::new(|| {
    ["plus", "add", "minus", "subtract", "multiply", "times", "divide", "equal"]
        .into_iter()
        .filter_map(|word| calculator_button(word).map(|id| (word, id)))
        .collect()
});

static CTRL_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bctrl\s*\+\s*(\w)").unwrap());
static ALT_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\balt\s*\+\s*(\w+)").unwrap());
static QUOTED_KEYS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"['"]([^^%{'"][^'"]*)['"]"#).unwrap());
static QUOTED_TEXT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"['"](.+?)['"]"#).unwrap());
static COMMAND_TYPE_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\btype\s+['"](.+?)['"]"#).unwrap());

/// Fill inferable arguments in place; returns one note per filled argument.
pub fn apply_fixups(plan: &mut Plan, command: &Command) -> Vec<String> {
    let app = plan.target_app.trim().to_lowercase();
    let calculator = CALCULATOR_APPS.contains(&app.as_str());
    let mut notes = Vec::new();
    for step in &mut plan.steps {
        if !app.is_empty()
            && APP_TOOLS.contains(&step.tool_name.as_str())
            && !step.arguments.contains_key("app_name")
        {
            step.arguments
                .insert("app_name".to_string(), Value::String(app.clone()));
            notes.push(format!("step {}: app_name = {:?}", step.index, app));
        }
        match step.tool_name.as_str() {
            "press_keys" if !step.arguments.contains_key("keys") => {
                if let Some(keys) = infer_keys(&step.description) {
                    notes.push(format!("step {}: keys = {:?}", step.index, keys));
                    step.arguments.insert("keys".to_string(), Value::String(keys));
                }
            }
            "type_text" if !step.arguments.contains_key("text") => {
                if let Some(text) = infer_text(step, command) {
                    notes.push(format!("step {}: text = {:?}", step.index, text));
                    step.arguments.insert("text".to_string(), Value::String(text));
                }
            }
            "click_element" if calculator && !has_auto_id(step) => {
                if let Some(id) = infer_calculator_button(step) {
                    notes.push(format!("step {}: auto_id = {:?}", step.index, id));
                    step.arguments.remove("title");
                    step.arguments.remove("control_type");
                    step.arguments
                        .insert("auto_id".to_string(), Value::String(id.to_string()));
                }
            }
            _ => {}
        }
    }
    notes
}

fn has_auto_id(step: &ActionStep) -> bool {
    match step.arguments.get("auto_id") {
        None | Some(Value::Null) => false,
        Some(Value::String(id)) => !id.trim().is_empty(),
        Some(_) => true,
    }
}

fn calculator_button(key: &str) -> Option<&'static str> {
    CALCULATOR_BUTTONS
        .iter()
        .find(|(name, _)| name == key)
        .map(|(_, id)| *id)
}

/// Calculator `auto_id` for a click: the title, then `digit N` / `number N`
/// in the description, then the first operator word in it.
fn infer_calculator_button(step: &ActionStep) -> Option<&'static str> {
    let from_title = step
        .arguments
        .get("title")
        .and_then(Value::as_str)
        .and_then(|title| calculator_button(&title.trim().to_lowercase()));
    if from_title.is_some() {
        return from_title;
    }
    let description = step.description.to_lowercase();
    CALCULATOR_BUTTONS
        .iter()
        .find(|(key, _)| {
            description.contains(&format!("digit {key}"))
                || description.contains(&format!("number {key}"))
        })
        .map(|(_, id)| *id)
        .or_else(|| {
            CALCULATOR_OPERATORS
                .iter()
                .find(|(word, _)| description.contains(word))
                .map(|(_, id)| *id)
        })
}

/// Key syntax for a press described in prose: `^x` for Ctrl, `%{X}` for Alt,
/// `{NAME}` for named keys, else a quoted literal.
pub fn infer_keys(description: &str) -> Option<String> {
    if let Some(caps) = CTRL_KEY.captures(description) {
        return Some(format!("^{}", caps[1].to_lowercase()));
    }
    if let Some(caps) = ALT_KEY.captures(description) {
        return Some(format!("%{{{}}}", caps[1].to_uppercase()));
    }
    let lower = description.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect();
    for (name, keys) in NAMED_KEYS {
        if words.contains(name) {
            return Some((*keys).to_string());
        }
    }
    QUOTED_KEYS
        .captures(description)
        .map(|caps| caps[1].to_string())
}

fn infer_text(step: &ActionStep, command: &Command) -> Option<String> {
    QUOTED_TEXT
        .captures(&step.description)
        .or_else(|| COMMAND_TYPE_TEXT.captures(command.as_str()))
        .map(|caps| caps[1].to_string())
}
