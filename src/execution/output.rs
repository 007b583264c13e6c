//! Step Output Table
//!
//! Each job keeps the named values its steps produce, keyed by step id.
//! Later steps of the same job read them through `${out.<step>.<key>}`.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

/// Outputs of one step, keyed by output name.
pub type StepOutputs = BTreeMap<String, Value>;

/// Reserved placeholder prefix for output references.
pub const OUTPUT_PREFIX: &str = "out.";

/// Per-job table of step outputs.
#[derive(Debug, Default, Clone)]
pub struct OutputTable {
    steps: HashMap<String, StepOutputs>,
}

impl OutputTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `value` under `key` for `step`. The last write wins.
    pub fn set(&mut self, step: &str, key: impl Into<String>, value: impl Into<Value>) {
        self.steps
            .entry(step.to_string())
            .or_default()
            .insert(key.into(), value.into());
    }

    pub fn get(&self, step: &str, key: &str) -> Option<&Value> {
        self.steps.get(step)?.get(key)
    }

    /// Looks up an output and renders it as a string.
    pub fn get_string(&self, step: &str, key: &str) -> Option<String> {
        self.get(step, key).map(render)
    }

    /// All outputs recorded for `step`.
    pub fn step(&self, step: &str) -> Option<&StepOutputs> {
        self.steps.get(step)
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Resolves an `out.<step>.<key>` placeholder name.
    ///
    /// The step id ends at the first dot after the prefix, so the key may
    /// itself contain dots.
    pub fn resolve_reference(&self, name: &str) -> Option<String> {
        let (step, key) = parse_reference(name)?;
        self.get_string(step, key)
    }
}

/// Splits `out.<step>.<key>` into its step id and key.
pub fn parse_reference(name: &str) -> Option<(&str, &str)> {
    name.strip_prefix(OUTPUT_PREFIX)?.split_once('.')
}

/// Renders an output value for interpolation.
///
/// Strings are inserted as-is; other values use their JSON text.
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
