//! Pipeline context - the key/value accumulator threaded through a run

use serde::{Deserialize, Serialize};
use std::collections::btree_map::{self, BTreeMap};
use std::collections::HashMap;
use std::path::PathBuf;

/// A single value stored in the context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ContextValue {
    /// Plain text (transcripts, generated content)
    Text(String),
    /// Structured data (segments, metadata)
    Record(serde_json::Value),
    /// Reference to a file on disk (audio input, published documents)
    File(PathBuf),
}

impl ContextValue {
    /// Borrow the value as text, if it is textual
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContextValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// String form used when the value is rendered into a prompt
    pub fn render(&self) -> String {
        match self {
            ContextValue::Text(s) => s.clone(),
            ContextValue::Record(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
            ContextValue::File(path) => format!("@{}", path.display()),
        }
    }

    /// True for empty text; records and files are never empty
    pub fn is_empty(&self) -> bool {
        matches!(self, ContextValue::Text(s) if s.trim().is_empty())
    }
}

impl From<&str> for ContextValue {
    fn from(s: &str) -> Self {
        ContextValue::Text(s.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(s: String) -> Self {
        ContextValue::Text(s)
    }
}

impl From<PathBuf> for ContextValue {
    fn from(path: PathBuf) -> Self {
        ContextValue::File(path)
    }
}

impl From<serde_json::Value> for ContextValue {
    fn from(value: serde_json::Value) -> Self {
        ContextValue::Record(value)
    }
}

/// Execution context for a pipeline run
///
/// Every key is written by exactly one step (or supplied as initial input)
/// and may be read by any later step. Also used as the output map a step
/// hands back to the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineContext {
    values: BTreeMap<String, ContextValue>,
}

impl PipelineContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ContextValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set a value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ContextValue>) {
        self.values.insert(key.into(), value.into());
    }

    /// Get a value
    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.values.get(key)
    }

    /// Get a textual value
    pub fn get_text(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(ContextValue::as_text)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<ContextValue> {
        self.values.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, ContextValue> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Keys from `required` that are absent from this context
    pub fn missing<'a>(&self, required: &'a [String]) -> Vec<&'a str> {
        required
            .iter()
            .filter(|key| !self.values.contains_key(key.as_str()))
            .map(String::as_str)
            .collect()
    }

    /// Merge another context into this one, overwriting existing keys
    pub fn extend(&mut self, other: PipelineContext) {
        self.values.extend(other.values);
    }

    /// Copy the listed keys that are present into a new context
    pub fn select(&self, keys: &[String]) -> PipelineContext {
        let values = keys
            .iter()
            .filter_map(|key| self.values.get(key).map(|v| (key.clone(), v.clone())))
            .collect();
        PipelineContext { values }
    }

    /// Get all values available for prompt rendering
    pub fn get_rendering_variables(&self) -> HashMap<String, String> {
        self.values
            .iter()
            .map(|(key, value)| (key.clone(), value.render()))
            .collect()
    }

    /// Render a template, replacing `{{ key }}` placeholders
    ///
    /// Unknown placeholders are left untouched.
    pub fn render_template(&self, template: &str, extra: &HashMap<String, String>) -> String {
        let mut rendered = template.to_string();
        let variables = self.get_rendering_variables();
        for (key, value) in variables.iter().chain(extra.iter()) {
            let placeholder = format!("{{{{ {} }}}}", key);
            rendered = rendered.replace(&placeholder, value);
        }
        rendered
    }
}

impl FromIterator<(String, ContextValue)> for PipelineContext {
    fn from_iter<I: IntoIterator<Item = (String, ContextValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for PipelineContext {
    type Item = (String, ContextValue);
    type IntoIter = btree_map::IntoIter<String, ContextValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}
