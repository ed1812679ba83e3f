//! Step domain model

use crate::core::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// What a step does when it runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    /// Speech-to-text on the audio input
    Transcribe,
    /// A single completion call rendered from a prompt template
    Prompt,
    /// Critique-and-revise pass over an earlier step's output
    Editor,
    /// Hand generated content to the publication sink
    Publish,
}

/// A single step in a pipeline definition
///
/// Definitions are immutable templates; per-run status lives in
/// [`StepRecord`](crate::core::StepRecord).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Unique step name
    pub name: String,

    pub kind: StepKind,

    /// Context keys that must exist before the step runs
    pub required_inputs: Vec<String>,

    /// Context keys the step writes
    pub produces_outputs: Vec<String>,

    /// Failure of an optional step does not halt the run
    pub optional: bool,

    /// Prompt template (prompt steps, optional preamble for editor steps)
    pub prompt: Option<String>,

    /// Context key the step operates on (editor steps)
    pub target: Option<String>,
}

impl StepDefinition {
    pub fn new(name: impl Into<String>, kind: StepKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required_inputs: Vec::new(),
            produces_outputs: Vec::new(),
            optional: false,
            prompt: None,
            target: None,
        }
    }

    pub fn requires<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_inputs.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn produces<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.produces_outputs.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Check kind-specific requirements
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |reason: &str| PipelineError::InvalidStep {
            step: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("step name is empty"));
        }

        match self.kind {
            StepKind::Transcribe => {
                if self.required_inputs.is_empty() {
                    return Err(invalid("transcribe steps need an audio input"));
                }
                if self.produces_outputs.is_empty() {
                    return Err(invalid("transcribe steps must produce a transcript key"));
                }
            }
            StepKind::Prompt => {
                if self.prompt.as_deref().map_or(true, |p| p.trim().is_empty()) {
                    return Err(invalid("prompt steps need a prompt template"));
                }
                if self.produces_outputs.is_empty() {
                    return Err(invalid("prompt steps must produce at least one key"));
                }
            }
            StepKind::Editor => {
                let target = self
                    .target
                    .as_ref()
                    .ok_or_else(|| invalid("editor steps need a target"))?;
                if !self.required_inputs.contains(target) {
                    return Err(invalid("editor target must be one of the required inputs"));
                }
                for key in editor_output_keys(target) {
                    if !self.produces_outputs.contains(&key) {
                        return Err(invalid(&format!("editor steps must produce '{}'", key)));
                    }
                }
            }
            StepKind::Publish => {
                if self.required_inputs.is_empty() {
                    return Err(invalid("publish steps need content to publish"));
                }
            }
        }

        Ok(())
    }
}

/// Output keys written by an editor step for `target`
pub fn editor_output_keys(target: &str) -> [String; 2] {
    [format!("{}_feedback", target), format!("edited_{}", target)]
}

/// Per-step, per-run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    /// Disabled steps complete immediately with no outputs
    pub enabled: bool,

    /// Free-form parameters (model, temperature, persona, ...)
    pub params: BTreeMap<String, serde_json::Value>,

    /// Knowledge documents injected into the step input, in order
    pub knowledge_docs: Vec<String>,

    /// Total collaborator attempts for transient failures
    pub retry_attempts: u32,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            params: BTreeMap::new(),
            knowledge_docs: Vec::new(),
            retry_attempts: 3,
        }
    }
}

impl StepConfig {
    /// Apply an override on top of this config
    pub fn apply(&mut self, overrides: &StepConfigOverride) {
        if let Some(enabled) = overrides.enabled {
            self.enabled = enabled;
        }
        if let Some(params) = &overrides.params {
            self.params
                .extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        if let Some(docs) = &overrides.knowledge_docs {
            self.knowledge_docs = docs.clone();
        }
        if let Some(attempts) = overrides.retry_attempts {
            self.retry_attempts = attempts;
        }
    }

    pub fn validate(&self, step: &str) -> Result<(), PipelineError> {
        if self.retry_attempts < 1 {
            return Err(PipelineError::InvalidRetryAttempts {
                step: step.to_string(),
                value: self.retry_attempts,
            });
        }
        Ok(())
    }

    /// A parameter rendered as a string
    pub fn param_str(&self, key: &str) -> Option<String> {
        self.params.get(key).map(|value| match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Parameters exposed to prompt templates as `param.<name>`
    pub fn template_variables(&self) -> HashMap<String, String> {
        self.params
            .keys()
            .filter_map(|key| {
                self.param_str(key)
                    .map(|value| (format!("param.{}", key), value))
            })
            .collect()
    }
}

/// Partial StepConfig supplied by pipeline files and callers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepConfigOverride {
    #[serde(default)]
    pub enabled: Option<bool>,

    #[serde(default)]
    pub params: Option<BTreeMap<String, serde_json::Value>>,

    #[serde(default)]
    pub knowledge_docs: Option<Vec<String>>,

    #[serde(default)]
    pub retry_attempts: Option<u32>,
}

impl StepConfigOverride {
    pub fn disabled() -> Self {
        Self {
            enabled: Some(false),
            ..Self::default()
        }
    }

    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = Some(attempts);
        self
    }

    pub fn with_knowledge_docs<I, S>(mut self, docs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.knowledge_docs = Some(docs.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value);
        self
    }
}
