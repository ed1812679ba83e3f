//! Command collaborator configuration

use serde::{Deserialize, Serialize};

/// How to invoke an external command-line backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandClientConfig {
    /// Program to execute (looked up on PATH)
    pub program: String,

    /// Arguments passed before any per-call arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Timeout for a single call in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Flag used to pass the model name, e.g. `-m`
    #[serde(default)]
    pub model_flag: Option<String>,

    /// Model used when a step does not set `params.model`
    #[serde(default)]
    pub default_model: Option<String>,
}

fn default_timeout() -> u64 {
    600
}

impl CommandClientConfig {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout_secs: default_timeout(),
            model_flag: None,
            default_model: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_model_flag(mut self, flag: impl Into<String>) -> Self {
        self.model_flag = Some(flag.into());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }
}
