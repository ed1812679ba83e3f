//! Error types for pipeline definitions and step execution

use crate::collaborators::CollaboratorError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors in a pipeline definition or its configuration
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Duplicate step name: {0}")]
    DuplicateStep(String),

    #[error("Output '{key}' is produced by both '{first}' and '{second}'")]
    DuplicateOutput {
        key: String,
        first: String,
        second: String,
    },

    #[error("Step '{step}' requires '{key}', which is neither a pipeline input nor produced by an earlier step")]
    UnresolvedInput { step: String, key: String },

    #[error("Unknown step '{0}'")]
    UnknownStep(String),

    #[error("Step '{step}' has retry_attempts = {value}; it must be at least 1")]
    InvalidRetryAttempts { step: String, value: u32 },

    #[error("Step '{step}' is invalid: {reason}")]
    InvalidStep { step: String, reason: String },

    #[error("Step configuration cannot change once the run has started")]
    ConfigFrozen,

    #[error("Saved run does not match pipeline '{0}'")]
    DefinitionMismatch(String),
}

/// Coarse classification of a step error, kept in step records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A required input was missing: a definition or ordering bug
    Contract,
    /// The transcription/completion/publication backend failed
    Collaborator,
    /// The editor response could not be split
    Parse,
    /// An input was present but unusable
    Input,
}

/// Error produced by executing a single step
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StepError {
    #[error("missing dependency: step '{step}' requires {keys:?}")]
    MissingDependency { step: String, keys: Vec<String> },

    #[error("{source} (after {attempts} attempt(s))")]
    Collaborator {
        source: CollaboratorError,
        attempts: u32,
    },

    #[error("unparseable editor response: no revision separator found after fallback extraction")]
    UnparseableEditorResponse,

    #[error("invalid input '{key}': {reason}")]
    InvalidInput { key: String, reason: String },
}

impl StepError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StepError::MissingDependency { .. } => ErrorKind::Contract,
            StepError::Collaborator { .. } => ErrorKind::Collaborator,
            StepError::UnparseableEditorResponse => ErrorKind::Parse,
            StepError::InvalidInput { .. } => ErrorKind::Input,
        }
    }

    /// Contract errors are fatal to the run even for optional steps
    pub fn is_contract(&self) -> bool {
        self.kind() == ErrorKind::Contract
    }

    /// Whether the step may be retried
    pub fn is_transient(&self) -> bool {
        matches!(self, StepError::Collaborator { source, .. } if source.is_transient())
    }

    /// Record how many attempts were made before giving up
    pub fn with_attempts(self, attempts: u32) -> Self {
        match self {
            StepError::Collaborator { source, .. } => StepError::Collaborator { source, attempts },
            other => other,
        }
    }
}

impl From<CollaboratorError> for StepError {
    fn from(source: CollaboratorError) -> Self {
        StepError::Collaborator {
            source,
            attempts: 1,
        }
    }
}
