//! Collaborator error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned by a transcription, completion, knowledge or publication backend
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollaboratorError {
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CollaboratorError {
    /// Transient errors are retried up to the step's `retry_attempts`
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CollaboratorError::Unavailable(_)
                | CollaboratorError::Timeout(_)
                | CollaboratorError::RateLimited(_)
        )
    }
}
