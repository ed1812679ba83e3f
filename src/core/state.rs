//! Execution state models

use crate::core::error::{ErrorKind, StepError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Overall pipeline run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Run has been created but not advanced yet
    Pending,
    /// Run is in progress
    Running,
    /// Every step has been processed
    Completed,
    /// A required step failed, a contract was violated, or the run was cancelled
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

/// Status of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Why a step did not contribute outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Disabled in its StepConfig
    Disabled,
    /// Optional step that failed; the run continued without it
    OptionalFailure,
}

/// Per-run record of one step's execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Step name
    pub name: String,

    pub status: StepStatus,

    /// Set when the step was skipped rather than contributing outputs
    #[serde(default)]
    pub skip: Option<SkipReason>,

    /// Number of collaborator attempts made
    #[serde(default)]
    pub attempts: u32,

    /// When the first external call started
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    /// When the last external call returned
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,

    /// Milliseconds spent inside collaborator calls, summed over attempts
    #[serde(default)]
    pub call_time_ms: u64,

    #[serde(default)]
    pub last_error: Option<String>,

    #[serde(default)]
    pub error_kind: Option<ErrorKind>,

    /// Non-fatal problems (omitted outputs, missing knowledge docs, soft inputs)
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl StepRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Pending,
            skip: None,
            attempts: 0,
            started_at: None,
            finished_at: None,
            call_time_ms: 0,
            last_error: None,
            error_kind: None,
            warnings: Vec::new(),
        }
    }

    /// Mark the start of the external call
    pub fn start_call(&mut self) {
        self.status = StepStatus::Running;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    /// Mark the end of the external call, adding its latency
    pub fn finish_call(&mut self, elapsed: std::time::Duration) {
        self.finished_at = Some(Utc::now());
        self.call_time_ms = self
            .call_time_ms
            .saturating_add(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));
    }

    pub fn complete(&mut self) {
        self.status = StepStatus::Completed;
    }

    pub fn skip_disabled(&mut self) {
        self.status = StepStatus::Completed;
        self.skip = Some(SkipReason::Disabled);
    }

    pub fn fail(&mut self, error: &StepError) {
        self.status = StepStatus::Failed;
        self.last_error = Some(error.to_string());
        self.error_kind = Some(error.kind());
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Time spent in collaborator calls, excluding retry backoff
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at?;
        i64::try_from(self.call_time_ms)
            .ok()
            .map(chrono::Duration::milliseconds)
    }

    /// True for steps that finished without contributing outputs
    pub fn is_skipped(&self) -> bool {
        self.skip.is_some()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, StepStatus::Completed | StepStatus::Failed)
    }
}

/// Why a run stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// Required input missing when the step was about to run
    Contract,
    /// A required step failed
    StepFailure,
    /// Cancelled by the caller between steps
    Cancelled,
}

/// Which step stopped the run, and why
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub step: Option<String>,
    pub cause: FailureCause,
    pub message: String,
}

/// Outcome of the caller's attempt to persist the run result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceOutcome {
    pub saved: bool,
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}
