//! Persistence for finished run results and resumable run state

pub mod resume;
#[cfg(feature = "sqlite")]
pub mod store;

pub use resume::{FileResumeStore, InMemoryResumeStore, ResumeStore};
#[cfg(feature = "sqlite")]
pub use store::SqliteRunStore;

use crate::core::{ExecutionStatus, PipelineContext, PipelineRun};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Summary of a finished (or failed) run stored alongside its context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub pipeline_name: String,

    pub status: ExecutionStatus,

    pub started_at: DateTime<Utc>,

    pub completed_at: Option<DateTime<Utc>>,

    /// Steps that contributed outputs
    pub completed_steps: usize,

    /// Steps skipped because they were disabled or failed while optional
    pub skipped_steps: usize,

    pub total_steps: usize,

    /// Failure description, if the run failed
    pub error: Option<String>,
}

/// A saved run result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRun {
    pub run_id: Uuid,
    pub metadata: RunMetadata,
    pub context: PipelineContext,
}

/// Result sink for finished runs
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a run's final context and metadata
    async fn save_run_result(
        &self,
        run_id: Uuid,
        context: &PipelineContext,
        metadata: &RunMetadata,
    ) -> Result<()>;

    /// Load a saved run by ID
    async fn load_run_result(&self, run_id: Uuid) -> Result<Option<StoredRun>>;

    /// List saved runs for a pipeline, newest first
    async fn list_runs(&self, pipeline_name: &str) -> Result<Vec<StoredRun>>;

    /// List all pipeline names with saved runs
    async fn list_pipelines(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or ephemeral use)
#[derive(Default)]
pub struct InMemoryPersistence {
    runs: RwLock<HashMap<Uuid, StoredRun>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_run_result(
        &self,
        run_id: Uuid,
        context: &PipelineContext,
        metadata: &RunMetadata,
    ) -> Result<()> {
        self.runs.write().await.insert(
            run_id,
            StoredRun {
                run_id,
                metadata: metadata.clone(),
                context: context.clone(),
            },
        );
        Ok(())
    }

    async fn load_run_result(&self, run_id: Uuid) -> Result<Option<StoredRun>> {
        Ok(self.runs.read().await.get(&run_id).cloned())
    }

    async fn list_runs(&self, pipeline_name: &str) -> Result<Vec<StoredRun>> {
        let mut runs: Vec<StoredRun> = self
            .runs
            .read()
            .await
            .values()
            .filter(|run| run.metadata.pipeline_name == pipeline_name)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.metadata.started_at.cmp(&a.metadata.started_at));
        Ok(runs)
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .runs
            .read()
            .await
            .values()
            .map(|run| run.metadata.pipeline_name.clone())
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Build the metadata saved for a run
pub fn create_metadata(run: &PipelineRun) -> RunMetadata {
    let state = run.state();
    RunMetadata {
        pipeline_name: state.pipeline_name.clone(),
        status: state.status,
        started_at: state.started_at.unwrap_or_else(Utc::now),
        completed_at: state.completed_at,
        completed_steps: run.completed_steps(),
        skipped_steps: state.steps.iter().filter(|r| r.is_skipped()).count(),
        total_steps: state.steps.len(),
        error: state.failure.as_ref().map(|f| f.message.clone()),
    }
}

/// Save a run's result and record the outcome on the run
///
/// A failed save never changes the run's status.
pub async fn save_run(backend: &dyn PersistenceBackend, run: &mut PipelineRun) -> Result<()> {
    let metadata = create_metadata(run);
    let result = backend
        .save_run_result(run.id(), run.context(), &metadata)
        .await;
    run.record_persistence(&result);
    result
}
