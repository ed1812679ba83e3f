//! Resumable runner - one step per tick, state kept in a ResumeStore

use crate::{
    core::{
        PipelineContext, PipelineDefinition, PipelineError, PipelineRun, RunState,
        StepConfigOverride,
    },
    execution::PipelineOrchestrator,
    persistence::ResumeStore,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ResumeError {
    #[error("Run {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Lets a caller drive a run across separate invocations
///
/// Each `tick` loads the run, advances it by at most one step and saves it
/// again, so the caller may stop between any two steps and pick up later,
/// even from another process.
pub struct ResumableRunner<S> {
    definition: Arc<PipelineDefinition>,
    orchestrator: Arc<PipelineOrchestrator>,
    store: S,
}

impl<S: ResumeStore> ResumableRunner<S> {
    pub fn new(
        definition: Arc<PipelineDefinition>,
        orchestrator: Arc<PipelineOrchestrator>,
        store: S,
    ) -> Self {
        Self {
            definition,
            orchestrator,
            store,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create a pending run and save it
    pub async fn start(
        &self,
        initial: PipelineContext,
        overrides: &BTreeMap<String, StepConfigOverride>,
    ) -> Result<RunState, ResumeError> {
        let run = PipelineRun::new(Arc::clone(&self.definition), initial, overrides)?;
        self.store.save(run.state()).await?;
        info!("Created run {} for pipeline {}", run.id(), self.definition.name);
        Ok(run.into_state())
    }

    /// Load a run, advance it by at most one step and save it
    pub async fn tick(&self, run_id: Uuid) -> Result<RunState, ResumeError> {
        let mut run = self.load(run_id).await?;
        if run.is_terminal() {
            return Ok(run.into_state());
        }

        self.orchestrator.advance(&mut run).await;
        self.store.save(run.state()).await?;
        Ok(run.into_state())
    }

    /// Fail a non-terminal run before its next step starts
    pub async fn cancel(&self, run_id: Uuid, reason: &str) -> Result<RunState, ResumeError> {
        let mut run = self.load(run_id).await?;
        if run.cancel(reason) {
            info!("Cancelled run {}: {}", run_id, reason);
            self.store.save(run.state()).await?;
        }
        Ok(run.into_state())
    }

    /// Current state of a stored run
    pub async fn status(&self, run_id: Uuid) -> Result<RunState, ResumeError> {
        Ok(self.load(run_id).await?.into_state())
    }

    async fn load(&self, run_id: Uuid) -> Result<PipelineRun, ResumeError> {
        let state = self
            .store
            .load(run_id)
            .await?
            .ok_or(ResumeError::NotFound(run_id))?;
        Ok(PipelineRun::restore(Arc::clone(&self.definition), state)?)
    }
}
