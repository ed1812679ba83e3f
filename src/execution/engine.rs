//! Pipeline orchestrator - advances runs one step at a time

use crate::{
    collaborators::Collaborators,
    core::{ExecutionStatus, FailureCause, PipelineRun, RunFailure, SkipReason, StepError},
    execution::{ExecutionResult, StepExecutor},
};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    RunStarted {
        run_id: Uuid,
        pipeline_name: String,
        total_steps: usize,
    },
    StepStarted {
        run_id: Uuid,
        step: String,
        index: usize,
    },
    StepRetrying {
        run_id: Uuid,
        step: String,
        attempt: u32,
        max_attempts: u32,
        error: String,
    },
    StepCompleted {
        run_id: Uuid,
        step: String,
        duration_ms: Option<i64>,
        warnings: Vec<String>,
    },
    StepSkipped {
        run_id: Uuid,
        step: String,
        reason: SkipReason,
    },
    StepFailed {
        run_id: Uuid,
        step: String,
        error: String,
        /// Whether the failure stopped the run
        fatal: bool,
    },
    RunFinished {
        run_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(&ExecutionEvent) + Send + Sync>;

/// Drives pipeline runs
///
/// Holds no per-run state: one orchestrator can advance any number of
/// independent runs, concurrently if the caller wishes.
pub struct PipelineOrchestrator {
    executor: StepExecutor,
    event_handlers: Vec<EventHandler>,
}

impl PipelineOrchestrator {
    pub fn new(collaborators: Collaborators) -> Self {
        Self::with_executor(StepExecutor::new(collaborators))
    }

    pub fn with_executor(executor: StepExecutor) -> Self {
        Self {
            executor,
            event_handlers: Vec::new(),
        }
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(&ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    pub fn executor(&self) -> &StepExecutor {
        &self.executor
    }

    /// Emit an event to all handlers
    fn emit(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(&event);
        }
    }

    /// Execute at most one step of `run`
    ///
    /// A pending run is started first. Terminal runs are left untouched.
    /// Every failure ends up in the run state; nothing is returned as an
    /// error.
    pub async fn advance(&self, run: &mut PipelineRun) -> ExecutionStatus {
        match run.status() {
            ExecutionStatus::Pending => {
                run.start();
                info!(
                    "Starting pipeline run: {} ({})",
                    run.definition().name,
                    run.id()
                );
                self.emit(ExecutionEvent::RunStarted {
                    run_id: run.id(),
                    pipeline_name: run.definition().name.clone(),
                    total_steps: run.definition().len(),
                });
            }
            ExecutionStatus::Running => {}
            status => return status,
        }

        let index = run.cursor();
        let definition = Arc::clone(run.definition());
        let Some(step) = definition.steps().get(index) else {
            run.complete();
            self.finish(run);
            return run.status();
        };

        let run_id = run.id();
        let config = run.config_at(index).clone();
        let (inputs, soft_warnings) = run.resolve_inputs(index);

        info!("Executing step {}/{}: {}", index + 1, definition.len(), step.name);
        self.emit(ExecutionEvent::StepStarted {
            run_id,
            step: step.name.clone(),
            index,
        });

        let on_retry = |attempt: u32, max_attempts: u32, error: &StepError| {
            self.emit(ExecutionEvent::StepRetrying {
                run_id,
                step: step.name.clone(),
                attempt,
                max_attempts,
                error: error.to_string(),
            });
        };
        let result = self
            .executor
            .execute(step, &config, &inputs, run.record_mut(index), &on_retry)
            .await;

        match result {
            ExecutionResult::Skipped => {
                run.record_mut(index).skip_disabled();
                self.emit(ExecutionEvent::StepSkipped {
                    run_id,
                    step: step.name.clone(),
                    reason: SkipReason::Disabled,
                });
                run.advance_cursor();
            }
            ExecutionResult::Completed { outputs, warnings } => {
                let record = run.record_mut(index);
                for warning in soft_warnings.into_iter().chain(warnings) {
                    warn!("Step {}: {}", step.name, warning);
                    record.warn(warning);
                }
                record.complete();
                let duration_ms = record.duration().map(|d| d.num_milliseconds());
                let warnings = record.warnings.clone();

                info!("Step {} completed", step.name);
                run.merge_outputs(outputs);
                self.emit(ExecutionEvent::StepCompleted {
                    run_id,
                    step: step.name.clone(),
                    duration_ms,
                    warnings,
                });
                run.advance_cursor();
            }
            ExecutionResult::Failed { error } => {
                run.record_mut(index).fail(&error);
                let fatal = error.is_contract() || !step.optional;

                self.emit(ExecutionEvent::StepFailed {
                    run_id,
                    step: step.name.clone(),
                    error: error.to_string(),
                    fatal,
                });

                if fatal {
                    error!("Step {} failed: {}", step.name, error);
                    let cause = if error.is_contract() {
                        FailureCause::Contract
                    } else {
                        FailureCause::StepFailure
                    };
                    run.fail(RunFailure {
                        step: Some(step.name.clone()),
                        cause,
                        message: error.to_string(),
                    });
                } else {
                    warn!("Optional step {} failed, continuing: {}", step.name, error);
                    run.record_mut(index).skip = Some(SkipReason::OptionalFailure);
                    self.emit(ExecutionEvent::StepSkipped {
                        run_id,
                        step: step.name.clone(),
                        reason: SkipReason::OptionalFailure,
                    });
                    run.advance_cursor();
                }
            }
        }

        if run.is_terminal() {
            self.finish(run);
        }
        run.status()
    }

    /// Advance until the run reaches a terminal status
    pub async fn run_to_completion(&self, run: &mut PipelineRun) -> ExecutionStatus {
        while !run.is_terminal() {
            self.advance(run).await;
        }
        run.status()
    }

    fn finish(&self, run: &PipelineRun) {
        info!(
            "Pipeline run finished: {} - {:?}",
            run.definition().name,
            run.status()
        );
        self.emit(ExecutionEvent::RunFinished {
            run_id: run.id(),
            status: run.status(),
        });
    }
}
