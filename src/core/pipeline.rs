//! Pipeline domain model: immutable definitions and per-run state

use crate::core::{
    context::{ContextValue, PipelineContext},
    error::PipelineError,
    state::{
        ExecutionStatus, FailureCause, PersistenceOutcome, RunFailure, SkipReason, StepRecord,
        StepStatus,
    },
    step::{StepConfig, StepConfigOverride, StepDefinition},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Display;
use std::sync::Arc;
use uuid::Uuid;

/// A validated, ordered pipeline definition
///
/// Shared between runs; never mutated once built.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineDefinition {
    /// Pipeline name
    pub name: String,

    /// Pipeline version (optional)
    pub version: Option<String>,

    /// Keys the caller supplies as initial input
    pub inputs: Vec<String>,

    steps: Vec<StepDefinition>,

    /// Default StepConfig per step, aligned with `steps`
    default_configs: Vec<StepConfig>,
}

impl PipelineDefinition {
    /// Build a definition with default step configs
    pub fn new(
        name: impl Into<String>,
        inputs: Vec<String>,
        steps: Vec<StepDefinition>,
    ) -> Result<Self, PipelineError> {
        let default_configs = vec![StepConfig::default(); steps.len()];
        Self::with_configs(name, inputs, steps, default_configs)
    }

    /// Build a definition with explicit default configs (aligned with `steps`)
    pub fn with_configs(
        name: impl Into<String>,
        inputs: Vec<String>,
        steps: Vec<StepDefinition>,
        default_configs: Vec<StepConfig>,
    ) -> Result<Self, PipelineError> {
        let definition = Self {
            name: name.into(),
            version: None,
            inputs,
            steps,
            default_configs,
        };
        definition.validate()?;
        Ok(definition)
    }

    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.version = version;
        self
    }

    /// Validate step names, output ownership and input ordering
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.default_configs.len() != self.steps.len() {
            return Err(PipelineError::DefinitionMismatch(self.name.clone()));
        }

        let mut seen_names = HashSet::new();
        let mut producers: HashMap<&str, &str> = HashMap::new();
        let mut available: HashSet<&str> = self.inputs.iter().map(String::as_str).collect();

        for (step, config) in self.steps.iter().zip(&self.default_configs) {
            if !seen_names.insert(step.name.as_str()) {
                return Err(PipelineError::DuplicateStep(step.name.clone()));
            }
            step.validate()?;
            config.validate(&step.name)?;

            for key in &step.required_inputs {
                if !available.contains(key.as_str()) {
                    return Err(PipelineError::UnresolvedInput {
                        step: step.name.clone(),
                        key: key.clone(),
                    });
                }
            }

            for key in &step.produces_outputs {
                if let Some(first) = producers.insert(key.as_str(), step.name.as_str()) {
                    return Err(PipelineError::DuplicateOutput {
                        key: key.clone(),
                        first: first.to_string(),
                        second: step.name.clone(),
                    });
                }
                if self.inputs.contains(key) {
                    return Err(PipelineError::DuplicateOutput {
                        key: key.clone(),
                        first: "<input>".to_string(),
                        second: step.name.clone(),
                    });
                }
                available.insert(key.as_str());
            }
        }

        Ok(())
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn step(&self, name: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn step_index(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name == name)
    }

    /// Index of the step that declares `key` as an output
    pub fn producer_of(&self, key: &str) -> Option<usize> {
        self.steps
            .iter()
            .position(|s| s.produces_outputs.iter().any(|k| k == key))
    }

    pub fn default_config(&self, name: &str) -> Option<&StepConfig> {
        self.step_index(name).map(|i| &self.default_configs[i])
    }

    /// Step configs for a new run with caller overrides applied
    pub fn resolve_configs(
        &self,
        overrides: &BTreeMap<String, StepConfigOverride>,
    ) -> Result<Vec<StepConfig>, PipelineError> {
        for name in overrides.keys() {
            if self.step_index(name).is_none() {
                return Err(PipelineError::UnknownStep(name.clone()));
            }
        }

        self.steps
            .iter()
            .zip(&self.default_configs)
            .map(|(step, default)| {
                let mut config = default.clone();
                if let Some(step_override) = overrides.get(&step.name) {
                    config.apply(step_override);
                }
                config.validate(&step.name)?;
                Ok(config)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// The complete resumable state of one run
///
/// Serializing this value is enough to suspend a run and resume it later,
/// in another process, against the same [`PipelineDefinition`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: Uuid,
    pub pipeline_name: String,
    pub status: ExecutionStatus,

    /// Index of the next step to execute
    pub cursor: usize,

    pub context: PipelineContext,

    /// Frozen step configs, aligned with the definition's steps
    pub configs: Vec<StepConfig>,

    /// Per-step records, aligned with the definition's steps
    pub steps: Vec<StepRecord>,

    #[serde(default)]
    pub failure: Option<RunFailure>,

    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub persistence: Option<PersistenceOutcome>,
}

/// One execution of a pipeline definition
#[derive(Debug, Clone)]
pub struct PipelineRun {
    definition: Arc<PipelineDefinition>,
    state: RunState,
}

impl PipelineRun {
    /// Create a pending run from initial input and caller overrides
    pub fn new(
        definition: Arc<PipelineDefinition>,
        initial: PipelineContext,
        overrides: &BTreeMap<String, StepConfigOverride>,
    ) -> Result<Self, PipelineError> {
        let configs = definition.resolve_configs(overrides)?;
        let steps = definition
            .steps()
            .iter()
            .map(|s| StepRecord::new(&s.name))
            .collect();

        let state = RunState {
            run_id: Uuid::new_v4(),
            pipeline_name: definition.name.clone(),
            status: ExecutionStatus::Pending,
            cursor: 0,
            context: initial,
            configs,
            steps,
            failure: None,
            started_at: None,
            completed_at: None,
            persistence: None,
        };

        Ok(Self { definition, state })
    }

    /// Rebuild a run from persisted state
    pub fn restore(
        definition: Arc<PipelineDefinition>,
        state: RunState,
    ) -> Result<Self, PipelineError> {
        let names_match = state.steps.len() == definition.len()
            && state.configs.len() == definition.len()
            && state
                .steps
                .iter()
                .zip(definition.steps())
                .all(|(record, step)| record.name == step.name);

        if state.pipeline_name != definition.name
            || !names_match
            || state.cursor > definition.len()
        {
            return Err(PipelineError::DefinitionMismatch(definition.name.clone()));
        }

        Ok(Self { definition, state })
    }

    pub fn id(&self) -> Uuid {
        self.state.run_id
    }

    pub fn status(&self) -> ExecutionStatus {
        self.state.status
    }

    pub fn cursor(&self) -> usize {
        self.state.cursor
    }

    pub fn context(&self) -> &PipelineContext {
        &self.state.context
    }

    pub fn failure(&self) -> Option<&RunFailure> {
        self.state.failure.as_ref()
    }

    pub fn definition(&self) -> &Arc<PipelineDefinition> {
        &self.definition
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn into_state(self) -> RunState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.status.is_terminal()
    }

    /// Step definitions paired with their records, in order
    pub fn steps(&self) -> impl Iterator<Item = (&StepDefinition, &StepRecord)> {
        self.definition.steps().iter().zip(&self.state.steps)
    }

    pub fn record(&self, name: &str) -> Option<&StepRecord> {
        self.state.steps.iter().find(|r| r.name == name)
    }

    pub fn config(&self, name: &str) -> Option<&StepConfig> {
        self.definition
            .step_index(name)
            .map(|i| &self.state.configs[i])
    }

    /// Override a step's config before the run starts
    pub fn set_step_config(
        &mut self,
        name: &str,
        overrides: &StepConfigOverride,
    ) -> Result<(), PipelineError> {
        if self.state.status != ExecutionStatus::Pending {
            return Err(PipelineError::ConfigFrozen);
        }
        let index = self
            .definition
            .step_index(name)
            .ok_or_else(|| PipelineError::UnknownStep(name.to_string()))?;

        let mut config = self.state.configs[index].clone();
        config.apply(overrides);
        config.validate(name)?;
        self.state.configs[index] = config;
        Ok(())
    }

    /// The step the next `advance` will execute
    pub fn current_step(&self) -> Option<&StepDefinition> {
        self.definition.steps().get(self.state.cursor)
    }

    /// Fraction of steps processed (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.definition.is_empty() {
            return 1.0;
        }
        self.state.cursor as f64 / self.definition.len() as f64
    }

    pub fn completed_steps(&self) -> usize {
        self.state
            .steps
            .iter()
            .filter(|r| r.status == StepStatus::Completed && !r.is_skipped())
            .count()
    }

    /// Cancel the run between steps; returns false if already terminal
    pub fn cancel(&mut self, reason: impl Into<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.fail(RunFailure {
            step: self.current_step().map(|s| s.name.clone()),
            cause: FailureCause::Cancelled,
            message: reason.into(),
        });
        true
    }

    /// Record the caller's attempt to persist the result; never changes status
    pub fn record_persistence<E: Display>(&mut self, result: &Result<(), E>) {
        self.state.persistence = Some(PersistenceOutcome {
            saved: result.is_ok(),
            error: result.as_ref().err().map(|e| e.to_string()),
            recorded_at: Utc::now(),
        });
    }

    /// Inputs for the step at `index`
    ///
    /// Keys whose producing step already ran without writing them are
    /// supplied as empty text and reported in the returned warnings. Keys
    /// that are missing for any other reason are left out so the step's
    /// precondition check reports them.
    pub fn resolve_inputs(&self, index: usize) -> (PipelineContext, Vec<String>) {
        let step = &self.definition.steps()[index];
        let mut inputs = self.state.context.select(&step.required_inputs);
        let mut warnings = Vec::new();

        for key in self.state.context.missing(&step.required_inputs) {
            let Some(producer) = self.definition.producer_of(key) else {
                continue;
            };
            let record = &self.state.steps[producer];
            if producer < index && record.is_terminal() {
                let reason = match (record.skip, record.status) {
                    (Some(SkipReason::Disabled), _) => "was disabled",
                    (_, StepStatus::Failed) => "failed",
                    _ => "did not produce it",
                };
                warnings.push(format!(
                    "input '{}' unavailable because step '{}' {}; using an empty value",
                    key, record.name, reason
                ));
                inputs.insert(key, ContextValue::Text(String::new()));
            }
        }

        (inputs, warnings)
    }

    pub(crate) fn config_at(&self, index: usize) -> &StepConfig {
        &self.state.configs[index]
    }

    pub(crate) fn record_mut(&mut self, index: usize) -> &mut StepRecord {
        &mut self.state.steps[index]
    }

    pub(crate) fn merge_outputs(&mut self, outputs: PipelineContext) {
        self.state.context.extend(outputs);
    }

    pub(crate) fn start(&mut self) {
        self.state.status = ExecutionStatus::Running;
        self.state.started_at = Some(Utc::now());
    }

    /// Move past the current step; completes the run after the last one
    pub(crate) fn advance_cursor(&mut self) {
        self.state.cursor += 1;
        if self.state.cursor >= self.definition.len() {
            self.complete();
        }
    }

    pub(crate) fn complete(&mut self) {
        self.state.status = ExecutionStatus::Completed;
        self.state.completed_at = Some(Utc::now());
    }

    pub(crate) fn fail(&mut self, failure: RunFailure) {
        self.state.status = ExecutionStatus::Failed;
        self.state.completed_at = Some(Utc::now());
        self.state.failure = Some(failure);
    }
}
