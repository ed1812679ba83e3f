//! podcast-pipeline - a resumable content pipeline for long-form audio

pub mod cli;
pub mod collaborators;
pub mod core;
pub mod execution;
pub mod persistence;

// Re-export commonly used types
pub use collaborators::{
    CollaboratorError, Collaborators, CompletionClient, KnowledgeStore, Publisher, Transcriber,
};
pub use core::{
    config::PipelineConfig, ContextValue, ExecutionStatus, PipelineContext, PipelineDefinition,
    PipelineError, PipelineRun, RunState, StepConfig, StepConfigOverride, StepDefinition,
    StepError, StepKind,
};
pub use execution::{
    EditorProtocol, ExecutionEvent, PipelineOrchestrator, ResumableRunner, StepExecutor,
};
pub use persistence::{PersistenceBackend, ResumeStore};
