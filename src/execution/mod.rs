//! Pipeline execution: step executor, editor protocol, orchestrator and
//! resumable runner

pub mod editor;
pub mod engine;
pub mod executor;
pub mod resume;

pub use editor::{EditorProtocol, EditorRequest, EditorResult, DEFAULT_SEPARATORS};
pub use engine::{EventHandler, ExecutionEvent, PipelineOrchestrator};
pub use executor::{ExecutionResult, StepExecutor};
pub use resume::{ResumableRunner, ResumeError};
