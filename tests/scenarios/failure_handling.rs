//! Required and optional failures, retries, contract violations and cancellation

use crate::helpers::*;
use podcast_pipeline::collaborators::CollaboratorError;
use podcast_pipeline::core::{
    ErrorKind, ExecutionStatus, FailureCause, PipelineContext, PipelineDefinition, PipelineRun,
    SkipReason, StepConfigOverride, StepDefinition, StepKind, StepStatus,
};
use podcast_pipeline::execution::ExecutionEvent;
use std::collections::BTreeMap;
use std::sync::Arc;

#[tokio::test]
async fn test_permanent_error_halts_run_at_failed_step() {
    let backends = Backends::new(
        ScriptedCompletion::new()
            .fail("WISDOM", CollaboratorError::Rejected("content policy".into()))
            .respond("OUTLINE", "never used"),
    );
    let mut orchestrator = backends.orchestrator();
    let events = record_events(&mut orchestrator);
    let mut run = new_run(three_step_pipeline(), &[]);

    let status = orchestrator.run_to_completion(&mut run).await;

    assert_eq!(status, ExecutionStatus::Failed);
    assert_eq!(run.cursor(), 1);
    assert_eq!(context_keys(run.context()), vec!["audio_file", "transcript"]);
    assert_eq!(backends.completion.calls_for("WISDOM"), 1);
    assert_eq!(backends.completion.calls_for("OUTLINE"), 0);
    assert_eq!(started_steps(&events), vec!["transcribe", "wisdom"]);

    let failure = run.failure().unwrap();
    assert_eq!(failure.cause, FailureCause::StepFailure);
    assert_eq!(failure.step.as_deref(), Some("wisdom"));
    assert!(failure.message.contains("content policy"));

    let wisdom = run.record("wisdom").unwrap();
    assert_eq!(wisdom.status, StepStatus::Failed);
    assert_eq!(wisdom.error_kind, Some(ErrorKind::Collaborator));
    assert_eq!(run.record("outline").unwrap().status, StepStatus::Pending);
}

#[tokio::test]
async fn test_failed_run_ignores_further_advances() {
    let backends = Backends::new(
        ScriptedCompletion::new().fail("WISDOM", CollaboratorError::Internal("boom".into())),
    );
    let orchestrator = backends.orchestrator();
    let mut run = new_run(three_step_pipeline(), &[]);
    orchestrator.run_to_completion(&mut run).await;
    let before = run.state().clone();

    assert_eq!(orchestrator.advance(&mut run).await, ExecutionStatus::Failed);
    assert_eq!(run.state(), &before);
    assert_eq!(backends.completion.calls_for("WISDOM"), 1);
}

#[tokio::test]
async fn test_optional_failure_is_isolated() {
    let mut steps = three_steps();
    steps[1] = steps[1].clone().optional(true);
    let definition =
        PipelineDefinition::new("podcast", vec!["audio_file".into()], steps).unwrap();
    let backends = Backends::new(
        ScriptedCompletion::new()
            .fail("WISDOM", CollaboratorError::Rejected("too long".into()))
            .respond("OUTLINE", "1. Intro"),
    );
    let mut orchestrator = backends.orchestrator();
    let events = record_events(&mut orchestrator);
    let mut run = new_run(definition, &[]);

    let status = orchestrator.run_to_completion(&mut run).await;

    assert_eq!(status, ExecutionStatus::Completed);
    assert!(!run.context().contains("wisdom_notes"));
    assert_eq!(run.context().get_text("transcript"), Some("hello world"));
    assert_eq!(run.context().get_text("outline"), Some("1. Intro"));

    let wisdom = run.record("wisdom").unwrap();
    assert_eq!(wisdom.status, StepStatus::Failed);
    assert_eq!(wisdom.skip, Some(SkipReason::OptionalFailure));
    assert!(run.record("outline").unwrap().warnings[0].contains("failed"));

    let events = events.lock().unwrap();
    assert!(events.iter().any(|event| matches!(
        event,
        ExecutionEvent::StepFailed { step, fatal: false, .. } if step == "wisdom"
    )));
    assert!(matches!(
        events.last(),
        Some(ExecutionEvent::RunFinished {
            status: ExecutionStatus::Completed,
            ..
        })
    ));
}

#[tokio::test]
async fn test_transient_errors_retry_exactly_retry_attempts_times() {
    for attempts in 1..=4 {
        let backends = Backends::new(
            ScriptedCompletion::new()
                .fail("WISDOM", CollaboratorError::Unavailable("503".into())),
        );
        let mut orchestrator = backends.orchestrator();
        let events = record_events(&mut orchestrator);
        let mut run = new_run(
            three_step_pipeline(),
            &[(
                "wisdom",
                StepConfigOverride::default().with_retry_attempts(attempts),
            )],
        );

        orchestrator.run_to_completion(&mut run).await;

        assert_eq!(run.status(), ExecutionStatus::Failed);
        assert_eq!(
            backends.completion.calls_for("WISDOM"),
            attempts as usize,
            "retry_attempts = {}",
            attempts
        );
        let record = run.record("wisdom").unwrap();
        assert_eq!(record.attempts, attempts);
        assert!(record
            .last_error
            .as_deref()
            .unwrap()
            .contains(&format!("after {} attempt(s)", attempts)));

        let retries = events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| matches!(event, ExecutionEvent::StepRetrying { .. }))
            .count();
        assert_eq!(retries, attempts as usize - 1);
    }
}

#[tokio::test]
async fn test_permanent_error_is_not_retried() {
    let backends = Backends::new(
        ScriptedCompletion::new()
            .fail("WISDOM", CollaboratorError::UnsupportedFormat("ogg".into())),
    );
    let mut run = new_run(
        three_step_pipeline(),
        &[("wisdom", StepConfigOverride::default().with_retry_attempts(5))],
    );

    backends.orchestrator().run_to_completion(&mut run).await;

    assert_eq!(run.status(), ExecutionStatus::Failed);
    assert_eq!(backends.completion.calls_for("WISDOM"), 1);
    assert_eq!(run.record("wisdom").unwrap().attempts, 1);
}

#[tokio::test]
async fn test_missing_input_is_fatal_even_for_optional_step() {
    let definition = PipelineDefinition::new(
        "podcast",
        vec!["audio_file".into()],
        vec![StepDefinition::new("transcribe", StepKind::Transcribe)
            .requires(["audio_file"])
            .produces(["transcript"])
            .optional(true)],
    )
    .unwrap();
    let backends = Backends::new(ScriptedCompletion::new());
    let mut run =
        PipelineRun::new(Arc::new(definition), PipelineContext::new(), &BTreeMap::new()).unwrap();

    backends.orchestrator().run_to_completion(&mut run).await;

    assert_eq!(run.status(), ExecutionStatus::Failed);
    assert_eq!(run.cursor(), 0);
    let failure = run.failure().unwrap();
    assert_eq!(failure.cause, FailureCause::Contract);
    assert!(failure.message.contains("audio_file"));
    assert_eq!(
        run.record("transcribe").unwrap().error_kind,
        Some(ErrorKind::Contract)
    );
    assert!(backends.transcriber.requests().is_empty());
}

#[tokio::test]
async fn test_cancel_between_steps() {
    let backends = Backends::new(scripted_notes());
    let orchestrator = backends.orchestrator();
    let mut run = new_run(three_step_pipeline(), &[]);

    orchestrator.advance(&mut run).await;
    assert!(run.cancel("operator stopped the run"));
    assert!(!run.cancel("again"));

    assert_eq!(orchestrator.advance(&mut run).await, ExecutionStatus::Failed);
    assert_eq!(run.cursor(), 1);
    assert_eq!(run.failure().unwrap().cause, FailureCause::Cancelled);
    assert_eq!(run.failure().unwrap().step.as_deref(), Some("wisdom"));
    assert_eq!(backends.completion.prompts().len(), 0);
}
