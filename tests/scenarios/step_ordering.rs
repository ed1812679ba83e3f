//! Declared-order execution, disabled steps and soft inputs

use crate::helpers::*;
use podcast_pipeline::core::{
    ContextValue, PipelineDefinition, SkipReason, StepConfigOverride, StepDefinition, StepKind,
    StepStatus,
};
use podcast_pipeline::execution::ExecutionEvent;
use std::path::PathBuf;

#[tokio::test]
async fn test_three_steps_complete_in_order() {
    let backends = Backends::new(scripted_notes());
    let mut orchestrator = backends.orchestrator();
    let events = record_events(&mut orchestrator);
    let mut run = new_run(three_step_pipeline(), &[]);

    orchestrator.run_to_completion(&mut run).await;

    assert_completed(&run);
    assert_eq!(
        context_keys(run.context()),
        vec!["audio_file", "outline", "transcript", "wisdom_notes"]
    );
    assert_eq!(
        run.context().get("audio_file"),
        Some(&ContextValue::File(PathBuf::from("episode.mp3")))
    );
    assert_eq!(run.context().get_text("transcript"), Some("hello world"));
    assert_eq!(
        run.context().get_text("wisdom_notes"),
        Some("- talk less, listen more")
    );
    assert_eq!(run.context().get_text("outline"), Some("1. Intro\n2. Listening"));
    assert_eq!(
        started_steps(&events),
        vec!["transcribe", "wisdom", "outline"]
    );
}

#[tokio::test]
async fn test_prompts_only_see_produced_inputs() {
    let backends = Backends::new(scripted_notes());
    let orchestrator = backends.orchestrator();
    let mut run = new_run(three_step_pipeline(), &[]);

    orchestrator.run_to_completion(&mut run).await;

    assert_completed(&run);
    let prompts = backends.completion.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts.iter().all(|prompt| !prompt.contains("{{")));
    assert!(prompts[0].starts_with("WISDOM\nhello world"));
    assert!(prompts[1].contains("- talk less, listen more"));
}

#[tokio::test]
async fn test_each_advance_runs_one_step_in_declared_order() {
    let backends = Backends::new(scripted_notes());
    let mut orchestrator = backends.orchestrator();
    let events = record_events(&mut orchestrator);
    let mut run = new_run(three_step_pipeline(), &[]);

    for (expected_cursor, step) in [(1, "transcribe"), (2, "wisdom"), (3, "outline")] {
        orchestrator.advance(&mut run).await;
        assert_eq!(run.cursor(), expected_cursor);
        assert_eq!(started_steps(&events).last().map(String::as_str), Some(step));
        assert_eq!(run.record(step).unwrap().status, StepStatus::Completed);
    }
    assert_completed(&run);
}

#[tokio::test]
async fn test_disabled_step_leaves_its_output_absent() {
    let backends = Backends::new(scripted_notes());
    let mut orchestrator = backends.orchestrator();
    let events = record_events(&mut orchestrator);
    let mut run = new_run(
        three_step_pipeline(),
        &[("outline", StepConfigOverride::disabled())],
    );

    orchestrator.run_to_completion(&mut run).await;

    assert_completed(&run);
    assert!(!run.context().contains("outline"));
    assert_eq!(backends.completion.calls_for("OUTLINE"), 0);

    let record = run.record("outline").unwrap();
    assert_eq!(record.skip, Some(SkipReason::Disabled));
    assert_eq!(record.attempts, 0);
    assert!(events.lock().unwrap().contains(&ExecutionEvent::StepSkipped {
        run_id: run.id(),
        step: "outline".into(),
        reason: SkipReason::Disabled,
    }));
}

#[tokio::test]
async fn test_disabling_unconsumed_step_keeps_other_outputs() {
    let enabled = {
        let backends = Backends::new(scripted_notes());
        let mut run = new_run(three_step_pipeline(), &[]);
        backends.orchestrator().run_to_completion(&mut run).await;
        run
    };
    let disabled = {
        let backends = Backends::new(scripted_notes());
        let mut run = new_run(
            three_step_pipeline(),
            &[("outline", StepConfigOverride::disabled())],
        );
        backends.orchestrator().run_to_completion(&mut run).await;
        run
    };

    assert_completed(&enabled);
    assert_completed(&disabled);
    let mut expected = enabled.context().clone();
    expected.remove("outline");
    assert_eq!(disabled.context(), &expected);
}

#[tokio::test]
async fn test_disabled_producer_yields_empty_input_with_warning() {
    let backends = Backends::new(scripted_notes());
    let orchestrator = backends.orchestrator();
    let mut run = new_run(
        three_step_pipeline(),
        &[("wisdom", StepConfigOverride::disabled())],
    );

    orchestrator.run_to_completion(&mut run).await;

    assert_completed(&run);
    assert!(!run.context().contains("wisdom_notes"));
    assert_eq!(run.context().get_text("outline"), Some("1. Intro\n2. Listening"));

    let outline = run.record("outline").unwrap();
    assert_eq!(outline.warnings.len(), 1);
    assert!(outline.warnings[0].contains("wisdom_notes"));
    assert!(outline.warnings[0].contains("disabled"));
    assert!(backends.completion.prompts()[0].starts_with("OUTLINE\n\nhello world"));
}

#[tokio::test]
async fn test_missing_declared_output_is_a_warning() {
    let definition = PipelineDefinition::new(
        "podcast",
        vec!["audio_file".into()],
        vec![
            StepDefinition::new("transcribe", StepKind::Transcribe)
                .requires(["audio_file"])
                .produces(["transcript"]),
            StepDefinition::new("social", StepKind::Prompt)
                .requires(["transcript"])
                .produces(["twitter_thread", "linkedin_post"])
                .with_prompt("SOCIAL {{ transcript }}"),
        ],
    )
    .unwrap();
    let backends = Backends::new(
        ScriptedCompletion::new().respond("SOCIAL", "## Twitter Thread\n1/ Listen more."),
    );
    let mut run = new_run(definition, &[]);

    backends.orchestrator().run_to_completion(&mut run).await;

    assert_completed(&run);
    assert_eq!(
        run.context().get_text("twitter_thread"),
        Some("1/ Listen more.")
    );
    assert!(!run.context().contains("linkedin_post"));
    let record = run.record("social").unwrap();
    assert_eq!(
        record.warnings,
        vec!["declared output 'linkedin_post' was not produced".to_string()]
    );
}
