//! Editor steps inside a run: separator split, structured re-emit and
//! unparseable responses

use crate::helpers::*;
use podcast_pipeline::collaborators::KnowledgeDocument;
use podcast_pipeline::core::{
    ErrorKind, ExecutionStatus, PipelineDefinition, SkipReason, StepConfigOverride,
    StepDefinition, StepKind,
};
use podcast_pipeline::execution::{EditorProtocol, EditorRequest};
use serde_json::json;

const REVIEW_MARKER: &str = "Review the content below";
const REEMIT_MARKER: &str = "Re-emit it";

fn editing_pipeline(optional: bool) -> PipelineDefinition {
    PipelineDefinition::new(
        "podcast",
        vec!["audio_file".into()],
        vec![
            StepDefinition::new("transcribe", StepKind::Transcribe)
                .requires(["audio_file"])
                .produces(["transcript"]),
            StepDefinition::new("article", StepKind::Prompt)
                .requires(["transcript"])
                .produces(["article"])
                .with_prompt("ARTICLE\n{{ transcript }}"),
            StepDefinition::new("edit_article", StepKind::Editor)
                .requires(["article"])
                .produces(["article_feedback", "edited_article"])
                .with_target("article")
                .optional(optional),
        ],
    )
    .unwrap()
}

#[tokio::test]
async fn test_separator_splits_feedback_from_revision() {
    let protocol = EditorProtocol::new();
    let backends = Backends::new(ScriptedCompletion::new().respond(
        REVIEW_MARKER,
        "Some notes here. REVISED CONTENT: Better text.",
    ));

    let result = protocol
        .review(
            backends.completion.as_ref(),
            &EditorRequest {
                content: "Rough text.",
                ..EditorRequest::default()
            },
            None,
            &Default::default(),
        )
        .await
        .unwrap();

    assert_eq!(result.feedback, "Some notes here.");
    assert_eq!(result.revised_content, "Better text.");
}

#[tokio::test]
async fn test_editor_step_writes_feedback_and_edited_keys() {
    let backends = Backends::new(
        ScriptedCompletion::new()
            .respond("ARTICLE", "Listening is underrated.")
            .respond(
                REVIEW_MARKER,
                "Add an example.\nIMPROVED VERSION:\nListening is underrated. Ask anyone.",
            ),
    );
    let mut run = new_run(
        editing_pipeline(false),
        &[(
            "edit_article",
            StepConfigOverride::default()
                .with_param("persona", json!("a radio producer"))
                .with_param("style", json!("plain")),
        )],
    );

    backends.orchestrator().run_to_completion(&mut run).await;

    assert_completed(&run);
    assert_eq!(run.context().get_text("article_feedback"), Some("Add an example."));
    assert_eq!(
        run.context().get_text("edited_article"),
        Some("Listening is underrated. Ask anyone.")
    );
    assert_eq!(
        run.context().get_text("article"),
        Some("Listening is underrated.")
    );

    let prompt = backends
        .completion
        .prompts()
        .into_iter()
        .find(|p| p.contains(REVIEW_MARKER))
        .unwrap();
    assert!(prompt.starts_with("You are a radio producer. The house style is: plain."));
    assert!(prompt.ends_with("CONTENT:\nListening is underrated.\n"));
}

#[tokio::test]
async fn test_missing_separator_uses_structured_reemit() {
    let backends = Backends::new(
        ScriptedCompletion::new()
            .respond(REEMIT_MARKER, "FEEDBACK: Cut the preamble.\nREVISED CONTENT:\nShort.")
            .respond("ARTICLE", "A long preamble. Then the point.")
            .respond(REVIEW_MARKER, "Cut the preamble. Here: Short."),
    );
    let mut run = new_run(editing_pipeline(false), &[]);

    backends.orchestrator().run_to_completion(&mut run).await;

    assert_completed(&run);
    assert_eq!(backends.completion.calls_for(REEMIT_MARKER), 1);
    assert_eq!(run.context().get_text("article_feedback"), Some("Cut the preamble."));
    assert_eq!(run.context().get_text("edited_article"), Some("Short."));
}

#[tokio::test]
async fn test_unparseable_response_fails_required_editor() {
    let backends = Backends::new(
        ScriptedCompletion::new()
            .respond(REEMIT_MARKER, "I cannot do that.")
            .respond("ARTICLE", "Draft.")
            .respond(REVIEW_MARKER, "Looks fine to me."),
    );
    let mut run = new_run(editing_pipeline(false), &[]);

    backends.orchestrator().run_to_completion(&mut run).await;

    assert_eq!(run.status(), ExecutionStatus::Failed);
    assert_eq!(run.cursor(), 2);
    let record = run.record("edit_article").unwrap();
    assert_eq!(record.error_kind, Some(ErrorKind::Parse));
    assert!(!run.context().contains("article_feedback"));
    assert!(!run.context().contains("edited_article"));
}

#[tokio::test]
async fn test_unparseable_response_skips_optional_editor() {
    let backends = Backends::new(
        ScriptedCompletion::new()
            .respond(REEMIT_MARKER, "Still no marker.")
            .respond("ARTICLE", "Draft.")
            .respond(REVIEW_MARKER, "Looks fine to me."),
    );
    let mut run = new_run(editing_pipeline(true), &[]);

    backends.orchestrator().run_to_completion(&mut run).await;

    assert_completed(&run);
    assert_eq!(run.context().get_text("article"), Some("Draft."));
    assert!(!run.context().contains("edited_article"));
    assert_eq!(
        run.record("edit_article").unwrap().skip,
        Some(SkipReason::OptionalFailure)
    );
}

#[tokio::test]
async fn test_voice_samples_come_from_knowledge_docs() {
    let backends = Backends::new(
        ScriptedCompletion::new()
            .respond("ARTICLE", "Draft.")
            .respond(REVIEW_MARKER, "Warmer.\nREVISED CONTENT:\nDraft, warmly."),
    )
    .with_knowledge(
        podcast_pipeline::collaborators::InMemoryKnowledgeStore::new()
            .with_document("host_voice", "We keep it friendly."),
    );
    let mut run = new_run(
        editing_pipeline(false),
        &[(
            "edit_article",
            StepConfigOverride::default().with_knowledge_docs(["host_voice", "missing_doc"]),
        )],
    );

    backends.orchestrator().run_to_completion(&mut run).await;

    assert_completed(&run);
    let prompt = backends
        .completion
        .prompts()
        .into_iter()
        .find(|p| p.contains(REVIEW_MARKER))
        .unwrap();
    let sample = KnowledgeDocument {
        id: "host_voice".into(),
        content: "We keep it friendly.".into(),
    };
    assert!(prompt.contains(&format!("### {}\n{}", sample.id, sample.content)));
    assert_eq!(
        run.record("edit_article").unwrap().warnings,
        vec!["knowledge document 'missing_doc' not found".to_string()]
    );
}
