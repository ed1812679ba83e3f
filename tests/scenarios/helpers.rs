//! Test doubles and builders shared by the scenario tests

use async_trait::async_trait;
use podcast_pipeline::collaborators::{
    CollaboratorError, Collaborators, CompletionClient, CompletionParams, InMemoryKnowledgeStore,
    KnowledgeStore, PublishReceipt, Publisher, Transcriber, Transcript, TranscriptionOptions,
};
use podcast_pipeline::core::{
    ExecutionStatus, PipelineContext, PipelineDefinition, PipelineRun, StepConfigOverride,
    StepDefinition, StepKind,
};
use podcast_pipeline::execution::{ExecutionEvent, PipelineOrchestrator, StepExecutor};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Completion backend answering by the first marker found in the prompt
pub struct ScriptedCompletion {
    routes: Vec<(String, Result<String, CollaboratorError>)>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn respond(mut self, marker: &str, response: &str) -> Self {
        self.routes.push((marker.to_string(), Ok(response.to_string())));
        self
    }

    pub fn fail(mut self, marker: &str, error: CollaboratorError) -> Self {
        self.routes.push((marker.to_string(), Err(error)));
        self
    }

    /// Every prompt received, in order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls_for(&self, marker: &str) -> usize {
        self.prompts()
            .iter()
            .filter(|prompt| prompt.contains(marker))
            .count()
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(
        &self,
        prompt: &str,
        _model: Option<&str>,
        _params: &CompletionParams,
    ) -> Result<String, CollaboratorError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.routes
            .iter()
            .find(|(marker, _)| prompt.contains(marker.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| Err(CollaboratorError::Rejected("no scripted response".into())))
    }
}

/// Transcriber returning a fixed transcript
pub struct StubTranscriber {
    text: String,
    requests: Mutex<Vec<(PathBuf, TranscriptionOptions)>>,
}

impl StubTranscriber {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<(PathBuf, TranscriptionOptions)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transcriber for StubTranscriber {
    async fn transcribe(
        &self,
        audio: &Path,
        options: &TranscriptionOptions,
    ) -> Result<Transcript, CollaboratorError> {
        self.requests
            .lock()
            .unwrap()
            .push((audio.to_path_buf(), options.clone()));
        Ok(Transcript {
            text: self.text.clone(),
            segments: None,
        })
    }
}

/// Publisher keeping every published document in memory
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(String, String)>>,
    error: Option<CollaboratorError>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(error: CollaboratorError) -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            error: Some(error),
        }
    }

    /// (title, body) pairs
    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(
        &self,
        title: &str,
        body: &str,
        _metadata: &BTreeMap<String, String>,
    ) -> Result<PublishReceipt, CollaboratorError> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        let mut published = self.published.lock().unwrap();
        published.push((title.to_string(), body.to_string()));
        Ok(PublishReceipt {
            location: format!("memory://{}", published.len()),
        })
    }
}

/// Test collaborators with handles kept for inspection
pub struct Backends {
    pub completion: Arc<ScriptedCompletion>,
    pub transcriber: Arc<StubTranscriber>,
    pub publisher: Arc<RecordingPublisher>,
    pub knowledge: Arc<dyn KnowledgeStore>,
}

impl Backends {
    pub fn new(completion: ScriptedCompletion) -> Self {
        Self {
            completion: Arc::new(completion),
            transcriber: Arc::new(StubTranscriber::new("hello world")),
            publisher: Arc::new(RecordingPublisher::new()),
            knowledge: Arc::new(InMemoryKnowledgeStore::new()),
        }
    }

    pub fn with_publisher(mut self, publisher: RecordingPublisher) -> Self {
        self.publisher = Arc::new(publisher);
        self
    }

    pub fn with_knowledge(mut self, knowledge: InMemoryKnowledgeStore) -> Self {
        self.knowledge = Arc::new(knowledge);
        self
    }

    pub fn collaborators(&self) -> Collaborators {
        let completion: Arc<dyn CompletionClient> = self.completion.clone();
        let transcriber: Arc<dyn Transcriber> = self.transcriber.clone();
        let publisher: Arc<dyn Publisher> = self.publisher.clone();
        Collaborators::new(completion, transcriber, Arc::clone(&self.knowledge), publisher)
    }

    /// Orchestrator without retry back-off
    pub fn orchestrator(&self) -> PipelineOrchestrator {
        PipelineOrchestrator::with_executor(
            StepExecutor::new(self.collaborators()).with_retry_delay(Duration::ZERO),
        )
    }
}

/// Completion answering the three-step pipeline's prompts
pub fn scripted_notes() -> ScriptedCompletion {
    ScriptedCompletion::new()
        .respond("WISDOM", "- talk less, listen more")
        .respond("OUTLINE", "1. Intro\n2. Listening")
}

/// transcribe -> wisdom -> outline
pub fn three_step_pipeline() -> PipelineDefinition {
    PipelineDefinition::new("podcast", vec!["audio_file".into()], three_steps()).unwrap()
}

pub fn three_steps() -> Vec<StepDefinition> {
    vec![
        StepDefinition::new("transcribe", StepKind::Transcribe)
            .requires(["audio_file"])
            .produces(["transcript"]),
        StepDefinition::new("wisdom", StepKind::Prompt)
            .requires(["transcript"])
            .produces(["wisdom_notes"])
            .with_prompt("WISDOM\n{{ transcript }}"),
        StepDefinition::new("outline", StepKind::Prompt)
            .requires(["transcript", "wisdom_notes"])
            .produces(["outline"])
            .with_prompt("OUTLINE\n{{ wisdom_notes }}\n{{ transcript }}"),
    ]
}

pub fn audio_input() -> PipelineContext {
    PipelineContext::new().with("audio_file", PathBuf::from("episode.mp3"))
}

pub fn new_run(
    definition: PipelineDefinition,
    overrides: &[(&str, StepConfigOverride)],
) -> PipelineRun {
    let overrides: BTreeMap<String, StepConfigOverride> = overrides
        .iter()
        .map(|(name, o)| (name.to_string(), o.clone()))
        .collect();
    PipelineRun::new(Arc::new(definition), audio_input(), &overrides).unwrap()
}

/// Attach an event recorder to an orchestrator
pub fn record_events(orchestrator: &mut PipelineOrchestrator) -> Arc<Mutex<Vec<ExecutionEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    orchestrator.add_event_handler(move |event| sink.lock().unwrap().push(event.clone()));
    events
}

/// Names of steps in the order they started
pub fn started_steps(events: &Mutex<Vec<ExecutionEvent>>) -> Vec<String> {
    events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|event| match event {
            ExecutionEvent::StepStarted { step, .. } => Some(step.clone()),
            _ => None,
        })
        .collect()
}

pub fn context_keys(context: &PipelineContext) -> Vec<&str> {
    context.keys().collect()
}

pub fn assert_completed(run: &PipelineRun) {
    assert_eq!(
        run.status(),
        ExecutionStatus::Completed,
        "run failed: {:?}",
        run.failure()
    );
}
