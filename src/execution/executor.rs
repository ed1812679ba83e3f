//! Step executor - runs individual steps against the collaborators

use crate::{
    collaborators::{Collaborators, CompletionParams, KnowledgeDocument, TranscriptionOptions},
    core::{
        editor_output_keys, ContextValue, PipelineContext, StepConfig, StepDefinition,
        StepError, StepKind, StepRecord,
    },
    execution::editor::{EditorProtocol, EditorRequest},
};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::OnceLock;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info, warn};

/// Params consumed by the executor rather than passed to the completion backend
const RESERVED_PARAMS: &[&str] = &["model", "persona", "style", "title", "language"];

/// Result of executing a step
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    /// Step ran; only declared outputs are included
    Completed {
        outputs: PipelineContext,
        warnings: Vec<String>,
    },
    /// Step is disabled in its config
    Skipped,
    /// Step failed after any retries
    Failed { error: StepError },
}

/// Called before each retry with (next attempt, max attempts, error)
pub type RetryObserver<'a> = &'a (dyn Fn(u32, u32, &StepError) + Send + Sync);

/// Executes a single step
#[derive(Debug, Clone)]
pub struct StepExecutor {
    collaborators: Collaborators,
    editor: EditorProtocol,
    retry_delay: Duration,
}

impl StepExecutor {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            collaborators,
            editor: EditorProtocol::default(),
            retry_delay: Duration::from_secs(2),
        }
    }

    pub fn with_editor(mut self, editor: EditorProtocol) -> Self {
        self.editor = editor;
        self
    }

    /// Base delay between retries; attempt `n` waits `n * delay`
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn editor(&self) -> &EditorProtocol {
        &self.editor
    }

    /// Execute a step and return the result
    ///
    /// `inputs` holds the step's resolved required inputs. Attempts and
    /// call timing are written to `record`; status changes are left to
    /// the orchestrator.
    pub async fn execute(
        &self,
        step: &StepDefinition,
        config: &StepConfig,
        inputs: &PipelineContext,
        record: &mut StepRecord,
        on_retry: RetryObserver<'_>,
    ) -> ExecutionResult {
        if !config.enabled {
            info!("Step {} is disabled, skipping", step.name);
            return ExecutionResult::Skipped;
        }

        let missing: Vec<String> = inputs
            .missing(&step.required_inputs)
            .into_iter()
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            return ExecutionResult::Failed {
                error: StepError::MissingDependency {
                    step: step.name.clone(),
                    keys: missing,
                },
            };
        }

        let mut warnings = Vec::new();
        let knowledge = self.load_knowledge(config, &mut warnings).await;

        let max_attempts = config.retry_attempts.max(1);
        let mut attempt = 0;
        let outputs = loop {
            attempt += 1;
            record.attempts = attempt;

            record.start_call();
            let call_started = Instant::now();
            let result = self.run_kind(step, config, inputs, &knowledge).await;
            record.finish_call(call_started.elapsed());

            match result {
                Ok(outputs) => break outputs,
                Err(error) if error.is_transient() && attempt < max_attempts => {
                    warn!(
                        "Step {} attempt {}/{} failed: {}",
                        step.name, attempt, max_attempts, error
                    );
                    on_retry(attempt + 1, max_attempts, &error);
                    sleep(self.retry_delay * attempt).await;
                }
                Err(error) => {
                    return ExecutionResult::Failed {
                        error: error.with_attempts(attempt),
                    };
                }
            }
        };

        ExecutionResult::Completed {
            outputs: check_outputs(step, outputs, &mut warnings),
            warnings,
        }
    }

    async fn load_knowledge(
        &self,
        config: &StepConfig,
        warnings: &mut Vec<String>,
    ) -> Vec<KnowledgeDocument> {
        if config.knowledge_docs.is_empty() {
            return Vec::new();
        }

        match self
            .collaborators
            .knowledge
            .get_documents(&config.knowledge_docs)
            .await
        {
            Ok(documents) => {
                for id in &config.knowledge_docs {
                    if !documents.iter().any(|d| &d.id == id) {
                        warnings.push(format!("knowledge document '{}' not found", id));
                    }
                }
                documents
            }
            Err(e) => {
                warnings.push(format!("knowledge documents unavailable: {}", e));
                Vec::new()
            }
        }
    }

    async fn run_kind(
        &self,
        step: &StepDefinition,
        config: &StepConfig,
        inputs: &PipelineContext,
        knowledge: &[KnowledgeDocument],
    ) -> Result<PipelineContext, StepError> {
        match step.kind {
            StepKind::Transcribe => self.transcribe(step, config, inputs, knowledge).await,
            StepKind::Prompt => self.prompt(step, config, inputs, knowledge).await,
            StepKind::Editor => self.edit(step, config, inputs, knowledge).await,
            StepKind::Publish => self.publish(step, config, inputs).await,
        }
    }

    async fn transcribe(
        &self,
        step: &StepDefinition,
        config: &StepConfig,
        inputs: &PipelineContext,
        knowledge: &[KnowledgeDocument],
    ) -> Result<PipelineContext, StepError> {
        let key = &step.required_inputs[0];
        let audio = match inputs.get(key) {
            Some(ContextValue::File(path)) => path.clone(),
            Some(ContextValue::Text(text)) if !text.trim().is_empty() => PathBuf::from(text.trim()),
            _ => {
                return Err(StepError::InvalidInput {
                    key: key.clone(),
                    reason: "expected an audio file reference".to_string(),
                })
            }
        };

        let options = TranscriptionOptions {
            language: config.param_str("language"),
            model: config.param_str("model"),
            prompt: (!knowledge.is_empty()).then(|| {
                knowledge
                    .iter()
                    .map(|d| d.content.trim())
                    .collect::<Vec<_>>()
                    .join("\n")
            }),
        };

        let transcript = self
            .collaborators
            .transcriber
            .transcribe(&audio, &options)
            .await?;

        let mut outputs = PipelineContext::new();
        outputs.insert(step.produces_outputs[0].clone(), transcript.text);
        if let (Some(key), Some(segments)) = (step.produces_outputs.get(1), transcript.segments) {
            outputs.insert(key.clone(), ContextValue::Record(segments));
        }
        Ok(outputs)
    }

    async fn prompt(
        &self,
        step: &StepDefinition,
        config: &StepConfig,
        inputs: &PipelineContext,
        knowledge: &[KnowledgeDocument],
    ) -> Result<PipelineContext, StepError> {
        let template = step.prompt.as_deref().unwrap_or_default();
        let mut prompt = inputs.render_template(template, &config.template_variables());
        append_knowledge(&mut prompt, knowledge);
        debug!("Effective prompt for step {}: {}", step.name, prompt);

        let model = config.param_str("model");
        let response = self
            .collaborators
            .completion
            .complete(&prompt, model.as_deref(), &completion_params(config))
            .await?;
        debug!("Completion for step {}: {}", step.name, response);

        if let [only] = step.produces_outputs.as_slice() {
            return Ok(PipelineContext::new().with(only.clone(), response.trim()));
        }
        Ok(split_sections(&response, &step.produces_outputs))
    }

    async fn edit(
        &self,
        step: &StepDefinition,
        config: &StepConfig,
        inputs: &PipelineContext,
        knowledge: &[KnowledgeDocument],
    ) -> Result<PipelineContext, StepError> {
        let target = step.target.as_deref().unwrap_or_default();
        let content = inputs.get(target).map(ContextValue::render).unwrap_or_default();
        if content.trim().is_empty() {
            return Err(StepError::InvalidInput {
                key: target.to_string(),
                reason: "nothing to edit".to_string(),
            });
        }

        let persona = config.param_str("persona");
        let style = config.param_str("style");
        let instructions = step
            .prompt
            .as_deref()
            .map(|p| inputs.render_template(p, &config.template_variables()));
        let request = EditorRequest {
            content: &content,
            persona: persona.as_deref(),
            style: style.as_deref(),
            instructions: instructions.as_deref(),
            voice_samples: knowledge,
        };

        let model = config.param_str("model");
        let result = self
            .editor
            .review(
                self.collaborators.completion.as_ref(),
                &request,
                model.as_deref(),
                &completion_params(config),
            )
            .await?;

        let [feedback_key, edited_key] = editor_output_keys(target);
        Ok(PipelineContext::new()
            .with(feedback_key, result.feedback)
            .with(edited_key, result.revised_content))
    }

    async fn publish(
        &self,
        step: &StepDefinition,
        config: &StepConfig,
        inputs: &PipelineContext,
    ) -> Result<PipelineContext, StepError> {
        let (source, body) = step
            .required_inputs
            .iter()
            .filter_map(|key| inputs.get(key).map(|v| (key, v)))
            .find(|(_, value)| !value.is_empty())
            .map(|(key, value)| (key.clone(), value.render()))
            .ok_or_else(|| StepError::InvalidInput {
                key: step.required_inputs.join(", "),
                reason: "no content to publish".to_string(),
            })?;

        let title = config
            .param_str("title")
            .unwrap_or_else(|| title_from_body(&body));

        let mut metadata = BTreeMap::new();
        metadata.insert("source".to_string(), source);
        metadata.insert("step".to_string(), step.name.clone());

        let receipt = self
            .collaborators
            .publisher
            .publish(&title, &body, &metadata)
            .await?;

        let mut outputs = PipelineContext::new();
        if let Some(key) = step.produces_outputs.first() {
            outputs.insert(key.clone(), receipt.location);
        }
        Ok(outputs)
    }
}

/// Keep declared outputs only and warn about declared keys that are missing
fn check_outputs(
    step: &StepDefinition,
    outputs: PipelineContext,
    warnings: &mut Vec<String>,
) -> PipelineContext {
    let mut declared = PipelineContext::new();
    for (key, value) in outputs {
        if step.produces_outputs.contains(&key) {
            declared.insert(key, value);
        } else {
            debug!("Step {} returned undeclared output '{}', dropping it", step.name, key);
        }
    }

    for key in &step.produces_outputs {
        if !declared.contains(key) {
            warnings.push(format!("declared output '{}' was not produced", key));
        }
    }
    declared
}

fn completion_params(config: &StepConfig) -> CompletionParams {
    config
        .params
        .iter()
        .filter(|(key, _)| !RESERVED_PARAMS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn append_knowledge(prompt: &mut String, knowledge: &[KnowledgeDocument]) {
    if knowledge.is_empty() {
        return;
    }
    prompt.push_str("\n\nREFERENCE DOCUMENTS:\n");
    for doc in knowledge {
        prompt.push_str(&format!("\n### {}\n{}\n", doc.id, doc.content.trim()));
    }
}

fn title_from_body(body: &str) -> String {
    body.lines()
        .map(|line| line.trim().trim_start_matches('#').trim())
        .find(|line| !line.is_empty())
        .unwrap_or("Untitled")
        .to_string()
}

fn heading_regex() -> &'static Regex {
    static HEADING: OnceLock<Regex> = OnceLock::new();
    HEADING.get_or_init(|| {
        Regex::new(r"(?m)^#{1,6}[ \t]+(.+?)[ \t#]*$").expect("heading pattern is valid")
    })
}

/// `"LinkedIn Post:"` -> `"linkedin_post"`
fn normalize_heading(heading: &str) -> String {
    heading
        .trim()
        .trim_matches(|c: char| c == '*' || c == ':')
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Split a markdown response into sections keyed by normalized heading
///
/// Only headings naming one of `keys` start a section; other headings stay
/// part of the surrounding section. Empty sections are left out.
pub fn split_sections(response: &str, keys: &[String]) -> PipelineContext {
    let headings: Vec<(String, usize, usize)> = heading_regex()
        .captures_iter(response)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let key = normalize_heading(caps.get(1)?.as_str());
            keys.contains(&key)
                .then(|| (key, whole.start(), whole.end()))
        })
        .collect();

    let mut sections = PipelineContext::new();
    for (i, (key, _, body_start)) in headings.iter().enumerate() {
        let body_end = headings
            .get(i + 1)
            .map(|(_, start, _)| *start)
            .unwrap_or(response.len());
        let body = response[*body_start..body_end].trim();
        if !body.is_empty() && !sections.contains(key) {
            sections.insert(key.clone(), body);
        }
    }
    sections
}
