//! Editor critique/revision protocol
//!
//! One completion call produces revision notes followed by a marked revised
//! version. The response is split at the earliest separator phrase; when no
//! separator is present a second, narrower call asks the model to re-emit
//! just the two parts. If that also fails the step reports an unparseable
//! response instead of guessing.

use crate::collaborators::{CompletionClient, CompletionParams, KnowledgeDocument};
use crate::core::StepError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Separator phrases recognised between feedback and revised content
pub const DEFAULT_SEPARATORS: &[&str] = &[
    "REVISED CONTENT:",
    "IMPROVED VERSION:",
    "EDITED VERSION:",
    "REVISED VERSION:",
    "REVISED ARTICLE:",
    "FINAL VERSION:",
];

const FEEDBACK_LABEL: &str = "FEEDBACK:";

/// Feedback and revised content split out of one model response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorResult {
    pub feedback: String,
    pub revised_content: String,
}

/// What the editor is asked to review
#[derive(Debug, Clone, Copy, Default)]
pub struct EditorRequest<'a> {
    pub content: &'a str,
    pub persona: Option<&'a str>,
    pub style: Option<&'a str>,
    /// Extra instructions placed before the content
    pub instructions: Option<&'a str>,
    pub voice_samples: &'a [KnowledgeDocument],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorProtocol {
    separators: Vec<String>,
}

impl Default for EditorProtocol {
    fn default() -> Self {
        Self::with_separators(DEFAULT_SEPARATORS.iter().copied())
    }
}

impl EditorProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom separator list; empty phrases are ignored
    pub fn with_separators<I, S>(separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            separators: separators
                .into_iter()
                .map(Into::into)
                .filter(|s: &String| !s.is_empty())
                .collect(),
        }
    }

    pub fn separators(&self) -> &[String] {
        &self.separators
    }

    /// Separator requested in prompts
    fn primary_separator(&self) -> &str {
        self.separators
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_SEPARATORS[0])
    }

    /// Split a raw response at the earliest separator
    ///
    /// Matching is case-sensitive. When two separators start at the same
    /// offset the longer one wins. Returns `None` when no separator is
    /// present or nothing follows it.
    pub fn split_response(&self, raw: &str) -> Option<EditorResult> {
        let (offset, len) = self
            .separators
            .iter()
            .filter_map(|sep| raw.find(sep.as_str()).map(|offset| (offset, sep.len())))
            .min_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))?;

        let feedback = raw[..offset].trim();
        let revised_content = raw[offset + len..].trim();
        if revised_content.is_empty() {
            return None;
        }

        Some(EditorResult {
            feedback: feedback.to_string(),
            revised_content: revised_content.to_string(),
        })
    }

    /// Prompt for the critique-and-revise call
    pub fn build_prompt(&self, request: &EditorRequest<'_>) -> String {
        let persona = request.persona.unwrap_or("an experienced editor");
        let mut prompt = format!("You are {}.", persona);
        if let Some(style) = request.style {
            prompt.push_str(&format!(" The house style is: {}.", style));
        }
        prompt.push_str(
            "\n\nReview the content below. First write concise revision notes \
             explaining what to improve. Then write the complete revised version.\n",
        );
        prompt.push_str(&format!(
            "Put the line \"{}\" on its own line between your notes and the revised version.\n",
            self.primary_separator()
        ));

        if let Some(instructions) = request.instructions {
            prompt.push_str(&format!("\n{}\n", instructions.trim()));
        }

        if !request.voice_samples.is_empty() {
            prompt.push_str("\nMatch the voice of these samples:\n");
            for sample in request.voice_samples {
                prompt.push_str(&format!("\n### {}\n{}\n", sample.id, sample.content.trim()));
            }
        }

        prompt.push_str(&format!("\nCONTENT:\n{}\n", request.content));
        prompt
    }

    /// Prompt asking the model to re-emit an unparseable response in the fixed format
    pub fn build_fallback_prompt(&self, raw: &str) -> String {
        format!(
            "The editorial response below mixes revision notes and a revised text \
             without a clear marker. Re-emit it in exactly this format and add nothing else:\n\n\
             {feedback}\n<the revision notes>\n\n{separator}\n<the complete revised text>\n\n\
             RESPONSE:\n{raw}\n",
            feedback = FEEDBACK_LABEL,
            separator = self.primary_separator(),
            raw = raw
        )
    }

    /// Run the protocol against a completion backend
    pub async fn review(
        &self,
        client: &dyn CompletionClient,
        request: &EditorRequest<'_>,
        model: Option<&str>,
        params: &CompletionParams,
    ) -> Result<EditorResult, StepError> {
        let prompt = self.build_prompt(request);
        debug!("Editor prompt: {}", prompt);

        let raw = client.complete(&prompt, model, params).await?;
        if let Some(result) = self.split_response(&raw) {
            return Ok(result);
        }

        warn!("Editor response has no revision separator; asking for a structured re-emit");
        let retry = client
            .complete(&self.build_fallback_prompt(&raw), model, params)
            .await?;

        self.split_response(&retry)
            .map(|result| EditorResult {
                feedback: strip_feedback_label(&result.feedback),
                revised_content: result.revised_content,
            })
            .ok_or(StepError::UnparseableEditorResponse)
    }
}

fn strip_feedback_label(feedback: &str) -> String {
    feedback
        .strip_prefix(FEEDBACK_LABEL)
        .unwrap_or(feedback)
        .trim()
        .to_string()
}
