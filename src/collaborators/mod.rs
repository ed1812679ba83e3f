//! External collaborators: transcription, completion, knowledge documents
//! and publication
//!
//! The pipeline core only talks to these traits. The implementations in
//! this module shell out to command-line tools or read the filesystem;
//! tests plug in scripted stubs.

pub mod command;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod publish;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use command::{CommandCompletionClient, CommandTranscriber};
pub use config::CommandClientConfig;
pub use error::CollaboratorError;
pub use knowledge::{DirectoryKnowledgeStore, InMemoryKnowledgeStore};
pub use publish::MarkdownPublisher;

/// Free-form completion parameters (temperature, max_tokens, ...)
pub type CompletionParams = BTreeMap<String, serde_json::Value>;

/// Text completion backend
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Complete a prompt with an optional model override
    async fn complete(
        &self,
        prompt: &str,
        model: Option<&str>,
        params: &CompletionParams,
    ) -> Result<String, CollaboratorError>;
}

/// Options passed to a transcription backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionOptions {
    pub language: Option<String>,

    pub model: Option<String>,

    /// Vocabulary hint built from knowledge documents
    pub prompt: Option<String>,
}

/// Result of a transcription call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,

    /// Timed segments, when the backend provides them
    pub segments: Option<serde_json::Value>,
}

/// Speech-to-text backend
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        audio: &Path,
        options: &TranscriptionOptions,
    ) -> Result<Transcript, CollaboratorError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub id: String,
    pub content: String,
}

/// Read-only store of reference documents
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Fetch documents by id; unknown ids are omitted from the result
    async fn get_documents(
        &self,
        ids: &[String],
    ) -> Result<Vec<KnowledgeDocument>, CollaboratorError>;
}

/// Where a published document ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub location: String,
}

/// Publication sink
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        title: &str,
        body: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<PublishReceipt, CollaboratorError>;
}

/// The set of backends a pipeline run talks to
#[derive(Clone)]
pub struct Collaborators {
    pub completion: Arc<dyn CompletionClient>,
    pub transcriber: Arc<dyn Transcriber>,
    pub knowledge: Arc<dyn KnowledgeStore>,
    pub publisher: Arc<dyn Publisher>,
}

impl Collaborators {
    pub fn new(
        completion: Arc<dyn CompletionClient>,
        transcriber: Arc<dyn Transcriber>,
        knowledge: Arc<dyn KnowledgeStore>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            completion,
            transcriber,
            knowledge,
            publisher,
        }
    }

    /// Command-line backends as configured in a pipeline file
    pub fn from_backends(
        completion: &CommandClientConfig,
        transcription: &CommandClientConfig,
        knowledge_dir: Option<&Path>,
        publish_dir: PathBuf,
    ) -> Self {
        let knowledge: Arc<dyn KnowledgeStore> = match knowledge_dir {
            Some(dir) => Arc::new(DirectoryKnowledgeStore::new(dir)),
            None => Arc::new(InMemoryKnowledgeStore::new()),
        };

        Self {
            completion: Arc::new(CommandCompletionClient::new(completion.clone())),
            transcriber: Arc::new(CommandTranscriber::new(transcription.clone())),
            knowledge,
            publisher: Arc::new(MarkdownPublisher::new(publish_dir)),
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
