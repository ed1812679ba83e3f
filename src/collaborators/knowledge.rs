//! Knowledge document stores

use crate::collaborators::{CollaboratorError, KnowledgeDocument, KnowledgeStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

const DOCUMENT_EXTENSIONS: &[&str] = &["md", "txt"];

/// Documents stored as `<dir>/<id>.md` or `<dir>/<id>.txt`
#[derive(Debug, Clone)]
pub struct DirectoryKnowledgeStore {
    root: PathBuf,
}

impl DirectoryKnowledgeStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn document_path(&self, id: &str) -> Option<PathBuf> {
        // Ids are plain names, never paths
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return None;
        }
        DOCUMENT_EXTENSIONS
            .iter()
            .map(|ext| self.root.join(format!("{}.{}", id, ext)))
            .find(|path| path.is_file())
    }
}

#[async_trait]
impl KnowledgeStore for DirectoryKnowledgeStore {
    async fn get_documents(
        &self,
        ids: &[String],
    ) -> Result<Vec<KnowledgeDocument>, CollaboratorError> {
        let mut documents = Vec::with_capacity(ids.len());

        for id in ids {
            let Some(path) = self.document_path(id) else {
                debug!("Knowledge document '{}' not found in {}", id, self.root.display());
                continue;
            };
            let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
                CollaboratorError::Internal(format!("Failed to read {}: {}", path.display(), e))
            })?;
            documents.push(KnowledgeDocument {
                id: id.clone(),
                content,
            });
        }

        Ok(documents)
    }
}

/// Knowledge documents held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryKnowledgeStore {
    documents: HashMap<String, String>,
}

impl InMemoryKnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, id: impl Into<String>, content: impl Into<String>) -> Self {
        self.documents.insert(id.into(), content.into());
        self
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn get_documents(
        &self,
        ids: &[String],
    ) -> Result<Vec<KnowledgeDocument>, CollaboratorError> {
        Ok(ids
            .iter()
            .filter_map(|id| {
                self.documents.get(id).map(|content| KnowledgeDocument {
                    id: id.clone(),
                    content: content.clone(),
                })
            })
            .collect())
    }
}
