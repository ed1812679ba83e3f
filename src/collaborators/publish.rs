//! Markdown file publisher

use crate::collaborators::{CollaboratorError, PublishReceipt, Publisher};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes each published document to `<dir>/<slug>.md`
#[derive(Debug, Clone)]
pub struct MarkdownPublisher {
    dir: PathBuf,
}

impl MarkdownPublisher {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn render(title: &str, body: &str, metadata: &BTreeMap<String, String>) -> String {
        let mut document = String::new();
        if !metadata.is_empty() {
            document.push_str("---\n");
            for (key, value) in metadata {
                document.push_str(&format!("{}: {}\n", key, value));
            }
            document.push_str("---\n\n");
        }
        document.push_str(&format!("# {}\n\n{}\n", title, body.trim()));
        document
    }
}

/// Lowercase, hyphen-separated file stem for a title
pub fn slugify(title: &str) -> String {
    let slug = title
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

#[async_trait]
impl Publisher for MarkdownPublisher {
    async fn publish(
        &self,
        title: &str,
        body: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<PublishReceipt, CollaboratorError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            CollaboratorError::Unavailable(format!(
                "Failed to create {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let path = self.dir.join(format!("{}.md", slugify(title)));
        tokio::fs::write(&path, Self::render(title, body, metadata))
            .await
            .map_err(|e| {
                CollaboratorError::Unavailable(format!("Failed to write {}: {}", path.display(), e))
            })?;

        info!("Published '{}' to {}", title, path.display());
        Ok(PublishReceipt {
            location: path.display().to_string(),
        })
    }
}
