//! Stores for resumable run state between `advance` calls

use crate::core::RunState;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Durable round-trip of a run's state
#[async_trait]
pub trait ResumeStore: Send + Sync {
    async fn load(&self, run_id: Uuid) -> Result<Option<RunState>>;

    async fn save(&self, state: &RunState) -> Result<()>;

    async fn remove(&self, run_id: Uuid) -> Result<()>;

    /// IDs of all stored runs
    async fn list(&self) -> Result<Vec<Uuid>>;
}

#[derive(Default)]
pub struct InMemoryResumeStore {
    states: RwLock<HashMap<Uuid, RunState>>,
}

impl InMemoryResumeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResumeStore for InMemoryResumeStore {
    async fn load(&self, run_id: Uuid) -> Result<Option<RunState>> {
        Ok(self.states.read().await.get(&run_id).cloned())
    }

    async fn save(&self, state: &RunState) -> Result<()> {
        self.states
            .write()
            .await
            .insert(state.run_id, state.clone());
        Ok(())
    }

    async fn remove(&self, run_id: Uuid) -> Result<()> {
        self.states.write().await.remove(&run_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Uuid>> {
        Ok(self.states.read().await.keys().copied().collect())
    }
}

/// One JSON file per run: `<dir>/<run_id>.json`
#[derive(Debug, Clone)]
pub struct FileResumeStore {
    dir: PathBuf,
}

impl FileResumeStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Store under the user's local data directory
    pub fn with_default_path() -> Self {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(data_dir.join("podcast-pipeline").join("runs"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, run_id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", run_id))
    }
}

#[async_trait]
impl ResumeStore for FileResumeStore {
    async fn load(&self, run_id: Uuid) -> Result<Option<RunState>> {
        let path = self.path_for(run_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };
        let state = serde_json::from_str(&content)
            .with_context(|| format!("Corrupt run state in {}", path.display()))?;
        Ok(Some(state))
    }

    async fn save(&self, state: &RunState) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let path = self.path_for(state.run_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(state)?;

        // Write then rename so a crash never leaves a half-written state
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    async fn remove(&self, run_id: Uuid) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(run_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<Uuid>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}
