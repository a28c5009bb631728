//! Checkpoint store implementations

use super::types::{CheckpointFile, CheckpointStore};
use crate::error::{Error, Result};
use crate::types::JsonObject;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

// ============================================================================
// File store
// ============================================================================

/// Checkpoints kept in one JSON file shared by every source.
///
/// The file is read once on open and rewritten on every save through a
/// temp file and a rename.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
    state: Arc<RwLock<CheckpointFile>>,
}

impl FileCheckpointStore {
    /// Open a checkpoint file, loading existing checkpoints if present
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::checkpoint(format!("Failed to read state file: {e}")))?;
            if contents.trim().is_empty() {
                CheckpointFile::new()
            } else {
                serde_json::from_str(&contents).map_err(|e| {
                    Error::checkpoint(format!("Failed to parse state file: {e}"))
                })?
            }
        } else {
            CheckpointFile::new()
        };

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(state)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, state: &CheckpointFile) -> Result<()> {
        let contents = serde_json::to_string_pretty(state)
            .map_err(|e| Error::checkpoint(format!("Failed to serialize state: {e}")))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::checkpoint(format!("Failed to create state dir: {e}")))?;
        }

        // Write to temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents)
            .await
            .map_err(|e| Error::checkpoint(format!("Failed to write state file: {e}")))?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| Error::checkpoint(format!("Failed to rename state file: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, source: &str) -> Result<Option<JsonObject>> {
        Ok(self.state.read().await.get(source).cloned())
    }

    async fn save(&self, source: &str, cursor: &JsonObject) -> Result<()> {
        let mut state = self.state.write().await;
        state.set(source, cursor.clone());
        self.persist(&state).await?;
        debug!(source, path = %self.path.display(), "checkpoint saved");
        Ok(())
    }
}

// ============================================================================
// Memory store
// ============================================================================

/// Checkpoints held in memory for the lifetime of the process
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    state: Arc<RwLock<CheckpointFile>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with one checkpoint
    pub fn with_checkpoint(source: &str, cursor: JsonObject) -> Self {
        let mut state = CheckpointFile::new();
        state.set(source, cursor);
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Copy of everything stored
    pub async fn snapshot(&self) -> CheckpointFile {
        self.state.read().await.clone()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, source: &str) -> Result<Option<JsonObject>> {
        Ok(self.state.read().await.get(source).cloned())
    }

    async fn save(&self, source: &str, cursor: &JsonObject) -> Result<()> {
        self.state.write().await.set(source, cursor.clone());
        Ok(())
    }
}
