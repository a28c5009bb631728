//! Checkpoint types
//!
//! The checkpoint file is serialized to JSON and persisted between runs.

use crate::error::Result;
use crate::types::JsonObject;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Load/save interface for cursors.
///
/// A missing checkpoint is `Ok(None)`, never an error.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the cursor saved for `source`
    async fn load(&self, source: &str) -> Result<Option<JsonObject>>;

    /// Replace the cursor saved for `source`
    async fn save(&self, source: &str, cursor: &JsonObject) -> Result<()>;
}

/// On-disk layout of a checkpoint file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointFile {
    /// Cursor per source id
    #[serde(default)]
    pub sources: BTreeMap<String, JsonObject>,
}

impl CheckpointFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, source: &str) -> Option<&JsonObject> {
        self.sources.get(source)
    }

    pub fn set(&mut self, source: &str, cursor: JsonObject) {
        self.sources.insert(source.to_string(), cursor);
    }
}
