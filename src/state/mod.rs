//! Checkpoint persistence
//!
//! Handles loading and saving the cursor of each source so polling resumes
//! where it stopped instead of replaying history.
//!
//! # Overview
//!
//! The state module provides:
//! - `CheckpointStore` - load/save interface keyed by source id
//! - `FileCheckpointStore` - JSON file with atomic writes
//! - `MemoryCheckpointStore` - process-local store for tests and one-shot runs

mod store;
mod types;

pub use store::{FileCheckpointStore, MemoryCheckpointStore};
pub use types::{CheckpointFile, CheckpointStore};

#[cfg(test)]
mod tests;
