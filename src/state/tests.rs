//! Tests for checkpoint stores

use super::*;
use crate::types::JsonObject;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::tempdir;

fn cursor(value: &str) -> JsonObject {
    let mut obj = JsonObject::new();
    obj.insert("timestamp".to_string(), json!(value));
    obj
}

// ============================================================================
// Memory Store Tests
// ============================================================================

#[tokio::test]
async fn test_memory_store_missing_is_none() {
    let store = MemoryCheckpointStore::new();
    assert!(store.load("users").await.unwrap().is_none());
}

#[tokio::test]
async fn test_memory_store_save_overwrites() {
    let store = MemoryCheckpointStore::new();
    store.save("users", &cursor("a")).await.unwrap();
    store.save("users", &cursor("b")).await.unwrap();
    store.save("groups", &cursor("c")).await.unwrap();

    assert_eq!(store.load("users").await.unwrap(), Some(cursor("b")));
    assert_eq!(store.load("groups").await.unwrap(), Some(cursor("c")));
    assert_eq!(store.snapshot().await.sources.len(), 2);
}

#[tokio::test]
async fn test_memory_store_seeded() {
    let store = MemoryCheckpointStore::with_checkpoint("users", cursor("2024-01-01"));
    assert_eq!(
        store.load("users").await.unwrap(),
        Some(cursor("2024-01-01"))
    );
}

// ============================================================================
// File Store Tests
// ============================================================================

#[tokio::test]
async fn test_file_store_missing_file() {
    let dir = tempdir().unwrap();
    let store = FileCheckpointStore::open(dir.path().join("state.json"))
        .await
        .unwrap();
    assert!(store.load("users").await.unwrap().is_none());
    assert!(!store.path().exists());
}

#[tokio::test]
async fn test_file_store_persists_across_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested/state.json");

    let store = FileCheckpointStore::open(&path).await.unwrap();
    store.save("users", &cursor("2024-01-01")).await.unwrap();
    store.save("groups", &cursor("2024-02-01")).await.unwrap();

    let reopened = FileCheckpointStore::open(&path).await.unwrap();
    assert_eq!(
        reopened.load("users").await.unwrap(),
        Some(cursor("2024-01-01"))
    );
    assert_eq!(
        reopened.load("groups").await.unwrap(),
        Some(cursor("2024-02-01"))
    );
    assert!(!path.with_extension("tmp").exists());
}

#[tokio::test]
async fn test_file_store_layout() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");
    let store = FileCheckpointStore::open(&path).await.unwrap();
    store.save("users", &cursor("x")).await.unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw, json!({"sources": {"users": {"timestamp": "x"}}}));
}

#[tokio::test]
async fn test_file_store_empty_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, "").unwrap();
    let store = FileCheckpointStore::open(&path).await.unwrap();
    assert!(store.load("users").await.unwrap().is_none());
}

#[tokio::test]
async fn test_file_store_corrupt_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, "{not json").unwrap();
    let err = FileCheckpointStore::open(&path).await.unwrap_err();
    assert!(matches!(err, crate::Error::Checkpoint { .. }));
}
