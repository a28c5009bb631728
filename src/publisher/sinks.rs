//! Publisher implementations

use super::types::{Event, Publisher};
use crate::error::{Error, Result};
use crate::types::JsonValue;
use async_trait::async_trait;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

// ============================================================================
// Stdout
// ============================================================================

/// Writes every event as one NDJSON line on stdout
#[derive(Debug, Default)]
pub struct StdoutPublisher {
    published: AtomicU64,
}

impl StdoutPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events written so far
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Publisher for StdoutPublisher {
    async fn publish(&self, event: Event) -> Result<()> {
        let line = event.to_json().to_string();
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{line}")
            .map_err(|e| Error::publish(format!("stdout write failed: {e}")))?;
        self.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

// ============================================================================
// Channel
// ============================================================================

/// Forwards events into a bounded tokio channel
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: mpsc::Sender<Event>,
}

impl ChannelPublisher {
    pub fn new(tx: mpsc::Sender<Event>) -> Self {
        Self { tx }
    }

    /// Publisher plus the receiving end of a channel of `capacity`
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl Publisher for ChannelPublisher {
    async fn publish(&self, event: Event) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| Error::publish("event channel closed"))
    }
}

// ============================================================================
// Collecting
// ============================================================================

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct CollectingPublisher {
    events: Mutex<Vec<Event>>,
}

impl CollectingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Decoded bodies of every event, in publish order
    pub fn bodies(&self) -> Vec<JsonValue> {
        self.events()
            .iter()
            .filter_map(|e| e.body().ok())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Publisher for CollectingPublisher {
    async fn publish(&self, event: Event) -> Result<()> {
        self.events
            .lock()
            .map_err(|_| Error::publish("collector lock poisoned"))?
            .push(event);
        Ok(())
    }
}
