//! Published event and the publisher trait

use crate::error::{Error, Result};
use crate::types::{JsonObject, JsonValue};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;

/// One event as delivered downstream
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    /// Event body serialized as JSON text
    pub message: String,
    /// Cursor at publish time
    pub cursor: JsonObject,
}

impl Event {
    pub fn new(body: &JsonValue, cursor: &JsonObject) -> Result<Self> {
        Self::at(body, cursor, Utc::now())
    }

    pub fn at(body: &JsonValue, cursor: &JsonObject, timestamp: DateTime<Utc>) -> Result<Self> {
        let message = serde_json::to_string(body)
            .map_err(|e| Error::publish(format!("failed to encode event: {e}")))?;
        Ok(Self {
            timestamp,
            message,
            cursor: cursor.clone(),
        })
    }

    /// Decode the message back into the event body
    pub fn body(&self) -> Result<JsonValue> {
        Ok(serde_json::from_str(&self.message)?)
    }

    /// `{"@timestamp", "message"}` document written by line-oriented sinks
    pub fn to_json(&self) -> JsonValue {
        json!({
            "@timestamp": self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            "message": self.message,
        })
    }
}

/// Downstream sink for events.
///
/// Events are published one at a time in emission order. A failure is
/// reported for that event only.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, event: Event) -> Result<()>;
}
