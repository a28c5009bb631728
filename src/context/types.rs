//! Per-interval scratch state threaded through templates and transforms

use crate::types::{JsonObject, JsonValue};
use reqwest::header::HeaderMap;
use serde_json::json;
use url::Url;

/// What templates can see of one HTTP response
#[derive(Debug, Clone, Default)]
pub struct ResponseSnapshot {
    pub status: u16,
    pub header: HeaderMap,
    /// URL actually fetched
    pub url: Option<Url>,
    /// Decoded body; `Null` until a response is recorded
    pub body: JsonValue,
    /// 0-based page index within the interval
    pub page: u64,
}

impl ResponseSnapshot {
    pub fn new(status: u16, header: HeaderMap, url: Url, body: JsonValue, page: u64) -> Self {
        Self {
            status,
            header,
            url: Some(url),
            body,
            page,
        }
    }

    /// JSON form of the snapshot, used by a bare `.last_response`
    pub fn to_json(&self) -> JsonValue {
        json!({
            "status_code": self.status,
            "page": self.page,
            "url": self.url.as_ref().map(ToString::to_string).unwrap_or_default(),
            "body": self.body,
        })
    }
}

/// Cursor, first/last event and first/last response for one polling interval.
///
/// The first event and first response are written once per interval; the last
/// ones are overwritten on every update. `clear_interval` resets everything
/// except the cursor.
#[derive(Debug, Clone)]
pub struct TransformContext {
    cursor: JsonObject,
    first_event: JsonValue,
    first_event_set: bool,
    last_event: JsonValue,
    first_response: ResponseSnapshot,
    first_response_set: bool,
    last_response: ResponseSnapshot,
    parent_last_response: Option<ResponseSnapshot>,
}

impl Default for TransformContext {
    fn default() -> Self {
        Self {
            cursor: JsonObject::new(),
            first_event: JsonValue::Object(JsonObject::new()),
            first_event_set: false,
            last_event: JsonValue::Object(JsonObject::new()),
            first_response: ResponseSnapshot::default(),
            first_response_set: false,
            last_response: ResponseSnapshot::default(),
            parent_last_response: None,
        }
    }
}

impl TransformContext {
    /// Create a context resuming from a persisted cursor
    pub fn new(cursor: JsonObject) -> Self {
        Self {
            cursor,
            ..Default::default()
        }
    }

    pub fn cursor(&self) -> &JsonObject {
        &self.cursor
    }

    pub fn update_cursor(&mut self, cursor: JsonObject) {
        self.cursor = cursor;
    }

    pub fn first_event(&self) -> &JsonValue {
        &self.first_event
    }

    pub fn last_event(&self) -> &JsonValue {
        &self.last_event
    }

    /// Record an emitted event; the first one of the interval is kept as `first_event`
    pub fn record_event(&mut self, event: &JsonValue) {
        if !self.first_event_set {
            self.first_event = event.clone();
            self.first_event_set = true;
        }
        self.last_event = event.clone();
    }

    pub fn update_last_event(&mut self, event: JsonValue) {
        self.last_event = event;
    }

    pub fn first_response(&self) -> &ResponseSnapshot {
        &self.first_response
    }

    pub fn last_response(&self) -> &ResponseSnapshot {
        &self.last_response
    }

    pub fn parent_last_response(&self) -> Option<&ResponseSnapshot> {
        self.parent_last_response.as_ref()
    }

    /// Store the first response of the interval; later calls are ignored
    pub fn update_first_response(&mut self, response: ResponseSnapshot) {
        if !self.first_response_set {
            self.first_response = response;
            self.first_response_set = true;
        }
    }

    pub fn update_last_response(&mut self, response: ResponseSnapshot) {
        self.last_response = response;
    }

    /// Reset interval-scoped fields; the cursor carries forward
    pub fn clear_interval(&mut self) {
        let cursor = std::mem::take(&mut self.cursor);
        *self = Self::new(cursor);
    }

    /// Context for a chain step: a copy of this one that can also see this
    /// context's last response as `parent_last_response`
    pub fn child(&self) -> Self {
        let mut child = self.clone();
        child.parent_last_response = Some(self.last_response.clone());
        child
    }

    /// Take over the events and cursor recorded by a chain step context
    pub fn adopt_events(&mut self, child: &TransformContext) {
        if !self.first_event_set && child.first_event_set {
            self.first_event = child.first_event.clone();
            self.first_event_set = true;
        }
        self.last_event = child.last_event.clone();
        self.cursor = child.cursor.clone();
    }
}
