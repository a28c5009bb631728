//! Cursor field templates

use super::types::TransformContext;
use crate::template::ValueTemplate;
use crate::transform::Transformable;
use crate::types::{JsonObject, JsonValue};
use serde::Deserialize;
use tracing::debug;

/// One named cursor entry as written in a source config
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CursorEntry {
    pub value: ValueTemplate,
    #[serde(default)]
    pub default: Option<ValueTemplate>,
    /// Keep the previous value instead of storing an empty one
    #[serde(default = "default_true")]
    pub ignore_empty_value: bool,
}

fn default_true() -> bool {
    true
}

/// Ordered set of cursor entries evaluated against a transform context
#[derive(Debug, Clone, Default)]
pub struct Cursor {
    entries: Vec<(String, CursorEntry)>,
}

impl Cursor {
    pub fn new(entries: impl IntoIterator<Item = (String, CursorEntry)>) -> Self {
        let mut entries: Vec<_> = entries.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compute the next cursor map from `previous` and the context
    pub fn evaluate(&self, ctx: &TransformContext, previous: &JsonObject) -> JsonObject {
        let mut next = previous.clone();
        let tr = Transformable::default();
        for (name, entry) in &self.entries {
            let value = match entry.value.execute(ctx, &tr, entry.default.as_ref()) {
                Ok(v) => v,
                Err(e) => {
                    debug!(cursor = %name, error = %e, "cursor value could not be computed");
                    String::new()
                }
            };
            if !value.is_empty() || !entry.ignore_empty_value {
                next.insert(name.clone(), JsonValue::String(value));
            }
        }
        next
    }

    /// Re-evaluate and store the cursor on the context
    pub fn update(&self, ctx: &mut TransformContext) {
        if self.entries.is_empty() {
            return;
        }
        let next = self.evaluate(ctx, ctx.cursor());
        ctx.update_cursor(next);
    }
}
