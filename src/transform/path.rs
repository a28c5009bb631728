//! Dotted-path access into JSON documents

use crate::error::{Error, Result};
use crate::types::{JsonObject, JsonValue};

/// Look up `a.b.c` inside `doc`
pub fn get_path<'a>(doc: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    path.split('.').try_fold(doc, |current, key| match current {
        JsonValue::Object(map) => map.get(key),
        _ => None,
    })
}

/// Store `value` at `a.b.c`, creating intermediate objects.
/// A `Null` document becomes an empty object first.
pub fn put_path(doc: &mut JsonValue, path: &str, value: JsonValue) -> Result<()> {
    if doc.is_null() {
        *doc = JsonValue::Object(JsonObject::new());
    }
    let mut keys = path.split('.').peekable();
    let mut current = doc;
    while let Some(key) = keys.next() {
        let JsonValue::Object(map) = current else {
            return Err(Error::transform(format!(
                "expected map at '{key}' while writing '{path}'"
            )));
        };
        if keys.peek().is_none() {
            map.insert(key.to_string(), value);
            return Ok(());
        }
        let next = map
            .entry(key.to_string())
            .or_insert_with(|| JsonValue::Object(JsonObject::new()));
        if next.is_null() {
            *next = JsonValue::Object(JsonObject::new());
        }
        current = next;
    }
    Ok(())
}

/// Remove `a.b.c`; returns whether anything was removed
pub fn delete_path(doc: &mut JsonValue, path: &str) -> bool {
    let (parent, last) = match path.rsplit_once('.') {
        Some((parent, last)) => (Some(parent), last),
        None => (None, path),
    };
    let container = match parent {
        Some(p) => get_path_mut(doc, p),
        None => Some(doc),
    };
    match container {
        Some(JsonValue::Object(map)) => map.remove(last).is_some(),
        _ => false,
    }
}

fn get_path_mut<'a>(doc: &'a mut JsonValue, path: &str) -> Option<&'a mut JsonValue> {
    path.split('.').try_fold(doc, |current, key| match current {
        JsonValue::Object(map) => map.get_mut(key),
        _ => None,
    })
}
