//! Chain helpers: id extraction and `replace_with` resolution

use crate::context::{ResponseSnapshot, TransformContext};
use crate::error::{Error, Result};
use crate::template::canonical_header_name;
use crate::types::{JsonObject, JsonValue};
use jsonpath_rust::JsonPath;
use tracing::error;

const FIRST_RESPONSE: &str = "first_response";
const LAST_RESPONSE: &str = "last_response";
const PARENT_LAST_RESPONSE: &str = "parent_last_response";

/// Check that `replace` is a JSONPath expression
pub fn validate_replace(replace: &str) -> Result<()> {
    let _: JsonPath = JsonPath::try_from(replace)
        .map_err(|e| Error::invalid_value("chain.replace", format!("{replace:?}: {e}")))?;
    Ok(())
}

/// Ids selected by `replace` in a response body.
///
/// Numbers and strings are kept, array matches are flattened one level and
/// anything else is logged and skipped.
pub fn extract_ids(body: &JsonValue, replace: &str) -> Result<Vec<String>> {
    let path: JsonPath = JsonPath::try_from(replace)
        .map_err(|e| Error::json_path(format!("error while getting keys: {e}")))?;

    let mut ids = Vec::new();
    match path.find(body) {
        JsonValue::Array(matches) => {
            for found in &matches {
                collect_ids(found, &mut ids);
            }
        }
        JsonValue::Null => {}
        other => collect_ids(&other, &mut ids),
    }
    Ok(ids)
}

fn collect_ids(value: &JsonValue, ids: &mut Vec<String>) {
    match value {
        JsonValue::Array(items) => {
            for item in items {
                match id_text(item) {
                    Some(id) => ids.push(id),
                    None => error!("events must be a number or string, skipping"),
                }
            }
        }
        other => match id_text(other) {
            Some(id) => ids.push(id),
            None => error!(value = %other, "cannot collect ids from value"),
        },
    }
}

fn id_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ============================================================================
// replace_with
// ============================================================================

/// `replace_with: "<pattern>,<expression>"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceWith {
    pattern: String,
    expression: String,
}

impl ReplaceWith {
    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split(',').collect();
        if parts.len() != 2 {
            return Err(Error::invalid_value(
                "chain.replace_with",
                "invalid number of parameters inside replace_with",
            ));
        }
        Ok(Self {
            pattern: parts[0].trim().to_string(),
            expression: parts[1].trim().to_string(),
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Value substituted for the pattern.
    ///
    /// `.first_response.`, `.last_response.` and `.parent_last_response.`
    /// expressions walk that response's `header` and `body`; anything else is
    /// a literal.
    pub fn resolve(&self, ctx: &TransformContext) -> Result<String> {
        let expression = self.expression.as_str();
        let keys: Vec<&str> = match expression.strip_prefix('.') {
            Some(rest)
                if [FIRST_RESPONSE, LAST_RESPONSE, PARENT_LAST_RESPONSE]
                    .iter()
                    .any(|root| rest.starts_with(&format!("{root}."))) =>
            {
                rest.split('.').collect()
            }
            _ => return Ok(expression.to_string()),
        };

        let snapshot = match keys[0] {
            FIRST_RESPONSE => ctx.first_response(),
            LAST_RESPONSE => ctx.last_response(),
            _ => ctx.parent_last_response().ok_or_else(|| {
                Error::transform("parent_last_response is only available in chain steps")
            })?,
        };
        let doc = response_document(snapshot)?;
        walk(&doc, &keys[1..])
    }
}

fn response_document(snapshot: &ResponseSnapshot) -> Result<JsonValue> {
    if snapshot.body.is_null() {
        let url = snapshot
            .url
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        return Err(Error::transform(format!(
            "response body is empty for request url: {url}"
        )));
    }
    let mut header = JsonObject::new();
    for (name, value) in &snapshot.header {
        let name = canonical_header_name(name.as_str());
        if header.contains_key(&name) {
            continue;
        }
        header.insert(
            name,
            JsonValue::String(String::from_utf8_lossy(value.as_bytes()).into_owned()),
        );
    }
    let mut doc = JsonObject::new();
    doc.insert("header".to_string(), JsonValue::Object(header));
    doc.insert("body".to_string(), snapshot.body.clone());
    Ok(JsonValue::Object(doc))
}

fn walk(doc: &JsonValue, keys: &[&str]) -> Result<String> {
    let mut current = doc;
    for (depth, key) in keys.iter().enumerate() {
        let path = keys[..=depth].join(".");
        let Some(value) = current.get(*key).filter(|v| !v.is_null()) else {
            return Err(Error::transform(format!(
                "value of expression could not be determined for key {path}"
            )));
        };
        match value {
            JsonValue::String(s) => return Ok(s.clone()),
            JsonValue::Number(n) => return Ok(n.to_string()),
            JsonValue::Bool(b) => return Ok(b.to_string()),
            JsonValue::Object(_) => current = value,
            _ => {
                return Err(Error::transform(format!(
                    "unable to parse the value of the expression {path}: type is not handled"
                )))
            }
        }
    }
    Err(Error::transform("value of expression could not be determined"))
}
