//! Placeholder interpolation for YAML configs
//!
//! Handles `{{ env.NAME }}` and `{{ config.key }}` before a definition is
//! deserialized. These double braces are resolved once at load time and never
//! clash with the `[[ ]]` delimiters of runtime templates.

use crate::error::{Error, Result};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// Regex for matching placeholders: {{ root.path }}
static PLACEHOLDER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_-]*)*)\s*\}\}")
        .expect("placeholder regex is valid")
});

/// Values placeholders may refer to
#[derive(Debug, Clone, Default)]
pub struct Interpolation {
    /// `env.*`
    pub env: Value,
    /// `config.*`
    pub config: Value,
}

impl Interpolation {
    /// Empty context; every placeholder is undefined
    pub fn new() -> Self {
        Self {
            env: Value::Object(Map::new()),
            config: Value::Object(Map::new()),
        }
    }

    /// Context over the current process environment
    pub fn from_env() -> Self {
        let env: Map<String, Value> = std::env::vars()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        Self {
            env: Value::Object(env),
            config: Value::Object(Map::new()),
        }
    }

    #[must_use]
    pub fn with_env(mut self, name: &str, value: &str) -> Self {
        if let Value::Object(env) = &mut self.env {
            env.insert(name.to_string(), Value::String(value.to_string()));
        }
        self
    }

    /// Overlay `config` values; later keys win
    #[must_use]
    pub fn with_config(mut self, config: Value) -> Self {
        merge(&mut self.config, config);
        self
    }

    /// Set one `config` value from a dotted key
    #[must_use]
    pub fn with_config_value(mut self, key: &str, value: Value) -> Self {
        let mut nested = value;
        for part in key.rsplit('.') {
            let mut obj = Map::new();
            obj.insert(part.to_string(), nested);
            nested = Value::Object(obj);
        }
        merge(&mut self.config, nested);
        self
    }

    /// Get a value by path (e.g., "config.api_key")
    pub fn get(&self, path: &str) -> Option<&Value> {
        let parts: Vec<&str> = path.split('.').collect();
        let root = match parts[0] {
            "env" => &self.env,
            "config" => &self.config,
            _ => return None,
        };
        get_nested_value(root, &parts[1..])
    }
}

fn merge(into: &mut Value, from: Value) {
    match (into, from) {
        (Value::Object(into), Value::Object(from)) => {
            for (k, v) in from {
                match into.get_mut(&k) {
                    Some(existing) if existing.is_object() && v.is_object() => merge(existing, v),
                    _ => {
                        into.insert(k, v);
                    }
                }
            }
        }
        (into, from) => *into = from,
    }
}

/// Get a nested value from a JSON value by path
fn get_nested_value<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for part in path {
        match current {
            Value::Object(map) => {
                current = map.get(*part)?;
            }
            _ => return None,
        }
    }
    Some(current)
}

/// Render a string, failing on undefined placeholders
pub fn render(template: &str, ctx: &Interpolation) -> Result<String> {
    let mut errors = Vec::new();
    let result = PLACEHOLDER_REGEX.replace_all(template, |cap: &regex::Captures<'_>| {
        let path = &cap[1];
        match ctx.get(path) {
            Some(value) => value_to_string(value),
            None => {
                errors.push(path.to_string());
                String::new()
            }
        }
    });

    if errors.is_empty() {
        Ok(result.into_owned())
    } else {
        Err(Error::undefined_var(errors.join(", ")))
    }
}

/// Check if a string contains placeholders
pub fn has_placeholders(s: &str) -> bool {
    PLACEHOLDER_REGEX.is_match(s)
}

/// Convert a JSON value to a string for substitution
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => value.to_string(),
    }
}

/// Render every string in a document.
///
/// A string made of a single placeholder takes the referenced value as is,
/// so `interval: "{{ config.interval }}"` can yield a number.
pub fn render_value(value: &Value, ctx: &Interpolation) -> Result<Value> {
    match value {
        Value::String(s) if has_placeholders(s) => {
            if let Some(cap) = PLACEHOLDER_REGEX.captures(s.trim()) {
                if cap.get(0).is_some_and(|m| m.len() == s.trim().len()) {
                    return ctx
                        .get(&cap[1])
                        .cloned()
                        .ok_or_else(|| Error::undefined_var(&cap[1]));
                }
            }
            Ok(Value::String(render(s, ctx)?))
        }
        Value::Object(map) => {
            let mut new_map = Map::new();
            for (k, v) in map {
                new_map.insert(k.clone(), render_value(v, ctx)?);
            }
            Ok(Value::Object(new_map))
        }
        Value::Array(arr) => Ok(Value::Array(
            arr.iter()
                .map(|v| render_value(v, ctx))
                .collect::<Result<_>>()?,
        )),
        _ => Ok(value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Interpolation {
        Interpolation::new()
            .with_env("API_TOKEN", "secret")
            .with_config(json!({"host": "api.example.com", "limit": 100, "auth": {"user": "bob"}}))
    }

    #[test]
    fn test_env_and_config_substitution() {
        let result = render("https://{{ config.host }}/items?token={{env.API_TOKEN}}", &ctx()).unwrap();
        assert_eq!(result, "https://api.example.com/items?token=secret");
    }

    #[test]
    fn test_nested_config() {
        assert_eq!(render("{{ config.auth.user }}", &ctx()).unwrap(), "bob");
    }

    #[test]
    fn test_undefined_placeholder() {
        let err = render("{{ config.missing }} {{ env.NOPE }}", &ctx()).unwrap_err();
        assert!(err.to_string().contains("config.missing, env.NOPE"));
    }

    #[test]
    fn test_unknown_root_is_undefined() {
        assert!(render("{{ partition.id }}", &ctx()).is_err());
    }

    #[test]
    fn test_runtime_templates_untouched() {
        let s = "[[ .last_response.body.next ]]";
        assert_eq!(render(s, &ctx()).unwrap(), s);
    }

    #[test]
    fn test_whole_placeholder_keeps_type() {
        let input = json!({"max": "{{ config.limit }}", "text": "n={{ config.limit }}"});
        let out = render_value(&input, &ctx()).unwrap();
        assert_eq!(out, json!({"max": 100, "text": "n=100"}));
    }

    #[test]
    fn test_config_value_overrides() {
        let ctx = ctx().with_config_value("auth.user", json!("alice"));
        assert_eq!(render("{{ config.auth.user }}", &ctx).unwrap(), "alice");
        assert_eq!(render("{{ config.host }}", &ctx).unwrap(), "api.example.com");
    }
}
