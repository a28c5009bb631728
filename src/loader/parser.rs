//! YAML parser for source definitions
//!
//! A file holds either one source at the top level or a `sources:` list.
//! An optional top-level `config:` map feeds `{{ config.* }}` placeholders;
//! values passed by the caller win over the file's own.

use super::interpolate::{render_value, Interpolation};
use super::types::SourceDefinition;
use crate::engine::SourceConfig;
use crate::error::{Error, Result};
use crate::transform::TransformRegistry;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

const CONFIG_KEY: &str = "config";
const SOURCES_KEY: &str = "sources";

/// Load a file that must hold exactly one source
pub fn load_source_from_file(path: impl AsRef<Path>) -> Result<SourceConfig> {
    single(load_sources_from_file(path)?)
}

/// Load every source of a file, interpolating against the process environment
pub fn load_sources_from_file(path: impl AsRef<Path>) -> Result<Vec<SourceConfig>> {
    load_sources_from_file_with(path, &Interpolation::from_env())
}

pub fn load_sources_from_file_with(
    path: impl AsRef<Path>,
    interpolation: &Interpolation,
) -> Result<Vec<SourceConfig>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound {
                path: path.display().to_string(),
            }
        } else {
            Error::config(format!(
                "Failed to read source file '{}': {e}",
                path.display()
            ))
        }
    })?;
    load_sources_from_str_with(&content, interpolation)
}

/// Load a YAML string that must hold exactly one source
pub fn load_source_from_str(yaml: &str) -> Result<SourceConfig> {
    single(load_sources_from_str(yaml)?)
}

pub fn load_source_from_str_with(yaml: &str, interpolation: &Interpolation) -> Result<SourceConfig> {
    single(load_sources_from_str_with(yaml, interpolation)?)
}

pub fn load_sources_from_str(yaml: &str) -> Result<Vec<SourceConfig>> {
    load_sources_from_str_with(yaml, &Interpolation::from_env())
}

/// Parse, validate and compile every source of a YAML document
pub fn load_sources_from_str_with(
    yaml: &str,
    interpolation: &Interpolation,
) -> Result<Vec<SourceConfig>> {
    let definitions = parse_definitions(yaml, interpolation)?;
    let registry = TransformRegistry::standard();
    let many = definitions.len() > 1;

    let mut seen = HashSet::new();
    let mut sources = Vec::with_capacity(definitions.len());
    for (i, def) in definitions.iter().enumerate() {
        let source = SourceConfig::compile(def, &registry).map_err(|e| {
            if many {
                Error::config(format!("sources[{i}]: {e}"))
            } else {
                e
            }
        })?;
        if !seen.insert(source.id.clone()) {
            return Err(Error::config(format!("duplicate source id {:?}", source.id)));
        }
        sources.push(source);
    }
    Ok(sources)
}

/// Interpolate and deserialize the definitions of a YAML document without
/// compiling them
pub fn parse_definitions(yaml: &str, interpolation: &Interpolation) -> Result<Vec<SourceDefinition>> {
    let mut doc: Value = serde_yaml::from_str(yaml)?;
    let Value::Object(root) = &mut doc else {
        return Err(Error::config("source file must be a YAML mapping"));
    };

    let file_config = root.remove(CONFIG_KEY).unwrap_or(Value::Object(Map::new()));
    let env_only = Interpolation {
        env: interpolation.env.clone(),
        config: Value::Object(Map::new()),
    };
    let file_config = render_value(&file_config, &env_only)?;
    let ctx = env_only
        .with_config(file_config)
        .with_config(interpolation.config.clone());

    let doc = render_value(&doc, &ctx)?;
    let raw = match doc {
        Value::Object(mut root) if root.contains_key(SOURCES_KEY) => {
            if root.len() > 1 {
                let extra: Vec<_> = root.keys().filter(|k| *k != SOURCES_KEY).cloned().collect();
                return Err(Error::config(format!(
                    "unexpected keys next to sources: {}",
                    extra.join(", ")
                )));
            }
            match root.remove(SOURCES_KEY) {
                Some(Value::Array(items)) => items,
                _ => return Err(Error::invalid_value(SOURCES_KEY, "must be a list")),
            }
        }
        other => vec![other],
    };

    if raw.is_empty() {
        return Err(Error::config("no sources defined"));
    }
    raw.into_iter()
        .map(|value| {
            serde_json::from_value::<SourceDefinition>(value)
                .map_err(|e| Error::config(format!("Failed to parse source definition: {e}")))
        })
        .collect()
}

fn single(mut sources: Vec<SourceConfig>) -> Result<SourceConfig> {
    match sources.len() {
        1 => Ok(sources.remove(0)),
        n => Err(Error::config(format!("expected exactly one source, found {n}"))),
    }
}
