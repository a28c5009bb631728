//! YAML Loader module
//!
//! Parse source definitions from YAML files.
//!
//! # Overview
//!
//! The loader module provides:
//! - `SourceDefinition` - Declarative polling source as written in YAML
//! - `{{ env.* }}` / `{{ config.* }}` interpolation before parsing
//! - Loading functions that validate and compile definitions into
//!   [`SourceConfig`](crate::engine::SourceConfig)

mod interpolate;
mod parser;
mod types;

pub use interpolate::{has_placeholders, render, render_value, Interpolation};
pub use parser::{
    load_source_from_file, load_source_from_str, load_source_from_str_with,
    load_sources_from_file, load_sources_from_file_with, load_sources_from_str,
    load_sources_from_str_with, parse_definitions,
};
pub use types::{
    ChainDefinition, ChainResponseDefinition, ChainStepDefinition, RequestDefinition,
    ResponseDefinition, SourceDefinition,
};

#[cfg(test)]
mod tests;
