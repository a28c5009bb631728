//! Transform configuration and the in-flight request envelope

use crate::error::{Error, Result};
use crate::template::canonical_header_name;
use crate::types::JsonValue;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

// ============================================================================
// Transformable
// ============================================================================

/// URL, headers and body of a request (or the body of a response) while
/// transforms run over it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transformable {
    pub url: Option<Url>,
    pub header: HeaderMap,
    /// `Null` when there is no body
    pub body: JsonValue,
}

impl Transformable {
    /// Envelope for an outgoing request
    pub fn request(url: Url, header: HeaderMap, body: JsonValue) -> Self {
        Self {
            url: Some(url),
            header,
            body,
        }
    }

    /// Envelope holding only a body, used for response transforms
    pub fn from_body(body: JsonValue) -> Self {
        Self {
            body,
            ..Default::default()
        }
    }

    pub fn has_body(&self) -> bool {
        match &self.body {
            JsonValue::Null => false,
            JsonValue::Object(m) => !m.is_empty(),
            _ => true,
        }
    }
}

// ============================================================================
// Namespaces and targets
// ============================================================================

/// Where a transform list runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Building a request from the config
    Request,
    /// Building the next page request from the last response
    Pagination,
    /// Post-processing a response body or split element
    Response,
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Namespace::Request => "request",
            Namespace::Pagination => "pagination",
            Namespace::Response => "response",
        })
    }
}

/// Field a transform writes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Dotted path inside the body
    Body(String),
    /// Canonical header name
    Header(String),
    /// URL query parameter
    UrlParam(String),
    /// The whole URL
    UrlValue,
}

impl Target {
    /// Parse `body.a.b`, `header.X-Foo`, `url.params.q` or `url.value`
    pub fn parse(target: &str) -> Result<Self> {
        let invalid = || Error::invalid_value("target", format!("invalid target: {target}"));
        if target == "url.value" {
            return Ok(Target::UrlValue);
        }
        if let Some(param) = target.strip_prefix("url.params.") {
            if param.is_empty() {
                return Err(invalid());
            }
            return Ok(Target::UrlParam(param.to_string()));
        }
        if let Some(name) = target.strip_prefix("header.") {
            if name.is_empty() {
                return Err(invalid());
            }
            return Ok(Target::Header(canonical_header_name(name)));
        }
        if let Some(path) = target.strip_prefix("body.") {
            if path.is_empty() || path.split('.').any(str::is_empty) {
                return Err(invalid());
            }
            return Ok(Target::Body(path.to_string()));
        }
        Err(invalid())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Target::Body(_) => "body",
            Target::Header(_) => "header",
            Target::UrlParam(_) => "url.params",
            Target::UrlValue => "url.value",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Body(p) => write!(f, "body.{p}"),
            Target::Header(h) => write!(f, "header.{h}"),
            Target::UrlParam(p) => write!(f, "url.params.{p}"),
            Target::UrlValue => f.write_str("url.value"),
        }
    }
}

/// How the rendered string is stored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    #[default]
    String,
    Int,
    Json,
}

// ============================================================================
// Config
// ============================================================================

/// Options shared by `set`, `append` and `delete`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformConfig {
    pub target: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub value_type: ValueType,
    #[serde(default)]
    pub fail_on_template_error: bool,
    #[serde(default)]
    pub do_not_log_failure: bool,
}

/// One list entry: a single-key map such as `{set: {...}}`
pub type TransformSpec = std::collections::BTreeMap<String, TransformConfig>;
