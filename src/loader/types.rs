//! Loader types
//!
//! Declarative source definition types for YAML parsing. Templates inside
//! these types are compiled while deserializing; everything else is checked
//! when the definition is compiled into a [`SourceConfig`](crate::engine::SourceConfig).

use crate::auth::AuthConfig;
use crate::context::CursorEntry;
use crate::decode::{DecodeAs, EncodeAs};
use crate::http::{RateLimitConfig, RetryConfig};
use crate::pagination::PaginationConfig;
use crate::split::SplitConfig;
use crate::template::ValueTemplate;
use crate::tracer::TracerConfig;
use crate::transform::TransformSpec;
use crate::types::{deserialize_duration, deserialize_opt_duration, JsonObject, Method};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

// ============================================================================
// Source Definition
// ============================================================================

/// One polling source as written in YAML
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceDefinition {
    /// Checkpoint key; defaults to the request URL
    #[serde(default)]
    pub id: Option<String>,

    /// Time between two polling intervals
    #[serde(default = "default_interval", deserialize_with = "deserialize_duration")]
    pub interval: Duration,

    #[serde(default)]
    pub auth: Option<AuthConfig>,

    pub request: RequestDefinition,

    #[serde(default)]
    pub response: ResponseDefinition,

    /// Dependent requests run after the root request
    #[serde(default)]
    pub chain: Vec<ChainDefinition>,

    /// Named cursor entries persisted between intervals
    #[serde(default)]
    pub cursor: BTreeMap<String, CursorEntry>,
}

fn default_interval() -> Duration {
    Duration::from_secs(60)
}

// ============================================================================
// Request / Response
// ============================================================================

/// `request` block
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestDefinition {
    pub url: String,

    #[serde(default)]
    pub method: Method,

    /// Static body, POST only
    #[serde(default)]
    pub body: Option<JsonObject>,

    /// Static headers sent before request transforms run
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub encode_as: Option<EncodeAs>,

    #[serde(default, deserialize_with = "deserialize_opt_duration")]
    pub timeout: Option<Duration>,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,

    #[serde(default)]
    pub transforms: Vec<TransformSpec>,

    #[serde(default)]
    pub tracer: Option<TracerConfig>,
}

/// `response` block of the root request
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseDefinition {
    #[serde(default)]
    pub decode_as: Option<DecodeAs>,

    #[serde(default)]
    pub transforms: Vec<TransformSpec>,

    #[serde(default)]
    pub split: Option<SplitConfig>,

    #[serde(default)]
    pub pagination: Option<PaginationConfig>,

    /// Keep the first root response visible as `.first_response`
    #[serde(default)]
    pub save_first_response: bool,
}

/// `response` block of a chain step
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainResponseDefinition {
    #[serde(default)]
    pub decode_as: Option<DecodeAs>,

    #[serde(default)]
    pub transforms: Vec<TransformSpec>,

    #[serde(default)]
    pub split: Option<SplitConfig>,
}

impl From<&ChainResponseDefinition> for ResponseDefinition {
    fn from(def: &ChainResponseDefinition) -> Self {
        Self {
            decode_as: def.decode_as,
            transforms: def.transforms.clone(),
            split: def.split.clone(),
            pagination: None,
            save_first_response: false,
        }
    }
}

// ============================================================================
// Chain
// ============================================================================

/// One entry of `chain`: exactly one of `step` or `while`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainDefinition {
    #[serde(default)]
    pub step: Option<ChainStepDefinition>,

    #[serde(default, rename = "while")]
    pub while_: Option<ChainStepDefinition>,
}

/// Body of a `step` or `while` chain entry
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainStepDefinition {
    /// Overrides the source auth for this step
    #[serde(default)]
    pub auth: Option<AuthConfig>,

    pub request: RequestDefinition,

    #[serde(default)]
    pub response: ChainResponseDefinition,

    /// JSONPath selecting ids in the previous response; also the text
    /// replaced by each id in this step's URL
    #[serde(default)]
    pub replace: String,

    /// `<pattern>,<expression>`
    #[serde(default)]
    pub replace_with: Option<String>,

    /// `while` only: repeat each request until this renders `true`
    #[serde(default)]
    pub until: Option<ValueTemplate>,
}
