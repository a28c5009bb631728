//! Split configuration

use crate::transform::TransformSpec;
use serde::Deserialize;
use std::fmt;

/// How the value at a split target is decomposed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitKind {
    #[default]
    Array,
    Map,
    String,
}

impl fmt::Display for SplitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SplitKind::Array => "array",
            SplitKind::Map => "map",
            SplitKind::String => "string",
        })
    }
}

/// `response.split` block, nested through `split`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SplitConfig {
    /// `body.<path>` of the value to split
    pub target: String,

    #[serde(default, rename = "type")]
    pub kind: SplitKind,

    /// Response transforms applied to every produced element
    #[serde(default)]
    pub transforms: Vec<TransformSpec>,

    /// Split applied to each produced element
    #[serde(default)]
    pub split: Option<Box<SplitConfig>>,

    #[serde(default)]
    pub keep_parent: bool,

    /// Map splits only: field receiving the entry key
    #[serde(default)]
    pub key_field: Option<String>,

    /// String splits only
    #[serde(default)]
    pub delimiter: Option<String>,

    #[serde(default)]
    pub ignore_empty_value: bool,
}
