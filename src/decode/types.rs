//! Content types for response decoding and request encoding

use crate::error::{Error, Result};
use crate::types::JsonValue;
use serde::{Deserialize, Deserializer};
use std::fmt;

/// Response body formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeAs {
    /// `application/json` (default)
    #[default]
    Json,
    /// `application/x-ndjson`, one JSON value per line
    Ndjson,
    /// `text/csv` with a header row
    Csv,
    /// `application/zip`, every entry read as concatenated JSON values
    Zip,
}

impl DecodeAs {
    /// Parse a MIME type, ignoring parameters such as `charset`
    pub fn parse(content_type: &str) -> Result<Self> {
        match essence(content_type).as_str() {
            "application/json" => Ok(Self::Json),
            "application/x-ndjson" => Ok(Self::Ndjson),
            "text/csv" => Ok(Self::Csv),
            "application/zip" => Ok(Self::Zip),
            _ => Err(Error::invalid_value(
                "response.decode_as",
                format!("content-type \"{content_type}\" is not supported"),
            )),
        }
    }

    /// Pick a decoder from a response `Content-Type`, falling back to JSON
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        content_type
            .and_then(|ct| Self::parse(ct).ok())
            .unwrap_or_default()
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Ndjson => "application/x-ndjson",
            Self::Csv => "text/csv",
            Self::Zip => "application/zip",
        }
    }
}

impl fmt::Display for DecodeAs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

impl<'de> Deserialize<'de> for DecodeAs {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Request body encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodeAs {
    /// `application/json` (default)
    #[default]
    Json,
    /// `application/x-www-form-urlencoded`, built from the URL query
    Form,
}

impl EncodeAs {
    pub fn parse(content_type: &str) -> Result<Self> {
        match essence(content_type).as_str() {
            "application/json" => Ok(Self::Json),
            "application/x-www-form-urlencoded" => Ok(Self::Form),
            _ => Err(Error::invalid_value(
                "request.encode_as",
                format!("content-type \"{content_type}\" is not supported"),
            )),
        }
    }

    /// Pick an encoder from a request `Content-Type`, falling back to JSON
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        content_type
            .and_then(|ct| Self::parse(ct).ok())
            .unwrap_or_default()
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Form => "application/x-www-form-urlencoded",
        }
    }
}

impl<'de> Deserialize<'de> for EncodeAs {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Trait for decoding response bodies into a JSON document
pub trait BodyDecoder: Send + Sync {
    /// Decode the raw body
    fn decode(&self, body: &[u8]) -> Result<JsonValue>;
}
