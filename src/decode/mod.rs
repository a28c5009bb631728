//! Body codecs
//!
//! Supports: JSON, NDJSON, CSV and ZIP responses; JSON and form encoded requests
//!
//! # Overview
//!
//! Responses are decoded with the configured `decode_as` type, or the
//! response `Content-Type` when none is configured, falling back to JSON.
//! NDJSON, CSV and ZIP decode to a top-level array so every line, record or
//! archived value is processed as its own document.

mod decoders;
mod encoders;
mod types;

pub use decoders::{CsvDecoder, JsonDecoder, NdjsonDecoder, ZipDecoder};
pub use types::{BodyDecoder, DecodeAs, EncodeAs};

#[cfg(test)]
mod tests;
