//! Decoder implementations
//!
//! Each decoder handles a specific response format.

use super::types::{BodyDecoder, DecodeAs};
use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::io::{Cursor, Read};

impl DecodeAs {
    /// Decoder for this format
    pub fn decoder(&self) -> &'static dyn BodyDecoder {
        match self {
            Self::Json => &JsonDecoder,
            Self::Ndjson => &NdjsonDecoder,
            Self::Csv => &CsvDecoder,
            Self::Zip => &ZipDecoder,
        }
    }

    /// Decode a body in this format
    pub fn decode(&self, body: &[u8]) -> Result<Value> {
        self.decoder().decode(body)
    }
}

// ============================================================================
// JSON Decoder
// ============================================================================

/// Whole body as one JSON document
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl BodyDecoder for JsonDecoder {
    fn decode(&self, body: &[u8]) -> Result<Value> {
        serde_json::from_slice(body).map_err(|e| Error::Decode {
            message: format!("Failed to parse JSON: {e}"),
        })
    }
}

// ============================================================================
// NDJSON Decoder
// ============================================================================

/// Concatenated JSON values, returned as an array
#[derive(Debug, Clone, Copy, Default)]
pub struct NdjsonDecoder;

impl BodyDecoder for NdjsonDecoder {
    fn decode(&self, body: &[u8]) -> Result<Value> {
        let mut records = Vec::new();
        for (n, value) in serde_json::Deserializer::from_slice(body)
            .into_iter::<Value>()
            .enumerate()
        {
            let value = value.map_err(|e| Error::Decode {
                message: format!("Failed to parse NDJSON value {}: {e}", n + 1),
            })?;
            records.push(value);
        }
        Ok(Value::Array(records))
    }
}

// ============================================================================
// ZIP Decoder
// ============================================================================

/// Archive of JSON / NDJSON files; values of every entry, in archive order,
/// returned as one array
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipDecoder;

impl BodyDecoder for ZipDecoder {
    fn decode(&self, body: &[u8]) -> Result<Value> {
        let mut archive = zip::ZipArchive::new(Cursor::new(body)).map_err(|e| Error::Decode {
            message: format!("Failed to open zip archive: {e}"),
        })?;

        let mut records = Vec::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i).map_err(|e| Error::Decode {
                message: format!("Failed to read zip entry {i}: {e}"),
            })?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let mut contents = Vec::new();
            file.read_to_end(&mut contents).map_err(|e| Error::Decode {
                message: format!("Failed to read zip entry {name}: {e}"),
            })?;
            for value in serde_json::Deserializer::from_slice(&contents).into_iter::<Value>() {
                records.push(value.map_err(|e| Error::Decode {
                    message: format!("Failed to parse JSON in zip entry {name}: {e}"),
                })?);
            }
        }
        Ok(Value::Array(records))
    }
}

// ============================================================================
// CSV Decoder
// ============================================================================

/// CSV with a header row; every record becomes an object of strings
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvDecoder;

impl BodyDecoder for CsvDecoder {
    fn decode(&self, body: &[u8]) -> Result<Value> {
        let text = std::str::from_utf8(body).map_err(|e| Error::Decode {
            message: format!("CSV body is not UTF-8: {e}"),
        })?;
        let mut rows = split_records(text).into_iter();

        let Some(header_line) = rows.next() else {
            return Ok(Value::Array(Vec::new()));
        };
        let headers = parse_csv_line(&header_line, ',');

        let mut records = Vec::new();
        for (n, line) in rows.enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let fields = parse_csv_line(&line, ',');
            if fields.len() != headers.len() {
                return Err(Error::Decode {
                    message: format!(
                        "record on line {}: wrong number of fields (expected {}, got {})",
                        n + 2,
                        headers.len(),
                        fields.len()
                    ),
                });
            }
            let obj: Map<String, Value> = headers
                .iter()
                .cloned()
                .zip(fields.into_iter().map(Value::String))
                .collect();
            records.push(Value::Object(obj));
        }

        Ok(Value::Array(records))
    }
}

/// Split into records, keeping newlines that sit inside quotes
fn split_records(text: &str) -> Vec<String> {
    let mut records = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in text.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            '\n' if !in_quotes => {
                records.push(std::mem::take(&mut current).trim_end_matches('\r').to_string());
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        records.push(current.trim_end_matches('\r').to_string());
    }
    records
}

/// Parse a CSV line into fields
fn parse_csv_line(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '"' {
            if in_quotes {
                // Escaped quote
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                in_quotes = true;
            }
        } else if c == delimiter && !in_quotes {
            fields.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }

    fields.push(current);
    fields
}
