//! Common types used throughout the poller
//!
//! Shared type aliases, the HTTP method enum and serde helpers for
//! duration fields.

use crate::template::parse_duration;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// JSON object type
pub type JsonObject = serde_json::Map<String, JsonValue>;

// ============================================================================
// HTTP Types
// ============================================================================

/// HTTP method accepted by a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    #[serde(alias = "get")]
    GET,
    #[serde(alias = "post")]
    POST,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::GET => reqwest::Method::GET,
            Method::POST => reqwest::Method::POST,
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::GET => write!(f, "GET"),
            Method::POST => write!(f, "POST"),
        }
    }
}

// ============================================================================
// Durations
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Seconds(u64),
    Text(String),
}

/// Deserialize `1m30s`, `500ms` or an integer number of seconds
pub fn deserialize_duration<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    match RawDuration::deserialize(d)? {
        RawDuration::Seconds(s) => Ok(Duration::from_secs(s)),
        RawDuration::Text(text) => {
            let nanos = parse_duration(&text).map_err(serde::de::Error::custom)?;
            u64::try_from(nanos)
                .map(Duration::from_nanos)
                .map_err(|_| serde::de::Error::custom(format!("negative duration {text:?}")))
        }
    }
}

/// Optional variant of [`deserialize_duration`]
pub fn deserialize_opt_duration<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<Option<Duration>, D::Error> {
    deserialize_duration(d).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[derive(Deserialize)]
    struct Holder {
        #[serde(deserialize_with = "deserialize_duration")]
        d: Duration,
    }

    #[test_case("d: 1m30s", Duration::from_secs(90) ; "go style")]
    #[test_case("d: 500ms", Duration::from_millis(500) ; "millis")]
    #[test_case("d: 45", Duration::from_secs(45) ; "integer seconds")]
    fn test_deserialize_duration(yaml: &str, expected: Duration) {
        let h: Holder = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(h.d, expected);
    }

    #[test]
    fn test_deserialize_duration_rejects_negative() {
        assert!(serde_yaml::from_str::<Holder>("d: -1s").is_err());
        assert!(serde_yaml::from_str::<Holder>("d: soon").is_err());
    }

    #[test]
    fn test_method_conversion() {
        assert_eq!(reqwest::Method::from(Method::POST), reqwest::Method::POST);
        assert_eq!(Method::default().to_string(), "GET");
    }
}
