//! Runtime values seen by template actions

use super::timefmt::{format_duration, Time};
use crate::error::{Error, Result};
use crate::types::JsonValue;
use reqwest::header::HeaderMap;
use serde_json::json;
use url::Url;

/// A value produced while evaluating a template
#[derive(Debug, Clone)]
pub enum Value {
    /// Anything decoded from JSON, plus strings, numbers and booleans built by functions
    Json(JsonValue),
    Time(Time),
    /// Nanoseconds
    Duration(i64),
    Header(HeaderMap),
    Url(Url),
    /// Decoded query string, in order
    Query(Vec<(String, String)>),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn nil() -> Self {
        Value::Json(JsonValue::Null)
    }

    pub fn string(s: impl Into<String>) -> Self {
        Value::Json(JsonValue::String(s.into()))
    }

    pub fn int(n: i64) -> Self {
        Value::Json(json!(n))
    }

    pub fn float(n: f64) -> Self {
        Value::Json(json!(n))
    }

    pub fn bool(b: bool) -> Self {
        Value::Json(JsonValue::Bool(b))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Json(JsonValue::Null) => "nil",
            Value::Json(JsonValue::Bool(_)) => "bool",
            Value::Json(JsonValue::Number(n)) if n.is_f64() => "float64",
            Value::Json(JsonValue::Number(_)) => "int",
            Value::Json(JsonValue::String(_)) => "string",
            Value::Json(JsonValue::Array(_)) => "array",
            Value::Json(JsonValue::Object(_)) => "map",
            Value::Time(_) => "time",
            Value::Duration(_) => "duration",
            Value::Header(_) => "header",
            Value::Url(_) => "url",
            Value::Query(_) => "query",
            Value::Bytes(_) => "bytes",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Json(JsonValue::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Json(JsonValue::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_u64().map(|u| u as i64))
                .or_else(|| n.as_f64().map(|f| f as i64)),
            Value::Duration(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Json(JsonValue::Number(n)) => n.as_f64(),
            _ => None,
        }
    }

    /// Truthiness used by `if`, `and`, `or` and `not`
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Json(JsonValue::Null) => false,
            Value::Json(JsonValue::Bool(b)) => *b,
            Value::Json(JsonValue::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            Value::Json(JsonValue::String(s)) => !s.is_empty(),
            Value::Json(JsonValue::Array(a)) => !a.is_empty(),
            Value::Json(JsonValue::Object(o)) => !o.is_empty(),
            Value::Duration(d) => *d != 0,
            Value::Header(h) => !h.is_empty(),
            Value::Query(q) => !q.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::Time(_) | Value::Url(_) => true,
        }
    }

    /// Convert to a JSON value, used by `toJSON` and typed transform values
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Json(v) => v.clone(),
            Value::Header(h) => header_to_json(h),
            Value::Query(q) => query_to_json(q),
            other => JsonValue::String(other.render()),
        }
    }

    /// Render the value the way an action prints it
    pub fn render(&self) -> String {
        match self {
            Value::Json(v) => render_json(v),
            Value::Time(t) => t.to_string(),
            Value::Duration(d) => format_duration(*d),
            Value::Header(h) => header_to_json(h).to_string(),
            Value::Url(u) => u.to_string(),
            Value::Query(q) => url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(q.iter())
                .finish(),
            Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        }
    }

    // ========================================================================
    // Field and method access
    // ========================================================================

    /// Evaluate `.name` on this value, with `args` when used as a method call
    pub fn access(&self, name: &str, args: &[Value]) -> Result<Value> {
        match self {
            Value::Json(JsonValue::Object(map)) if args.is_empty() => map
                .get(name)
                .cloned()
                .map(Value::Json)
                .ok_or_else(|| Error::undefined_var(format!("map has no entry for key {name:?}"))),
            Value::Json(JsonValue::Null) => Err(Error::executing(format!(
                "nil pointer evaluating .{name}"
            ))),
            Value::Header(h) => header_access(h, name, args),
            Value::Query(q) => query_access(q, name, args),
            Value::Url(u) => url_access(u, name),
            Value::Time(t) => time_access(t, name, args),
            Value::Duration(d) => match name {
                "Seconds" => Ok(Value::float(*d as f64 / 1e9)),
                "Milliseconds" => Ok(Value::int(*d / 1_000_000)),
                "String" => Ok(Value::string(format_duration(*d))),
                _ => Err(no_field(name, self)),
            },
            _ => Err(no_field(name, self)),
        }
    }
}

fn no_field(name: &str, v: &Value) -> Error {
    Error::executing(format!("can't evaluate field {name} in type {}", v.type_name()))
}

fn one_string_arg<'a>(name: &str, args: &'a [Value]) -> Result<&'a str> {
    match args {
        [v] => v
            .as_str()
            .ok_or_else(|| Error::executing(format!("{name}: expected a string argument"))),
        _ => Err(Error::executing(format!(
            "wrong number of args for {name}: want 1 got {}",
            args.len()
        ))),
    }
}

fn header_access(h: &HeaderMap, name: &str, args: &[Value]) -> Result<Value> {
    if name == "Get" {
        let key = one_string_arg(name, args)?;
        let value = h
            .get(key)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        return Ok(Value::string(value));
    }
    if name == "Values" {
        let key = one_string_arg(name, args)?;
        return Ok(Value::Json(JsonValue::Array(header_values(h, key))));
    }
    if !args.is_empty() {
        return Err(Error::executing(format!("header has no method {name}")));
    }
    let values = header_values(h, name);
    if values.is_empty() {
        return Err(Error::undefined_var(format!("map has no entry for key {name:?}")));
    }
    Ok(Value::Json(JsonValue::Array(values)))
}

fn header_values(h: &HeaderMap, key: &str) -> Vec<JsonValue> {
    h.get_all(key)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|v| JsonValue::String(v.to_string()))
        .collect()
}

/// Header names are canonicalised (`x-foo` becomes `X-Foo`)
pub fn canonical_header_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => {
                    first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

fn header_to_json(h: &HeaderMap) -> JsonValue {
    let mut map = serde_json::Map::new();
    for key in h.keys() {
        map.insert(
            canonical_header_name(key.as_str()),
            JsonValue::Array(header_values(h, key.as_str())),
        );
    }
    JsonValue::Object(map)
}

fn query_access(q: &[(String, String)], name: &str, args: &[Value]) -> Result<Value> {
    match name {
        "Get" => {
            let key = one_string_arg(name, args)?;
            let value = q
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .unwrap_or_default();
            Ok(Value::string(value))
        }
        "Has" => {
            let key = one_string_arg(name, args)?;
            Ok(Value::bool(q.iter().any(|(k, _)| k == key)))
        }
        "Encode" => Ok(Value::string(Value::Query(q.to_vec()).render())),
        _ if args.is_empty() => {
            let values: Vec<JsonValue> = q
                .iter()
                .filter(|(k, _)| k == name)
                .map(|(_, v)| JsonValue::String(v.clone()))
                .collect();
            if values.is_empty() {
                Err(Error::undefined_var(format!("map has no entry for key {name:?}")))
            } else {
                Ok(Value::Json(JsonValue::Array(values)))
            }
        }
        _ => Err(Error::executing(format!("query has no method {name}"))),
    }
}

fn query_to_json(q: &[(String, String)]) -> JsonValue {
    let mut map = serde_json::Map::new();
    for (k, v) in q {
        let entry = map
            .entry(k.clone())
            .or_insert_with(|| JsonValue::Array(Vec::new()));
        if let JsonValue::Array(values) = entry {
            values.push(JsonValue::String(v.clone()));
        }
    }
    JsonValue::Object(map)
}

/// Query pairs of a URL as a template value
pub fn url_query(u: &Url) -> Value {
    Value::Query(u.query_pairs().into_owned().collect())
}

fn url_access(u: &Url, name: &str) -> Result<Value> {
    let value = match name {
        "Host" => {
            let host = u.host_str().unwrap_or_default();
            match u.port() {
                Some(port) => format!("{host}:{port}"),
                None => host.to_string(),
            }
        }
        "Hostname" => u.host_str().unwrap_or_default().to_string(),
        "Scheme" => u.scheme().to_string(),
        "Path" => u.path().to_string(),
        "RawQuery" => u.query().unwrap_or_default().to_string(),
        "Fragment" => u.fragment().unwrap_or_default().to_string(),
        "String" => u.to_string(),
        "Query" => return Ok(url_query(u)),
        _ => return Err(no_field(name, &Value::Url(u.clone()))),
    };
    Ok(Value::string(value))
}

fn time_access(t: &Time, name: &str, args: &[Value]) -> Result<Value> {
    use chrono::{Datelike, Timelike};

    let at = &t.at;
    let value = match name {
        "Unix" => Value::int(at.timestamp()),
        "UnixMilli" => Value::int(at.timestamp_millis()),
        "UnixNano" => Value::int(at.timestamp_nanos_opt().unwrap_or(i64::MAX)),
        "Year" => Value::int(i64::from(at.year())),
        "Month" => Value::int(i64::from(at.month())),
        "Day" => Value::int(i64::from(at.day())),
        "Hour" => Value::int(i64::from(at.hour())),
        "Minute" => Value::int(i64::from(at.minute())),
        "Second" => Value::int(i64::from(at.second())),
        "YearDay" => Value::int(i64::from(at.ordinal())),
        "UTC" => Value::Time(t.to_utc()),
        "String" => Value::string(t.to_string()),
        "Format" => {
            let layout = one_string_arg(name, args)?;
            Value::string(t.format(super::timefmt::named_layout(layout)))
        }
        "Add" => match args {
            [Value::Duration(d)] => Value::Time(t.add_nanos(*d)),
            _ => return Err(Error::executing("Add expects a duration")),
        },
        _ => return Err(no_field(name, &Value::Time(t.clone()))),
    };
    Ok(value)
}

// ============================================================================
// Printing
// ============================================================================

/// Print a JSON value: strings unquoted, integral floats without a fraction
pub fn render_json(v: &JsonValue) -> String {
    match v {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (None, Some(u), _) => u.to_string(),
            (None, None, Some(f)) => format_float(f),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

pub fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e21 {
        format!("{f:.0}")
    } else {
        format!("{f}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_render_numbers() {
        assert_eq!(render_json(&json!(25)), "25");
        assert_eq!(render_json(&json!(1.0)), "1");
        assert_eq!(render_json(&json!(4.666)), "4.666");
        assert_eq!(render_json(&json!(null)), "");
    }

    #[test]
    fn test_header_get() {
        let mut h = HeaderMap::new();
        h.insert("foo", HeaderValue::from_static("bar"));
        let v = Value::Header(h);
        let got = v.access("Get", &[Value::string("Foo")]).unwrap();
        assert_eq!(got.render(), "bar");
        assert!(v.access("Missing", &[]).is_err());
    }

    #[test]
    fn test_url_fields() {
        let u = Url::parse("http://localhost:8080/api?bar=bazz").unwrap();
        let v = Value::Url(u);
        assert_eq!(v.access("Host", &[]).unwrap().render(), "localhost:8080");
        assert_eq!(v.access("Path", &[]).unwrap().render(), "/api");
        let q = v.access("Query", &[]).unwrap();
        assert_eq!(q.access("Get", &[Value::string("bar")]).unwrap().render(), "bazz");
    }

    #[test]
    fn test_missing_key_is_error() {
        let v = Value::Json(json!({"a": 1}));
        assert!(v.access("b", &[]).is_err());
        assert!(Value::nil().access("a", &[]).is_err());
    }

    #[test]
    fn test_canonical_header_name() {
        assert_eq!(canonical_header_name("x-api-key"), "X-Api-Key");
        assert_eq!(canonical_header_name("LINK"), "Link");
    }
}
