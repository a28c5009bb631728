//! Built-in template functions
//!
//! The table is fixed: templates referring to any other name fail to compile.

use super::timefmt::{self, named_layout, parse_duration, parse_time, Time};
use super::value::{render_json, Value};
use crate::error::{Error, Result};
use crate::types::JsonValue;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine as _;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use regex::Regex;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::sync::LazyLock;

/// Evaluation environment shared by every function call of one execution
#[derive(Debug, Clone, Copy)]
pub struct Env {
    pub now: DateTime<Utc>,
}

type Builtin = fn(&Env, Vec<Value>) -> Result<Value>;

const BUILTINS: &[(&str, Builtin)] = &[
    ("now", now),
    ("parseDuration", parse_duration_fn),
    ("parseDate", parse_date),
    ("parseDateInTZ", parse_date_in_tz),
    ("formatDate", format_date),
    ("parseTimestamp", |_, a| parse_timestamp(a, 1_000_000_000)),
    ("parseTimestampMilli", |_, a| parse_timestamp(a, 1_000_000)),
    ("parseTimestampNano", |_, a| parse_timestamp(a, 1)),
    ("getRFC5988Link", get_rfc5988_link),
    ("toInt", to_int),
    ("add", add),
    ("mul", mul),
    ("div", div),
    ("min", |_, a| min_max(a, Ordering::Less)),
    ("max", |_, a| min_max(a, Ordering::Greater)),
    ("hmac", |_, a| hmac_fn(a, false)),
    ("hmacBase64", |_, a| hmac_fn(a, true)),
    ("hash", |_, a| hash_fn(a, false)),
    ("hashBase64", |_, a| hash_fn(a, true)),
    ("base64Encode", |_, a| base64_encode(a, false)),
    ("base64EncodeNoPad", |_, a| base64_encode(a, true)),
    ("base64Decode", |_, a| base64_decode(a, false)),
    ("base64DecodeNoPad", |_, a| base64_decode(a, true)),
    ("hexDecode", hex_decode),
    ("join", join),
    ("sprintf", sprintf),
    ("printf", sprintf),
    ("print", print),
    ("urlEncode", url_encode),
    ("replaceAll", replace_all),
    ("toJSON", to_json),
    ("uuid", |_, _| Ok(Value::string(uuid::Uuid::new_v4().to_string()))),
    ("userAgent", user_agent_fn),
    ("index", index),
    ("len", len),
    ("eq", |_, a| compare_fn(a, |o| o == Ordering::Equal)),
    ("ne", |_, a| compare_fn(a, |o| o != Ordering::Equal)),
    ("lt", |_, a| compare_fn(a, |o| o == Ordering::Less)),
    ("le", |_, a| compare_fn(a, |o| o != Ordering::Greater)),
    ("gt", |_, a| compare_fn(a, |o| o == Ordering::Greater)),
    ("ge", |_, a| compare_fn(a, |o| o != Ordering::Less)),
    ("and", and),
    ("or", or),
    ("not", not),
];

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.iter().any(|(n, _)| *n == name)
}

pub fn call(name: &str, env: &Env, args: Vec<Value>) -> Result<Value> {
    let (_, f) = BUILTINS
        .iter()
        .find(|(n, _)| *n == name)
        .ok_or_else(|| Error::executing(format!("function {name:?} not defined")))?;
    f(env, args)
}

// ============================================================================
// Argument helpers
// ============================================================================

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<()> {
    if args.len() < min || args.len() > max {
        return Err(Error::executing(format!(
            "wrong number of args for {name}: got {}",
            args.len()
        )));
    }
    Ok(())
}

fn str_arg<'a>(name: &str, v: &'a Value) -> Result<&'a str> {
    v.as_str().ok_or_else(|| {
        Error::executing(format!(
            "{name}: expected string, got {}",
            v.type_name()
        ))
    })
}

fn int_arg(name: &str, v: &Value) -> Result<i64> {
    v.as_i64().ok_or_else(|| {
        Error::executing(format!("{name}: expected integer, got {}", v.type_name()))
    })
}

fn time_arg(name: &str, v: &Value) -> Result<Time> {
    match v {
        Value::Time(t) => Ok(t.clone()),
        other => Err(Error::executing(format!(
            "{name}: expected time, got {}",
            other.type_name()
        ))),
    }
}

fn concat(values: &[Value]) -> String {
    values.iter().map(Value::render).collect()
}

// ============================================================================
// Dates and durations
// ============================================================================

fn now(env: &Env, args: Vec<Value>) -> Result<Value> {
    arity("now", &args, 0, 1)?;
    let t = Time::utc(env.now);
    match args.first() {
        None => Ok(Value::Time(t)),
        Some(Value::Duration(d)) => Ok(Value::Time(t.add_nanos(*d))),
        Some(other) => Err(Error::executing(format!(
            "now: expected duration, got {}",
            other.type_name()
        ))),
    }
}

fn parse_duration_fn(_: &Env, args: Vec<Value>) -> Result<Value> {
    arity("parseDuration", &args, 1, 1)?;
    Ok(Value::Duration(parse_duration(str_arg(
        "parseDuration",
        &args[0],
    )?)?))
}

fn parse_date(_: &Env, args: Vec<Value>) -> Result<Value> {
    arity("parseDate", &args, 1, 2)?;
    let date = str_arg("parseDate", &args[0])?;
    let layout = match args.get(1) {
        Some(l) => named_layout(str_arg("parseDate", l)?),
        None => timefmt::RFC3339,
    };
    Ok(Value::Time(parse_time(layout, date)?.to_utc()))
}

fn parse_date_in_tz(_: &Env, args: Vec<Value>) -> Result<Value> {
    arity("parseDateInTZ", &args, 2, 3)?;
    let date = str_arg("parseDateInTZ", &args[0])?;
    let tz = str_arg("parseDateInTZ", &args[1])?;
    let layout = match args.get(2) {
        Some(l) => named_layout(str_arg("parseDateInTZ", l)?),
        None => timefmt::RFC3339,
    };
    let parsed = parse_time(layout, date)?;
    Ok(Value::Time(timefmt::wall_clock_in_zone(&parsed, tz)))
}

fn format_date(_: &Env, args: Vec<Value>) -> Result<Value> {
    arity("formatDate", &args, 1, 3)?;
    let t = time_arg("formatDate", &args[0])?;
    let layout = match args.get(1) {
        Some(l) => named_layout(str_arg("formatDate", l)?),
        None => timefmt::RFC3339,
    };
    let zoned = match args.get(2) {
        Some(tz) => t
            .in_zone(str_arg("formatDate", tz)?)
            .unwrap_or_else(|| t.to_utc()),
        None => t.to_utc(),
    };
    Ok(Value::string(zoned.format(layout)))
}

fn parse_timestamp(args: Vec<Value>, unit_nanos: i64) -> Result<Value> {
    arity("parseTimestamp", &args, 1, 1)?;
    let raw = match &args[0] {
        Value::Json(JsonValue::String(s)) => s.trim().parse::<i64>().unwrap_or(0),
        v => int_arg("parseTimestamp", v)?,
    };
    let nanos = i128::from(raw) * i128::from(unit_nanos);
    let secs = (nanos.div_euclid(1_000_000_000)) as i64;
    let sub = (nanos.rem_euclid(1_000_000_000)) as u32;
    let at = Utc
        .timestamp_opt(secs, sub)
        .single()
        .ok_or_else(|| Error::executing("parseTimestamp: timestamp out of range"))?;
    Ok(Value::Time(Time::utc(at)))
}

// ============================================================================
// Links
// ============================================================================

static LINK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([^>]*)>((?:\s*;\s*[^;,<]*)*)").expect("valid regex"));

fn get_rfc5988_link(_: &Env, args: Vec<Value>) -> Result<Value> {
    arity("getRFC5988Link", &args, 2, 2)?;
    let rel = str_arg("getRFC5988Link", &args[0])?;
    let links: Vec<String> = match &args[1] {
        Value::Json(JsonValue::Array(items)) => items.iter().map(render_json).collect(),
        other => vec![other.render()],
    };
    for link in &links {
        for cap in LINK_REGEX.captures_iter(link) {
            let params = cap.get(2).map_or("", |m| m.as_str());
            let matches = params.split(';').any(|param| {
                let Some((key, value)) = param.trim().split_once('=') else {
                    return false;
                };
                key.trim().eq_ignore_ascii_case("rel")
                    && value
                        .trim()
                        .trim_matches('"')
                        .split_whitespace()
                        .any(|r| r == rel)
            });
            if matches {
                return Ok(Value::string(cap.get(1).map_or("", |m| m.as_str())));
            }
        }
    }
    Ok(Value::string(""))
}

// ============================================================================
// Numbers
// ============================================================================

fn to_int(_: &Env, args: Vec<Value>) -> Result<Value> {
    arity("toInt", &args, 1, 1)?;
    let n = match &args[0] {
        Value::Json(JsonValue::String(s)) => s.trim().parse::<i64>().unwrap_or(0),
        Value::Json(JsonValue::Bool(b)) => i64::from(*b),
        v => v.as_i64().unwrap_or(0),
    };
    Ok(Value::int(n))
}

fn add(_: &Env, args: Vec<Value>) -> Result<Value> {
    let mut total: i64 = 0;
    for v in &args {
        total = total
            .checked_add(int_arg("add", v)?)
            .ok_or_else(|| Error::executing("add: integer overflow"))?;
    }
    Ok(Value::int(total))
}

fn mul(_: &Env, args: Vec<Value>) -> Result<Value> {
    arity("mul", &args, 2, 2)?;
    int_arg("mul", &args[0])?
        .checked_mul(int_arg("mul", &args[1])?)
        .map(Value::int)
        .ok_or_else(|| Error::executing("mul: integer overflow"))
}

fn div(_: &Env, args: Vec<Value>) -> Result<Value> {
    arity("div", &args, 2, 2)?;
    let a = int_arg("div", &args[0])?;
    let b = int_arg("div", &args[1])?;
    a.checked_div(b)
        .map(Value::int)
        .ok_or_else(|| Error::executing("div: integer divide by zero"))
}

/// Ordering between two values of compatible kinds
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Duration(x), Value::Duration(y)) => Some(x.cmp(y)),
        (Value::Time(x), Value::Time(y)) => Some(x.at.cmp(&y.at)),
        (Value::Json(JsonValue::String(x)), Value::Json(JsonValue::String(y))) => Some(x.cmp(y)),
        (Value::Json(JsonValue::Bool(x)), Value::Json(JsonValue::Bool(y))) => Some(x.cmp(y)),
        (Value::Json(JsonValue::Null), Value::Json(JsonValue::Null)) => Some(Ordering::Equal),
        (Value::Json(JsonValue::Number(x)), Value::Json(JsonValue::Number(y))) => {
            match (x.as_i64(), y.as_i64()) {
                (Some(i), Some(j)) => Some(i.cmp(&j)),
                _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
            }
        }
        _ => None,
    }
}

fn min_max(args: Vec<Value>, keep: Ordering) -> Result<Value> {
    arity("min/max", &args, 2, 2)?;
    let mut args = args;
    let b = args.pop().unwrap_or_else(Value::nil);
    let a = args.pop().unwrap_or_else(Value::nil);
    match compare(&a, &b) {
        Some(o) if o == keep || o == Ordering::Equal => Ok(a),
        Some(_) => Ok(b),
        None => Err(Error::executing(format!(
            "cannot compare {} and {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn compare_fn(args: Vec<Value>, accept: fn(Ordering) -> bool) -> Result<Value> {
    if args.len() < 2 {
        return Err(Error::executing("comparison needs two arguments"));
    }
    let first = &args[0];
    // eq with several arguments is true when any of them matches
    for other in &args[1..] {
        let o = compare(first, other).ok_or_else(|| {
            Error::executing(format!(
                "incompatible types for comparison: {} and {}",
                first.type_name(),
                other.type_name()
            ))
        })?;
        if accept(o) {
            return Ok(Value::bool(true));
        }
    }
    Ok(Value::bool(false))
}

fn and(_: &Env, args: Vec<Value>) -> Result<Value> {
    let mut last = Value::bool(true);
    for v in args {
        if !v.is_truthy() {
            return Ok(v);
        }
        last = v;
    }
    Ok(last)
}

fn or(_: &Env, args: Vec<Value>) -> Result<Value> {
    let mut last = Value::bool(false);
    for v in args {
        if v.is_truthy() {
            return Ok(v);
        }
        last = v;
    }
    Ok(last)
}

fn not(_: &Env, args: Vec<Value>) -> Result<Value> {
    arity("not", &args, 1, 1)?;
    Ok(Value::bool(!args[0].is_truthy()))
}

// ============================================================================
// Hashing and encoding
// ============================================================================

fn digest(alg: &str, data: &[u8]) -> Option<Vec<u8>> {
    match alg {
        "sha1" => Some(Sha1::digest(data).to_vec()),
        "sha256" => Some(Sha256::digest(data).to_vec()),
        _ => None,
    }
}

fn keyed_digest(alg: &str, key: &[u8], data: &[u8]) -> Option<Vec<u8>> {
    match alg {
        "sha1" => {
            let mut mac = Hmac::<Sha1>::new_from_slice(key).ok()?;
            mac.update(data);
            Some(mac.finalize().into_bytes().to_vec())
        }
        "sha256" => {
            let mut mac = Hmac::<Sha256>::new_from_slice(key).ok()?;
            mac.update(data);
            Some(mac.finalize().into_bytes().to_vec())
        }
        _ => None,
    }
}

fn encode_digest(bytes: Option<Vec<u8>>, base64: bool) -> Value {
    match bytes {
        Some(b) if base64 => Value::string(STANDARD.encode(b)),
        Some(b) => Value::string(hex::encode(b)),
        // unsupported algorithms render empty so the default applies
        None => Value::string(""),
    }
}

fn hmac_fn(args: Vec<Value>, base64: bool) -> Result<Value> {
    if args.len() < 2 {
        return Err(Error::executing("hmac: needs an algorithm and a key"));
    }
    let alg = str_arg("hmac", &args[0])?;
    let key = args[1].render();
    let data = concat(&args[2..]);
    Ok(encode_digest(
        keyed_digest(alg, key.as_bytes(), data.as_bytes()),
        base64,
    ))
}

fn hash_fn(args: Vec<Value>, base64: bool) -> Result<Value> {
    if args.is_empty() {
        return Err(Error::executing("hash: needs an algorithm"));
    }
    let alg = str_arg("hash", &args[0])?;
    let data = concat(&args[1..]);
    Ok(encode_digest(digest(alg, data.as_bytes()), base64))
}

fn base64_encode(args: Vec<Value>, no_pad: bool) -> Result<Value> {
    let data = concat(&args);
    if data.is_empty() {
        return Ok(Value::string(""));
    }
    let encoded = if no_pad {
        STANDARD_NO_PAD.encode(data)
    } else {
        STANDARD.encode(data)
    };
    Ok(Value::string(encoded))
}

fn base64_decode(args: Vec<Value>, no_pad: bool) -> Result<Value> {
    arity("base64Decode", &args, 1, 1)?;
    let input = args[0].render();
    let decoded = if no_pad {
        STANDARD_NO_PAD.decode(input.as_bytes())
    } else {
        STANDARD.decode(input.as_bytes())
    };
    Ok(match decoded {
        Ok(bytes) => Value::string(String::from_utf8_lossy(&bytes)),
        Err(_) => Value::string(""),
    })
}

fn hex_decode(_: &Env, args: Vec<Value>) -> Result<Value> {
    arity("hexDecode", &args, 1, 1)?;
    Ok(match hex::decode(args[0].render()) {
        Ok(bytes) => Value::Bytes(bytes),
        Err(_) => Value::string(""),
    })
}

// ============================================================================
// Strings
// ============================================================================

fn join(_: &Env, args: Vec<Value>) -> Result<Value> {
    arity("join", &args, 2, 2)?;
    let sep = str_arg("join", &args[1])?;
    Ok(Value::string(match &args[0] {
        Value::Json(JsonValue::Array(items)) => items
            .iter()
            .map(render_json)
            .collect::<Vec<_>>()
            .join(sep),
        other => other.render(),
    }))
}

fn print(_: &Env, args: Vec<Value>) -> Result<Value> {
    let mut out = String::new();
    for (i, v) in args.iter().enumerate() {
        // a space separates operands when neither side is a string
        if i > 0 && v.as_str().is_none() && args[i - 1].as_str().is_none() {
            out.push(' ');
        }
        out.push_str(&v.render());
    }
    Ok(Value::string(out))
}

fn url_encode(_: &Env, args: Vec<Value>) -> Result<Value> {
    arity("urlEncode", &args, 1, 1)?;
    let input = args[0].render();
    Ok(Value::string(
        url::form_urlencoded::byte_serialize(input.as_bytes()).collect::<String>(),
    ))
}

fn replace_all(_: &Env, args: Vec<Value>) -> Result<Value> {
    arity("replaceAll", &args, 3, 3)?;
    let old = str_arg("replaceAll", &args[0])?;
    let new = str_arg("replaceAll", &args[1])?;
    Ok(Value::string(args[2].render().replace(old, new)))
}

fn to_json(_: &Env, args: Vec<Value>) -> Result<Value> {
    arity("toJSON", &args, 1, 1)?;
    Ok(Value::string(serde_json::to_string(&args[0].to_json())?))
}

/// User agent sent with every request unless a transform overrides it
pub fn user_agent(extra: &[String]) -> String {
    let mut parts = vec![
        std::env::consts::OS.to_string(),
        std::env::consts::ARCH.to_string(),
    ];
    parts.extend(extra.iter().filter(|s| !s.is_empty()).cloned());
    format!("Solidafy-Poller/{} ({})", crate::VERSION, parts.join("; "))
}

fn user_agent_fn(_: &Env, args: Vec<Value>) -> Result<Value> {
    let extra: Vec<String> = args.iter().map(Value::render).collect();
    Ok(Value::string(user_agent(&extra)))
}

fn index(_: &Env, args: Vec<Value>) -> Result<Value> {
    let mut args = args.into_iter();
    let mut current = args
        .next()
        .ok_or_else(|| Error::executing("index: missing collection"))?;
    for key in args {
        current = match (&current, &key) {
            (Value::Json(JsonValue::Object(map)), Value::Json(JsonValue::String(k))) => {
                map.get(k).cloned().map_or_else(Value::nil, Value::Json)
            }
            (Value::Json(JsonValue::Array(items)), k) => {
                let i = k
                    .as_i64()
                    .ok_or_else(|| Error::executing("index: array index must be an integer"))?;
                let item = usize::try_from(i)
                    .ok()
                    .and_then(|i| items.get(i))
                    .ok_or_else(|| Error::executing(format!("index out of range: {i}")))?;
                Value::Json(item.clone())
            }
            (Value::Header(_) | Value::Query(_), Value::Json(JsonValue::String(k))) => {
                current.access(k, &[]).unwrap_or_else(|_| Value::nil())
            }
            (Value::Json(JsonValue::Null), _) => Value::nil(),
            (c, k) => {
                return Err(Error::executing(format!(
                    "can't index item of type {} with {}",
                    c.type_name(),
                    k.type_name()
                )))
            }
        };
    }
    Ok(current)
}

fn len(_: &Env, args: Vec<Value>) -> Result<Value> {
    arity("len", &args, 1, 1)?;
    let n = match &args[0] {
        Value::Json(JsonValue::String(s)) => s.len(),
        Value::Json(JsonValue::Array(a)) => a.len(),
        Value::Json(JsonValue::Object(o)) => o.len(),
        Value::Header(h) => h.keys_len(),
        Value::Query(q) => q.len(),
        Value::Bytes(b) => b.len(),
        other => {
            return Err(Error::executing(format!(
                "len of type {}",
                other.type_name()
            )))
        }
    };
    Ok(Value::int(n as i64))
}

// ============================================================================
// sprintf
// ============================================================================

fn sprintf(_: &Env, args: Vec<Value>) -> Result<Value> {
    let mut args = args.into_iter();
    let format = args
        .next()
        .ok_or_else(|| Error::executing("sprintf: missing format"))?;
    let format = str_arg("sprintf", &format)?.to_string();
    let mut values = args;
    let mut out = String::new();
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut flags = String::new();
        while let Some(f) = chars.peek().copied().filter(|f| "-+ 0#".contains(*f)) {
            flags.push(f);
            chars.next();
        }
        let mut width = String::new();
        while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
            width.push(d);
            chars.next();
        }
        let mut precision = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut p = String::new();
            while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                p.push(d);
                chars.next();
            }
            precision = Some(p.parse::<usize>().unwrap_or(0));
        }
        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };
        if verb == '%' {
            out.push('%');
            continue;
        }
        let Some(v) = values.next() else {
            out.push_str(&format!("%!{verb}(MISSING)"));
            continue;
        };
        let formatted = match verb {
            'v' | 's' => v.render(),
            'q' => serde_json::to_string(&v.render())?,
            'd' => match v.as_i64() {
                Some(n) if flags.contains('+') && n >= 0 => format!("+{n}"),
                Some(n) => n.to_string(),
                None => format!("%!d({})", v.render()),
            },
            'f' | 'F' => match v.as_f64() {
                Some(f) => format!("{:.*}", precision.unwrap_or(6), f),
                None => format!("%!f({})", v.render()),
            },
            'g' => v.as_f64().map_or_else(|| v.render(), super::value::format_float),
            'x' => match v.as_i64() {
                Some(n) => format!("{n:x}"),
                None => hex::encode(v.render()),
            },
            'X' => match v.as_i64() {
                Some(n) => format!("{n:X}"),
                None => hex::encode_upper(v.render()),
            },
            't' => v.is_truthy().to_string(),
            other => format!("%!{other}({})", v.render()),
        };
        let width: usize = width.parse().unwrap_or(0);
        let pad = width.saturating_sub(formatted.chars().count());
        if pad == 0 {
            out.push_str(&formatted);
        } else if flags.contains('-') {
            out.push_str(&formatted);
            out.push_str(&" ".repeat(pad));
        } else if flags.contains('0') && "dfFxX".contains(verb) {
            let (sign, digits) = match formatted.strip_prefix('-') {
                Some(rest) => ("-", rest.to_string()),
                None => ("", formatted),
            };
            out.push_str(sign);
            out.push_str(&"0".repeat(pad));
            out.push_str(&digits);
        } else {
            out.push_str(&" ".repeat(pad));
            out.push_str(&formatted);
        }
    }
    let extra: Vec<String> = values.map(|v| v.render()).collect();
    if !extra.is_empty() {
        out.push_str(&format!("%!(EXTRA {})", extra.join(", ")));
    }
    Ok(Value::string(out))
}
