//! Tests for YAML loader module

use super::*;
use crate::engine::ChainKind;
use crate::error::Error;
use crate::types::Method;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::io::Write;
use std::time::Duration;
use test_case::test_case;

fn no_env() -> Interpolation {
    Interpolation::new()
}

fn load(yaml: &str) -> crate::Result<crate::engine::SourceConfig> {
    load_source_from_str_with(yaml, &no_env())
}

// ============================================================================
// Basic Loading Tests
// ============================================================================

#[test]
fn test_load_minimal_source() {
    let yaml = r"
request:
  url: https://api.example.com/items
";
    let source = load(yaml).unwrap();
    assert_eq!(source.id, "https://api.example.com/items");
    assert_eq!(source.interval, Duration::from_secs(60));
    assert_eq!(source.root.request.method(), Method::GET);
    assert!(source.chain.is_empty());
    assert!(source.cursor.is_empty());
}

#[test]
fn test_load_full_source() {
    let yaml = r#"
id: items
interval: 1m30s
request:
  url: https://api.example.com/items
  method: post
  body:
    query: all
  timeout: 10s
  retry:
    max_attempts: 3
    wait_min: 500ms
    wait_max: 5s
  rate_limit:
    remaining: '[[ .last_response.header.Get "X-Rate-Limit-Remaining" ]]'
    reset: '[[ .last_response.header.Get "X-Rate-Limit-Reset" ]]'
  transforms:
    - set:
        target: body.since
        value: '[[ .cursor.since ]]'
        default: '[[ now (parseDuration "-1h") ]]'
response:
  split:
    target: body.items
  pagination:
    - set:
        target: body.page
        value: '[[ .last_response.body.next ]]'
        fail_on_template_error: true
cursor:
  since:
    value: '[[ .last_event.updated ]]'
"#;
    let source = load(yaml).unwrap();
    assert_eq!(source.id, "items");
    assert_eq!(source.interval, Duration::from_secs(90));
    assert_eq!(source.root.request.method(), Method::POST);
    assert_eq!(source.root.client.timeout, Duration::from_secs(10));
    assert_eq!(source.root.client.retry.max_attempts(), 3);
    assert!(source.root.client.rate_limiter.is_enabled());
    assert!(!source.root.response.pagination().is_none());
    assert!(!source.cursor.is_empty());
}

#[test]
fn test_load_sources_list() {
    let yaml = r"
sources:
  - id: a
    request:
      url: https://api.example.com/a
  - id: b
    interval: 5
    request:
      url: https://api.example.com/b
";
    let sources = load_sources_from_str_with(yaml, &no_env()).unwrap();
    assert_eq!(sources.len(), 2);
    assert_eq!(sources[1].id, "b");
    assert_eq!(sources[1].interval, Duration::from_secs(5));
}

#[test]
fn test_duplicate_source_ids_rejected() {
    let yaml = r"
sources:
  - request:
      url: https://api.example.com/a
  - request:
      url: https://api.example.com/a
";
    let err = load_sources_from_str_with(yaml, &no_env()).unwrap_err();
    assert!(err.to_string().contains("duplicate source id"));
}

#[test]
fn test_single_source_loader_rejects_lists() {
    let yaml = r"
sources:
  - id: a
    request: {url: https://api.example.com/a}
  - id: b
    request: {url: https://api.example.com/b}
";
    let err = load(yaml).unwrap_err();
    assert!(err.to_string().contains("expected exactly one source, found 2"));
}

#[test]
fn test_unknown_field_rejected() {
    let yaml = r"
request:
  url: https://api.example.com/items
  verb: GET
";
    assert!(matches!(load(yaml), Err(Error::Config { .. })));
}

// ============================================================================
// Interpolation Tests
// ============================================================================

#[test]
fn test_config_block_and_env_interpolation() {
    let yaml = r#"
config:
  host: api.example.com
  every: 30
request:
  url: "https://{{ config.host }}/items"
  headers:
    X-Token: "{{ env.API_TOKEN }}"
interval: "{{ config.every }}"
"#;
    let interpolation = Interpolation::new().with_env("API_TOKEN", "t0k3n");
    let source = load_source_from_str_with(yaml, &interpolation).unwrap();
    assert_eq!(source.root.request.url().as_str(), "https://api.example.com/items");
    assert_eq!(source.interval, Duration::from_secs(30));
}

#[test]
fn test_caller_config_overrides_file() {
    let yaml = r#"
config:
  host: api.example.com
request:
  url: "https://{{ config.host }}/items"
"#;
    let interpolation = Interpolation::new().with_config_value("host", json!("staging.example.com"));
    let source = load_source_from_str_with(yaml, &interpolation).unwrap();
    assert_eq!(source.root.request.url().host_str(), Some("staging.example.com"));
}

#[test]
fn test_undefined_placeholder_fails_load() {
    let yaml = r#"
request:
  url: "https://{{ config.host }}/items"
"#;
    assert!(matches!(load(yaml), Err(Error::UndefinedVariable { .. })));
}

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "id: from-file\nrequest:\n  url: https://api.example.com/x").unwrap();

    let sources = load_sources_from_file_with(file.path(), &no_env()).unwrap();
    assert_eq!(sources[0].id, "from-file");

    let err = load_sources_from_file_with("/nonexistent/source.yaml", &no_env()).unwrap_err();
    assert!(matches!(err, Error::FileNotFound { .. }));
}

// ============================================================================
// Validation Tests
// ============================================================================

#[test_case("interval: 0s\nrequest: {url: 'https://x.test/'}", "interval must be greater than 0"; "zero interval")]
#[test_case("request: {url: 'not a url'}", "request.url"; "invalid url")]
#[test_case("request: {url: 'https://x.test/', body: {a: 1}}", "body can't be used with method: GET"; "body with get")]
#[test_case("request: {url: 'https://x.test/', method: PUT}", "PUT"; "unsupported method")]
#[test_case("request: {url: 'https://x.test/', retry: {max_attempts: 0}}", "max_attempts"; "zero attempts")]
#[test_case("request: {url: 'https://x.test/', retry: {wait_min: 10s, wait_max: 1s}}", "wait_min"; "inverted waits")]
#[test_case("request: {url: 'https://x.test/', transforms: [{set: {target: url.value, value: x}}]}", "url.value"; "url value outside pagination")]
#[test_case("request: {url: 'https://x.test/', transforms: [{set: {target: body.a, value: '[[ .cursor.a '}}]}", "Template"; "bad template")]
#[test_case("request: {url: 'https://x.test/'}\nresponse: {split: {target: body.a, type: array, key_field: k}}", "key_field"; "key field on array")]
#[test_case("request: {url: 'https://x.test/'}\nresponse: {split: {target: body.a, type: string}}", "delimiter"; "string without delimiter")]
#[test_case("request: {url: 'https://x.test/'}\nresponse: {decode_as: application/xml}", "application/xml"; "unknown decoder")]
#[test_case("request: {url: 'https://x.test/'}\nauth: {basic: {user: u, password: p}, oauth2: {client: {id: a, secret: b}, token_url: 'https://t.test'}}", "only one kind of auth can be enabled"; "conflicting auth")]
fn test_invalid_source(yaml: &str, expected: &str) {
    let err = load(yaml).unwrap_err();
    assert!(
        err.to_string().contains(expected),
        "{err} does not mention {expected}"
    );
}

// ============================================================================
// Chain Tests
// ============================================================================

#[test]
fn test_load_chain() {
    let yaml = r#"
request:
  url: https://api.example.com/exports
chain:
  - step:
      request:
        url: https://api.example.com/exports/$.records[:].id
      replace: $.records[:].id
      replace_with: "$.token,.parent_last_response.body.token"
  - while:
      request:
        url: https://api.example.com/status/$.id
        retry:
          max_attempts: 3
      replace: $.id
      until: '[[ eq .last_response.body.status "done" ]]'
"#;
    let source = load(yaml).unwrap();
    assert_eq!(source.chain.len(), 2);
    assert_eq!(source.chain[0].kind, ChainKind::Step);
    assert_eq!(
        source.chain[0].replace_with.as_ref().map(|r| r.pattern()),
        Some("$.token")
    );
    assert_eq!(source.chain[1].kind, ChainKind::While);
    assert!(source.chain[0].auth.is_none());
}

#[test_case("- step: {request: {url: 'https://x.test/$.id'}}", "chain.replace"; "missing replace")]
#[test_case("- step: {request: {url: 'https://x.test/$.id'}, replace: $.id, until: 'true'}", "until can only be used with while"; "until on step")]
#[test_case("- while: {request: {url: 'https://x.test/$.id'}, replace: $.id}", "chain.while.until"; "while without until")]
#[test_case("- step: {request: {url: 'https://x.test/$.id'}, replace: $.id, replace_with: 'a,b,c'}", "invalid number of parameters inside replace_with"; "bad replace_with")]
#[test_case("- {}", "exactly one of step or while"; "empty chain entry")]
fn test_invalid_chain(chain: &str, expected: &str) {
    let yaml = format!("request: {{url: 'https://x.test/'}}\nchain:\n{chain}\n");
    let err = load(&yaml).unwrap_err();
    assert!(
        err.to_string().contains(expected),
        "{err} does not mention {expected}"
    );
}
