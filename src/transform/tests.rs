//! Tests for the transform module

use super::*;
use crate::context::{ResponseSnapshot, TransformContext};
use pretty_assertions::assert_eq;
use reqwest::header::HeaderMap;
use serde_json::json;
use test_case::test_case;
use url::Url;

fn build(namespace: Namespace, yaml: &str) -> crate::Result<Vec<Transform>> {
    let specs: Vec<TransformSpec> = serde_yaml::from_str(yaml).expect("valid yaml");
    TransformRegistry::standard().build(namespace, &specs)
}

fn request(url: &str) -> Transformable {
    Transformable::request(Url::parse(url).unwrap(), HeaderMap::new(), serde_json::Value::Null)
}

// ============================================================================
// Target Tests
// ============================================================================

#[test_case("body.a.b", Target::Body("a.b".into()))]
#[test_case("header.x-api-key", Target::Header("X-Api-Key".into()))]
#[test_case("url.params.page", Target::UrlParam("page".into()))]
#[test_case("url.value", Target::UrlValue)]
fn test_target_parse(raw: &str, expected: Target) {
    assert_eq!(Target::parse(raw).unwrap(), expected);
}

#[test_case("cursor.x")]
#[test_case("body.")]
#[test_case("body.a..b")]
#[test_case("url.params.")]
#[test_case("header.")]
fn test_target_parse_invalid(raw: &str) {
    assert!(Target::parse(raw).is_err());
}

// ============================================================================
// Registry Tests
// ============================================================================

#[test]
fn test_registry_rejects_unknown_transform() {
    let err = build(Namespace::Request, "- replace: {target: body.a, value: x}").unwrap_err();
    assert!(err.to_string().contains("does not exist"));
}

#[test]
fn test_registry_rejects_two_keys_in_one_entry() {
    let yaml = "- set: {target: body.a, value: x}\n  append: {target: body.b, value: y}";
    assert!(build(Namespace::Request, yaml).is_err());
}

#[test_case(Namespace::Response, "- set: {target: header.X-Foo, value: x}" ; "header in response")]
#[test_case(Namespace::Response, "- set: {target: url.params.p, value: x}" ; "params in response")]
#[test_case(Namespace::Request, "- set: {target: url.value, value: x}" ; "url value in request")]
#[test_case(Namespace::Pagination, "- append: {target: url.value, value: x}" ; "append url value")]
#[test_case(Namespace::Pagination, "- delete: {target: url.value}" ; "delete url value")]
fn test_registry_rejects_illegal_target(namespace: Namespace, yaml: &str) {
    assert!(build(namespace, yaml).is_err());
}

#[test]
fn test_registry_accepts_pagination_url_value_set() {
    let transforms = build(
        Namespace::Pagination,
        "- set: {target: url.value, value: '[[.last_response.body.next]]'}",
    )
    .unwrap();
    assert_eq!(transforms.len(), 1);
    assert_eq!(transforms[0].target, Target::UrlValue);
}

#[test]
fn test_registry_rejects_typed_header_value() {
    let err = build(
        Namespace::Request,
        "- set: {target: header.X-Count, value: '1', value_type: int}",
    )
    .unwrap_err();
    assert!(err.to_string().contains("only string values"));
}

#[test]
fn test_registry_rejects_bad_template() {
    assert!(build(Namespace::Request, "- set: {target: body.a, value: '[[ nope ]]'}").is_err());
    assert!(build(Namespace::Request, "- set: {target: body.a, value: '[[ .x '}").is_err());
}

// ============================================================================
// Set Tests
// ============================================================================

#[test]
fn test_set_body_and_header() {
    let transforms = build(
        Namespace::Request,
        r#"
- set: {target: body.filter.id, value: "[[.cursor.id]]"}
- set: {target: header.Authorization, value: "Bearer abc"}
"#,
    )
    .unwrap();
    let mut cursor = crate::types::JsonObject::new();
    cursor.insert("id".into(), json!("42"));
    let ctx = TransformContext::new(cursor);
    let mut tr = request("https://example.com/");

    let applied = run_all(&transforms, &ctx, &mut tr).unwrap();
    assert_eq!(applied, 2);
    assert_eq!(tr.body, json!({"filter": {"id": "42"}}));
    assert_eq!(tr.header.get("Authorization").unwrap(), "Bearer abc");
}

#[test_case("int", "7", json!(7))]
#[test_case("json", r#"{"a":[1,2]}"#, json!({"a": [1, 2]}))]
#[test_case("string", "7", json!("7"))]
fn test_set_value_type(value_type: &str, value: &str, expected: serde_json::Value) {
    let yaml = format!("- set: {{target: body.v, value: '{value}', value_type: {value_type}}}");
    let transforms = build(Namespace::Request, &yaml).unwrap();
    let mut tr = Transformable::default();
    run_all(&transforms, &TransformContext::default(), &mut tr).unwrap();
    assert_eq!(tr.body, json!({ "v": expected }));
}

#[test]
fn test_set_int_parse_failure_is_error() {
    let transforms = build(
        Namespace::Request,
        "- set: {target: body.v, value: 'abc', value_type: int}",
    )
    .unwrap();
    let mut tr = Transformable::default();
    assert!(run_all(&transforms, &TransformContext::default(), &mut tr).is_err());
}

#[test]
fn test_set_url_param_replaces_existing() {
    let transforms = build(Namespace::Request, "- set: {target: url.params.page, value: '3'}").unwrap();
    let mut tr = request("https://example.com/items?page=1&limit=10&page=2");
    run_all(&transforms, &TransformContext::default(), &mut tr).unwrap();
    assert_eq!(
        tr.url.unwrap().as_str(),
        "https://example.com/items?page=3&limit=10"
    );
}

#[test]
fn test_set_url_value_from_last_response() {
    let transforms = build(
        Namespace::Pagination,
        "- set: {target: url.value, value: '[[.last_response.body.next]]'}",
    )
    .unwrap();
    let mut ctx = TransformContext::default();
    ctx.update_last_response(ResponseSnapshot::new(
        200,
        HeaderMap::new(),
        Url::parse("https://example.com/a").unwrap(),
        json!({"next": "https://example.com/b?cursor=x"}),
        0,
    ));
    let mut tr = request("https://example.com/a");
    run_all(&transforms, &ctx, &mut tr).unwrap();
    assert_eq!(tr.url.unwrap().as_str(), "https://example.com/b?cursor=x");
}

// ============================================================================
// Template failure handling
// ============================================================================

#[test]
fn test_missing_value_is_skipped() {
    let transforms = build(
        Namespace::Request,
        "- set: {target: body.id, value: '[[.last_response.body.missing]]'}",
    )
    .unwrap();
    let mut tr = Transformable::default();
    let applied = run_all(&transforms, &TransformContext::default(), &mut tr).unwrap();
    assert_eq!(applied, 0);
    assert_eq!(tr.body, serde_json::Value::Null);
}

#[test]
fn test_missing_value_uses_default() {
    let transforms = build(
        Namespace::Request,
        "- set: {target: body.id, value: '[[.last_response.body.missing]]', default: fallback}",
    )
    .unwrap();
    let mut tr = Transformable::default();
    run_all(&transforms, &TransformContext::default(), &mut tr).unwrap();
    assert_eq!(tr.body, json!({"id": "fallback"}));
}

#[test]
fn test_fail_on_template_error() {
    let transforms = build(
        Namespace::Request,
        "- set: {target: body.id, value: '[[.last_response.body.missing]]', fail_on_template_error: true}",
    )
    .unwrap();
    let mut tr = Transformable::default();
    let err = run_all(&transforms, &TransformContext::default(), &mut tr).unwrap_err();
    assert!(matches!(err, crate::Error::Transform { .. }));
}

// ============================================================================
// Append / Delete Tests
// ============================================================================

#[test]
fn test_append_body_builds_array() {
    let transforms = build(
        Namespace::Response,
        r#"
- append: {target: body.tags, value: "a"}
- append: {target: body.tags, value: "b"}
- append: {target: body.tags, value: "c"}
"#,
    )
    .unwrap();
    let mut tr = Transformable::from_body(json!({}));
    run_all(&transforms, &TransformContext::default(), &mut tr).unwrap();
    assert_eq!(tr.body, json!({"tags": ["a", "b", "c"]}));
}

#[test]
fn test_append_header_and_param() {
    let transforms = build(
        Namespace::Request,
        r#"
- append: {target: header.X-Tag, value: "one"}
- append: {target: header.X-Tag, value: "two"}
- append: {target: url.params.id, value: "2"}
"#,
    )
    .unwrap();
    let mut tr = request("https://example.com/?id=1");
    run_all(&transforms, &TransformContext::default(), &mut tr).unwrap();
    let tags: Vec<_> = tr.header.get_all("X-Tag").iter().collect();
    assert_eq!(tags.len(), 2);
    assert_eq!(tr.url.unwrap().query(), Some("id=1&id=2"));
}

#[test]
fn test_delete_targets() {
    let transforms = build(
        Namespace::Request,
        r#"
- delete: {target: body.secret}
- delete: {target: header.X-Debug}
- delete: {target: url.params.trace}
"#,
    )
    .unwrap();
    let mut tr = request("https://example.com/?trace=1&q=x");
    tr.body = json!({"secret": 1, "keep": 2});
    tr.header.insert("X-Debug", "1".parse().unwrap());

    let applied = run_all(&transforms, &TransformContext::default(), &mut tr).unwrap();
    assert_eq!(applied, 3);
    assert_eq!(tr.body, json!({"keep": 2}));
    assert!(tr.header.get("X-Debug").is_none());
    assert_eq!(tr.url.unwrap().query(), Some("q=x"));
}

#[test]
fn test_transformable_has_body() {
    assert!(!Transformable::default().has_body());
    assert!(!Transformable::from_body(json!({})).has_body());
    assert!(Transformable::from_body(json!({"a": 1})).has_body());
    assert!(Transformable::from_body(json!([1])).has_body());
}
