//! Tests for the template engine

use super::*;
use crate::context::{ResponseSnapshot, TransformContext};
use crate::transform::Transformable;
use crate::types::JsonObject;
use crate::Error;
use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::json;
use test_case::test_case;
use url::Url;

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 11, 5, 13, 25, 32).unwrap()
}

fn render(src: &str, ctx: &TransformContext) -> crate::Result<String> {
    ValueTemplate::compile(src)?.execute_at(ctx, &Transformable::default(), None, fixed_now())
}

fn ctx_with_body(body: serde_json::Value) -> TransformContext {
    let mut ctx = TransformContext::default();
    ctx.update_last_response(ResponseSnapshot::new(
        200,
        HeaderMap::new(),
        Url::parse("https://example.com/?p1=v1&p1=v2").unwrap(),
        body,
        0,
    ));
    ctx
}

// ============================================================================
// Compilation
// ============================================================================

#[test_case("[[ nope ]]" ; "unknown function")]
#[test_case("[[ .a " ; "unterminated action")]
#[test_case("[[ if .a ]]x" ; "missing end")]
#[test_case("[[ end ]]" ; "stray end")]
fn test_compile_errors(src: &str) {
    assert!(ValueTemplate::compile(src).is_err());
}

#[test]
fn test_plain_text_passes_through() {
    let ctx = TransformContext::default();
    assert_eq!(render("hello world", &ctx).unwrap(), "hello world");
}

#[test]
fn test_trim_markers() {
    let ctx = ctx_with_body(json!({"v": 1}));
    assert_eq!(
        render("a  [[- .last_response.body.v -]]  b", &ctx).unwrap(),
        "a1b"
    );
}

// ============================================================================
// Context fields
// ============================================================================

#[test]
fn test_reads_last_response_body() {
    let ctx = ctx_with_body(json!({"param": 25, "nested": {"name": "x"}}));
    assert_eq!(render("[[.last_response.body.param]]", &ctx).unwrap(), "25");
    assert_eq!(
        render("[[.last_response.body.nested.name]]", &ctx).unwrap(),
        "x"
    );
}

#[test]
fn test_reads_cursor_and_events() {
    let mut cursor = JsonObject::new();
    cursor.insert("since".into(), json!("2020-01-01"));
    let mut ctx = TransformContext::new(cursor);
    ctx.record_event(&json!({"id": 1}));
    ctx.record_event(&json!({"id": 2}));
    assert_eq!(
        render("[[.cursor.since]] [[.first_event.id]] [[.last_event.id]]", &ctx).unwrap(),
        "2020-01-01 1 2"
    );
}

#[test]
fn test_reads_response_metadata() {
    let mut header = HeaderMap::new();
    header.insert("Next-Page", HeaderValue::from_static("abc"));
    let mut ctx = TransformContext::default();
    ctx.update_last_response(ResponseSnapshot::new(
        201,
        header,
        Url::parse("https://example.com/items?p1=v1").unwrap(),
        json!({}),
        3,
    ));
    assert_eq!(
        render(
            r#"[[.last_response.status_code]] [[.last_response.page]] [[.last_response.header.Get "Next-Page"]] [[.last_response.url.params.Get "p1"]]"#,
            &ctx
        )
        .unwrap(),
        "201 3 abc v1"
    );
    assert_eq!(
        render("[[.last_response.url.value]]", &ctx).unwrap(),
        "https://example.com/items?p1=v1"
    );
}

#[test]
fn test_reads_parent_last_response() {
    let parent = ctx_with_body(json!({"owner": "me"}));
    let child = parent.child();
    assert_eq!(
        render("[[.parent_last_response.body.owner]]", &child).unwrap(),
        "me"
    );
    assert!(render("[[.parent_last_response.body.owner]]", &parent).is_err());
}

#[test]
fn test_missing_key_is_error() {
    let ctx = ctx_with_body(json!({}));
    let err = render("[[.last_response.body.missing]]", &ctx).unwrap_err();
    assert!(matches!(err, Error::UndefinedVariable { .. }));
}

#[test]
fn test_null_renders_empty_result() {
    let ctx = ctx_with_body(json!({"v": null}));
    let err = render("[[.last_response.body.v]]", &ctx).unwrap_err();
    assert!(matches!(err, Error::EmptyTemplateResult));
}

#[test]
fn test_default_used_on_failure() {
    let ctx = ctx_with_body(json!({}));
    let tpl = ValueTemplate::compile("[[.last_response.body.missing]]").unwrap();
    let default = ValueTemplate::compile("[[ formatDate (now (parseDuration \"-24h\")) ]]").unwrap();
    let out = tpl
        .execute_at(&ctx, &Transformable::default(), Some(&default), fixed_now())
        .unwrap();
    assert_eq!(out, "2020-11-04T13:25:32Z");
}

#[test]
fn test_reads_transformable_body() {
    let tpl = ValueTemplate::compile("[[.body.name]]").unwrap();
    let tr = Transformable::from_body(json!({"name": "elem"}));
    let out = tpl
        .execute_at(&TransformContext::default(), &tr, None, fixed_now())
        .unwrap();
    assert_eq!(out, "elem");
}

// ============================================================================
// Conditionals
// ============================================================================

#[test_case(json!({"status": "done"}), "finished")]
#[test_case(json!({"status": "running"}), "waiting")]
fn test_if_else(body: serde_json::Value, expected: &str) {
    let ctx = ctx_with_body(body);
    let src = r#"[[if eq .last_response.body.status "done"]]finished[[else]]waiting[[end]]"#;
    assert_eq!(render(src, &ctx).unwrap(), expected);
}

#[test]
fn test_else_if_and_logic() {
    let ctx = ctx_with_body(json!({"n": 5}));
    let src = "[[if gt .last_response.body.n 10]]big[[else if and (ge .last_response.body.n 5) (not false)]]mid[[else]]small[[end]]";
    assert_eq!(render(src, &ctx).unwrap(), "mid");
}

// ============================================================================
// Functions
// ============================================================================

#[test_case("[[now]]", "2020-11-05 13:25:32 +0000 UTC" ; "now")]
#[test_case("[[ formatDate (now (parseDuration \"-1h\")) ]]", "2020-11-05T12:25:32Z" ; "now with duration")]
#[test_case("[[ formatDate (now) \"UnixDate\" \"America/New_York\" ]]", "Thu Nov  5 08:25:32 EST 2020" ; "format date in zone")]
#[test_case("[[ formatDate (now) \"2006-01-02\" \"Not/AZone\" ]]", "2020-11-05" ; "unknown zone falls back to utc")]
#[test_case("[[ (parseDate \"2020-11-05T12:25:32Z\").Unix ]]", "1604579132" ; "parse date")]
#[test_case("[[ formatDate (parseDate \"2020-11-05 12:25:32\" \"DateTime\") ]]", "2020-11-05T12:25:32Z" ; "parse date named layout")]
#[test_case("[[ formatDate (parseDateInTZ \"2020-11-05 12:25:32\" \"America/New_York\" \"DateTime\") ]]", "2020-11-05T17:25:32Z" ; "parse date in zone")]
#[test_case("[[ formatDate (parseTimestamp 1604582732) ]]", "2020-11-05T13:25:32Z" ; "parse timestamp")]
#[test_case("[[ formatDate (parseTimestampMilli 1604582732000) ]]", "2020-11-05T13:25:32Z" ; "parse timestamp milli")]
#[test_case("[[ (parseDuration \"1m30s\").Seconds ]]", "90" ; "duration seconds")]
#[test_case("[[(toInt \"1\")]] [[(toInt 1)]] [[(toInt \"abc\")]] [[(toInt 2)]]", "1 1 0 2" ; "to int")]
#[test_case("[[ add 1 2 3 ]] [[ mul 3 4 ]] [[ div 9 2 ]]", "6 12 4" ; "arithmetic")]
#[test_case("[[ min 3 7 ]] [[ max 3 7 ]] [[ min \"b\" \"a\" ]]", "3 7 a" ; "min max")]
#[test_case("[[hmac \"sha1\" \"secret\" \"string1\" \"string2\"]]", "87eca1e7cba012b2dd4a907c2ad4345a252a38f4" ; "hmac sha1")]
#[test_case("[[hmacBase64 \"sha1\" \"secret\" \"string1\" \"string2\"]]", "h+yh58ugErLdSpB8KtQ0WiUqOPQ=" ; "hmac sha1 base64")]
#[test_case("[[hmacBase64 \"sha256\" \"secret\" \"string1\" \"string2\"]]", "HlglO6yRZs0Ts3MjmgnRKtTJk3fr9nt8LmeliVKZyAA=" ; "hmac sha256 base64")]
#[test_case("[[hash \"sha1\"]]", "da39a3ee5e6b4b0d3255bfef95601890afd80709" ; "hash sha1 empty")]
#[test_case("[[hash \"sha1\" \"string1\" \"string2\"]]", "6b3966bea9fe56d1f9708517fd22b70c682b8a3d" ; "hash sha1")]
#[test_case("[[hashBase64 \"sha1\" \"string1\" \"string2\"]]", "azlmvqn+VtH5cIUX/SK3DGgrij0=" ; "hash sha1 base64")]
#[test_case("[[hashBase64 \"sha256\" \"string1\" \"string2\"]]", "usCapy5jLnbDbmwcTlArc8Paf8poxHUnPcVReBVYfMQ=" ; "hash sha256 base64")]
#[test_case("[[base64Encode \"string1\" \"string2\"]]", "c3RyaW5nMXN0cmluZzI=" ; "base64 encode")]
#[test_case("[[base64Decode \"c3RyaW5nMXN0cmluZzI=\"]]", "string1string2" ; "base64 decode")]
#[test_case("[[hexDecode \"6869\"]]", "hi" ; "hex decode")]
#[test_case("[[urlEncode \"2022-02-17T04:37:10.406+0000\"]]", "2022-02-17T04%3A37%3A10.406%2B0000" ; "url encode")]
#[test_case("[[replaceAll \"some\" \"my\" \"some value\"]]", "my value" ; "replace all")]
#[test_case("[[sprintf \"%s-%03d\" \"id\" 7]]", "id-007" ; "sprintf padding")]
#[test_case("[[ \"x\" | printf \"<%s>\" ]]", "<x>" ; "pipe into printf")]
#[test_case("[[len \"abcd\"]]", "4" ; "len")]
fn test_functions(src: &str, expected: &str) {
    let ctx = TransformContext::default();
    assert_eq!(render(src, &ctx).unwrap(), expected);
}

#[test_case("[[hash \"md5\" \"x\"]]" ; "unsupported hash")]
#[test_case("[[base64Decode \"!!!\"]]" ; "invalid base64")]
fn test_functions_rendering_empty(src: &str) {
    let ctx = TransformContext::default();
    assert!(matches!(render(src, &ctx), Err(Error::EmptyTemplateResult)));
}

#[test]
fn test_div_by_zero_is_error() {
    assert!(render("[[ div 1 0 ]]", &TransformContext::default()).is_err());
}

#[test]
fn test_join_and_sprintf() {
    let ctx = ctx_with_body(json!({"strarr": ["foo", "bar"], "iarr": [1, 2], "s": "foo"}));
    assert_eq!(
        render(
            r#"[[join .last_response.body.strarr ","]] [[join .last_response.body.iarr ","]] [[join .last_response.body.s ","]]"#,
            &ctx
        )
        .unwrap(),
        "foo,bar 1,2 foo"
    );
    assert_eq!(
        render(r#"[[sprintf "%q:%d" (join .last_response.body.strarr ",") 1]]"#, &ctx).unwrap(),
        r#""foo,bar":1"#
    );
}

#[test]
fn test_to_json_and_index() {
    let ctx = ctx_with_body(json!({"items": [{"id": 1234}], "@timestamp": "t"}));
    assert_eq!(
        render("[[toJSON .last_response.body.items]]", &ctx).unwrap(),
        r#"[{"id":1234}]"#
    );
    assert_eq!(
        render(r#"[[index .last_response.body "@timestamp"]]"#, &ctx).unwrap(),
        "t"
    );
    assert_eq!(
        render(r#"[[(index .last_response.body.items 0).id]]"#, &ctx).unwrap(),
        "1234"
    );
}

#[test]
fn test_get_rfc5988_link() {
    let mut header = HeaderMap::new();
    header.append(
        "Link",
        HeaderValue::from_static(
            r#"<https://example.com/a?page=2>; rel="next", <https://example.com/a?page=1>; rel="prev""#,
        ),
    );
    let mut ctx = TransformContext::default();
    ctx.update_last_response(ResponseSnapshot::new(
        200,
        header,
        Url::parse("https://example.com/a").unwrap(),
        json!({}),
        0,
    ));
    assert_eq!(
        render(r#"[[getRFC5988Link "next" .last_response.header.Link]]"#, &ctx).unwrap(),
        "https://example.com/a?page=2"
    );
    assert_eq!(
        render(r#"[[getRFC5988Link "prev" .last_response.header.Link]]"#, &ctx).unwrap(),
        "https://example.com/a?page=1"
    );
    assert!(render(r#"[[getRFC5988Link "last" .last_response.header.Link]]"#, &ctx).is_err());
}

#[test]
fn test_uuid_and_user_agent() {
    let ctx = TransformContext::default();
    let id = render("[[uuid]]", &ctx).unwrap();
    assert_eq!(id.len(), 36);
    let ua = render(r#"[[userAgent "extra"]]"#, &ctx).unwrap();
    assert!(ua.starts_with("Solidafy-Poller/"));
    assert!(ua.ends_with("; extra)"));
    assert_eq!(ua, user_agent(&["extra".to_string()]));
}

#[test]
fn test_deserialize_compiles() {
    let tpl: ValueTemplate = serde_json::from_value(json!("[[.cursor.id]]")).unwrap();
    assert_eq!(tpl.source(), "[[.cursor.id]]");
    assert!(serde_json::from_value::<ValueTemplate>(json!("[[ nope ]]")).is_err());
}
