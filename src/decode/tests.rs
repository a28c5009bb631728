//! Tests for decoder module

use super::*;
use crate::transform::Transformable;
use pretty_assertions::assert_eq;
use reqwest::header::HeaderMap;
use serde_json::{json, Value};
use test_case::test_case;
use url::Url;

// ============================================================================
// Content types
// ============================================================================

#[test_case("application/json", DecodeAs::Json ; "json")]
#[test_case("application/json; charset=utf-8", DecodeAs::Json ; "json with charset")]
#[test_case("application/x-ndjson", DecodeAs::Ndjson ; "ndjson")]
#[test_case("Text/CSV", DecodeAs::Csv ; "csv any case")]
#[test_case("application/zip", DecodeAs::Zip ; "zip")]
fn test_decode_as_parse(raw: &str, expected: DecodeAs) {
    assert_eq!(DecodeAs::parse(raw).unwrap(), expected);
}

#[test]
fn test_decode_as_rejects_unknown() {
    assert!(DecodeAs::parse("application/xml").is_err());
    assert!(serde_yaml::from_str::<DecodeAs>("image/png").is_err());
}

#[test]
fn test_decode_as_from_response_header() {
    assert_eq!(DecodeAs::from_content_type(Some("text/csv")), DecodeAs::Csv);
    assert_eq!(DecodeAs::from_content_type(Some("text/html")), DecodeAs::Json);
    assert_eq!(DecodeAs::from_content_type(None), DecodeAs::Json);
}

#[test]
fn test_encode_as_parse() {
    assert_eq!(
        EncodeAs::parse("application/x-www-form-urlencoded").unwrap(),
        EncodeAs::Form
    );
    assert_eq!(EncodeAs::default(), EncodeAs::Json);
    assert!(EncodeAs::parse("text/plain").is_err());
}

// ============================================================================
// Decoders
// ============================================================================

#[test]
fn test_json_decoder() {
    let value = DecodeAs::Json.decode(br#"{"items": [1, 2]}"#).unwrap();
    assert_eq!(value, json!({"items": [1, 2]}));
}

#[test]
fn test_json_decoder_invalid() {
    let err = DecodeAs::Json.decode(b"{not json").unwrap_err();
    assert!(matches!(err, crate::Error::Decode { .. }));
    assert!(DecodeAs::Json.decode(b"").is_err());
}

#[test]
fn test_ndjson_decoder() {
    let body = b"{\"id\": 1}\n{\"id\": 2}\n\n{\"id\": 3}\n";
    let value = DecodeAs::Ndjson.decode(body).unwrap();
    assert_eq!(value, json!([{"id": 1}, {"id": 2}, {"id": 3}]));
}

#[test]
fn test_ndjson_decoder_invalid_value() {
    let err = DecodeAs::Ndjson.decode(b"{\"id\": 1}\n{oops}\n").unwrap_err();
    assert!(err.to_string().contains("NDJSON value 2"));
}

fn zip_archive(entries: &[(&str, &str)]) -> Vec<u8> {
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, contents) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

#[test]
fn test_zip_decoder_reads_every_entry() {
    let body = zip_archive(&[
        ("a.json", r#"{"id": 1}"#),
        ("b.ndjson", "{\"id\": 2}\n{\"id\": 3}\n"),
    ]);
    let value = DecodeAs::Zip.decode(&body).unwrap();
    assert_eq!(value, json!([{"id": 1}, {"id": 2}, {"id": 3}]));
}

#[test]
fn test_zip_decoder_empty_archive() {
    assert_eq!(DecodeAs::Zip.decode(&zip_archive(&[])).unwrap(), json!([]));
}

#[test]
fn test_zip_decoder_errors() {
    let err = DecodeAs::Zip.decode(b"not a zip").unwrap_err();
    assert!(err.to_string().contains("zip archive"));

    let body = zip_archive(&[("bad.json", "{oops")]);
    let err = DecodeAs::Zip.decode(&body).unwrap_err();
    assert!(err.to_string().contains("bad.json"));
}

#[test]
fn test_csv_decoder_basic() {
    let body = b"id,name,active\n1,Alice,true\n2,Bob,false\n";
    let value = DecodeAs::Csv.decode(body).unwrap();
    assert_eq!(
        value,
        json!([
            {"id": "1", "name": "Alice", "active": "true"},
            {"id": "2", "name": "Bob", "active": "false"}
        ])
    );
}

#[test]
fn test_csv_decoder_quoted_fields() {
    let body = "id,comment\r\n1,\"hello, world\"\r\n2,\"line one\nline two\"\r\n3,\"say \"\"hi\"\"\"\r\n";
    let value = DecodeAs::Csv.decode(body.as_bytes()).unwrap();
    assert_eq!(
        value,
        json!([
            {"id": "1", "comment": "hello, world"},
            {"id": "2", "comment": "line one\nline two"},
            {"id": "3", "comment": "say \"hi\""}
        ])
    );
}

#[test]
fn test_csv_decoder_empty_body() {
    assert_eq!(DecodeAs::Csv.decode(b"").unwrap(), Value::Array(vec![]));
    assert_eq!(DecodeAs::Csv.decode(b"a,b\n").unwrap(), Value::Array(vec![]));
}

#[test]
fn test_csv_decoder_wrong_field_count() {
    let err = DecodeAs::Csv.decode(b"a,b\n1,2,3\n").unwrap_err();
    assert!(err.to_string().contains("wrong number of fields"));
}

// ============================================================================
// Encoders
// ============================================================================

#[test]
fn test_json_encoder() {
    let mut tr = Transformable::request(
        Url::parse("http://localhost/search").unwrap(),
        HeaderMap::new(),
        json!({"query": "*", "size": 10}),
    );
    let body = EncodeAs::Json.encode(&mut tr).unwrap().unwrap();
    let decoded: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(decoded, json!({"query": "*", "size": 10}));
    assert_eq!(tr.header.get("content-type").unwrap(), "application/json");
}

#[test]
fn test_json_encoder_empty_body() {
    let mut tr = Transformable::request(
        Url::parse("http://localhost/").unwrap(),
        HeaderMap::new(),
        json!({}),
    );
    assert_eq!(EncodeAs::Json.encode(&mut tr).unwrap(), None);
}

#[test]
fn test_form_encoder_moves_query_to_body() {
    let mut tr = Transformable::request(
        Url::parse("http://localhost/token?grant=x&scope=a+b").unwrap(),
        HeaderMap::new(),
        Value::Null,
    );
    let body = EncodeAs::Form.encode(&mut tr).unwrap().unwrap();
    assert_eq!(String::from_utf8(body).unwrap(), "grant=x&scope=a+b");
    assert_eq!(tr.url.unwrap().as_str(), "http://localhost/token");
    assert_eq!(
        tr.header.get("content-type").unwrap(),
        "application/x-www-form-urlencoded"
    );
}
