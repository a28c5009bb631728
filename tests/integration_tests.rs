//! Integration tests using mock HTTP server
//!
//! Tests the full end-to-end flow: YAML source → HTTP requests → published
//! events → saved checkpoint

use pretty_assertions::assert_eq;
use serde_json::json;
use solidafy_poller::engine::Input;
use solidafy_poller::loader::{load_source_from_str_with, load_sources_from_file_with, Interpolation};
use solidafy_poller::metrics::InputMetrics;
use solidafy_poller::publisher::CollectingPublisher;
use solidafy_poller::state::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
use solidafy_poller::SourceConfig;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{basic_auth, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn source(yaml: &str, server: &MockServer) -> SourceConfig {
    let yaml = yaml.replace("SERVER", &server.uri());
    load_source_from_str_with(&yaml, &Interpolation::new()).unwrap()
}

fn input(config: SourceConfig) -> (Input, Arc<CollectingPublisher>) {
    let publisher = Arc::new(CollectingPublisher::new());
    let input = Input::new(config, Arc::new(MemoryCheckpointStore::new()), publisher.clone()).unwrap();
    (input, publisher)
}

const HELLO_BODY: &str = r#"{"hello":[{"world":"moon"},{"space":[{"cake":"pumpkin"}]}]}"#;

// ============================================================================
// End-to-end Scenarios
// ============================================================================

#[tokio::test]
async fn test_single_get_without_split_publishes_whole_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(HELLO_BODY, "application/json"))
        .expect(1)
        .mount(&server)
        .await;

    let (mut input, publisher) = input(source("request: {url: 'SERVER/api'}", &server));
    input.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(
        publisher.bodies(),
        vec![json!({"hello": [{"world": "moon"}, {"space": [{"cake": "pumpkin"}]}]})]
    );
}

#[tokio::test]
async fn test_split_on_target_publishes_each_element() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(HELLO_BODY, "application/json"))
        .mount(&server)
        .await;

    let yaml = r"
request: {url: 'SERVER/api'}
response:
  split: {target: body.hello}
";
    let (mut input, publisher) = input(source(yaml, &server));
    input.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(
        publisher.bodies(),
        vec![json!({"world": "moon"}), json!({"space": [{"cake": "pumpkin"}]})]
    );
}

#[tokio::test]
async fn test_rate_limited_request_waits_for_reset() {
    let server = MockServer::start().await;
    let reset = chrono::Utc::now().timestamp() + 2;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("X-Rate-Limit-Limit", "10")
                .insert_header("X-Rate-Limit-Remaining", "0")
                .insert_header("X-Rate-Limit-Reset", reset.to_string().as_str()),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let yaml = r#"
request:
  url: 'SERVER/api'
  rate_limit:
    limit: '[[ .last_response.header.Get "X-Rate-Limit-Limit" ]]'
    remaining: '[[ .last_response.header.Get "X-Rate-Limit-Remaining" ]]'
    reset: '[[ .last_response.header.Get "X-Rate-Limit-Reset" ]]'
"#;
    let (mut input, publisher) = input(source(yaml, &server));
    let started = Instant::now();
    input.run_once(&CancellationToken::new()).await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(publisher.bodies(), vec![json!({"ok": true})]);
}

#[tokio::test]
async fn test_cancel_interrupts_rate_limit_wait() {
    let server = MockServer::start().await;
    let reset = chrono::Utc::now().timestamp() + 3600;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("X-Rate-Limit-Remaining", "0")
                .insert_header("X-Rate-Limit-Reset", reset.to_string().as_str()),
        )
        .mount(&server)
        .await;

    let yaml = r#"
request:
  url: 'SERVER/api'
  rate_limit:
    remaining: '[[ .last_response.header.Get "X-Rate-Limit-Remaining" ]]'
    reset: '[[ .last_response.header.Get "X-Rate-Limit-Reset" ]]'
"#;
    let (mut input, publisher) = input(source(yaml, &server));
    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        stopper.cancel();
    });

    let outcome = tokio::time::timeout(Duration::from_secs(10), input.run_once(&cancel)).await;
    assert!(outcome.expect("cancel should end the wait").is_err());
    assert!(publisher.is_empty());
}

#[tokio::test]
async fn test_chain_substitutes_ids_into_next_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/records"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"records": [{"id": 1}]})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1, "detail": "one"})))
        .expect(1)
        .mount(&server)
        .await;

    let yaml = r"
request: {url: 'SERVER/records'}
chain:
  - step:
      request: {url: 'SERVER/$.records[:].id'}
      replace: '$.records[:].id'
";
    let (mut input, publisher) = input(source(yaml, &server));
    input.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(publisher.bodies(), vec![json!({"id": 1, "detail": "one"})]);
}

#[tokio::test]
async fn test_chain_while_repeats_until_condition() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"job": "j1"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/status/j1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "pending"})))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/status/j1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "done", "rows": 3})))
        .mount(&server)
        .await;

    let yaml = r#"
request: {url: 'SERVER/jobs'}
chain:
  - while:
      request:
        url: 'SERVER/status/$.job'
        retry: {max_attempts: 5, wait_min: 10ms, wait_max: 20ms}
      replace: '$.job'
      until: '[[ eq .last_response.body.status "done" ]]'
"#;
    let (mut input, publisher) = input(source(yaml, &server));
    input.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(publisher.bodies(), vec![json!({"status": "done", "rows": 3})]);
}

#[tokio::test]
async fn test_date_cursor_carries_into_next_interval() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("$filter", "alertCreationTime ge 2002-10-02T15:00:00Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "@timestamp": "2002-10-02T15:10:00Z",
            "foo": "bar"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "@timestamp": "2002-10-02T15:00:00Z",
            "foo": "bar"
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let yaml = r#"
id: alerts
request:
  url: 'SERVER/alerts'
  transforms:
    - set:
        target: url.params.$filter
        value: 'alertCreationTime ge [[ .cursor.timestamp ]]'
        default: 'alertCreationTime ge [[ formatDate (now (parseDuration "-10m")) "2006-01-02T15:04:05Z" ]]'
cursor:
  timestamp:
    value: '[[ index .last_response.body "@timestamp" ]]'
"#;
    let store = Arc::new(MemoryCheckpointStore::new());
    let publisher = Arc::new(CollectingPublisher::new());
    let mut input = Input::new(source(yaml, &server), store.clone(), publisher.clone()).unwrap();
    let cancel = CancellationToken::new();

    input.run_once(&cancel).await.unwrap();
    input.run_once(&cancel).await.unwrap();

    assert_eq!(publisher.len(), 2);
    let saved = store.load("alerts").await.unwrap().unwrap();
    assert_eq!(saved["timestamp"], json!("2002-10-02T15:10:00Z"));
}

// ============================================================================
// Pagination
// ============================================================================

#[tokio::test]
async fn test_header_pagination_stops_on_same_url() {
    let server = MockServer::start().await;
    let page2 = format!("{}/items?page=2", server.uri());
    Mock::given(method("GET"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Link", format!("<{page2}>; rel=\"next\"").as_str())
                .set_body_json(json!([{"n": 2}])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Link", format!("<{page2}>; rel=\"next\"").as_str())
                .set_body_json(json!([{"n": 1}])),
        )
        .mount(&server)
        .await;

    let yaml = r#"
request: {url: 'SERVER/items'}
response:
  pagination:
    header:
      field_name: Link
      regex_pattern: '<([^>]+)>; *rel="next"(?:,|$)'
"#;
    let (mut input, publisher) = input(source(yaml, &server));
    let stats = input.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(publisher.bodies(), vec![json!({"n": 1}), json!({"n": 2})]);
    assert_eq!(stats.pages, 2);
}

#[tokio::test]
async fn test_body_pagination_with_post_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("\"offset\":\"10\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [{"n": 2}]})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"items": [{"n": 1}], "next": 10})),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let yaml = r"
request:
  url: 'SERVER/search'
  method: POST
  body: {query: '*'}
response:
  split: {target: body.items}
  pagination:
    - set:
        target: body.offset
        value: '[[ .last_response.body.next ]]'
";
    let (mut input, publisher) = input(source(yaml, &server));
    input.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(publisher.bodies(), vec![json!({"n": 1}), json!({"n": 2})]);
}

// ============================================================================
// Auth and Retry
// ============================================================================

#[tokio::test]
async fn test_basic_auth_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(basic_auth("user", "pass"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let yaml = r"
auth:
  basic: {user: user, password: pass}
request: {url: 'SERVER/api'}
";
    let (mut input, publisher) = input(source(yaml, &server));
    input.run_once(&CancellationToken::new()).await.unwrap();
    assert_eq!(publisher.len(), 1);
}

#[tokio::test]
async fn test_oauth2_token_shared_with_chain() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-1",
            "expires_in": "3600",
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .and(header("Authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ids": ["a"]})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/a"))
        .and(header("Authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"user": "a"})))
        .mount(&server)
        .await;

    let yaml = r"
auth:
  oauth2:
    client: {id: cid, secret: csecret}
    token_url: 'SERVER/token'
request: {url: 'SERVER/users'}
chain:
  - step:
      request: {url: 'SERVER/users/$.ids'}
      replace: '$.ids'
";
    let (mut input, publisher) = input(source(yaml, &server));
    input.run_once(&CancellationToken::new()).await.unwrap();
    assert_eq!(publisher.bodies(), vec![json!({"user": "a"})]);
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let yaml = r"
request:
  url: 'SERVER/api'
  retry: {max_attempts: 3, wait_min: 10ms, wait_max: 50ms}
";
    let metrics = Arc::new(InputMetrics::new().unwrap());
    let (input, publisher) = input(source(yaml, &server));
    let mut input = input.with_metrics(metrics.clone());
    input.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(publisher.len(), 1);
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.intervals_total, 1);
    assert_eq!(snapshot.events_published_total, 1);
}

#[tokio::test]
async fn test_not_implemented_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(501))
        .expect(1)
        .mount(&server)
        .await;

    let yaml = r"
request:
  url: 'SERVER/api'
  retry: {max_attempts: 3, wait_min: 10ms, wait_max: 50ms}
";
    let (mut input, publisher) = input(source(yaml, &server));
    assert!(input.run_once(&CancellationToken::new()).await.is_err());
    assert!(publisher.is_empty());
}

// ============================================================================
// Checkpoint Files
// ============================================================================

#[tokio::test]
async fn test_file_checkpoint_resumes_new_worker() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("after", "42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 43}])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 41}, {"id": 42}])))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("cursor.json");
    let mut file = tempfile::NamedTempFile::new_in(dir.path()).unwrap();
    write!(
        file,
        r"
id: ids
request:
  url: '{}/ids'
  transforms:
    - set: {{target: url.params.after, value: '[[ .cursor.last_id ]]'}}
cursor:
  last_id: {{value: '[[ .last_event.id ]]'}}
",
        server.uri()
    )
    .unwrap();

    for _ in 0..2 {
        let config = load_sources_from_file_with(file.path(), &Interpolation::new())
            .unwrap()
            .remove(0);
        let store = Arc::new(FileCheckpointStore::open(&state).await.unwrap());
        let publisher = Arc::new(CollectingPublisher::new());
        let mut input = Input::new(config, store, publisher).unwrap();
        input.run_once(&CancellationToken::new()).await.unwrap();
    }

    let store = FileCheckpointStore::open(&state).await.unwrap();
    let saved = store.load("ids").await.unwrap().unwrap();
    assert_eq!(saved["last_id"], json!("43"));
}
