//! Integration tests for POST /v1/chat/completions
//!
//! Runs the full router against a wiremock upstream. Credentials come from a
//! scripted provider so the retry path can be driven deterministically.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use duckbridge::{
    config::Config,
    error::{AppError, AppResult},
    handlers::{AppState, app},
    middleware::RequestId,
    upstream::{CredentialProvider, UpstreamCredential},
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tower::ServiceExt;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, header as header_eq, method, path},
};

const TOKEN: &str = "4-test-token";

/// Credential provider failing a fixed number of times before succeeding
struct ScriptedCredentials {
    failures: usize,
    calls: AtomicUsize,
}

impl ScriptedCredentials {
    fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for ScriptedCredentials {
    async fn acquire(&self, _request_id: RequestId) -> AppResult<UpstreamCredential> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(AppError::TokenUnavailable(format!(
                "scripted failure {}",
                call + 1
            )));
        }
        Ok(UpstreamCredential::new(TOKEN, Some("hash-1".to_string())))
    }
}

fn config_for(upstream_url: &str, max_retry_count: usize, retry_delay_ms: u64) -> Config {
    let mut config = Config::default();
    config.upstream.base_url = upstream_url.to_string();
    config.upstream.timeout_seconds = 5;
    config.retry.max_retry_count = max_retry_count;
    config.retry.retry_delay_ms = retry_delay_ms;
    config
}

fn router(config: Config, credentials: Arc<ScriptedCredentials>) -> axum::Router {
    let state = AppState::new(Arc::new(config))
        .expect("state should build")
        .with_credential_provider(credentials);
    app(state)
}

fn chat_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn mount_chat(server: &MockServer, body: &str) {
    Mock::given(method("POST"))
        .and(path("/duckchat/v1/chat"))
        .and(header_eq("x-vqd-4", TOKEN))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body.to_string()),
        )
        .mount(server)
        .await;
}

const HI_BODY: &str = "data: {\"role\":\"assistant\",\"message\":\"H\",\"action\":\"success\"}\n\n\
                       data: {\"role\":\"assistant\",\"message\":\"i\",\"action\":\"success\"}\n\n\
                       data: [DONE]\n\n";

#[tokio::test]
async fn test_aggregate_completion_concatenates_fragments() {
    let server = MockServer::start().await;
    mount_chat(&server, HI_BODY).await;

    let app = router(config_for(&server.uri(), 0, 0), ScriptedCredentials::new(0));
    let response = app
        .oneshot(chat_request(
            r#"{"model":"gpt-4o-mini","messages":[{"role":"user","content":"Hello"}]}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();

    assert_eq!(json["object"], "chat.completion");
    assert_eq!(json["model"], "gpt-4o-mini");
    assert!(json["id"].as_str().unwrap().starts_with("chatcmpl-"));
    assert_eq!(json["choices"][0]["index"], 0);
    assert_eq!(json["choices"][0]["message"]["role"], "assistant");
    assert_eq!(json["choices"][0]["message"]["content"], "Hi");
    assert_eq!(json["choices"][0]["finish_reason"], "stop");
    assert_eq!(json["usage"]["prompt_tokens"], 0);
    assert_eq!(json["usage"]["completion_tokens"], 0);
    assert_eq!(json["usage"]["total_tokens"], 0);
}

#[tokio::test]
async fn test_prompt_and_model_are_translated_for_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/duckchat/v1/chat"))
        .and(header_eq("x-vqd-hash-1", "hash-1"))
        .and(body_partial_json(serde_json::json!({
            "model": "claude-3-haiku-20240307",
            "messages": [{
                "role": "user",
                "content": "user:Be brief;\r\nuser:Hello;\r\n"
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(HI_BODY))
        .expect(1)
        .mount(&server)
        .await;

    let app = router(config_for(&server.uri(), 0, 0), ScriptedCredentials::new(0));
    let response = app
        .oneshot(chat_request(
            r#"{"model":"claude-3-haiku","messages":[
                {"role":"system","content":"Be brief"},
                {"role":"user","content":[{"type":"text","text":"Hel"},{"type":"text","text":"lo"}]}
            ]}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["model"], "claude-3-haiku-20240307");
}

#[tokio::test]
async fn test_streaming_completion_emits_chunks_without_done_sentinel() {
    let server = MockServer::start().await;
    mount_chat(
        &server,
        "data: {\"message\":\"Hi\",\"action\":\"success\"}\n\ndata: [DONE]\n\n",
    )
    .await;

    let app = router(config_for(&server.uri(), 0, 0), ScriptedCredentials::new(0));
    let response = app
        .oneshot(chat_request(
            r#"{"model":"gpt-4o-mini","stream":true,"messages":[{"role":"user","content":"Hello"}]}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );

    let body = body_string(response).await;
    let records: Vec<serde_json::Value> = body
        .split("\n\n")
        .filter_map(|record| record.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).expect("every record should be JSON"))
        .collect();

    assert_eq!(records.len(), 2, "expected content and stop chunks: {}", body);
    assert!(!body.contains("[DONE]"));

    assert_eq!(records[0]["object"], "chat.completion.chunk");
    assert_eq!(records[0]["choices"][0]["delta"]["content"], "Hi");
    assert!(records[0]["choices"][0]["finish_reason"].is_null());

    assert_eq!(records[1]["choices"][0]["finish_reason"], "stop");
    assert!(records[1]["choices"][0]["delta"].get("content").is_none());

    assert_eq!(records[0]["id"], records[1]["id"]);
    assert_eq!(records[0]["created"], records[1]["created"]);
}

#[tokio::test]
async fn test_streaming_body_without_done_has_no_stop_chunk() {
    let server = MockServer::start().await;
    mount_chat(&server, "data: {\"message\":\"partial\",\"action\":\"success\"}\n\n").await;

    let app = router(config_for(&server.uri(), 0, 0), ScriptedCredentials::new(0));
    let response = app
        .oneshot(chat_request(
            r#"{"stream":true,"messages":[{"role":"user","content":"Hello"}]}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("partial"));
    assert!(!body.contains("\"stop\""));
}

#[tokio::test]
async fn test_credential_failures_are_retried_after_delay() {
    let server = MockServer::start().await;
    mount_chat(&server, HI_BODY).await;

    let credentials = ScriptedCredentials::new(2);
    let app = router(config_for(&server.uri(), 3, 50), credentials.clone());

    let started = Instant::now();
    let response = app
        .oneshot(chat_request(
            r#"{"messages":[{"role":"user","content":"Hello"}]}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(credentials.calls(), 3);
    assert!(
        started.elapsed() >= Duration::from_millis(100),
        "two retries should wait at least two delays, took {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn test_exhausted_retries_return_last_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/duckchat/v1/chat"))
        .respond_with(ResponseTemplate::new(418).set_body_string("ERR_INVALID_VQD"))
        .expect(3)
        .mount(&server)
        .await;

    let credentials = ScriptedCredentials::new(0);
    let app = router(config_for(&server.uri(), 2, 10), credentials.clone());
    let response = app
        .oneshot(chat_request(
            r#"{"messages":[{"role":"user","content":"Hello"}]}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(credentials.calls(), 3, "a fresh credential per attempt");

    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    let message = json["error"].as_str().unwrap();
    assert!(message.contains("418"), "got: {}", message);
    assert!(message.contains("ERR_INVALID_VQD"), "got: {}", message);
}

#[tokio::test]
async fn test_streaming_failure_before_commit_is_plain_error() {
    let credentials = ScriptedCredentials::new(usize::MAX);
    let app = router(config_for("http://127.0.0.1:1", 1, 10), credentials.clone());

    let response = app
        .oneshot(chat_request(
            r#"{"stream":true,"messages":[{"role":"user","content":"Hello"}]}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(credentials.calls(), 2);
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert!(
        json["error"]
            .as_str()
            .unwrap()
            .contains("scripted failure 2")
    );
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let credentials = ScriptedCredentials::new(0);
    let app = router(config_for("http://127.0.0.1:1", 0, 0), credentials.clone());

    let response = app
        .oneshot(chat_request(r#"{"messages": [ not json"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["error"]["type"], "invalid_request_error");
    assert_eq!(credentials.calls(), 0, "no upstream work for a bad body");
}

#[tokio::test]
async fn test_unknown_role_is_bad_request() {
    let app = router(
        config_for("http://127.0.0.1:1", 0, 0),
        ScriptedCredentials::new(0),
    );

    let response = app
        .oneshot(chat_request(
            r#"{"messages":[{"role":"wizard","content":"Hello"}]}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_form_encoded_content_type_with_json_body_is_accepted() {
    let server = MockServer::start().await;
    mount_chat(&server, HI_BODY).await;

    let app = router(config_for(&server.uri(), 0, 0), ScriptedCredentials::new(0));

    // What `curl -d '<json>'` sends
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(
            r#"{"model":"gpt-4o-mini","messages":[{"role":"user","content":"Hello"}]}"#,
        ))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["choices"][0]["message"]["content"], "Hi");
}

#[tokio::test]
async fn test_missing_content_type_with_broken_body_is_bad_request() {
    let app = router(
        config_for("http://127.0.0.1:1", 0, 0),
        ScriptedCredentials::new(0),
    );

    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .body(Body::from("model=gpt-4o-mini"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
