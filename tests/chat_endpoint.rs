//! Integration tests for POST /api/chat
//!
//! Each test points the provider base URLs at a wiremock server and drives
//! the full router (request ID middleware, validation, selection, upstream
//! call) with `oneshot`.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use chat_relay::{config::Config, handlers, handlers::AppState};
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, header as header_matcher, method, path},
};

/// Build the app with the given provider environment, base URLs pointing
/// at `mock_url`
fn create_app(mock_url: &str, vars: &[(&str, &str)]) -> Router {
    let mut config = Config::default();
    let openai_base = format!("{}/v1", mock_url);
    let gemini_base = mock_url.to_string();
    let vars: Vec<(String, String)> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    config.apply_env(move |key| match key {
        "OPENAI_BASE_URL" => Some(openai_base.clone()),
        "GEMINI_BASE_URL" => Some(gemini_base.clone()),
        _ => vars.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone()),
    });

    handlers::router(AppState::new(config).expect("should create AppState"))
}

fn chat_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn openai_reply(text: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": text},
            "finish_reason": "stop"
        }]
    })
}

fn gemini_reply(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }]
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Successful relays
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_openai_chat_round_trip() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header_matcher("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "messages": [
                {"role": "system", "content": "You are a concise assistant."},
                {"role": "user", "content": "Hi"}
            ],
            "temperature": 0.7,
            "max_tokens": 2048
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_reply("Hello")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let app = create_app(&mock_server.uri(), &[("OPENAI_API_KEY", "sk-test")]);
    let (status, body) = send(
        app,
        chat_request(r#"{"message":"Hi","provider":"openai"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "reply": "Hello",
            "provider": "openai",
            "model": "gpt-4o-mini",
            "finish_reason": "stop"
        })
    );
}

#[tokio::test]
async fn test_gemini_chat_round_trip() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
        .and(header_matcher("x-goog-api-key", "gm-test"))
        .and(body_partial_json(json!({
            "contents": [{"role": "user", "parts": [{"text": "Hi"}]}],
            "generationConfig": {"temperature": 0.7, "maxOutputTokens": 2048}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_reply("Hello")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let app = create_app(&mock_server.uri(), &[("GEMINI_API_KEY", "gm-test")]);
    let (status, body) = send(app, chat_request(r#"{"message":"Hi"}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reply"], "Hello");
    assert_eq!(body["provider"], "gemini");
    assert_eq!(body["model"], "gemini-2.5-flash");
    assert_eq!(body["finish_reason"], "STOP");
}

#[tokio::test]
async fn test_default_selection_prefers_gemini() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_reply("from gemini")))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_reply("from openai")))
        .expect(0)
        .mount(&mock_server)
        .await;

    let app = create_app(
        &mock_server.uri(),
        &[("OPENAI_API_KEY", "sk-test"), ("GEMINI_API_KEY", "gm-test")],
    );
    let (status, body) = send(app, chat_request(r#"{"message":"Hi"}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["provider"], "gemini");
    assert_eq!(body["reply"], "from gemini");
}

#[tokio::test]
async fn test_model_override_is_forwarded_verbatim() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"model": "gpt-4o"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_reply("ok")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let app = create_app(&mock_server.uri(), &[("OPENAI_API_KEY", "sk-test")]);
    let (status, body) = send(
        app,
        chat_request(r#"{"message":"Hi","provider":"OpenAI","model":"gpt-4o"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model"], "gpt-4o");
}

#[tokio::test]
async fn test_model_override_keeps_surrounding_whitespace() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"model": "gpt-4o "})))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_reply("ok")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let app = create_app(&mock_server.uri(), &[("OPENAI_API_KEY", "sk-test")]);
    let (status, body) = send(
        app,
        chat_request(r#"{"message":"Hi","model":"gpt-4o "}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model"], "gpt-4o ");
}

#[tokio::test]
async fn test_null_content_becomes_empty_reply() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": null}}]
        })))
        .mount(&mock_server)
        .await;

    let app = create_app(&mock_server.uri(), &[("OPENAI_API_KEY", "sk-test")]);
    let (status, body) = send(app, chat_request(r#"{"message":"Hi"}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reply"], "");
    assert_eq!(body["finish_reason"], Value::Null);
}

// ─────────────────────────────────────────────────────────────────────────────
// Client errors
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_blank_message_is_rejected_without_upstream_call() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_reply("unused")))
        .expect(0)
        .mount(&mock_server)
        .await;

    for body in [
        r#"{"message":""}"#,
        r#"{"message":"   "}"#,
        r#"{"provider":"openai"}"#,
        r#"{"message":42}"#,
        "not json",
    ] {
        let app = create_app(&mock_server.uri(), &[("OPENAI_API_KEY", "sk-test")]);
        let (status, json_body) = send(app, chat_request(body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {}", body);
        assert_eq!(json_body, json!({"error": "message is required"}));
    }
}

#[tokio::test]
async fn test_missing_content_type_is_rejected() {
    let mock_server = MockServer::start().await;
    let app = create_app(&mock_server.uri(), &[("OPENAI_API_KEY", "sk-test")]);

    let request = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .body(Body::from(r#"{"message":"Hi"}"#))
        .unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "message is required");
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider availability
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_no_provider_configured_returns_500() {
    let mock_server = MockServer::start().await;
    let app = create_app(&mock_server.uri(), &[]);

    let (status, body) = send(app, chat_request(r#"{"message":"Hi"}"#)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        json!({"error": "No API provider configured or available"})
    );
}

#[tokio::test]
async fn test_explicit_unconfigured_provider_does_not_fall_back() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_reply("unused")))
        .expect(0)
        .mount(&mock_server)
        .await;

    let app = create_app(&mock_server.uri(), &[("GEMINI_API_KEY", "gm-test")]);
    let (status, body) = send(
        app,
        chat_request(r#"{"message":"Hi","provider":"openai"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "No API provider configured or available");
}

#[tokio::test]
async fn test_unknown_provider_name_returns_500() {
    let mock_server = MockServer::start().await;
    let app = create_app(
        &mock_server.uri(),
        &[("OPENAI_API_KEY", "sk-test"), ("GEMINI_API_KEY", "gm-test")],
    );

    let (status, _) = send(
        app,
        chat_request(r#"{"message":"Hi","provider":"anthropic"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

// ─────────────────────────────────────────────────────────────────────────────
// Upstream failures
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_upstream_auth_failure_returns_502_with_detail() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
        })))
        .mount(&mock_server)
        .await;

    let app = create_app(&mock_server.uri(), &[("OPENAI_API_KEY", "sk-bad")]);
    let (status, body) = send(app, chat_request(r#"{"message":"Hi"}"#)).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "Failed to contact OpenAI");
    let detail = body["detail"].as_str().expect("detail should be a string");
    assert!(detail.contains("401"), "detail: {}", detail);
    assert!(
        detail.contains("Incorrect API key provided"),
        "detail: {}",
        detail
    );
}

#[tokio::test]
async fn test_gemini_blocked_prompt_returns_502() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        })))
        .mount(&mock_server)
        .await;

    let app = create_app(&mock_server.uri(), &[("GEMINI_API_KEY", "gm-test")]);
    let (status, body) = send(app, chat_request(r#"{"message":"Hi"}"#)).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "Failed to contact Gemini");
    assert!(body["detail"].as_str().unwrap().contains("SAFETY"));
}

#[tokio::test]
async fn test_upstream_failure_is_counted_in_metrics() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
        .mount(&mock_server)
        .await;

    let app = create_app(&mock_server.uri(), &[("GEMINI_API_KEY", "gm-test")]);
    let (status, _) = send(app.clone(), chat_request(r#"{"message":"Hi"}"#)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    assert!(
        text.contains(
            r#"chat_relay_requests_total{endpoint="chat",outcome="upstream_error",provider="gemini"} 1"#
        ),
        "metrics:\n{}",
        text
    );
}
