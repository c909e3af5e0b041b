//! End-to-end tests of [`HttpBridge`] against an in-process stub bridge.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use codial_bridge::{BridgeError, BridgeRequest, HttpBridge, ProviderBridge, SystemContext};

async fn generate_handler(Json(payload): Json<Value>) -> impl IntoResponse {
    // The stub keys its behavior off the conversation text.
    let text = payload["text"].as_str().unwrap_or("");
    match text {
        "tools" => Json(json!({
            "decision_summary": "needs a file",
            "tool_requests": [
                {"call_id": "t1", "name": "fs.read", "arguments": {"path": "a"}}
            ]
        }))
        .into_response(),
        "rate-limit" => (
            StatusCode::TOO_MANY_REQUESTS,
            [("Retry-After", "2")],
            "slow down",
        )
            .into_response(),
        "unauthorized" => (StatusCode::UNAUTHORIZED, "bad token").into_response(),
        "server-error" => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
        _ => Json(json!({
            "output_text": format!("echo: {text}"),
            "decision_summary": "answered",
            "tool_requests": []
        }))
        .into_response(),
    }
}

async fn start_stub() -> String {
    let app = Router::new().route("/v1/generate", post(generate_handler));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _server = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn request(text: &str) -> BridgeRequest {
    BridgeRequest {
        session_id: "s-1".into(),
        user_id: "u-1".into(),
        provider: "github-copilot-sdk".into(),
        model: "gpt-5-mini".into(),
        text: text.into(),
        attachments: vec![],
        mcp_enabled: false,
        mcp_profile_name: None,
        system_context: SystemContext::default(),
        tool_specs: vec![],
        tool_results: vec![],
        tool_call_round: 0,
    }
}

fn bridge(url: &str) -> HttpBridge {
    HttpBridge::new(
        "github-copilot-sdk",
        url,
        Some("tok".into()),
        Duration::from_secs(2),
        "GitHub Copilot SDK",
    )
    .unwrap()
}

#[tokio::test]
async fn terminal_response_roundtrips() {
    let url = start_stub().await;
    let response = bridge(&url).generate(&request("hello")).await.unwrap();
    assert!(response.is_terminal());
    assert_eq!(response.output_text, "echo: hello");
    assert_eq!(response.decision_summary, "answered");
}

#[tokio::test]
async fn tool_requests_parsed() {
    let url = start_stub().await;
    let response = bridge(&url).generate(&request("tools")).await.unwrap();
    assert!(!response.is_terminal());
    assert_eq!(response.tool_requests.len(), 1);
    assert_eq!(response.tool_requests[0].name, "fs.read");
    assert_eq!(response.tool_requests[0].tool_call_id.as_str(), "t1");
}

#[tokio::test]
async fn rate_limit_maps_with_retry_after() {
    let url = start_stub().await;
    let err = bridge(&url).generate(&request("rate-limit")).await.unwrap_err();
    match err {
        BridgeError::RateLimited { retry_after_ms } => assert_eq!(retry_after_ms, 2_000),
        other => panic!("expected rate limit, got {other:?}"),
    }
}

#[tokio::test]
async fn unauthorized_maps_to_auth() {
    let url = start_stub().await;
    let err = bridge(&url).generate(&request("unauthorized")).await.unwrap_err();
    assert!(matches!(err, BridgeError::Auth { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn server_error_is_retryable_api_error() {
    let url = start_stub().await;
    let err = bridge(&url).generate(&request("server-error")).await.unwrap_err();
    match &err {
        BridgeError::Api { status, .. } => assert_eq!(*status, 500),
        other => panic!("expected api error, got {other:?}"),
    }
    assert!(err.is_retryable());
}

#[tokio::test]
async fn empty_base_url_is_not_configured() {
    let bridge = HttpBridge::new(
        "github-copilot-sdk",
        "",
        None,
        Duration::from_secs(1),
        "GitHub Copilot SDK",
    )
    .unwrap();
    let err = bridge.generate(&request("hello")).await.unwrap_err();
    assert!(matches!(err, BridgeError::NotConfigured { .. }));
}

#[tokio::test]
async fn unreachable_bridge_is_transport_error() {
    let bridge = HttpBridge::new(
        "github-copilot-sdk",
        "http://127.0.0.1:1",
        None,
        Duration::from_millis(300),
        "GitHub Copilot SDK",
    )
    .unwrap();
    let err = bridge.generate(&request("hello")).await.unwrap_err();
    assert!(err.is_retryable());
}
