//! HTTP tests for webhook intake and the operator endpoints
//!
//! Deliveries are signed with the fixture key pair in `tests/fixtures/`.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use pretty_assertions::assert_eq;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use serde_json::{json, Value};
use sha2::Sha256;
use tower::ServiceExt;

use livechat_ingest::config::IngestConfig;
use livechat_ingest::error::{Error, Result};
use livechat_ingest::handlers::{router, AppState};
use livechat_ingest::session::{PageSession, PageSource};
use livechat_ingest::webhook::{signed_content, SignatureVerifier};

const PRIVATE_PEM: &str = include_str!("fixtures/test_private_key.pem");
const PUBLIC_PEM: &str = include_str!("fixtures/test_public_key.pem");
const TIMESTAMP: &str = "2026-03-01T12:00:00Z";

struct NoBrowser;

#[async_trait]
impl PageSource for NoBrowser {
    async fn acquire(&self) -> Result<Arc<dyn PageSession>> {
        Err(Error::generic("no browser available"))
    }
}

fn app_with(verifier: SignatureVerifier) -> (Arc<AppState>, Router) {
    let (state, _drain) = AppState::build(&IngestConfig::default(), verifier, Arc::new(NoBrowser));
    let app = router(Arc::clone(&state));
    (state, app)
}

fn app() -> (Arc<AppState>, Router) {
    app_with(SignatureVerifier::from_pem(PUBLIC_PEM))
}

fn sign(event_id: &str, body: &[u8]) -> String {
    let key = RsaPrivateKey::from_pkcs8_pem(PRIVATE_PEM).unwrap();
    let signer = SigningKey::<Sha256>::new(key);
    STANDARD.encode(signer.sign(&signed_content(event_id, TIMESTAMP, body)).to_bytes())
}

fn chat_body(message_id: &str, content: &str) -> Vec<u8> {
    json!({
        "message_id": message_id,
        "sender": { "username": "alice", "user_id": 123 },
        "content": content,
    })
    .to_string()
    .into_bytes()
}

fn delivery(
    path: &str,
    event_id: &str,
    event_type: &str,
    body: Vec<u8>,
    signed: bool,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .header("Kick-Event-Message-Id", event_id)
        .header("Kick-Event-Type", event_type)
        .header("Kick-Event-Message-Timestamp", TIMESTAMP);
    if signed {
        builder = builder.header("Kick-Event-Signature", sign(event_id, &body));
    }
    builder.body(Body::from(body)).unwrap()
}

/// Signed `chat.message.sent` delivery to the main route
fn chat(event_id: &str, body: Vec<u8>) -> Request<Body> {
    delivery("/kick-webhook", event_id, "chat.message.sent", body, true)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, body)
}

// ============================================================================
// Webhook intake
// ============================================================================

#[tokio::test]
async fn test_signed_chat_message_is_stored() {
    let (state, app) = app();
    let request = chat("evt-1", chat_body("msg-1", "hello chat"));

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "success" }));

    let (status, body) = send(&app, get("/messages?source=webhook")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    let message = &body["messages"][0];
    assert_eq!(message["id"], "msg-1");
    assert_eq!(message["username"], "alice");
    assert_eq!(message["text"], "hello chat");
    assert_eq!(message["user_id"], "123");
    assert_eq!(message["source"], "webhook");

    let counters = state.webhook().metrics().counters();
    assert_eq!(counters.received, 1);
    assert_eq!(counters.verified, 1);
    assert_eq!(counters.stored, 1);
}

#[tokio::test]
async fn test_redelivery_is_acknowledged_once() {
    let (state, app) = app();
    let body = chat_body("msg-1", "hello");

    let (_, first) = send(&app, chat("evt-1", body.clone())).await;
    let (status, second) = send(&app, chat("evt-1", body)).await;

    assert_eq!(first["status"], "success");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second, json!({ "status": "duplicate" }));
    assert_eq!(state.webhook().store().len(), 1);
    assert_eq!(state.webhook().metrics().counters().duplicates, 1);
}

#[tokio::test]
async fn test_unsigned_delivery_is_forbidden() {
    let (state, app) = app();
    let body = chat_body("msg-1", "hi");
    let request = delivery("/kick-webhook", "evt-1", "chat.message.sent", body, false);

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({ "status": "error", "message": "Invalid signature" }));
    assert!(state.webhook().store().is_empty());
    assert_eq!(state.webhook().metrics().counters().rejected, 1);
}

#[tokio::test]
async fn test_tampered_body_is_forbidden() {
    let (state, app) = app();
    let signed_for = chat_body("msg-1", "hi");
    let mut request = chat("evt-1", signed_for);
    *request.body_mut() = Body::from(chat_body("msg-1", "hI"));

    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(state.webhook().store().is_empty());
}

#[tokio::test]
async fn test_signature_from_other_key_is_forbidden() {
    // the built-in key did not sign the fixture deliveries
    let (_, app) = app_with(SignatureVerifier::kick());
    let request = chat("evt-1", chat_body("msg-1", "hi"));

    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_other_event_types_are_ignored() {
    let (state, app) = app();
    let body = json!({ "follower": { "username": "bob" } }).to_string().into_bytes();
    let request = delivery("/kick-webhook", "evt-2", "channel.followed", body, true);

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ignored" }));
    assert!(state.webhook().store().is_empty());
}

#[tokio::test]
async fn test_empty_content_is_payload_error() {
    let (state, app) = app();
    let request = chat("evt-3", chat_body("msg-3", "   "));

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "error");
    assert!(body["message"].is_string());
    assert!(state.webhook().store().is_empty());
    assert_eq!(state.webhook().metrics().counters().payload_errors, 1);
}

#[tokio::test]
async fn test_invalid_json_is_payload_error() {
    let (_, app) = app();
    let request = chat("evt-4", b"{not json".to_vec());

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_underscore_alias_route() {
    let (state, app) = app();
    let body = chat_body("msg-5", "alias");
    let request = delivery("/kick_webhook", "evt-5", "chat.message.sent", body, true);

    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state.webhook().store().len(), 1);
}

// ============================================================================
// Operator endpoints
// ============================================================================

#[tokio::test]
async fn test_clear_allows_redelivery() {
    let (state, app) = app();
    let body = chat_body("msg-1", "hello");
    send(&app, chat("evt-1", body.clone())).await;

    let (status, cleared) = send(&app, post("/messages/clear?source=webhook")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared, json!({ "status": "success", "cleared": 1 }));
    assert!(state.webhook().store().is_empty());

    let (_, again) = send(&app, chat("evt-1", body)).await;
    assert_eq!(again["status"], "success");
}

#[tokio::test]
async fn test_messages_limit_and_unknown_source() {
    let (_, app) = app();
    for i in 0..5 {
        let id = format!("msg-{i}");
        send(&app, chat(&id, chat_body(&id, "x"))).await;
    }

    let (_, body) = send(&app, get("/messages?limit=2")).await;
    assert_eq!(body["count"], 2);
    assert_eq!(body["messages"][0]["id"], "msg-3");
    assert_eq!(body["messages"][1]["id"], "msg-4");

    let (_, body) = send(&app, get("/messages?source=webhook&limit=1")).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["messages"][0]["id"], "msg-4");

    let (_, body) = send(&app, get("/messages?source=scrape&limit=3")).await;
    assert_eq!(body["count"], 0);

    let (status, body) = send(&app, get("/messages?source=irc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_status_reports_pipeline() {
    let (_, app) = app();
    send(&app, chat("evt-1", chat_body("m", "x"))).await;

    let (status, body) = send(&app, get("/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "running");
    assert_eq!(body["scraper"]["state"], "idle");
    assert_eq!(body["stores"]["webhook"]["len"], 1);
    assert_eq!(body["stores"]["webhook"]["capacity"], 100);
    assert_eq!(body["webhook"]["stored"], 1);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (_, app) = app();
    let body = chat_body("m", "x");
    send(&app, delivery("/kick-webhook", "evt-1", "chat.message.sent", body, false)).await;

    let response = app.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("livechat_webhook_received_total 1"));
    assert!(text.contains("livechat_webhook_rejected_total 1"));
}

#[tokio::test]
async fn test_probes() {
    let (_, app) = app();
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "healthy" }));

    let (status, _) = send(&app, get("/ready")).await;
    assert_eq!(status, StatusCode::OK);

    let (_, keyless) = app_with(SignatureVerifier::without_key());
    let (status, body) = send(&keyless, get("/ready")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unavailable");
}

#[tokio::test]
async fn test_scraper_start_rejects_bad_channel() {
    let (state, app) = app();
    let request = Request::builder()
        .method("POST")
        .uri("/scraper/start")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "channel": "not a channel" }).to_string()))
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert!(!state.scraper().is_running());
}

#[tokio::test]
async fn test_scraper_stop_when_idle() {
    let (_, app) = app();
    let (status, body) = send(&app, post("/scraper/stop")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "idle");
}

#[tokio::test]
async fn test_cors_allows_only_localhost() {
    let (_, app) = app();
    let local = Request::builder()
        .uri("/status")
        .header(header::ORIGIN, "http://localhost:8501")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(local).await.unwrap();
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "http://localhost:8501"
    );

    let remote = Request::builder()
        .uri("/status")
        .header(header::ORIGIN, "http://evil.example")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(remote).await.unwrap();
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}
