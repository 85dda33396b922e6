//! Webhook endpoint
//!
//! ```text
//! POST /kick-webhook
//!   │
//!   ├─ signature invalid ─────────────▶ 403
//!   ├─ not chat.message.sent ─────────▶ 200 {"status":"ignored"}
//!   ├─ body unusable ─────────────────▶ 200 {"status":"error"}
//!   ├─ message id already stored ─────▶ 200 {"status":"duplicate"}
//!   └─ append to webhook store ───────▶ 200 {"status":"success"}
//! ```
//!
//! Only a bad signature is answered with a rejecting status. Anything wrong
//! after verification is acknowledged with 200 so the sender does not retry.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::envelope::WebhookEnvelope;
use super::payload::extract_message;
use super::signature::SignatureVerifier;
use crate::metrics::{DeliveryOutcome, WebhookMetrics};
use crate::pipeline::{BoundedStore, ChatMessage, DedupWindow, IngestSender};

/// JSON body of every webhook response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookResponse {
    /// `success`, `duplicate`, `ignored` or `error`
    pub status: String,
    /// Human-readable detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WebhookResponse {
    fn new(status: &str) -> Self {
        Self {
            status: status.to_string(),
            message: None,
        }
    }

    fn with_message(status: &str, message: impl Into<String>) -> Self {
        Self {
            status: status.to_string(),
            message: Some(message.into()),
        }
    }
}

/// Shared state of the webhook endpoint
pub struct WebhookState {
    verifier: SignatureVerifier,
    store: Arc<BoundedStore<ChatMessage>>,
    dedup: DedupWindow,
    metrics: WebhookMetrics,
    events: Option<IngestSender>,
}

impl WebhookState {
    /// State writing accepted messages to `store`
    pub fn new(
        verifier: SignatureVerifier,
        store: Arc<BoundedStore<ChatMessage>>,
        dedup_capacity: usize,
    ) -> Self {
        Self {
            verifier,
            store,
            dedup: DedupWindow::new(dedup_capacity),
            metrics: WebhookMetrics::new(),
            events: None,
        }
    }

    /// Also report rejected and unusable deliveries on the operator channel
    pub fn with_events(mut self, events: IngestSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Signature verifier in use
    pub fn verifier(&self) -> &SignatureVerifier {
        &self.verifier
    }

    /// The webhook message store
    pub fn store(&self) -> &Arc<BoundedStore<ChatMessage>> {
        &self.store
    }

    /// Delivery counters and latency
    pub fn metrics(&self) -> &WebhookMetrics {
        &self.metrics
    }

    /// Clear stored messages and the redelivery window
    pub fn clear(&self) -> usize {
        self.dedup.clear();
        self.store.clear()
    }

    /// Decide the response for one delivery, applying its side effects
    pub fn handle(
        &self,
        envelope: &WebhookEnvelope,
    ) -> (StatusCode, DeliveryOutcome, WebhookResponse) {
        if let Err(reason) = self.verifier.try_verify(envelope) {
            warn!(%reason, event_id = ?envelope.event_id, "Webhook signature verification failed");
            self.notify(format!("Rejected webhook delivery: {reason}"));
            return (
                StatusCode::FORBIDDEN,
                DeliveryOutcome::Rejected,
                WebhookResponse::with_message("error", "Invalid signature"),
            );
        }

        if !envelope.is_chat_message() {
            debug!(event_type = ?envelope.event_type, "Ignoring webhook event");
            return (
                StatusCode::OK,
                DeliveryOutcome::Ignored,
                WebhookResponse::new("ignored"),
            );
        }

        let message = match extract_message(&envelope.raw_body, envelope.event_id.as_deref()) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Verified webhook carried no usable message");
                self.notify(format!("Webhook payload error: {e}"));
                return (
                    StatusCode::OK,
                    DeliveryOutcome::PayloadError,
                    WebhookResponse::with_message("error", e.to_string()),
                );
            }
        };

        if !self.dedup.insert_if_new(message.id()) {
            debug!(id = message.id(), "Duplicate webhook delivery");
            return (
                StatusCode::OK,
                DeliveryOutcome::Duplicate,
                WebhookResponse::new("duplicate"),
            );
        }

        info!(
            id = message.id(),
            username = message.username(),
            "Webhook chat message stored"
        );
        self.store.append(message);
        (
            StatusCode::OK,
            DeliveryOutcome::Stored,
            WebhookResponse::new("success"),
        )
    }

    fn notify(&self, text: String) {
        if let Some(events) = &self.events {
            events.warning(text);
        }
    }
}

/// `POST /kick-webhook`
#[instrument(skip_all)]
pub async fn webhook_handler(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let envelope = WebhookEnvelope::from_parts(&headers, body);
    let (status, outcome, response) = state.handle(&envelope);
    state.metrics.record(outcome, started.elapsed());
    (status, Json(response)).into_response()
}

/// Router serving the webhook endpoint and its underscore alias
pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/kick-webhook", post(webhook_handler))
        .route("/kick_webhook", post(webhook_handler))
        .with_state(state)
}
