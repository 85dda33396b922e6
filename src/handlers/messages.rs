//! Read-side endpoints for the message stores and the operator log
//!
//! - `GET /messages?source=webhook|scrape&limit=N`
//! - `POST /messages/clear?source=webhook|scrape`
//! - `GET /events?limit=N`
//!
//! Without `source`, `/messages` merges both stores ordered by receive time
//! and `/messages/clear` empties both.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::status::AppState;
use crate::pipeline::{ChatMessage, OperatorEvent, Source};

/// Query of `/messages` and `/messages/clear`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagesQuery {
    /// `webhook` or `scrape`; both when absent
    pub source: Option<String>,
    /// Return at most the newest `limit` messages
    pub limit: Option<usize>,
}

/// Query of `/events`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventsQuery {
    /// Return at most the newest `limit` events
    pub limit: Option<usize>,
}

/// `/messages` response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesResponse {
    /// Messages, oldest first
    pub messages: Vec<ChatMessage>,
    /// Number of messages returned
    pub count: usize,
}

/// `/events` response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsResponse {
    /// Operator events, oldest first
    pub events: Vec<OperatorEvent>,
    /// Number of events returned
    pub count: usize,
}

/// `/messages/clear` response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearResponse {
    /// Always `success`
    pub status: String,
    /// Messages removed
    pub cleared: usize,
}

fn bad_request(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "status": "error", "message": message })),
    )
        .into_response()
}

/// Parse an optional `source`; `Ok(None)` means both stores
fn parse_source(raw: Option<&str>) -> Result<Option<Source>, String> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => s.parse().map(Some),
    }
}

fn keep_newest<T>(mut items: Vec<T>, limit: Option<usize>) -> Vec<T> {
    if let Some(limit) = limit {
        if items.len() > limit {
            items.drain(..items.len() - limit);
        }
    }
    items
}

/// Messages of one store, or of both merged by receive time
pub fn collect_messages(
    state: &AppState,
    source: Option<Source>,
    limit: Option<usize>,
) -> Vec<ChatMessage> {
    match (source, limit) {
        (Some(source), Some(n)) => state.store(source).tail(n),
        (Some(source), None) => state.store(source).snapshot(),
        (None, _) => {
            let mut all = state.store(Source::Webhook).snapshot();
            all.extend(state.store(Source::Scrape).snapshot());
            all.sort_by_key(|m| m.received_at());
            keep_newest(all, limit)
        }
    }
}

/// `GET /messages`
#[instrument(skip_all)]
pub async fn messages_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MessagesQuery>,
) -> Response {
    let source = match parse_source(query.source.as_deref()) {
        Ok(source) => source,
        Err(e) => return bad_request(e),
    };
    let messages = collect_messages(&state, source, query.limit);
    debug!(count = messages.len(), "Listing messages");
    Json(MessagesResponse {
        count: messages.len(),
        messages,
    })
    .into_response()
}

/// `POST /messages/clear`
#[instrument(skip_all)]
pub async fn clear_messages_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MessagesQuery>,
) -> Response {
    let source = match parse_source(query.source.as_deref()) {
        Ok(source) => source,
        Err(e) => return bad_request(e),
    };
    let clear = |source: Source| match source {
        // forgets delivered ids as well
        Source::Webhook => state.webhook().clear(),
        Source::Scrape => state.store(Source::Scrape).clear(),
    };
    let cleared = match source {
        Some(source) => clear(source),
        None => clear(Source::Webhook) + clear(Source::Scrape),
    };
    info!(cleared, source = ?source, "Cleared messages");
    Json(ClearResponse {
        status: "success".to_string(),
        cleared,
    })
    .into_response()
}

/// `GET /events`
#[instrument(skip_all)]
pub async fn events_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> Json<EventsResponse> {
    let log = state.event_log();
    let events = match query.limit {
        Some(n) => log.tail(n),
        None => log.snapshot(),
    };
    Json(EventsResponse {
        count: events.len(),
        events,
    })
}
