//! Inbound webhook request, as received

use axum::body::Bytes;
use http::HeaderMap;

/// Delivery id header
pub const EVENT_ID_HEADER: &str = "Kick-Event-Message-Id";

/// Event type header
pub const EVENT_TYPE_HEADER: &str = "Kick-Event-Type";

/// Delivery timestamp header
pub const TIMESTAMP_HEADER: &str = "Kick-Event-Message-Timestamp";

/// Base64 signature header
pub const SIGNATURE_HEADER: &str = "Kick-Event-Signature";

/// Event type carrying a chat message
pub const CHAT_MESSAGE_EVENT: &str = "chat.message.sent";

/// Headers and raw body of one webhook request.
///
/// Built once per request and never stored. Header values that are absent or
/// not valid UTF-8 are `None`.
#[derive(Debug, Clone)]
pub struct WebhookEnvelope {
    /// Delivery id
    pub event_id: Option<String>,
    /// Event type
    pub event_type: Option<String>,
    /// Delivery timestamp, verbatim
    pub timestamp: Option<String>,
    /// Base64-encoded signature
    pub signature_b64: Option<String>,
    /// Request body, byte for byte
    pub raw_body: Bytes,
}

impl WebhookEnvelope {
    /// Build an envelope from request parts
    pub fn from_parts(headers: &HeaderMap, raw_body: Bytes) -> Self {
        Self {
            event_id: header(headers, EVENT_ID_HEADER),
            event_type: header(headers, EVENT_TYPE_HEADER),
            timestamp: header(headers, TIMESTAMP_HEADER),
            signature_b64: header(headers, SIGNATURE_HEADER),
            raw_body,
        }
    }

    /// Whether this delivery carries a chat message
    pub fn is_chat_message(&self) -> bool {
        self.event_type.as_deref() == Some(CHAT_MESSAGE_EVENT)
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
