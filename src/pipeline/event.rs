//! Message and event types carried through the pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a chat message came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Signed webhook push
    Webhook,
    /// Polling scraper
    Scrape,
}

impl Source {
    /// Lowercase name used in query strings and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Webhook => "webhook",
            Source::Scrape => "scrape",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "webhook" => Ok(Source::Webhook),
            "scrape" => Ok(Source::Scrape),
            other => Err(format!("unknown source: {other}")),
        }
    }
}

/// An accepted chat message.
///
/// Identity is `(source, id)`; ids are only unique within one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    id: String,
    username: String,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    source: Source,
    received_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Build a message stamped with the current time
    pub fn new(
        source: Source,
        id: impl Into<String>,
        username: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            text: text.into(),
            user_id: None,
            source,
            received_at: Utc::now(),
        }
    }

    /// Attach the author's source-side id
    pub fn with_user_id(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    /// Override the receive timestamp
    pub fn with_received_at(mut self, at: DateTime<Utc>) -> Self {
        self.received_at = at;
        self
    }

    /// Source-assigned message id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Author display name
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Plain message text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Author id, when the source provides one
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Which source delivered the message
    pub fn source(&self) -> Source {
        self.source
    }

    /// When the pipeline accepted the message
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// `(source, id)` identity key
    pub fn key(&self) -> (Source, &str) {
        (self.source, &self.id)
    }
}

/// Severity/kind tag of an [`IngestEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Progress information
    Status,
    /// Recoverable issue, the producer keeps going
    Warning,
    /// The producer stopped
    Error,
    /// A chat message
    Message,
}

/// A typed event on the ingest queue.
///
/// Serializes as `{"type": "...", "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum IngestEvent {
    /// Progress information for the operator
    Status(String),
    /// Recoverable issue
    Warning(String),
    /// Loop-level failure
    Error(String),
    /// Accepted chat message
    Message(ChatMessage),
}

impl IngestEvent {
    /// Kind tag of this event
    pub fn kind(&self) -> EventKind {
        match self {
            IngestEvent::Status(_) => EventKind::Status,
            IngestEvent::Warning(_) => EventKind::Warning,
            IngestEvent::Error(_) => EventKind::Error,
            IngestEvent::Message(_) => EventKind::Message,
        }
    }

    /// The message payload, if this is a message event
    pub fn as_message(&self) -> Option<&ChatMessage> {
        match self {
            IngestEvent::Message(msg) => Some(msg),
            _ => None,
        }
    }
}

/// A status/warning/error event as kept in the operator log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorEvent {
    /// Event kind (never `message`)
    pub kind: EventKind,
    /// Human readable text
    pub text: String,
    /// When the drain loop relayed it
    pub at: DateTime<Utc>,
}

impl OperatorEvent {
    /// Convert a non-message event; message events yield `None`
    pub fn from_event(event: &IngestEvent) -> Option<Self> {
        let text = match event {
            IngestEvent::Status(t) | IngestEvent::Warning(t) | IngestEvent::Error(t) => t.clone(),
            IngestEvent::Message(_) => return None,
        };
        Some(Self {
            kind: event.kind(),
            text,
            at: Utc::now(),
        })
    }
}
