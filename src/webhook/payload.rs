//! Chat message extraction from a verified webhook body
//!
//! Field names follow the `chat.message.sent` payload. Older and third-party
//! senders use `message`/`text`/`msg` for the content and a top-level
//! `username`/`user` for the author, so those are accepted as fallbacks.

use serde::Deserialize;
use serde_json::Value;

use crate::error::PayloadError;
use crate::extraction::parser::UNKNOWN_USERNAME;
use crate::pipeline::{ChatMessage, Source};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChatPayload {
    message_id: Option<Value>,
    sender: Option<Sender>,
    content: Option<String>,
    message: Option<String>,
    text: Option<String>,
    msg: Option<String>,
    username: Option<String>,
    user: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Sender {
    username: Option<String>,
    user_id: Option<Value>,
}

impl ChatPayload {
    fn content(&self) -> Option<&str> {
        [&self.content, &self.message, &self.text, &self.msg]
            .into_iter()
            .filter_map(|f| f.as_deref())
            .map(str::trim)
            .find(|s| !s.is_empty())
    }

    fn username(&self) -> Option<&str> {
        self.sender
            .as_ref()
            .and_then(|s| s.username.as_deref())
            .into_iter()
            .chain(self.username.as_deref())
            .chain(self.user.as_deref())
            .map(str::trim)
            .find(|s| !s.is_empty())
    }
}

/// Extract a chat message from a raw webhook body.
///
/// `delivery_id` is the envelope's event id, used when the body has no
/// `message_id` of its own.
pub fn extract_message(
    raw_body: &[u8],
    delivery_id: Option<&str>,
) -> Result<ChatMessage, PayloadError> {
    let payload: ChatPayload = serde_json::from_slice(raw_body)
        .map_err(|e| PayloadError::InvalidJson(e.to_string()))?;

    let text = payload.content().ok_or(PayloadError::EmptyContent)?;
    let id = payload
        .message_id
        .as_ref()
        .and_then(scalar_to_string)
        .or_else(|| delivery_id.filter(|id| !id.is_empty()).map(str::to_string))
        .ok_or(PayloadError::MissingId)?;
    let username = payload.username().unwrap_or(UNKNOWN_USERNAME);
    let user_id = payload
        .sender
        .as_ref()
        .and_then(|s| s.user_id.as_ref())
        .and_then(scalar_to_string);

    Ok(ChatMessage::new(Source::Webhook, id, username, text).with_user_id(user_id))
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_kick_payload() {
        let body = br#"{
            "message_id": "01J8",
            "broadcaster": {"username": "streamer"},
            "sender": {"user_id": 123456, "username": "viewer1"},
            "content": "hello chat",
            "emotes": []
        }"#;
        let msg = extract_message(body, Some("evt-1")).unwrap();
        assert_eq!(msg.id(), "01J8");
        assert_eq!(msg.username(), "viewer1");
        assert_eq!(msg.text(), "hello chat");
        assert_eq!(msg.user_id(), Some("123456"));
        assert_eq!(msg.source(), Source::Webhook);
    }

    #[test]
    fn test_fallback_fields() {
        let body = br#"{"message": "  hi there ", "user": "bob"}"#;
        let msg = extract_message(body, Some("evt-9")).unwrap();
        assert_eq!(msg.id(), "evt-9");
        assert_eq!(msg.username(), "bob");
        assert_eq!(msg.text(), "hi there");
        assert_eq!(msg.user_id(), None);
    }

    #[test]
    fn test_unknown_username() {
        let msg = extract_message(br#"{"message_id": 7, "text": "x"}"#, None).unwrap();
        assert_eq!(msg.id(), "7");
        assert_eq!(msg.username(), UNKNOWN_USERNAME);
    }

    #[test]
    fn test_empty_content() {
        let err = extract_message(br#"{"message_id": "a", "content": "   "}"#, None).unwrap_err();
        assert_eq!(err, PayloadError::EmptyContent);
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            extract_message(b"not json", None),
            Err(PayloadError::InvalidJson(_))
        ));
        assert!(matches!(
            extract_message(b"[1,2]", None),
            Err(PayloadError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_missing_id() {
        let err = extract_message(br#"{"content": "x"}"#, Some("")).unwrap_err();
        assert_eq!(err, PayloadError::MissingId);
    }
}
