//! Chat entry extraction from a rendered chatroom snapshot
//!
//! The page is split on the entry delimiter attribute rather than parsed as a
//! full DOM: the markup is only loosely stable, and one broken entry must not
//! cost the rest of the snapshot. Each fragment is then mined for its id,
//! author and content region. Only the content region goes through an HTML
//! parser, to turn it into plain text.

use scraper::Html;
use tracing::trace;

use crate::error::ParseIssue;
use crate::pipeline::{ChatMessage, Source};

/// Attribute that opens every chat entry; the id follows up to the next quote
pub const ENTRY_DELIMITER: &str = "data-chat-entry=\"";

/// Marker of the "older messages above" placeholder entry
pub const HISTORY_BREAKER: &str = "chatroom-history-breaker";

/// Opening of the content region inside an entry
pub const CONTENT_OPEN: &str = "class=\"chat-entry-content\">";

/// End of the content region
pub const CONTENT_CLOSE: &str = "</div>";

/// Author id attribute
pub const USER_ID_ATTR: &str = "data-chat-entry-user-id=\"";

/// Class on the author name element, used when no author id is present
pub const USERNAME_CLASS: &str = "chat-entry-username";

/// Display name used when none can be extracted
pub const UNKNOWN_USERNAME: &str = "unknown";

const SNIPPET_CHARS: usize = 120;

/// One chat entry as found on the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Message id from the entry attribute
    pub id: String,
    /// Plain text content (empty when the entry has no content region)
    pub text: String,
    /// Author id, when present
    pub user_id: Option<String>,
    /// Author display name, [`UNKNOWN_USERNAME`] when not found
    pub username: String,
}

impl RawMessage {
    /// Turn the entry into an accepted chat message from `source`
    pub fn into_message(self, source: Source) -> ChatMessage {
        ChatMessage::new(source, self.id, self.username, self.text).with_user_id(self.user_id)
    }
}

/// Result of parsing one snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedSnapshot {
    /// Entries in page order
    pub messages: Vec<RawMessage>,
    /// Fragments that were dropped
    pub issues: Vec<ParseIssue>,
    /// Placeholder fragments skipped on purpose
    pub placeholders: usize,
}

impl ParsedSnapshot {
    /// Whether the snapshot yielded nothing at all
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.issues.is_empty()
    }
}

/// Stateless chat entry parser
pub struct MessageParser;

impl MessageParser {
    /// Split `snapshot` into chat entries.
    ///
    /// Entries come back in the page's order. A fragment without a usable id
    /// is reported in `issues` and otherwise ignored.
    pub fn parse(snapshot: &str) -> ParsedSnapshot {
        let mut parsed = ParsedSnapshot::default();

        // everything before the first delimiter is page chrome
        for (index, fragment) in snapshot.split(ENTRY_DELIMITER).skip(1).enumerate() {
            if fragment.contains(HISTORY_BREAKER) {
                parsed.placeholders += 1;
                continue;
            }
            match Self::parse_entry(fragment) {
                Ok(raw) => parsed.messages.push(raw),
                Err(reason) => {
                    trace!(index, %reason, "Dropping chat entry");
                    parsed.issues.push(ParseIssue {
                        index,
                        reason,
                        snippet: snippet(fragment),
                    });
                }
            }
        }
        parsed
    }

    fn parse_entry(fragment: &str) -> Result<RawMessage, String> {
        let id = Self::entry_id(fragment)?;
        let text = Self::content_text(fragment);
        let user_id = attr_value(fragment, USER_ID_ATTR)
            .map(str::trim)
            .filter(|uid| !uid.is_empty())
            .map(str::to_string);
        let username = Self::username(fragment, user_id.as_deref())
            .unwrap_or_else(|| UNKNOWN_USERNAME.to_string());

        Ok(RawMessage {
            id,
            text,
            user_id,
            username,
        })
    }

    fn entry_id(fragment: &str) -> Result<String, String> {
        let end = fragment
            .find('"')
            .ok_or_else(|| "unterminated message id".to_string())?;
        let id = fragment[..end].trim();
        if id.is_empty() {
            return Err("missing message id".to_string());
        }
        if id.chars().any(|c| c == '<' || c == '>' || c.is_whitespace()) {
            return Err(format!("malformed message id {:?}", truncate(id, 32)));
        }
        Ok(id.to_string())
    }

    fn content_text(fragment: &str) -> String {
        let Some(start) = fragment.find(CONTENT_OPEN) else {
            return String::new();
        };
        let region = &fragment[start + CONTENT_OPEN.len()..];
        let region = match region.find(CONTENT_CLOSE) {
            Some(end) => &region[..end],
            None => region,
        };
        html_to_plain_text(region)
    }

    fn username(fragment: &str, user_id: Option<&str>) -> Option<String> {
        let anchor = user_id
            .and_then(|uid| fragment.find(&format!(" id=\"{uid}\"")))
            .or_else(|| fragment.find(USERNAME_CLASS))?;
        let after = &fragment[anchor..];
        // the name sits after the element's closing `">`
        let open = after.find("\">")?;
        let rest = &after[open + 2..];
        let end = rest.find("</span>")?;
        let name = html_to_plain_text(&rest[..end]);
        (!name.is_empty()).then_some(name)
    }
}

/// Strip markup from an HTML fragment, decode entities and collapse whitespace
pub fn html_to_plain_text(html: &str) -> String {
    if !html.contains('<') && !html.contains('&') {
        return html.split_whitespace().collect::<Vec<_>>().join(" ");
    }
    let doc = Html::parse_fragment(html);
    let text: String = doc.root_element().text().collect();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn attr_value<'a>(fragment: &'a str, attr: &str) -> Option<&'a str> {
    let start = fragment.find(attr)? + attr.len();
    let rest = &fragment[start..];
    let end = rest.find('"')?;
    Some(&rest[..end])
}

fn snippet(fragment: &str) -> String {
    truncate(fragment, SNIPPET_CHARS)
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
