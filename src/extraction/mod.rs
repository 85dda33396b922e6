//! Chat entry extraction
//!
//! Turns rendered chatroom pages into structured entries.

pub mod parser;

pub use parser::{html_to_plain_text, MessageParser, ParsedSnapshot, RawMessage};
