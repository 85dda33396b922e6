//! Signed webhook intake
//!
//! Requests are verified against the sender's public key before their body is
//! looked at. Verified chat messages go straight to the webhook store.

pub mod envelope;
pub mod handler;
pub mod payload;
pub mod signature;

pub use envelope::{WebhookEnvelope, CHAT_MESSAGE_EVENT};
pub use handler::{webhook_router, WebhookResponse, WebhookState};
pub use payload::extract_message;
pub use signature::{signed_content, SignatureVerifier, KICK_PUBLIC_KEY_PEM};
