//! Producer/consumer pipeline
//!
//! Producers (the scrape session and the webhook handler) push typed
//! [`IngestEvent`]s onto an [`IngestQueue`]; a single [`DrainLoop`] per store
//! moves them into [`BoundedStore`]s in bounded batches.
//!
//! ```text
//! SessionController ──▶ DedupWindow ──▶ IngestQueue ──▶ DrainLoop ──▶ BoundedStore (scrape)
//!                                            │                 └────▶ BoundedStore (operator log)
//! Webhook handler ──────────────────────────┘ (warnings)
//! Webhook handler ──▶ DedupWindow ──▶ BoundedStore (webhook)
//! ```

pub mod dedup;
pub mod drain;
pub mod event;
pub mod queue;
pub mod store;

pub use dedup::DedupWindow;
pub use drain::{DrainLoop, DrainStats};
pub use event::{ChatMessage, EventKind, IngestEvent, OperatorEvent, Source};
pub use queue::{IngestQueue, IngestReceiver, IngestSender};
pub use store::BoundedStore;
