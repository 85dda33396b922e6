//! Browser-driven chat scraping
//!
//! ```text
//! SessionController ──acquire──▶ PageSource ──▶ PageSession (Chromium page)
//!        │                                          │
//!        │  every poll interval                     │ page_source()
//!        ▼                                          ▼
//!   PageClassifier ──Ready──▶ MessageParser ──▶ DedupWindow ──▶ IngestQueue
//! ```

pub mod classify;
pub mod controller;
pub mod source;
pub mod state;

pub use classify::{PageClassifier, PageCondition};
pub use controller::{is_valid_channel, SessionController, TickReport};
pub use source::{ChromiumPageSource, ChromiumSession, PageSession, PageSource};
pub use state::SessionState;
