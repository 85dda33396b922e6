//! Livechat Ingest - live chat capture for a streaming platform
//!
//! Chat messages arrive two ways and end up in bounded, deduplicated stores
//! that operator tooling reads over HTTP.
//!
//! # Features
//!
//! - **Signed Webhooks**: RSA-SHA256 verified push deliveries
//! - **Browser Scraping**: Headless Chromium polling of the chatroom page (CDP)
//! - **Deduplication**: Bounded recency windows per source
//! - **Bounded Stores**: Oldest entries evicted first
//!
//! # Architecture
//!
//! ```text
//! Platform ──POST──▶ Webhook Handler ──verify──▶ DedupWindow ──▶ BoundedStore (webhook)
//!
//! Chromium ◀──CDP── SessionController ──▶ MessageParser ──▶ DedupWindow
//!                                                              │
//!                                                              ▼
//!                         BoundedStore (scrape) ◀── DrainLoop ◀── IngestQueue
//!                         BoundedStore (events) ◀──────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use livechat_ingest::config::IngestConfig;
//! use livechat_ingest::handlers::{router, AppState};
//! use livechat_ingest::session::ChromiumPageSource;
//! use livechat_ingest::webhook::SignatureVerifier;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = IngestConfig::from_env()?;
//!     let source = Arc::new(ChromiumPageSource::new(config.scraper.browser.clone()));
//!     let (state, drain) = AppState::build(&config, SignatureVerifier::kick(), source);
//!
//!     let (_stop, shutdown) = tokio::sync::watch::channel(false);
//!     tokio::spawn(drain.run(shutdown));
//!
//!     let listener = tokio::net::TcpListener::bind(config.server.socket_addr()).await?;
//!     axum::serve(listener, router(state)).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod browser;
pub mod config;
pub mod cors;
pub mod error;
pub mod extraction;
pub mod handlers;
pub mod metrics;
pub mod pipeline;
pub mod session;
pub mod webhook;

// Re-exports for convenience
pub use config::IngestConfig;
pub use error::{Error, Result};
pub use extraction::MessageParser;
pub use handlers::{router, AppState};
pub use pipeline::{BoundedStore, ChatMessage, DedupWindow, IngestQueue, Source};
pub use session::{SessionController, SessionState};
pub use webhook::SignatureVerifier;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
