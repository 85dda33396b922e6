//! Status and health check handlers.
//!
//! - `/health` - liveness, always 200 while the server answers
//! - `/ready` - 200 once the webhook key is loaded, 503 otherwise
//! - `/status` - session state, store sizes, queue depth and webhook metrics
//! - `/metrics` - the webhook metrics as Prometheus text
//!
//! # Example Response
//!
//! ```json
//! {
//!   "version": "0.1.0",
//!   "uptime_seconds": 3600,
//!   "scraper": { "state": "polling", "channel": "xqc", "dedup_size": 500 },
//!   "stores": { "webhook": { "len": 42, "capacity": 100 }, ... },
//!   "queue_depth": 0,
//!   "webhook": { "received": 50, "verified": 48, "rejected": 2, ... },
//!   "memory": { "rss_bytes": 52428800, "virtual_bytes": 268435456 },
//!   "latency": { "p50_ms": 1.2, "p95_ms": 4.5, "p99_ms": 9.8, ... }
//! }
//! ```

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, instrument};

use crate::config::IngestConfig;
use crate::metrics::{LatencyMetrics, WebhookCounters};
use crate::pipeline::{
    BoundedStore, ChatMessage, DrainLoop, IngestQueue, IngestSender, OperatorEvent, Source,
};
use crate::session::{PageSource, SessionController, SessionState};
use crate::webhook::{SignatureVerifier, WebhookState};

/// Server version from Cargo.toml
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Server name from Cargo.toml
pub const SERVER_NAME: &str = env!("CARGO_PKG_NAME");

// ============================================================================
// Response Types
// ============================================================================

/// Health check response for simple liveness probes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `healthy`, or `unavailable` when not ready
    pub status: String,
    /// Why the service is not ready
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "healthy".to_string(),
            reason: None,
        }
    }
}

/// Scraper part of the status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperStatus {
    /// Lifecycle state
    pub state: SessionState,
    /// Channel of the current or last run
    pub channel: Option<String>,
    /// Scraped ids remembered for deduplication
    pub dedup_size: usize,
}

/// Fill level of one bounded store
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StoreStatus {
    /// Items held
    pub len: usize,
    /// Maximum items held
    pub capacity: usize,
}

impl<T: Clone> From<&BoundedStore<T>> for StoreStatus {
    fn from(store: &BoundedStore<T>) -> Self {
        Self {
            len: store.len(),
            capacity: store.capacity(),
        }
    }
}

/// Fill levels of all stores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoresStatus {
    /// Webhook message store
    pub webhook: StoreStatus,
    /// Scrape message store
    pub scrape: StoreStatus,
    /// Operator event log
    pub events: StoreStatus,
}

/// Detailed server status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Server version (from Cargo.toml)
    pub version: String,
    /// Server name
    pub name: String,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Scraping session
    pub scraper: ScraperStatus,
    /// Store fill levels
    pub stores: StoresStatus,
    /// Events waiting in the ingest queue
    pub queue_depth: usize,
    /// Webhook delivery counters
    pub webhook: WebhookCounters,
    /// Memory usage metrics
    pub memory: MemoryMetrics,
    /// Webhook handling latency
    pub latency: LatencyMetrics,
    /// Server status (always "running" if responding)
    pub status: String,
    /// RFC 3339 timestamp of when status was generated
    pub timestamp: String,
}

/// Memory usage metrics collected from sysinfo.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryMetrics {
    /// Resident Set Size - actual physical memory used (bytes)
    pub rss_bytes: u64,
    /// Virtual memory size (bytes)
    pub virtual_bytes: u64,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared state behind every HTTP handler
pub struct AppState {
    start_time: Instant,
    webhook: Arc<WebhookState>,
    scraper: SessionController,
    scrape_store: Arc<BoundedStore<ChatMessage>>,
    event_log: Arc<BoundedStore<OperatorEvent>>,
    events: IngestSender,
}

impl AppState {
    /// Assemble state from already built parts
    pub fn new(
        webhook: Arc<WebhookState>,
        scraper: SessionController,
        scrape_store: Arc<BoundedStore<ChatMessage>>,
        event_log: Arc<BoundedStore<OperatorEvent>>,
        events: IngestSender,
    ) -> Self {
        Self {
            start_time: Instant::now(),
            webhook,
            scraper,
            scrape_store,
            event_log,
            events,
        }
    }

    /// Wire the whole pipeline from configuration.
    ///
    /// Returns the shared state and the drain loop that feeds the scrape
    /// store and the event log; the caller decides where the loop runs.
    pub fn build(
        config: &IngestConfig,
        verifier: SignatureVerifier,
        source: Arc<dyn PageSource>,
    ) -> (Arc<Self>, DrainLoop) {
        let (events, receiver) = IngestQueue::new();

        let webhook_store = Arc::new(BoundedStore::new(config.webhook.store_capacity));
        let webhook = Arc::new(
            WebhookState::new(verifier, webhook_store, config.webhook.dedup_capacity)
                .with_events(events.clone()),
        );

        let scrape_store = Arc::new(BoundedStore::new(config.pipeline.scrape_store_capacity));
        let event_log = Arc::new(BoundedStore::new(config.pipeline.event_log_capacity));
        let drain = DrainLoop::new(receiver, Arc::clone(&scrape_store), Arc::clone(&event_log))
            .with_batch_size(config.pipeline.drain_batch)
            .with_tick(config.pipeline.drain_tick);

        let scraper = SessionController::new(config.scraper.clone(), source, events.clone());

        let state = Arc::new(Self::new(webhook, scraper, scrape_store, event_log, events));
        (state, drain)
    }

    /// Server uptime in seconds.
    #[inline]
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Webhook endpoint state
    pub fn webhook(&self) -> &Arc<WebhookState> {
        &self.webhook
    }

    /// Scraping session controller
    pub fn scraper(&self) -> &SessionController {
        &self.scraper
    }

    /// Message store for `source`
    pub fn store(&self, source: Source) -> &Arc<BoundedStore<ChatMessage>> {
        match source {
            Source::Webhook => self.webhook.store(),
            Source::Scrape => &self.scrape_store,
        }
    }

    /// Operator event log
    pub fn event_log(&self) -> &Arc<BoundedStore<OperatorEvent>> {
        &self.event_log
    }

    /// Producer handle onto the ingest queue
    pub fn events(&self) -> &IngestSender {
        &self.events
    }

    /// Snapshot of everything `/status` reports
    pub fn status(&self) -> StatusResponse {
        let metrics = self.webhook.metrics();
        StatusResponse {
            version: SERVER_VERSION.to_string(),
            name: SERVER_NAME.to_string(),
            uptime_seconds: self.uptime_seconds(),
            scraper: ScraperStatus {
                state: self.scraper.state(),
                channel: self.scraper.channel(),
                dedup_size: self.scraper.dedup_len(),
            },
            stores: StoresStatus {
                webhook: StoreStatus::from(self.webhook.store().as_ref()),
                scrape: StoreStatus::from(self.scrape_store.as_ref()),
                events: StoreStatus::from(self.event_log.as_ref()),
            },
            queue_depth: self.events.pending(),
            webhook: metrics.counters(),
            memory: collect_memory_metrics(),
            latency: metrics.latency(),
            status: "running".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

// ============================================================================
// System Metrics Collection
// ============================================================================

/// Memory usage of the current process; zeros if it cannot be read.
fn collect_memory_metrics() -> MemoryMetrics {
    let pid = Pid::from_u32(std::process::id());
    let mut system = System::new();

    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

    match system.process(pid) {
        Some(process) => MemoryMetrics {
            rss_bytes: process.memory(),
            virtual_bytes: process.virtual_memory(),
        },
        None => {
            debug!("Could not find current process in sysinfo");
            MemoryMetrics::default()
        }
    }
}

// ============================================================================
// HTTP Handlers
// ============================================================================

/// `GET /health`
#[instrument(skip_all)]
pub async fn health_handler() -> impl IntoResponse {
    debug!("Health check requested");
    (StatusCode::OK, Json(HealthResponse::default()))
}

/// `GET /ready`
///
/// Not ready while the webhook key is missing: every delivery would be
/// rejected.
#[instrument(skip_all)]
pub async fn readiness_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    debug!("Readiness check requested");
    if state.webhook.verifier().has_key() {
        (StatusCode::OK, Json(HealthResponse::default()))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "unavailable".to_string(),
                reason: Some("webhook public key not loaded".to_string()),
            }),
        )
    }
}

/// `GET /status`
#[instrument(skip_all)]
pub async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    debug!("Status check requested");
    (StatusCode::OK, Json(state.status()))
}

/// `GET /metrics`
#[instrument(skip_all)]
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.webhook.metrics().to_prometheus_format(),
    )
}

// ============================================================================
// Tests
// ============================================================================
