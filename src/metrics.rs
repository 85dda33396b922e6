//! Webhook intake metrics
//!
//! Lock-free counters for every outcome of a delivery plus an HdrHistogram of
//! handling latency. Exposed as JSON on `/status` and as Prometheus text on
//! `/metrics`.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use hdrhistogram::Histogram;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Request latency percentile metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyMetrics {
    /// 50th percentile (median) latency in milliseconds
    pub p50_ms: f64,
    /// 95th percentile latency in milliseconds
    pub p95_ms: f64,
    /// 99th percentile latency in milliseconds
    pub p99_ms: f64,
    /// Total number of requests recorded
    pub total_requests: u64,
    /// Mean latency in milliseconds
    pub mean_ms: f64,
    /// Maximum latency recorded in milliseconds
    pub max_ms: f64,
}

/// Thread-safe latency histogram.
///
/// Tracks latencies from 1 microsecond to 60 seconds with 3 significant
/// figures.
#[derive(Debug)]
pub struct LatencyHistogram {
    inner: RwLock<Histogram<u64>>,
}

impl LatencyHistogram {
    /// Create a new latency histogram.
    pub fn new() -> Self {
        let histogram =
            Histogram::new_with_bounds(1, 60_000_000, 3).expect("Failed to create histogram");
        Self {
            inner: RwLock::new(histogram),
        }
    }

    /// Record a latency value in microseconds. Out-of-range values are dropped.
    pub fn record(&self, latency_us: u64) {
        let _ = self.inner.write().record(latency_us);
    }

    /// Record a latency duration.
    pub fn record_duration(&self, duration: Duration) {
        self.record(duration.as_micros() as u64);
    }

    /// Number of recorded values
    pub fn count(&self) -> u64 {
        self.inner.read().len()
    }

    /// Percentiles converted to milliseconds
    pub fn metrics(&self) -> LatencyMetrics {
        let hist = self.inner.read();
        LatencyMetrics {
            p50_ms: hist.value_at_percentile(50.0) as f64 / 1000.0,
            p95_ms: hist.value_at_percentile(95.0) as f64 / 1000.0,
            p99_ms: hist.value_at_percentile(99.0) as f64 / 1000.0,
            total_requests: hist.len(),
            mean_ms: hist.mean() / 1000.0,
            max_ms: hist.max() as f64 / 1000.0,
        }
    }

    /// Clear all recorded values.
    pub fn reset(&self) {
        self.inner.write().reset();
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one webhook delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Failed signature verification (HTTP 403)
    Rejected,
    /// Verified, but the body held no usable message
    PayloadError,
    /// Verified redelivery of an already stored message
    Duplicate,
    /// Verified event of a type that is not stored
    Ignored,
    /// Verified chat message appended to the store
    Stored,
}

/// Counters for the webhook endpoint
#[derive(Debug, Default)]
pub struct WebhookMetrics {
    received: AtomicU64,
    rejected: AtomicU64,
    payload_errors: AtomicU64,
    duplicates: AtomicU64,
    ignored: AtomicU64,
    stored: AtomicU64,
    latency: LatencyHistogram,
}

/// Point-in-time copy of [`WebhookMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookCounters {
    /// Requests seen
    pub received: u64,
    /// Requests that passed verification
    pub verified: u64,
    /// Requests that failed verification
    pub rejected: u64,
    /// Verified requests with an unusable body
    pub payload_errors: u64,
    /// Verified redeliveries
    pub duplicates: u64,
    /// Verified events of other types
    pub ignored: u64,
    /// Messages stored
    pub stored: u64,
}

impl WebhookMetrics {
    /// Empty metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a finished delivery and its handling time
    pub fn record(&self, outcome: DeliveryOutcome, elapsed: Duration) {
        self.received.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            DeliveryOutcome::Rejected => &self.rejected,
            DeliveryOutcome::PayloadError => &self.payload_errors,
            DeliveryOutcome::Duplicate => &self.duplicates,
            DeliveryOutcome::Ignored => &self.ignored,
            DeliveryOutcome::Stored => &self.stored,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.latency.record_duration(elapsed);
    }

    /// Current counter values
    pub fn counters(&self) -> WebhookCounters {
        let received = self.received.load(Ordering::Relaxed);
        let rejected = self.rejected.load(Ordering::Relaxed);
        WebhookCounters {
            received,
            verified: received.saturating_sub(rejected),
            rejected,
            payload_errors: self.payload_errors.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
        }
    }

    /// Handling latency percentiles
    pub fn latency(&self) -> LatencyMetrics {
        self.latency.metrics()
    }

    /// Prometheus text exposition
    pub fn to_prometheus_format(&self) -> String {
        let c = self.counters();
        let mut out = String::new();
        for (name, value) in [
            ("received", c.received),
            ("verified", c.verified),
            ("rejected", c.rejected),
            ("payload_errors", c.payload_errors),
            ("duplicates", c.duplicates),
            ("ignored", c.ignored),
            ("stored", c.stored),
        ] {
            let _ = writeln!(out, "livechat_webhook_{name}_total {value}");
        }

        if self.latency.count() > 0 {
            let l = self.latency();
            let _ = writeln!(out, "livechat_webhook_latency_p50_ms {}", l.p50_ms);
            let _ = writeln!(out, "livechat_webhook_latency_p95_ms {}", l.p95_ms);
            let _ = writeln!(out, "livechat_webhook_latency_p99_ms {}", l.p99_ms);
        }
        out
    }
}
