//! Cooperative consumer for the ingest queue
//!
//! Each cycle pulls at most `batch_size` events: messages go to the message
//! store, everything else is logged and appended to the operator event log.
//! Shutdown uses the same bounded cycle to flush what was queued at the time
//! the stop arrived.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::event::{ChatMessage, IngestEvent, OperatorEvent};
use super::queue::IngestReceiver;
use super::store::BoundedStore;

/// Default events drained per cycle
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default interval between cycles
pub const DEFAULT_DRAIN_TICK: Duration = Duration::from_millis(300);

const MIN_DRAIN_TICK: Duration = Duration::from_millis(1);

/// Counters accumulated by a drain loop
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainStats {
    /// Cycles that moved at least one event
    pub cycles: u64,
    /// Messages stored
    pub messages: u64,
    /// Status events relayed
    pub statuses: u64,
    /// Warnings relayed
    pub warnings: u64,
    /// Errors relayed
    pub errors: u64,
}

/// Single consumer moving queued events into bounded stores
pub struct DrainLoop {
    receiver: IngestReceiver,
    messages: Arc<BoundedStore<ChatMessage>>,
    events: Arc<BoundedStore<OperatorEvent>>,
    batch_size: usize,
    tick: Duration,
    stats: DrainStats,
}

impl DrainLoop {
    /// Create a drain loop with default batch size and tick
    pub fn new(
        receiver: IngestReceiver,
        messages: Arc<BoundedStore<ChatMessage>>,
        events: Arc<BoundedStore<OperatorEvent>>,
    ) -> Self {
        Self {
            receiver,
            messages,
            events,
            batch_size: DEFAULT_BATCH_SIZE,
            tick: DEFAULT_DRAIN_TICK,
            stats: DrainStats::default(),
        }
    }

    /// Set the per-cycle cap (minimum 1)
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the cycle interval (minimum 1ms)
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(MIN_DRAIN_TICK);
        self
    }

    /// Counters so far
    pub fn stats(&self) -> DrainStats {
        self.stats
    }

    /// Run one bounded cycle; returns how many events were handled
    pub fn cycle(&mut self) -> usize {
        let batch = self.receiver.drain_batch(self.batch_size);
        if batch.is_empty() {
            return 0;
        }
        let handled = batch.len();

        let mut accepted = Vec::new();
        for event in batch {
            match event {
                IngestEvent::Message(msg) => {
                    self.stats.messages += 1;
                    accepted.push(msg);
                }
                other => self.relay(other),
            }
        }
        if !accepted.is_empty() {
            self.messages.extend(accepted);
        }

        self.stats.cycles += 1;
        debug!(
            handled,
            remaining = self.receiver.pending(),
            "Drain cycle complete"
        );
        handled
    }

    fn relay(&mut self, event: IngestEvent) {
        match &event {
            IngestEvent::Status(text) => {
                self.stats.statuses += 1;
                info!(target: "livechat::operator", "{}", text);
            }
            IngestEvent::Warning(text) => {
                self.stats.warnings += 1;
                warn!(target: "livechat::operator", "{}", text);
            }
            IngestEvent::Error(text) => {
                self.stats.errors += 1;
                error!(target: "livechat::operator", "{}", text);
            }
            IngestEvent::Message(_) => return,
        }
        if let Some(op) = OperatorEvent::from_event(&event) {
            self.events.append(op);
        }
    }

    /// Flush what is queued right now, in bounded cycles
    pub fn flush(&mut self) -> usize {
        let mut budget = self.receiver.pending();
        let mut total = 0;
        while budget > 0 {
            let n = self.cycle();
            if n == 0 {
                break;
            }
            total += n;
            budget = budget.saturating_sub(n);
        }
        total
    }

    /// Drive the loop until `shutdown` flips to `true` (or its sender is
    /// dropped, or every producer is gone), then flush the remainder.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> DrainStats {
        info!(
            batch_size = self.batch_size,
            tick_ms = self.tick.as_millis() as u64,
            "Drain loop started"
        );
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.cycle();
                    if self.receiver.is_closed() && self.receiver.pending() == 0 {
                        debug!("All producers gone");
                        break;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        let flushed = self.flush();
        info!(flushed, stats = ?self.stats, "Drain loop stopped");
        self.stats
    }
}
