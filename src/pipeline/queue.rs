//! Unbounded ingest channel
//!
//! Producers never block on push. The consumer pulls at most `max` events per
//! call so a burst is spread over several drain cycles.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::trace;

use super::event::{ChatMessage, IngestEvent};

/// Constructor for the sender/receiver pair
pub struct IngestQueue;

impl IngestQueue {
    /// Create a new queue
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (IngestSender, IngestReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicUsize::new(0));
        (
            IngestSender {
                tx,
                depth: depth.clone(),
            },
            IngestReceiver { rx, depth },
        )
    }
}

/// Producer side; cheap to clone
#[derive(Debug, Clone)]
pub struct IngestSender {
    tx: mpsc::UnboundedSender<IngestEvent>,
    depth: Arc<AtomicUsize>,
}

impl IngestSender {
    /// Push an event. Never blocks; returns `false` once the consumer is gone.
    pub fn push(&self, event: IngestEvent) -> bool {
        self.depth.fetch_add(1, Ordering::Relaxed);
        match self.tx.send(event) {
            Ok(()) => true,
            Err(_) => {
                self.depth.fetch_sub(1, Ordering::Relaxed);
                trace!("Ingest queue closed, event dropped");
                false
            }
        }
    }

    /// Push a status event
    pub fn status(&self, text: impl Into<String>) -> bool {
        self.push(IngestEvent::Status(text.into()))
    }

    /// Push a warning event
    pub fn warning(&self, text: impl Into<String>) -> bool {
        self.push(IngestEvent::Warning(text.into()))
    }

    /// Push an error event
    pub fn error(&self, text: impl Into<String>) -> bool {
        self.push(IngestEvent::Error(text.into()))
    }

    /// Push a message event
    pub fn message(&self, msg: ChatMessage) -> bool {
        self.push(IngestEvent::Message(msg))
    }

    /// Events pushed but not yet drained
    pub fn pending(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }
}

/// Consumer side
#[derive(Debug)]
pub struct IngestReceiver {
    rx: mpsc::UnboundedReceiver<IngestEvent>,
    depth: Arc<AtomicUsize>,
}

impl IngestReceiver {
    /// Take up to `max` immediately available events without waiting
    pub fn drain_batch(&mut self, max: usize) -> Vec<IngestEvent> {
        let mut batch = Vec::with_capacity(max.min(self.pending()));
        while batch.len() < max {
            match self.rx.try_recv() {
                Ok(event) => {
                    self.depth.fetch_sub(1, Ordering::Relaxed);
                    batch.push(event);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        batch
    }

    /// Wait for the next event (`None` once all senders are dropped and the
    /// queue is empty)
    pub async fn recv(&mut self) -> Option<IngestEvent> {
        let event = self.rx.recv().await;
        if event.is_some() {
            self.depth.fetch_sub(1, Ordering::Relaxed);
        }
        event
    }

    /// Events waiting in the queue
    pub fn pending(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    /// Whether every sender has been dropped
    pub fn is_closed(&self) -> bool {
        self.rx.is_closed()
    }
}
