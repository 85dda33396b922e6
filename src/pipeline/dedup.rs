//! Bounded recency set of message ids
//!
//! Holds the last `capacity` accepted ids. Membership is a hash lookup,
//! eviction is strict FIFO by insertion order.

use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;

/// Default number of ids retained
pub const DEFAULT_DEDUP_CAPACITY: usize = 500;

#[derive(Debug, Default)]
struct Window {
    members: HashSet<String>,
    order: VecDeque<String>,
}

/// Thread-safe FIFO dedup window
#[derive(Debug)]
pub struct DedupWindow {
    capacity: usize,
    inner: Mutex<Window>,
}

impl DedupWindow {
    /// Create a window retaining at most `capacity` ids (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(Window {
                members: HashSet::with_capacity(capacity + 1),
                order: VecDeque::with_capacity(capacity + 1),
            }),
        }
    }

    /// Whether `id` is currently retained
    pub fn seen(&self, id: &str) -> bool {
        self.inner.lock().members.contains(id)
    }

    /// Record `id`, evicting the oldest entry past capacity.
    /// Recording an id already present is a no-op.
    pub fn record(&self, id: impl Into<String>) {
        let id = id.into();
        let mut window = self.inner.lock();
        Self::insert_locked(&mut window, id, self.capacity);
    }

    /// Record `id` if unseen; returns `true` when it was new.
    ///
    /// Check and insert happen under one lock, so two racing callers can
    /// never both get `true` for the same id.
    pub fn insert_if_new(&self, id: &str) -> bool {
        let mut window = self.inner.lock();
        if window.members.contains(id) {
            return false;
        }
        Self::insert_locked(&mut window, id.to_string(), self.capacity);
        true
    }

    fn insert_locked(window: &mut Window, id: String, capacity: usize) {
        if !window.members.insert(id.clone()) {
            return;
        }
        window.order.push_back(id);
        while window.order.len() > capacity {
            if let Some(oldest) = window.order.pop_front() {
                window.members.remove(&oldest);
            }
        }
    }

    /// Number of ids retained
    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    /// Whether the window is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of ids retained
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Forget every id
    pub fn clear(&self) {
        let mut window = self.inner.lock();
        window.members.clear();
        window.order.clear();
    }
}

impl Default for DedupWindow {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY)
    }
}
