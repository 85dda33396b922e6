//! Fixed-capacity ring buffer with oldest-first eviction
//!
//! Writers and readers share one `RwLock`; [`BoundedStore::snapshot`] copies
//! the contents under the read lock, so a reader never observes a half-applied
//! append.

use std::collections::VecDeque;

use parking_lot::RwLock;

/// Default capacity of a per-source message store
pub const DEFAULT_STORE_CAPACITY: usize = 100;

/// Default capacity of the operator event log
pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 200;

/// Thread-safe bounded ring buffer
#[derive(Debug)]
pub struct BoundedStore<T> {
    capacity: usize,
    items: RwLock<VecDeque<T>>,
}

impl<T: Clone> BoundedStore<T> {
    /// Create a store holding at most `capacity` items (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            items: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Append an item, evicting the oldest one when full.
    /// Returns the evicted item, if any.
    pub fn append(&self, item: T) -> Option<T> {
        let mut items = self.items.write();
        let evicted = if items.len() >= self.capacity {
            items.pop_front()
        } else {
            None
        };
        items.push_back(item);
        evicted
    }

    /// Append several items under one write lock
    pub fn extend<I: IntoIterator<Item = T>>(&self, iter: I) -> usize {
        let mut items = self.items.write();
        let mut added = 0;
        for item in iter {
            if items.len() >= self.capacity {
                items.pop_front();
            }
            items.push_back(item);
            added += 1;
        }
        added
    }

    /// Copy of the contents, oldest first
    pub fn snapshot(&self) -> Vec<T> {
        self.items.read().iter().cloned().collect()
    }

    /// The newest `n` items, oldest first
    pub fn tail(&self, n: usize) -> Vec<T> {
        let items = self.items.read();
        let skip = items.len().saturating_sub(n);
        items.iter().skip(skip).cloned().collect()
    }

    /// Number of items held
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Maximum number of items held
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remove everything, returning how many items were dropped
    pub fn clear(&self) -> usize {
        let mut items = self.items.write();
        let n = items.len();
        items.clear();
        n
    }
}
