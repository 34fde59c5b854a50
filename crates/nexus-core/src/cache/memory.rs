//! Bounded in-memory cache backend.
//!
//! FIFO eviction over a plain `HashMap` plus insertion-order queue. The
//! default deployment is a single process, so this is the default backend;
//! anything distributed goes through the [`CacheBackend`] trait instead.

use crate::cache::{CacheBackend, CacheEntry};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    insertion_order: VecDeque<String>,
}

/// In-memory FIFO cache, capped at `capacity` entries.
#[derive(Debug)]
pub struct InMemoryCacheBackend {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl InMemoryCacheBackend {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { inner: Mutex::new(Inner::default()), capacity: capacity.max(1) }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}

impl Default for InMemoryCacheBackend {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    async fn get(&self, key: &str) -> Option<CacheEntry> {
        let mut inner = self.inner.lock();
        let expired = match inner.entries.get(key) {
            Some(entry) => entry.is_expired(chrono::Utc::now().timestamp_millis()),
            None => return None,
        };
        if expired {
            // Lazy eviction: expired entries die on first read.
            inner.entries.remove(key);
            inner.insertion_order.retain(|k| k != key);
            return None;
        }
        inner.entries.get(key).cloned()
    }

    async fn set(&self, key: String, entry: CacheEntry) {
        let mut inner = self.inner.lock();
        if inner.entries.insert(key.clone(), entry).is_none() {
            inner.insertion_order.push_back(key);
            while inner.insertion_order.len() > self.capacity {
                if let Some(oldest) = inner.insertion_order.pop_front() {
                    inner.entries.remove(&oldest);
                }
            }
        }
    }
}
