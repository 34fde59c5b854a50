//! Method-aware response caching.
//!
//! The [`RequestCache`] decides per request whether to look up or store a
//! result, using the method catalog in [`methods`] and the observed chain
//! head for TTL decisions. Storage is pluggable through [`CacheBackend`];
//! the in-memory FIFO in [`memory`] is the default.

use crate::{chain::Chain, types::JsonRpcRequest};
use async_trait::async_trait;

pub mod memory;
pub mod methods;

pub use memory::InMemoryCacheBackend;
pub use methods::{cache_key, policy_for, Ttl};

/// A cached result payload and its expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub payload: serde_json::Value,
    /// Unix milliseconds; `None` never expires.
    pub expires_at_ms: Option<i64>,
}

impl CacheEntry {
    #[must_use]
    pub fn is_expired(&self, now_ms: i64) -> bool {
        match self.expires_at_ms {
            Some(expires_at) => now_ms >= expires_at,
            None => false,
        }
    }
}

/// Pluggable cache storage.
///
/// Implementations may evict expired entries inside `get`; callers treat
/// expiry as a miss either way. Concurrent writers race last-write-wins,
/// which is acceptable for idempotent RPC results.
#[async_trait]
pub trait CacheBackend: Send + Sync + std::fmt::Debug {
    async fn get(&self, key: &str) -> Option<CacheEntry>;
    async fn set(&self, key: String, entry: CacheEntry);
}

/// Policy-driven cache facade over a backend.
#[derive(Debug)]
pub struct RequestCache {
    backend: Box<dyn CacheBackend>,
}

impl RequestCache {
    #[must_use]
    pub fn new(backend: Box<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    #[must_use]
    pub fn in_memory(capacity: usize) -> Self {
        Self::new(Box::new(InMemoryCacheBackend::new(capacity)))
    }

    /// A cache that stores nothing; every read is a miss.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Box::new(NoopCacheBackend))
    }

    /// Looks up a cached result for the request, honoring expiry.
    ///
    /// Returns `None` for uncacheable methods, misses, and expired entries.
    pub async fn read(&self, chain: &Chain, request: &JsonRpcRequest) -> Option<serde_json::Value> {
        let _policy = methods::policy_for(&request.method)?;
        let key = methods::cache_key(chain.chain_id, &request.method, request.params.as_ref());
        let entry = self.backend.get(&key).await?;
        if entry.is_expired(chrono::Utc::now().timestamp_millis()) {
            return None;
        }
        Some(entry.payload)
    }

    /// Stores a successful result if the method's policy allows it.
    ///
    /// Null results are never stored: "not found yet" answers (pending
    /// receipts, unmined transactions) would otherwise stick until expiry.
    pub async fn write(
        &self,
        chain: &Chain,
        request: &JsonRpcRequest,
        result: &serde_json::Value,
        highest_block: Option<u64>,
    ) {
        if result.is_null() {
            return;
        }
        let Some(policy) = methods::policy_for(&request.method) else {
            return;
        };
        let Some(ttl) = methods::ttl_for(policy, chain, request.params.as_ref(), highest_block)
        else {
            return;
        };

        let expires_at_ms = match ttl {
            Ttl::Forever => None,
            Ttl::Seconds(secs) => {
                Some(chrono::Utc::now().timestamp_millis() + (secs as i64) * 1_000)
            }
        };
        let key = methods::cache_key(chain.chain_id, &request.method, request.params.as_ref());
        self.backend.set(key, CacheEntry { payload: result.clone(), expires_at_ms }).await;
    }
}

/// Backend for disabled caching.
#[derive(Debug)]
struct NoopCacheBackend;

#[async_trait]
impl CacheBackend for NoopCacheBackend {
    async fn get(&self, _key: &str) -> Option<CacheEntry> {
        None
    }

    async fn set(&self, _key: String, _entry: CacheEntry) {}
}
