//! Per-chain head tracking.
//!
//! The relay engine feeds observed `eth_blockNumber` results through here so
//! the cache can tell "near the head" from "deep history" when choosing TTLs.
//! The tracker is best-effort: a chain with no observed head simply gets the
//! conservative short TTL for historical reads.

use dashmap::DashMap;

/// Highest block number observed per chain.
///
/// Monotonic: a stale or reorged-lower observation never lowers the stored
/// value. Shared via `Arc` across the relay engine and cache.
#[derive(Debug, Default)]
pub struct ChainStateTracker {
    highest_blocks: DashMap<u64, u64>,
}

impl ChainStateTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a block number observed for `chain_id`, keeping the maximum.
    pub fn record_block(&self, chain_id: u64, block_number: u64) {
        self.highest_blocks
            .entry(chain_id)
            .and_modify(|current| *current = (*current).max(block_number))
            .or_insert(block_number);
    }

    /// Highest block observed for `chain_id`, if any relay has reported one.
    #[must_use]
    pub fn highest_block(&self, chain_id: u64) -> Option<u64> {
        self.highest_blocks.get(&chain_id).map(|entry| *entry)
    }
}
