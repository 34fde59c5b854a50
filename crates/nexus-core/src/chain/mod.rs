//! Chain registry: the set of blockchain networks the gateway knows about.
//!
//! Chains are identified canonically by numeric chain id, with a secondary
//! `(network, chain)` name pair used by path-based routing
//! (`/ethereum/mainnet` next to `/1`). Registration is idempotent for
//! identical definitions and rejects conflicting redefinitions.

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};

pub mod state;

pub use state::ChainStateTracker;

/// A blockchain network the gateway can relay to.
///
/// `block_time` is the expected seconds between blocks and drives cache TTLs
/// for head-relative data. Deprecated chains keep relaying but are flagged in
/// status responses; disabled chains reject relays outright.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    pub chain_id: u64,
    /// Network grouping, e.g. `"ethereum"` or `"base"`.
    pub network: String,
    /// Chain name within the network, e.g. `"mainnet"` or `"sepolia"`.
    pub name: String,
    /// Expected seconds between blocks. Clamped to at least 1 when used.
    pub block_time: u64,
    #[serde(default)]
    pub is_deprecated: bool,
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Chain {
    #[must_use]
    pub fn new(chain_id: u64, network: impl Into<String>, name: impl Into<String>, block_time: u64) -> Self {
        Self {
            chain_id,
            network: network.into(),
            name: name.into(),
            block_time,
            is_deprecated: false,
            is_enabled: true,
        }
    }

    /// Block time with a floor of one second, for TTL arithmetic.
    #[must_use]
    pub fn block_time_secs(&self) -> u64 {
        self.block_time.max(1)
    }
}

/// Errors raised while populating a registry.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("chain {0} is already registered with a different definition")]
    ConflictingChain(u64),
    #[error("chain names ({network}, {name}) are already taken by chain {existing}")]
    ConflictingNames { network: String, name: String, existing: u64 },
    #[error("provider {0:?} is already registered with a different definition")]
    ConflictingProvider(String),
}

/// Lookup table of known chains, by id and by `(network, name)` pair.
///
/// Built once at startup from the built-in catalog plus configuration, then
/// shared read-only behind an `Arc`.
#[derive(Debug, Default)]
pub struct ChainRegistry {
    by_id: HashMap<u64, Arc<Chain>>,
    by_names: HashMap<(String, String), Arc<Chain>>,
}

impl ChainRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a chain.
    ///
    /// Re-registering an identical definition is a no-op. Registering a
    /// different definition under an already-taken chain id or name pair is
    /// rejected, so two config sections cannot silently fight over a chain.
    pub fn register(&mut self, chain: Chain) -> Result<(), RegistryError> {
        if let Some(existing) = self.by_id.get(&chain.chain_id) {
            if **existing == chain {
                return Ok(());
            }
            return Err(RegistryError::ConflictingChain(chain.chain_id));
        }
        let names_key = (chain.network.clone(), chain.name.clone());
        if let Some(existing) = self.by_names.get(&names_key) {
            return Err(RegistryError::ConflictingNames {
                network: chain.network,
                name: chain.name,
                existing: existing.chain_id,
            });
        }
        let chain = Arc::new(chain);
        self.by_id.insert(chain.chain_id, Arc::clone(&chain));
        self.by_names.insert(names_key, chain);
        Ok(())
    }

    #[must_use]
    pub fn get_by_id(&self, chain_id: u64) -> Option<Arc<Chain>> {
        self.by_id.get(&chain_id).cloned()
    }

    #[must_use]
    pub fn get_by_names(&self, network: &str, name: &str) -> Option<Arc<Chain>> {
        self.by_names.get(&(network.to_string(), name.to_string())).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// All registered chains, in no particular order.
    #[must_use]
    pub fn chains(&self) -> Vec<Arc<Chain>> {
        self.by_id.values().cloned().collect()
    }
}

/// Built-in chain catalog covering the networks the default provider
/// templates know endpoints for.
#[must_use]
pub fn builtin_chains() -> Vec<Chain> {
    vec![
        Chain::new(1, "ethereum", "mainnet", 12),
        Chain::new(11_155_111, "ethereum", "sepolia", 12),
        Chain::new(17_000, "ethereum", "holesky", 12),
        Chain::new(8453, "base", "mainnet", 2),
        Chain::new(84_532, "base", "sepolia", 2),
        Chain::new(137, "polygon", "mainnet", 2),
        Chain::new(10, "optimism", "mainnet", 2),
        Chain::new(42_161, "arbitrum", "mainnet", 1),
    ]
}
