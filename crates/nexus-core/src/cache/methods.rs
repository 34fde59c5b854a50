//! Per-method cache policy.
//!
//! Only methods in the catalog are cached. TTLs follow block semantics:
//! head-relative reads live for one block time, while data addressed by an
//! immutable handle (block hash, a block buried past the finality window)
//! never expires.

use crate::chain::Chain;
use std::{collections::HashMap, sync::LazyLock};

/// How long a cached value stays valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    Seconds(u64),
    Forever,
}

/// How a method's TTL is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlPolicy {
    /// Immutable answer (e.g. `eth_chainId`).
    Forever,
    /// Valid until the next block is expected.
    OneBlock,
    /// TTL depends on the block parameter at `index` in the params array.
    BlockParam { index: usize },
}

/// A cacheable method and its TTL derivation rule.
#[derive(Debug, Clone, Copy)]
pub struct MethodPolicy {
    pub method: &'static str,
    pub policy: TtlPolicy,
}

/// Catalog of cacheable methods. Everything else relays uncached.
pub const CACHEABLE_METHODS: &[MethodPolicy] = &[
    MethodPolicy { method: "net_version", policy: TtlPolicy::Forever },
    MethodPolicy { method: "eth_chainId", policy: TtlPolicy::Forever },
    MethodPolicy { method: "eth_blockNumber", policy: TtlPolicy::OneBlock },
    MethodPolicy { method: "eth_gasPrice", policy: TtlPolicy::OneBlock },
    MethodPolicy { method: "eth_maxPriorityFeePerGas", policy: TtlPolicy::OneBlock },
    MethodPolicy { method: "eth_getTransactionByHash", policy: TtlPolicy::OneBlock },
    MethodPolicy { method: "eth_getTransactionReceipt", policy: TtlPolicy::OneBlock },
    MethodPolicy { method: "eth_getBlockByHash", policy: TtlPolicy::Forever },
    MethodPolicy { method: "eth_getBlockByNumber", policy: TtlPolicy::BlockParam { index: 0 } },
    MethodPolicy { method: "eth_getBalance", policy: TtlPolicy::BlockParam { index: 1 } },
    MethodPolicy { method: "eth_getCode", policy: TtlPolicy::BlockParam { index: 1 } },
    MethodPolicy { method: "eth_getTransactionCount", policy: TtlPolicy::BlockParam { index: 1 } },
    MethodPolicy { method: "eth_call", policy: TtlPolicy::BlockParam { index: 1 } },
    MethodPolicy { method: "eth_getStorageAt", policy: TtlPolicy::BlockParam { index: 2 } },
];

static POLICY_TABLE: LazyLock<HashMap<&'static str, &'static MethodPolicy>> =
    LazyLock::new(|| CACHEABLE_METHODS.iter().map(|p| (p.method, p)).collect());

/// Policy for a method, or `None` when the method is not cacheable.
#[must_use]
pub fn policy_for(method: &str) -> Option<&'static MethodPolicy> {
    POLICY_TABLE.get(method).copied()
}

/// Blocks behind the head after which a block is treated as final.
///
/// Scaled off a five-minute window so fast chains get proportionally deeper
/// thresholds in block count but the same threshold in wall time.
#[must_use]
pub fn finality_depth(chain: &Chain) -> u64 {
    (300 / chain.block_time_secs()).max(1)
}

/// Computes the TTL for a request, or `None` when the request should bypass
/// the cache (unparseable or unrecognized block parameter).
#[must_use]
pub fn ttl_for(
    policy: &MethodPolicy,
    chain: &Chain,
    params: Option<&serde_json::Value>,
    highest_block: Option<u64>,
) -> Option<Ttl> {
    match policy.policy {
        TtlPolicy::Forever => Some(Ttl::Forever),
        TtlPolicy::OneBlock => Some(Ttl::Seconds(chain.block_time_secs())),
        TtlPolicy::BlockParam { index } => block_param_ttl(chain, params, index, highest_block),
    }
}

fn block_param_ttl(
    chain: &Chain,
    params: Option<&serde_json::Value>,
    index: usize,
    highest_block: Option<u64>,
) -> Option<Ttl> {
    let one_block = Ttl::Seconds(chain.block_time_secs());
    let param = match params.and_then(|p| p.as_array()) {
        // A missing block parameter defaults to "latest" per the Ethereum API.
        Some(array) => match array.get(index) {
            Some(param) => param,
            None => return Some(one_block),
        },
        None => return Some(one_block),
    };

    match param {
        serde_json::Value::String(tag) => match tag.as_str() {
            "latest" | "pending" | "safe" | "finalized" => Some(one_block),
            "earliest" => Some(Ttl::Forever),
            other => {
                let number = crate::types::parse_hex_quantity(other)?;
                match highest_block {
                    Some(head) if head.saturating_sub(number) > finality_depth(chain) => {
                        Some(Ttl::Forever)
                    }
                    // Near the head, or head unknown: stay conservative.
                    _ => Some(one_block),
                }
            }
        },
        // EIP-1898 block-hash object: hash-addressed data is immutable.
        serde_json::Value::Object(fields) if fields.contains_key("blockHash") => {
            Some(Ttl::Forever)
        }
        serde_json::Value::Object(fields) => {
            let number = fields.get("blockNumber").and_then(|v| v.as_str())?;
            let number = crate::types::parse_hex_quantity(number)?;
            match highest_block {
                Some(head) if head.saturating_sub(number) > finality_depth(chain) => {
                    Some(Ttl::Forever)
                }
                _ => Some(one_block),
            }
        }
        _ => None,
    }
}

/// Deterministic params suffix for cache keys.
///
/// Absent params and explicit `null` normalize to the same suffix; otherwise
/// the serialized params are used verbatim, so two requests share an entry
/// only when their params serialize identically.
#[must_use]
pub fn params_suffix(params: Option<&serde_json::Value>) -> String {
    match params {
        None | Some(serde_json::Value::Null) => "null".to_string(),
        Some(value) => value.to_string(),
    }
}

/// Cache key: `"{chain_id}-{method}-{params_suffix}"`.
#[must_use]
pub fn cache_key(chain_id: u64, method: &str, params: Option<&serde_json::Value>) -> String {
    format!("{chain_id}-{method}-{}", params_suffix(params))
}
