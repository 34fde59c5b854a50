//! Core library for the Nexus JSON-RPC relay gateway.
//!
//! Nexus sits between RPC clients and a set of blockchain node providers
//! (Alchemy, Infura, Ankr, self-hosted nodes) and presents them as a single
//! endpoint per chain. The library is transport-agnostic: the HTTP/WebSocket
//! server crate wires these pieces to axum.
//!
//! # Architecture
//!
//! - [`chain`]: chain registry and per-chain head tracking
//! - [`provider`]: provider registry, per-chain endpoint resolution, key lookup
//! - [`relay`]: endpoint pools, failover, and the relay engine
//! - [`cache`]: method-aware response caching with TTL policies
//! - [`subs`]: WebSocket subscription sharing (one upstream per unique key)
//! - [`context`]: request orchestration, routing, and access control
//! - [`config`]: file + environment configuration loading

pub mod cache;
pub mod chain;
pub mod config;
pub mod context;
pub mod provider;
pub mod relay;
pub mod subs;
pub mod types;

pub use cache::RequestCache;
pub use chain::{Chain, ChainRegistry, ChainStateTracker};
pub use context::RelayHandler;
pub use provider::{ProviderRegistry, ServiceProvider};
pub use relay::{RelayOutcome, Relayer};
pub use subs::SubscriptionHub;
