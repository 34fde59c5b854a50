//! Endpoint pools: which providers to try for one request, in what order,
//! and how many times.
//!
//! A pool is built per relay from the providers supporting the chain. The
//! cursor is forward-only: an endpoint is never retried within one request,
//! and the attempt budget caps how far down the list a failing request walks.

use crate::{
    chain::Chain,
    provider::{ProviderKeys, ProviderRegistry, ServiceProvider},
    relay::endpoint::RpcEndpoint,
};
use rand::Rng;
use serde::Deserialize;
use std::{sync::Arc, time::Duration};

/// Provider ordering for a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayOrder {
    /// Weighted random order, sampled without replacement.
    Random,
    /// Registration order.
    Sequential,
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Surface the first failure; exactly one attempt.
    FailImmediately,
    /// Move to the next endpoint, up to `max_attempts` attempts total.
    CycleRequests { max_attempts: u32 },
}

/// Relay behavior knobs, shared by every pool the gateway builds.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub order: RelayOrder,
    pub failure: FailurePolicy,
    /// Per-attempt deadline. Always explicit so one hung provider cannot
    /// absorb the whole request budget.
    pub attempt_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            order: RelayOrder::Random,
            failure: FailurePolicy::CycleRequests { max_attempts: 3 },
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

impl RelayConfig {
    /// Maximum relay attempts for one request.
    #[must_use]
    pub fn attempt_budget(&self) -> u32 {
        match self.failure {
            FailurePolicy::FailImmediately => 1,
            FailurePolicy::CycleRequests { max_attempts } => max_attempts.max(1),
        }
    }
}

/// Shuffles providers by weight, sampling without replacement.
///
/// A provider with weight `w` is `w` times as likely as a weight-1 provider
/// to occupy the first slot; the remainder recurses on what is left.
pub fn weighted_shuffle<R: Rng>(providers: &mut Vec<Arc<ServiceProvider>>, rng: &mut R) {
    let mut remaining = std::mem::take(providers);
    while !remaining.is_empty() {
        let total: u64 = remaining.iter().map(|p| u64::from(p.weight())).sum();
        let mut roll = rng.gen_range(0..total);
        let mut picked = 0;
        for (index, provider) in remaining.iter().enumerate() {
            let weight = u64::from(provider.weight());
            if roll < weight {
                picked = index;
                break;
            }
            roll -= weight;
        }
        providers.push(remaining.remove(picked));
    }
}

/// Ordered providers for one request, with a forward-only cursor and an
/// attempt budget.
#[derive(Debug)]
pub struct EndpointPool {
    chain: Arc<Chain>,
    providers: Vec<Arc<ServiceProvider>>,
    cursor: usize,
    attempts_made: u32,
    attempt_budget: u32,
}

impl EndpointPool {
    #[must_use]
    pub fn new(chain: Arc<Chain>, providers: Vec<Arc<ServiceProvider>>, attempt_budget: u32) -> Self {
        Self { chain, providers, cursor: 0, attempts_made: 0, attempt_budget: attempt_budget.max(1) }
    }

    /// Whether another attempt is available: budget remaining and at least
    /// one untried provider that resolves to an endpoint.
    #[must_use]
    pub fn has_next(&self, keys: &ProviderKeys) -> bool {
        self.attempts_made < self.attempt_budget &&
            self.providers[self.cursor..]
                .iter()
                .any(|provider| provider.rpc_endpoint(&self.chain, keys).is_some())
    }

    /// Next resolvable endpoint, consuming one unit of the attempt budget.
    ///
    /// Providers that fail to resolve (disabled, missing key) are skipped
    /// without consuming budget.
    pub fn next_endpoint(&mut self, keys: &ProviderKeys) -> Option<RpcEndpoint> {
        if self.attempts_made >= self.attempt_budget {
            return None;
        }
        while self.cursor < self.providers.len() {
            let provider = &self.providers[self.cursor];
            self.cursor += 1;
            if let Some(endpoint) = provider.rpc_endpoint(&self.chain, keys) {
                self.attempts_made += 1;
                return Some(endpoint);
            }
        }
        None
    }

    #[must_use]
    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }
}

/// Builds pools from the registry according to the relay configuration.
#[derive(Debug, Clone)]
pub struct EndpointPoolFactory {
    providers: Arc<ProviderRegistry>,
    config: RelayConfig,
}

impl EndpointPoolFactory {
    #[must_use]
    pub fn new(providers: Arc<ProviderRegistry>, config: RelayConfig) -> Self {
        Self { providers, config }
    }

    #[must_use]
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Providers supporting the chain, before resolution filtering.
    #[must_use]
    pub fn eligible_providers(&self, chain_id: u64) -> Vec<Arc<ServiceProvider>> {
        self.providers.providers_supporting(chain_id)
    }

    /// Builds a pool for one request. Ordering is applied here so every
    /// request gets an independent shuffle.
    #[must_use]
    pub fn pool_for<R: Rng>(&self, chain: &Arc<Chain>, rng: &mut R) -> EndpointPool {
        let mut providers = self.providers.providers_supporting(chain.chain_id);
        match self.config.order {
            RelayOrder::Sequential => {}
            RelayOrder::Random => weighted_shuffle(&mut providers, rng),
        }
        EndpointPool::new(Arc::clone(chain), providers, self.config.attempt_budget())
    }
}
