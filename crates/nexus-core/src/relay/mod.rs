//! The relay engine: cache check, pool walk, failover, head tracking.
//!
//! One [`Relayer::relay`] call serves one JSON-RPC request. Cache hits short
//! circuit the pool entirely; otherwise endpoints are tried in pool order
//! until a legal answer arrives or the attempt budget runs out.

use crate::{
    cache::RequestCache,
    chain::{Chain, ChainStateTracker},
    provider::ProviderKeys,
    types::{parse_hex_quantity, JsonRpcError, JsonRpcRequest},
};
use std::sync::Arc;

pub mod endpoint;
pub mod http_client;
pub mod pool;

pub use endpoint::{RelayFailure, RpcEndpoint};
pub use http_client::HttpClient;
pub use pool::{EndpointPool, EndpointPoolFactory, FailurePolicy, RelayConfig, RelayOrder};

/// Where a successful result came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Provider(Arc<str>),
}

impl ResponseSource {
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            ResponseSource::Cache => "cache",
            ResponseSource::Provider(name) => name,
        }
    }
}

/// One failed attempt, attributed to the provider that failed.
#[derive(Debug, Clone)]
pub struct RelayAttemptFailure {
    pub provider: Arc<str>,
    pub failure: RelayFailure,
}

/// Terminal outcome of relaying one request.
#[derive(Debug, Clone)]
pub enum RelayOutcome {
    /// A provider (or the cache) produced a result payload.
    Success { result: serde_json::Value, source: ResponseSource },
    /// A provider answered with a JSON-RPC error object. Legal, final, and
    /// passed through to the client without further attempts.
    LegalError { error: JsonRpcError, provider: Arc<str> },
    /// Every attempt failed. Empty `failures` means no endpoint could even
    /// be resolved for the chain.
    AllFailed { failures: Vec<RelayAttemptFailure> },
}

/// Relay engine shared across requests.
#[derive(Debug)]
pub struct Relayer {
    factory: EndpointPoolFactory,
    keys: Arc<ProviderKeys>,
    http: HttpClient,
    cache: Arc<RequestCache>,
    chain_state: Arc<ChainStateTracker>,
}

impl Relayer {
    #[must_use]
    pub fn new(
        factory: EndpointPoolFactory,
        keys: Arc<ProviderKeys>,
        http: HttpClient,
        cache: Arc<RequestCache>,
        chain_state: Arc<ChainStateTracker>,
    ) -> Self {
        Self { factory, keys, http, cache, chain_state }
    }

    #[must_use]
    pub fn keys(&self) -> &Arc<ProviderKeys> {
        &self.keys
    }

    #[must_use]
    pub fn factory(&self) -> &EndpointPoolFactory {
        &self.factory
    }

    /// Relays one request for one chain.
    pub async fn relay(&self, chain: &Arc<Chain>, request: &JsonRpcRequest) -> RelayOutcome {
        if let Some(result) = self.cache.read(chain, request).await {
            tracing::debug!(
                chain_id = chain.chain_id,
                method = %request.method,
                "serving from cache"
            );
            return RelayOutcome::Success { result, source: ResponseSource::Cache };
        }

        // thread_rng is not Send; scope it out before the first await.
        let mut pool = {
            let mut rng = rand::thread_rng();
            self.factory.pool_for(chain, &mut rng)
        };
        let timeout = self.factory.config().attempt_timeout;
        let mut failures: Vec<RelayAttemptFailure> = Vec::new();

        while let Some(endpoint) = pool.next_endpoint(&self.keys) {
            match endpoint.relay(&self.http, request, timeout).await {
                Ok(result) => {
                    tracing::debug!(
                        chain_id = chain.chain_id,
                        method = %request.method,
                        provider = %endpoint.provider,
                        attempt = pool.attempts_made(),
                        "relay succeeded"
                    );
                    self.observe_head(chain, request, &result);
                    self.store_result(chain, request, &result);
                    return RelayOutcome::Success {
                        result,
                        source: ResponseSource::Provider(endpoint.provider),
                    };
                }
                Err(RelayFailure::ErrorRpcResponse { error }) => {
                    tracing::debug!(
                        chain_id = chain.chain_id,
                        method = %request.method,
                        provider = %endpoint.provider,
                        code = error.code,
                        "upstream returned an error response, passing through"
                    );
                    return RelayOutcome::LegalError { error, provider: endpoint.provider };
                }
                Err(failure) => {
                    tracing::warn!(
                        chain_id = chain.chain_id,
                        method = %request.method,
                        provider = %endpoint.provider,
                        attempt = pool.attempts_made(),
                        kind = failure.kind(),
                        error = %failure,
                        "relay attempt failed"
                    );
                    failures.push(RelayAttemptFailure { provider: endpoint.provider, failure });
                }
            }
        }

        RelayOutcome::AllFailed { failures }
    }

    /// Feeds head observations to the chain state tracker.
    fn observe_head(&self, chain: &Arc<Chain>, request: &JsonRpcRequest, result: &serde_json::Value) {
        if request.method != "eth_blockNumber" {
            return;
        }
        if let Some(block) = result.as_str().and_then(parse_hex_quantity) {
            self.chain_state.record_block(chain.chain_id, block);
        }
    }

    /// Writes the result to the cache off the request path.
    fn store_result(&self, chain: &Arc<Chain>, request: &JsonRpcRequest, result: &serde_json::Value) {
        if crate::cache::policy_for(&request.method).is_none() {
            return;
        }
        let cache = Arc::clone(&self.cache);
        let chain = Arc::clone(chain);
        let request = request.clone();
        let result = result.clone();
        let highest = self.chain_state.highest_block(chain.chain_id);
        tokio::spawn(async move {
            cache.write(&chain, &request, &result, highest).await;
        });
    }
}
