//! Registry guaranteeing at most one outbound subscription per key.
//!
//! Creation goes through the `DashMap` entry API so two concurrent
//! subscribers racing on the same key still produce exactly one upstream
//! subscription. Terminated outbounds remove themselves; the removal is
//! guarded by pointer identity so a replacement created in the meantime is
//! never evicted by its predecessor's cleanup.

use crate::{
    chain::Chain,
    provider::{ProviderKeys, ProviderRegistry},
    subs::{
        inbound::InboundSubscription, outbound::OutboundSubscription, SubscribeError,
        SubscriptionKey,
    },
};
use dashmap::DashMap;
use std::{sync::Arc, time::Duration};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Shared subscription registry and factory.
#[derive(Debug)]
pub struct SubscriptionHub {
    outbounds: Arc<DashMap<SubscriptionKey, Arc<OutboundSubscription>>>,
    providers: Arc<ProviderRegistry>,
    keys: Arc<ProviderKeys>,
    connect_timeout: Duration,
}

impl SubscriptionHub {
    #[must_use]
    pub fn new(providers: Arc<ProviderRegistry>, keys: Arc<ProviderKeys>) -> Self {
        Self {
            outbounds: Arc::new(DashMap::new()),
            providers,
            keys,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Subscribes a client to a shared feed.
    ///
    /// Reuses the live outbound for the key when one exists, otherwise
    /// creates it from the chain's WebSocket-capable endpoints.
    pub fn subscribe(
        &self,
        chain: &Arc<Chain>,
        params: Option<&serde_json::Value>,
    ) -> Result<InboundSubscription, SubscribeError> {
        let key = SubscriptionKey::from_params(chain.chain_id, params)?;

        let ws_urls: Vec<String> = self
            .providers
            .providers_supporting(chain.chain_id)
            .iter()
            .filter_map(|provider| provider.rpc_endpoint(chain, &self.keys))
            .filter_map(|endpoint| endpoint.ws_url)
            .collect();
        if ws_urls.is_empty() {
            return Err(SubscribeError::NoWsEndpoint(chain.chain_id));
        }

        let outbound = self
            .outbounds
            .entry(key.clone())
            .or_insert_with(|| {
                tracing::debug!(key = %key, endpoints = ws_urls.len(), "creating outbound subscription");
                let registry = Arc::clone(&self.outbounds);
                let entry_key = key.clone();
                OutboundSubscription::spawn(
                    key.clone(),
                    ws_urls,
                    self.connect_timeout,
                    move |finished| {
                        registry.remove_if(&entry_key, |_, current| Arc::ptr_eq(current, finished));
                    },
                )
            })
            .clone();

        Ok(InboundSubscription::attach(outbound))
    }

    /// Number of live outbound subscriptions.
    #[must_use]
    pub fn outbound_count(&self) -> usize {
        self.outbounds.len()
    }

    /// The current outbound for a key, if one is registered.
    #[must_use]
    pub fn outbound_for(&self, key: &SubscriptionKey) -> Option<Arc<OutboundSubscription>> {
        self.outbounds.get(key).map(|entry| Arc::clone(&entry))
    }
}
