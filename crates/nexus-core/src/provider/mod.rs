//! Service provider registry and endpoint resolution.
//!
//! A [`ServiceProvider`] is a node operator (Alchemy, Infura, a self-hosted
//! node) with per-chain connection recipes. Resolution turns a provider plus
//! a chain into a concrete [`RpcEndpoint`], injecting the API key when the
//! recipe calls for one. Keys come from configuration or from
//! `NEXUS_PROVIDER_<NAME>_KEY` environment variables.

use crate::{
    chain::{Chain, RegistryError},
    relay::endpoint::RpcEndpoint,
};
use parking_lot::RwLock;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

/// How a provider exposes a particular chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainSupport {
    /// URL is completed by appending the provider API key as the final path
    /// segment, e.g. `https://eth-mainnet.g.alchemy.com/v2` + `/<key>`.
    /// Resolution fails without a key.
    KeyAppended { base_url: String, ws_base_url: Option<String> },
    /// URL is used verbatim; no key required.
    Url { url: String, ws_url: Option<String> },
}

impl ChainSupport {
    fn resolve(&self, key: Option<&str>) -> Option<(String, Option<String>)> {
        match self {
            ChainSupport::KeyAppended { base_url, ws_base_url } => {
                let key = key?;
                let url = format!("{}/{}", base_url.trim_end_matches('/'), key);
                let ws_url = ws_base_url
                    .as_ref()
                    .map(|base| format!("{}/{}", base.trim_end_matches('/'), key));
                Some((url, ws_url))
            }
            ChainSupport::Url { url, ws_url } => Some((url.clone(), ws_url.clone())),
        }
    }
}

/// API keys for providers, resolved config-first with environment fallback.
///
/// The environment variable for a provider named `alchemy` is
/// `NEXUS_PROVIDER_ALCHEMY_KEY`. Keys are looked up at resolution time, so a
/// restarted process (or a live re-read of the environment) picks up rotated
/// keys without re-registering providers.
#[derive(Debug, Default)]
pub struct ProviderKeys {
    configured: HashMap<String, String>,
}

impl ProviderKeys {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_config(configured: HashMap<String, String>) -> Self {
        Self { configured }
    }

    pub fn insert(&mut self, provider: impl Into<String>, key: impl Into<String>) {
        self.configured.insert(provider.into(), key.into());
    }

    /// Environment variable name for a provider's key.
    #[must_use]
    pub fn env_var_name(provider: &str) -> String {
        let normalized: String = provider
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        format!("NEXUS_PROVIDER_{normalized}_KEY")
    }

    /// Key for a provider: configured value first, then the environment.
    #[must_use]
    pub fn key_for(&self, provider: &str) -> Option<String> {
        if let Some(key) = self.configured.get(provider) {
            return Some(key.clone());
        }
        std::env::var(Self::env_var_name(provider)).ok().filter(|key| !key.is_empty())
    }
}

/// A node provider with per-chain connection recipes.
///
/// The support map and enabled flag are interior-mutable so configuration
/// reloads can adjust a provider without tearing down the registry.
#[derive(Debug)]
pub struct ServiceProvider {
    name: Arc<str>,
    /// Relative weight for randomized pool ordering.
    weight: u32,
    enabled: AtomicBool,
    support: RwLock<HashMap<u64, ChainSupport>>,
}

impl ServiceProvider {
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            weight: 1,
            enabled: AtomicBool::new(true),
            support: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight.max(1);
        self
    }

    #[must_use]
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    #[must_use]
    pub fn weight(&self) -> u32 {
        self.weight
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Adds or overwrites the recipe for a chain. Last write wins.
    pub fn set_chain_support(&self, chain_id: u64, support: ChainSupport) {
        self.support.write().insert(chain_id, support);
    }

    /// Whether this provider declares support for the chain at all.
    #[must_use]
    pub fn supports(&self, chain_id: u64) -> bool {
        self.support.read().contains_key(&chain_id)
    }

    #[must_use]
    pub fn chain_support(&self, chain_id: u64) -> Option<ChainSupport> {
        self.support.read().get(&chain_id).cloned()
    }

    /// Resolves a concrete endpoint for the chain, or `None` when the
    /// provider is disabled, does not support the chain, or a required key
    /// is missing.
    #[must_use]
    pub fn rpc_endpoint(&self, chain: &Arc<Chain>, keys: &ProviderKeys) -> Option<RpcEndpoint> {
        if !self.is_enabled() {
            return None;
        }
        let support = self.chain_support(chain.chain_id)?;
        let Some((url, ws_url)) = support.resolve(keys.key_for(&self.name).as_deref()) else {
            tracing::warn!(
                provider = %self.name,
                chain_id = chain.chain_id,
                "provider supports chain but no API key is configured, skipping"
            );
            return None;
        };
        Some(RpcEndpoint { provider: Arc::clone(&self.name), chain: Arc::clone(chain), url, ws_url })
    }
}

/// Ordered collection of registered providers.
///
/// Registration order is the sequential relay order, so it is preserved.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<ServiceProvider>>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider. A second registration under the same name is
    /// rejected; adjust the existing provider instead.
    pub fn register(&mut self, provider: ServiceProvider) -> Result<(), RegistryError> {
        if self.providers.iter().any(|existing| existing.name == provider.name) {
            return Err(RegistryError::ConflictingProvider(provider.name.to_string()));
        }
        self.providers.push(Arc::new(provider));
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<ServiceProvider>> {
        self.providers.iter().find(|provider| provider.name.as_ref() == name).cloned()
    }

    #[must_use]
    pub fn providers(&self) -> &[Arc<ServiceProvider>] {
        &self.providers
    }

    /// Providers declaring support for the chain, in registration order.
    /// Disabled providers are included here; they drop out at resolution.
    #[must_use]
    pub fn providers_supporting(&self, chain_id: u64) -> Vec<Arc<ServiceProvider>> {
        self.providers.iter().filter(|provider| provider.supports(chain_id)).cloned().collect()
    }
}

/// Built-in provider templates with key-appended URLs for the chains the
/// built-in catalog covers.
#[must_use]
pub fn builtin_providers() -> Vec<ServiceProvider> {
    let alchemy = ServiceProvider::new("alchemy");
    for (chain_id, subdomain) in [
        (1, "eth-mainnet"),
        (11_155_111, "eth-sepolia"),
        (17_000, "eth-holesky"),
        (8453, "base-mainnet"),
        (84_532, "base-sepolia"),
        (137, "polygon-mainnet"),
        (10, "opt-mainnet"),
        (42_161, "arb-mainnet"),
    ] {
        alchemy.set_chain_support(
            chain_id,
            ChainSupport::KeyAppended {
                base_url: format!("https://{subdomain}.g.alchemy.com/v2"),
                ws_base_url: Some(format!("wss://{subdomain}.g.alchemy.com/v2")),
            },
        );
    }

    let infura = ServiceProvider::new("infura");
    for (chain_id, subdomain) in [
        (1, "mainnet"),
        (11_155_111, "sepolia"),
        (17_000, "holesky"),
        (8453, "base-mainnet"),
        (137, "polygon-mainnet"),
        (10, "optimism-mainnet"),
        (42_161, "arbitrum-mainnet"),
    ] {
        infura.set_chain_support(
            chain_id,
            ChainSupport::KeyAppended {
                base_url: format!("https://{subdomain}.infura.io/v3"),
                ws_base_url: Some(format!("wss://{subdomain}.infura.io/ws/v3")),
            },
        );
    }

    let ankr = ServiceProvider::new("ankr");
    for (chain_id, path) in [
        (1, "eth"),
        (11_155_111, "eth_sepolia"),
        (17_000, "eth_holesky"),
        (8453, "base"),
        (137, "polygon"),
        (10, "optimism"),
        (42_161, "arbitrum"),
    ] {
        ankr.set_chain_support(
            chain_id,
            ChainSupport::KeyAppended {
                base_url: format!("https://rpc.ankr.com/{path}"),
                ws_base_url: None,
            },
        );
    }

    vec![alchemy, infura, ankr]
}
