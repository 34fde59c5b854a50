//! Configuration loading and registry assembly.
//!
//! Configuration layers, later sources winning:
//!
//! 1. built-in defaults
//! 2. a TOML file (`nexus.toml` by default)
//! 3. environment variables with the `NEXUS__` prefix and `__` separators,
//!    e.g. `NEXUS__SERVER__PORT=4001`
//!
//! Provider API keys additionally come from `NEXUS_PROVIDER_<NAME>_KEY`
//! variables, resolved lazily by [`ProviderKeys`].

use crate::{
    cache::memory,
    chain::{builtin_chains, Chain, ChainRegistry, RegistryError},
    provider::{builtin_providers, ChainSupport, ProviderKeys, ProviderRegistry, ServiceProvider},
    relay::{FailurePolicy, RelayConfig, RelayOrder},
};
use serde::Deserialize;
use std::time::Duration;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("registry assembly failed: {0}")]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 4000 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive, e.g. `"info,nexus_core=debug"`.
    pub level: String,
    /// `"pretty"` or `"json"`.
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

/// How failed relay attempts are recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryMode {
    /// Try the next endpoint, bounded by `max_attempts`.
    Cycle,
    /// Surface the first failure.
    None,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelaySection {
    pub order: RelayOrder,
    pub recovery: RecoveryMode,
    pub max_attempts: u32,
    pub attempt_timeout_seconds: u64,
    pub max_concurrent_requests: usize,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            order: RelayOrder::Random,
            recovery: RecoveryMode::Cycle,
            max_attempts: 3,
            attempt_timeout_seconds: 10,
            max_concurrent_requests: 256,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccessConfig {
    /// Gateway access key. Absent or empty means unprotected.
    pub key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub enabled: bool,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true, capacity: memory::DEFAULT_CAPACITY }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubscriptionConfig {
    pub connect_timeout_seconds: u64,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self { connect_timeout_seconds: 3 }
    }
}

/// An extra chain beyond the built-in catalog.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainEntry {
    pub chain_id: u64,
    pub network: String,
    pub name: String,
    pub block_time: u64,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Per-chain endpoint override for a provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderChainEntry {
    pub chain_id: u64,
    /// Verbatim endpoint URL; no key appended.
    pub url: Option<String>,
    pub ws_url: Option<String>,
    /// Key-appended base URL, completed with the provider key.
    pub base_url: Option<String>,
    pub ws_base_url: Option<String>,
}

impl ProviderChainEntry {
    fn to_support(&self) -> Result<ChainSupport, ConfigError> {
        match (&self.url, &self.base_url) {
            (Some(url), None) => {
                Ok(ChainSupport::Url { url: url.clone(), ws_url: self.ws_url.clone() })
            }
            (None, Some(base_url)) => Ok(ChainSupport::KeyAppended {
                base_url: base_url.clone(),
                ws_base_url: self.ws_base_url.clone(),
            }),
            _ => Err(ConfigError::Invalid(format!(
                "provider chain {} must set exactly one of url or base_url",
                self.chain_id
            ))),
        }
    }
}

/// A provider selection: a built-in template by name, optionally adjusted,
/// or a fully custom provider defined by its chain entries.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderEntry {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// API key; `NEXUS_PROVIDER_<NAME>_KEY` is the fallback.
    pub key: Option<String>,
    #[serde(default)]
    pub chains: Vec<ProviderChainEntry>,
}

fn default_weight() -> u32 {
    1
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub log: LogConfig,
    pub relay: RelaySection,
    pub access: AccessConfig,
    pub cache: CacheConfig,
    pub subscriptions: SubscriptionConfig,
    pub chains: Vec<ChainEntry>,
    pub providers: Vec<ProviderEntry>,
}

impl AppConfig {
    /// Loads configuration from an optional file plus the environment.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let file = path.unwrap_or("nexus.toml");
        let raw = config::Config::builder()
            .add_source(config::File::with_name(file).required(path.is_some()))
            .add_source(config::Environment::with_prefix("NEXUS").separator("__"))
            .build()?;
        let app: AppConfig = raw.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    /// Cross-field validation beyond what serde enforces.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.log.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::Invalid(format!(
                "log.format must be \"pretty\" or \"json\", got {:?}",
                self.log.format
            )));
        }
        if self.relay.max_attempts == 0 {
            return Err(ConfigError::Invalid("relay.max_attempts must be at least 1".into()));
        }
        if self.relay.attempt_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "relay.attempt_timeout_seconds must be at least 1".into(),
            ));
        }
        if self.cache.capacity == 0 {
            return Err(ConfigError::Invalid("cache.capacity must be at least 1".into()));
        }
        for provider in &self.providers {
            if provider.name.is_empty() {
                return Err(ConfigError::Invalid("provider name must not be empty".into()));
            }
            for chain in &provider.chains {
                chain.to_support()?;
            }
        }
        Ok(())
    }

    /// Runtime relay configuration.
    #[must_use]
    pub fn relay_config(&self) -> RelayConfig {
        let failure = match self.relay.recovery {
            RecoveryMode::None => FailurePolicy::FailImmediately,
            RecoveryMode::Cycle => {
                FailurePolicy::CycleRequests { max_attempts: self.relay.max_attempts }
            }
        };
        RelayConfig {
            order: self.relay.order,
            failure,
            attempt_timeout: Duration::from_secs(self.relay.attempt_timeout_seconds),
        }
    }

    #[must_use]
    pub fn subscription_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.subscriptions.connect_timeout_seconds.max(1))
    }

    /// Builds the chain registry: built-in catalog plus configured chains.
    ///
    /// A configured entry matching a built-in chain id replaces nothing; it
    /// must be identical or registration fails, keeping chain identities
    /// unambiguous.
    pub fn build_chain_registry(&self) -> Result<ChainRegistry, ConfigError> {
        let mut registry = ChainRegistry::new();
        for chain in builtin_chains() {
            registry.register(chain)?;
        }
        for entry in &self.chains {
            let mut chain =
                Chain::new(entry.chain_id, entry.network.clone(), entry.name.clone(), entry.block_time);
            chain.is_deprecated = entry.deprecated;
            chain.is_enabled = entry.enabled;
            registry.register(chain)?;
        }
        Ok(registry)
    }

    /// Builds the provider registry and key table.
    ///
    /// With no `[[providers]]` entries, every built-in template is
    /// registered and relies on environment keys. Configured entries select
    /// or define providers: an entry naming a built-in starts from that
    /// template, then applies its own chain entries on top.
    pub fn build_provider_registry(&self) -> Result<(ProviderRegistry, ProviderKeys), ConfigError> {
        let mut registry = ProviderRegistry::new();
        let mut keys = ProviderKeys::new();

        if self.providers.is_empty() {
            for provider in builtin_providers() {
                registry.register(provider)?;
            }
            return Ok((registry, keys));
        }

        let templates = builtin_providers();
        for entry in &self.providers {
            let provider = ServiceProvider::new(&entry.name).with_weight(entry.weight);
            provider.set_enabled(entry.enabled);

            if let Some(template) = templates.iter().find(|t| t.name().as_ref() == entry.name) {
                for chain in builtin_chains() {
                    if let Some(support) = template.chain_support(chain.chain_id) {
                        provider.set_chain_support(chain.chain_id, support);
                    }
                }
            }
            for chain in &entry.chains {
                provider.set_chain_support(chain.chain_id, chain.to_support()?);
            }
            if let Some(key) = &entry.key {
                keys.insert(entry.name.clone(), key.clone());
            }
            registry.register(provider)?;
        }
        Ok((registry, keys))
    }
}
