//! Nexus gateway server binary.
//!
//! Wires the core components to axum: loads configuration, builds the chain
//! and provider registries, and serves HTTP + WebSocket traffic until
//! shutdown.

use anyhow::Context;
use nexus_core::{
    cache::RequestCache,
    chain::ChainStateTracker,
    config::AppConfig,
    relay::{EndpointPoolFactory, HttpClient},
    RelayHandler, Relayer, SubscriptionHub,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use nexus_server::router::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional config file path as the only argument.
    let config_path = std::env::args().nth(1);
    let config = AppConfig::load(config_path.as_deref()).context("loading configuration")?;

    init_logging(&config)?;
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        "starting nexus gateway"
    );

    let chains = Arc::new(config.build_chain_registry().context("building chain registry")?);
    let (providers, keys) =
        config.build_provider_registry().context("building provider registry")?;
    let providers = Arc::new(providers);
    let keys = Arc::new(keys);

    tracing::info!(
        chains = chains.len(),
        providers = providers.providers().len(),
        "registries ready"
    );

    let cache = if config.cache.enabled {
        Arc::new(RequestCache::in_memory(config.cache.capacity))
    } else {
        Arc::new(RequestCache::disabled())
    };

    let relayer = Arc::new(Relayer::new(
        EndpointPoolFactory::new(Arc::clone(&providers), config.relay_config()),
        Arc::clone(&keys),
        HttpClient::new(config.relay.max_concurrent_requests)
            .context("building HTTP client")?,
        cache,
        Arc::new(ChainStateTracker::new()),
    ));

    let handler = Arc::new(RelayHandler::new(
        Arc::clone(&chains),
        relayer,
        config.access.key.clone(),
    ));
    let hub = Arc::new(
        SubscriptionHub::new(Arc::clone(&providers), keys)
            .with_connect_timeout(config.subscription_connect_timeout()),
    );

    let app = router::build_router(Arc::new(AppState { handler, hub }));

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("binding {bind_address}"))?;
    tracing::info!(address = %bind_address, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("shutdown complete");
    Ok(())
}

fn init_logging(config: &AppConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log.level))
        .context("invalid log filter")?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log.format.as_str() {
        "json" => builder.json().init(),
        _ => builder.init(),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    } else {
        tracing::info!("shutdown signal received");
    }
}
