//! Cache behavior through the full relay path.

use crate::mock_infrastructure::rpc_mock::RpcNodeMock;
use nexus_core::{
    cache::RequestCache,
    chain::{Chain, ChainRegistry, ChainStateTracker},
    provider::{ChainSupport, ProviderKeys, ProviderRegistry, ServiceProvider},
    relay::{EndpointPoolFactory, HttpClient, RelayConfig, RelayOrder, FailurePolicy},
    RelayHandler, Relayer,
};
use serde_json::json;
use std::{sync::Arc, time::Duration};

/// Gateway with one upstream and an in-memory cache. `block_time` drives the
/// TTL of head-relative methods.
fn cached_gateway(url: &str, block_time: u64) -> RelayHandler {
    let mut chains = ChainRegistry::new();
    chains.register(Chain::new(1, "ethereum", "mainnet", block_time)).unwrap();

    let mut providers = ProviderRegistry::new();
    let provider = ServiceProvider::new("only");
    provider.set_chain_support(1, ChainSupport::Url { url: url.to_string(), ws_url: None });
    providers.register(provider).unwrap();

    let config = RelayConfig {
        order: RelayOrder::Sequential,
        failure: FailurePolicy::FailImmediately,
        attempt_timeout: Duration::from_secs(5),
    };
    let relayer = Relayer::new(
        EndpointPoolFactory::new(Arc::new(providers), config),
        Arc::new(ProviderKeys::new()),
        HttpClient::new(16).unwrap(),
        Arc::new(RequestCache::in_memory(100)),
        Arc::new(ChainStateTracker::new()),
    );
    RelayHandler::new(Arc::new(chains), Arc::new(relayer), None)
}

/// Cache writes land off the request path; give the spawned write a moment.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn second_identical_request_is_served_from_cache() {
    let mut node = RpcNodeMock::start().await;
    let once = node.mock_result("eth_chainId", json!("0x1"), 1).await;

    let handler = cached_gateway(&node.url(), 12);
    let body = br#"{"jsonrpc":"2.0","method":"eth_chainId","id":1}"#;

    let first = handler.handle_post("/1", None, body).await;
    assert_eq!(first.status, 200);
    settle().await;

    let second = handler.handle_post("/1", None, body).await;
    assert_eq!(second.status, 200);
    assert_eq!(second.body["result"], json!("0x1"));

    // Exactly one upstream call across both requests.
    once.assert_async().await;
}

#[tokio::test]
async fn expired_entry_goes_back_upstream() {
    let mut node = RpcNodeMock::start().await;
    let twice = node.mock_result("eth_blockNumber", json!("0x100"), 2).await;

    // One-second block time: eth_blockNumber expires after a second.
    let handler = cached_gateway(&node.url(), 1);
    let body = br#"{"jsonrpc":"2.0","method":"eth_blockNumber","id":1}"#;

    let first = handler.handle_post("/1", None, body).await;
    assert_eq!(first.status, 200);
    settle().await;

    tokio::time::sleep(Duration::from_millis(1_200)).await;
    let second = handler.handle_post("/1", None, body).await;
    assert_eq!(second.status, 200);

    twice.assert_async().await;
}

#[tokio::test]
async fn uncacheable_methods_always_relay() {
    let mut node = RpcNodeMock::start().await;
    let twice = node.mock_result("eth_sendRawTransaction", json!("0xhash"), 2).await;

    let handler = cached_gateway(&node.url(), 12);
    let body = br#"{"jsonrpc":"2.0","method":"eth_sendRawTransaction","params":["0xaa"],"id":1}"#;

    handler.handle_post("/1", None, body).await;
    settle().await;
    handler.handle_post("/1", None, body).await;

    twice.assert_async().await;
}

#[tokio::test]
async fn different_params_do_not_share_entries() {
    let mut node = RpcNodeMock::start().await;
    let twice = node.mock_result("eth_getBlockByNumber", json!({"number": "0x1"}), 2).await;

    let handler = cached_gateway(&node.url(), 12);
    let block_one = br#"{"jsonrpc":"2.0","method":"eth_getBlockByNumber","params":["0x1",false],"id":1}"#;
    let block_two = br#"{"jsonrpc":"2.0","method":"eth_getBlockByNumber","params":["0x2",false],"id":1}"#;

    handler.handle_post("/1", None, block_one).await;
    settle().await;
    handler.handle_post("/1", None, block_two).await;

    twice.assert_async().await;
}

#[tokio::test]
async fn error_responses_are_never_cached() {
    let mut node = RpcNodeMock::start().await;
    let twice = node.mock_rpc_error("eth_chainId", -32603, "internal error", 2).await;

    let handler = cached_gateway(&node.url(), 12);
    let body = br#"{"jsonrpc":"2.0","method":"eth_chainId","id":1}"#;

    let first = handler.handle_post("/1", None, body).await;
    assert_eq!(first.status, 200);
    assert_eq!(first.body["error"]["code"], -32603);
    settle().await;

    let second = handler.handle_post("/1", None, body).await;
    assert_eq!(second.body["error"]["code"], -32603);

    twice.assert_async().await;
}
