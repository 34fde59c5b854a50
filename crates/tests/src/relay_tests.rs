//! Relay and failover scenarios against mock upstream nodes.

use crate::mock_infrastructure::rpc_mock::RpcNodeMock;
use nexus_core::{
    cache::RequestCache,
    chain::{Chain, ChainRegistry, ChainStateTracker},
    provider::{ChainSupport, ProviderKeys, ProviderRegistry, ServiceProvider},
    relay::{EndpointPoolFactory, FailurePolicy, HttpClient, RelayConfig, RelayOrder},
    types::error_codes,
    RelayHandler, Relayer,
};
use serde_json::json;
use std::{sync::Arc, time::Duration};

const BLOCK_NUMBER_BODY: &[u8] =
    br#"{"jsonrpc":"2.0","method":"eth_blockNumber","params":[],"id":1}"#;

/// Gateway with sequential ordering over the given upstream URLs, caching
/// disabled so every request reaches the pool.
fn gateway(urls: &[String], failure: FailurePolicy) -> RelayHandler {
    let mut chains = ChainRegistry::new();
    chains.register(Chain::new(1, "ethereum", "mainnet", 12)).unwrap();

    let mut providers = ProviderRegistry::new();
    for (index, url) in urls.iter().enumerate() {
        let provider = ServiceProvider::new(format!("provider-{index}"));
        provider.set_chain_support(1, ChainSupport::Url { url: url.clone(), ws_url: None });
        providers.register(provider).unwrap();
    }

    let config = RelayConfig {
        order: RelayOrder::Sequential,
        failure,
        attempt_timeout: Duration::from_secs(5),
    };
    let relayer = Relayer::new(
        EndpointPoolFactory::new(Arc::new(providers), config),
        Arc::new(ProviderKeys::new()),
        HttpClient::new(16).unwrap(),
        Arc::new(RequestCache::disabled()),
        Arc::new(ChainStateTracker::new()),
    );
    RelayHandler::new(Arc::new(chains), Arc::new(relayer), None)
}

fn cycle(max_attempts: u32) -> FailurePolicy {
    FailurePolicy::CycleRequests { max_attempts }
}

#[tokio::test]
async fn all_providers_healthy_uses_only_the_first() {
    let mut first = RpcNodeMock::start().await;
    let mut second = RpcNodeMock::start().await;
    let mut third = RpcNodeMock::start().await;

    let ok = first.mock_result("eth_blockNumber", json!("0x10"), 1).await;
    let untouched_b = second.mock_untouched().await;
    let untouched_c = third.mock_untouched().await;

    let handler = gateway(&[first.url(), second.url(), third.url()], cycle(3));
    let response = handler.handle_post("/1", None, BLOCK_NUMBER_BODY).await;

    assert_eq!(response.status, 200);
    assert_eq!(response.body["result"], json!("0x10"));
    ok.assert_async().await;
    untouched_b.assert_async().await;
    untouched_c.assert_async().await;
}

#[tokio::test]
async fn cycle_fails_over_past_a_broken_provider() {
    let mut first = RpcNodeMock::start().await;
    let mut second = RpcNodeMock::start().await;

    let broken = first.mock_http_error(500, 1).await;
    let ok = second.mock_result("eth_blockNumber", json!("0x11"), 1).await;

    let handler = gateway(&[first.url(), second.url()], cycle(3));
    let response = handler.handle_post("/1", None, BLOCK_NUMBER_BODY).await;

    assert_eq!(response.status, 200);
    assert_eq!(response.body["result"], json!("0x11"));
    broken.assert_async().await;
    ok.assert_async().await;
}

#[tokio::test]
async fn fail_immediately_never_reaches_the_second_provider() {
    let mut first = RpcNodeMock::start().await;
    let mut second = RpcNodeMock::start().await;

    let broken = first.mock_http_error(500, 1).await;
    let untouched = second.mock_untouched().await;

    let handler = gateway(&[first.url(), second.url()], FailurePolicy::FailImmediately);
    let response = handler.handle_post("/1", None, BLOCK_NUMBER_BODY).await;

    assert_eq!(response.status, 502);
    assert_eq!(response.body["error"]["code"], error_codes::ALL_PROVIDERS_FAILED);
    assert_eq!(response.body["error"]["data"].as_array().unwrap().len(), 1);
    broken.assert_async().await;
    untouched.assert_async().await;
}

#[tokio::test]
async fn all_providers_down_reports_every_attempt() {
    let mut first = RpcNodeMock::start().await;
    let mut second = RpcNodeMock::start().await;
    let mut third = RpcNodeMock::start().await;

    let a = first.mock_http_error(500, 1).await;
    let b = second.mock_http_error(503, 1).await;
    let c = third.mock_garbage(1).await;

    let handler = gateway(&[first.url(), second.url(), third.url()], cycle(3));
    let response = handler.handle_post("/1", None, BLOCK_NUMBER_BODY).await;

    assert_eq!(response.status, 502);
    assert_eq!(response.body["error"]["code"], error_codes::ALL_PROVIDERS_FAILED);
    let attempts = response.body["error"]["data"].as_array().unwrap();
    assert_eq!(attempts.len(), 3);
    assert_eq!(attempts[0]["kind"], "non_200_response");
    assert_eq!(attempts[1]["kind"], "non_200_response");
    assert_eq!(attempts[2]["kind"], "non_json_response");
    a.assert_async().await;
    b.assert_async().await;
    c.assert_async().await;
}

#[tokio::test]
async fn attempt_budget_caps_the_walk() {
    let mut first = RpcNodeMock::start().await;
    let mut second = RpcNodeMock::start().await;
    let mut third = RpcNodeMock::start().await;

    let a = first.mock_http_error(500, 1).await;
    let b = second.mock_http_error(500, 1).await;
    let untouched = third.mock_untouched().await;

    let handler = gateway(&[first.url(), second.url(), third.url()], cycle(2));
    let response = handler.handle_post("/1", None, BLOCK_NUMBER_BODY).await;

    assert_eq!(response.status, 502);
    assert_eq!(response.body["error"]["data"].as_array().unwrap().len(), 2);
    a.assert_async().await;
    b.assert_async().await;
    untouched.assert_async().await;
}

#[tokio::test]
async fn rpc_error_response_passes_through_without_failover() {
    let mut first = RpcNodeMock::start().await;
    let mut second = RpcNodeMock::start().await;

    let error = first
        .mock_rpc_error("eth_call", 3, "execution reverted: insufficient balance", 1)
        .await;
    let untouched = second.mock_untouched().await;

    let handler = gateway(&[first.url(), second.url()], cycle(3));
    let body = br#"{"jsonrpc":"2.0","method":"eth_call","params":[{},"latest"],"id":7}"#;
    let response = handler.handle_post("/1", None, body).await;

    // A legal error answer is a 200 with the upstream error echoed.
    assert_eq!(response.status, 200);
    assert_eq!(response.body["error"]["code"], 3);
    assert_eq!(
        response.body["error"]["message"],
        "execution reverted: insufficient balance"
    );
    assert_eq!(response.body["id"], 7);
    error.assert_async().await;
    untouched.assert_async().await;
}

#[tokio::test]
async fn request_id_is_echoed_verbatim() {
    let mut node = RpcNodeMock::start().await;
    let ok = node.mock_result("eth_chainId", json!("0x1"), 1).await;

    let handler = gateway(&[node.url()], cycle(1));
    let body = br#"{"jsonrpc":"2.0","method":"eth_chainId","id":"my-id"}"#;
    let response = handler.handle_post("/1", None, body).await;

    assert_eq!(response.status, 200);
    assert_eq!(response.body["id"], "my-id");
    ok.assert_async().await;
}
