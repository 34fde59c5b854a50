//! Subscription multiplexing against a mock WebSocket node.

use crate::mock_infrastructure::ws_mock::WsNodeMock;
use futures_util::{SinkExt, StreamExt};
use nexus_core::{
    cache::RequestCache,
    chain::{Chain, ChainRegistry, ChainStateTracker},
    provider::{ChainSupport, ProviderKeys, ProviderRegistry, ServiceProvider},
    relay::{EndpointPoolFactory, FailurePolicy, HttpClient, RelayConfig, RelayOrder},
    subs::{SubscriptionEvent, TerminationReason},
    types::error_codes,
    RelayHandler, Relayer, SubscriptionHub,
};
use nexus_server::router::{build_router, AppState};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message};

fn hub_for(ws_url: &str, chain_ids: &[u64]) -> SubscriptionHub {
    let mut providers = ProviderRegistry::new();
    let provider = ServiceProvider::new("ws-node");
    for chain_id in chain_ids {
        provider.set_chain_support(
            *chain_id,
            ChainSupport::Url {
                url: "http://127.0.0.1:8545".to_string(),
                ws_url: Some(ws_url.to_string()),
            },
        );
    }
    providers.register(provider).unwrap();
    SubscriptionHub::new(Arc::new(providers), Arc::new(ProviderKeys::new()))
        .with_connect_timeout(Duration::from_secs(3))
}

fn mainnet() -> Arc<Chain> {
    Arc::new(Chain::new(1, "ethereum", "mainnet", 12))
}

async fn expect_activated(
    inbound: &mut nexus_core::subs::InboundSubscription,
) {
    let event = tokio::time::timeout(Duration::from_secs(5), inbound.next_event())
        .await
        .expect("timed out waiting for activation");
    assert!(matches!(event, Some(SubscriptionEvent::Activated)), "got {event:?}");
}

async fn expect_data(
    inbound: &mut nexus_core::subs::InboundSubscription,
) -> serde_json::Value {
    let event = tokio::time::timeout(Duration::from_secs(5), inbound.next_event())
        .await
        .expect("timed out waiting for data");
    match event {
        Some(SubscriptionEvent::Data(payload)) => payload,
        other => panic!("expected data event, got {other:?}"),
    }
}

#[tokio::test]
async fn two_inbounds_share_one_upstream_subscription() {
    let node = WsNodeMock::start().await;
    let hub = hub_for(&node.url(), &[1]);
    let chain = mainnet();
    let params = json!(["newHeads"]);

    let mut first = hub.subscribe(&chain, Some(&params)).unwrap();
    let mut second = hub.subscribe(&chain, Some(&params)).unwrap();

    expect_activated(&mut first).await;
    expect_activated(&mut second).await;
    assert_eq!(node.subscribe_count(), 1);
    assert_eq!(hub.outbound_count(), 1);

    node.push(json!({"number": "0x100"}));
    assert_eq!(expect_data(&mut first).await, json!({"number": "0x100"}));
    assert_eq!(expect_data(&mut second).await, json!({"number": "0x100"}));
}

#[tokio::test]
async fn different_chains_get_separate_upstream_subscriptions() {
    let node = WsNodeMock::start().await;
    let hub = hub_for(&node.url(), &[1, 8453]);
    let mainnet = mainnet();
    let base = Arc::new(Chain::new(8453, "base", "mainnet", 2));
    let params = json!(["newHeads"]);

    let mut on_mainnet = hub.subscribe(&mainnet, Some(&params)).unwrap();
    let mut on_base = hub.subscribe(&base, Some(&params)).unwrap();

    expect_activated(&mut on_mainnet).await;
    expect_activated(&mut on_base).await;
    assert_eq!(node.subscribe_count(), 2);
    assert_eq!(hub.outbound_count(), 2);
}

#[tokio::test]
async fn last_detach_unsubscribes_upstream_and_clears_the_registry() {
    let node = WsNodeMock::start().await;
    let hub = hub_for(&node.url(), &[1]);
    let chain = mainnet();
    let params = json!(["newHeads"]);

    let mut first = hub.subscribe(&chain, Some(&params)).unwrap();
    let mut second = hub.subscribe(&chain, Some(&params)).unwrap();
    expect_activated(&mut first).await;
    expect_activated(&mut second).await;

    first.detach();
    // One inbound remains; the upstream subscription must survive.
    node.push(json!({"number": "0x200"}));
    assert_eq!(expect_data(&mut second).await, json!({"number": "0x200"}));
    assert_eq!(node.unsubscribe_count(), 0);

    second.detach();
    for _ in 0..50 {
        if hub.outbound_count() == 0 && node.unsubscribe_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(hub.outbound_count(), 0);
    assert_eq!(node.unsubscribe_count(), 1);
}

#[tokio::test]
async fn resubscribe_after_teardown_creates_a_fresh_upstream_subscription() {
    let node = WsNodeMock::start().await;
    let hub = hub_for(&node.url(), &[1]);
    let chain = mainnet();
    let params = json!(["newHeads"]);

    let mut inbound = hub.subscribe(&chain, Some(&params)).unwrap();
    expect_activated(&mut inbound).await;
    inbound.detach();
    for _ in 0..50 {
        if hub.outbound_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let mut fresh = hub.subscribe(&chain, Some(&params)).unwrap();
    expect_activated(&mut fresh).await;
    assert_eq!(node.subscribe_count(), 2);
}

#[tokio::test]
async fn connect_failure_terminates_with_failed() {
    let hub = hub_for("ws://127.0.0.1:1/", &[1]);
    let chain = mainnet();
    let params = json!(["newHeads"]);

    let mut inbound = hub.subscribe(&chain, Some(&params)).unwrap();
    let event = tokio::time::timeout(Duration::from_secs(10), inbound.next_event())
        .await
        .expect("timed out waiting for termination");
    assert!(matches!(
        event,
        Some(SubscriptionEvent::Terminated(TerminationReason::Failed(_)))
    ));
}

/// Serves the full gateway stack on a random local port, with the given
/// mock node as the only provider for mainnet.
async fn serve_gateway(ws_url: &str) -> SocketAddr {
    let mut chains = ChainRegistry::new();
    chains.register(Chain::new(1, "ethereum", "mainnet", 12)).unwrap();

    let mut providers = ProviderRegistry::new();
    let provider = ServiceProvider::new("ws-node");
    provider.set_chain_support(
        1,
        ChainSupport::Url {
            url: "http://127.0.0.1:8545".to_string(),
            ws_url: Some(ws_url.to_string()),
        },
    );
    providers.register(provider).unwrap();
    let providers = Arc::new(providers);
    let keys = Arc::new(ProviderKeys::new());

    let config = RelayConfig {
        order: RelayOrder::Sequential,
        failure: FailurePolicy::FailImmediately,
        attempt_timeout: Duration::from_secs(5),
    };
    let relayer = Relayer::new(
        EndpointPoolFactory::new(Arc::clone(&providers), config),
        Arc::clone(&keys),
        HttpClient::new(4).unwrap(),
        Arc::new(RequestCache::disabled()),
        Arc::new(ChainStateTracker::new()),
    );
    let handler = Arc::new(RelayHandler::new(Arc::new(chains), Arc::new(relayer), None));
    let hub = Arc::new(
        SubscriptionHub::new(providers, keys).with_connect_timeout(Duration::from_secs(3)),
    );

    let app = build_router(Arc::new(AppState { handler, hub }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

type ClientSocket = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn next_json(socket: &mut ClientSocket) -> serde_json::Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).expect("non-JSON frame");
        }
    }
}

#[tokio::test]
async fn upstream_drop_sends_clients_an_error_notification() {
    let node = WsNodeMock::start().await;
    let addr = serve_gateway(&node.url()).await;

    let (mut client, _) = connect_async(format!("ws://{addr}/1")).await.unwrap();
    let subscribe = json!({
        "jsonrpc": "2.0",
        "method": "eth_subscribe",
        "params": ["newHeads"],
        "id": 1,
    });
    client.send(Message::Text(subscribe.to_string())).await.unwrap();

    let ack = next_json(&mut client).await;
    let client_id = ack["result"].as_str().expect("subscription id").to_string();

    // Wait for the upstream subscription before pushing, or the notification
    // can land on a not-yet-subscribed connection and be dropped.
    for _ in 0..50 {
        if node.subscribe_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(node.subscribe_count(), 1);

    node.push(json!({"number": "0x10"}));
    let note = next_json(&mut client).await;
    assert_eq!(note["method"], "eth_subscription");
    assert_eq!(note["params"]["subscription"], json!(client_id));
    assert_eq!(note["params"]["result"], json!({"number": "0x10"}));

    // Kill the node side mid-feed; the client must hear about it.
    node.drop_connections();
    let failure = next_json(&mut client).await;
    assert_eq!(failure["method"], "eth_subscription");
    assert_eq!(failure["params"]["subscription"], json!(client_id));
    assert_eq!(
        failure["params"]["error"]["code"],
        json!(error_codes::SUBSCRIPTION_REJECTED)
    );
    let message = failure["params"]["error"]["message"].as_str().unwrap();
    assert!(message.contains("terminated"), "{message}");
}

#[tokio::test]
async fn filtered_subscriptions_are_rejected() {
    let node = WsNodeMock::start().await;
    let hub = hub_for(&node.url(), &[1]);
    let chain = mainnet();

    let params = json!(["logs", {"address": "0xaa"}]);
    assert!(hub.subscribe(&chain, Some(&params)).is_err());
    assert_eq!(node.subscribe_count(), 0);
    assert_eq!(hub.outbound_count(), 0);
}
