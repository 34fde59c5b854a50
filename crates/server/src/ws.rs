//! WebSocket sessions.
//!
//! One session per accepted upgrade, bound to a single chain. The session
//! speaks JSON-RPC over the socket: `eth_subscribe`/`eth_unsubscribe` go to
//! the subscription hub, everything else relays like a POST would. Each live
//! subscription gets a forwarding task that turns hub events into
//! `eth_subscription` notifications.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use nexus_core::{
    chain::Chain,
    subs::{InboundSubscription, SubscriptionEvent, TerminationReason},
    types::{error_codes, JsonRpcRequest, JsonRpcResponse},
};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::mpsc;

use crate::router::AppState;

struct ClientSubscription {
    forwarder: tokio::task::JoinHandle<()>,
}

impl Drop for ClientSubscription {
    fn drop(&mut self) {
        // Aborting the forwarder drops its InboundSubscription, which
        // detaches from the shared outbound.
        self.forwarder.abort();
    }
}

/// Runs one client session to completion.
pub async fn serve(state: Arc<AppState>, chain: Arc<Chain>, socket: WebSocket) {
    let (mut sink, mut read) = socket.split();

    // All writers go through one channel so notification forwarders and
    // request replies cannot interleave partial frames.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    // Forwarders report their client id here when the upstream feed ends, so
    // dead entries do not accumulate in the session map.
    let (retired_tx, mut retired_rx) = mpsc::unbounded_channel::<String>();
    let mut subscriptions: HashMap<String, ClientSubscription> = HashMap::new();

    loop {
        let text = tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            },
            retired = retired_rx.recv() => {
                if let Some(client_id) = retired {
                    subscriptions.remove(&client_id);
                }
                continue;
            }
        };

        let request: JsonRpcRequest = match serde_json::from_str(&text) {
            Ok(request) => request,
            Err(e) => {
                send_json(
                    &out_tx,
                    &error_body(error_codes::INVALID_REQUEST, format!("invalid request: {e}")),
                );
                continue;
            }
        };

        match request.method.as_str() {
            "eth_subscribe" => {
                handle_subscribe(&state, &chain, &request, &out_tx, &retired_tx, &mut subscriptions);
            }
            "eth_unsubscribe" => {
                handle_unsubscribe(&request, &out_tx, &mut subscriptions);
            }
            _ => {
                let body = state.handler.relay_rpc(&chain, &request).await;
                send_json(&out_tx, &body);
            }
        }
    }

    tracing::debug!(
        chain_id = chain.chain_id,
        subscriptions = subscriptions.len(),
        "WebSocket session closed"
    );
    // Dropping the map aborts forwarders and detaches their subscriptions.
    drop(subscriptions);
    writer.abort();
}

fn handle_subscribe(
    state: &Arc<AppState>,
    chain: &Arc<Chain>,
    request: &JsonRpcRequest,
    out_tx: &mpsc::UnboundedSender<Message>,
    retired_tx: &mpsc::UnboundedSender<String>,
    subscriptions: &mut HashMap<String, ClientSubscription>,
) {
    let inbound = match state.hub.subscribe(chain, request.params.as_ref()) {
        Ok(inbound) => inbound,
        Err(e) => {
            let body = JsonRpcResponse::error(
                error_codes::SUBSCRIPTION_REJECTED,
                e.to_string(),
                Arc::clone(&request.id),
            );
            send_json(out_tx, &to_value(&body));
            return;
        }
    };

    let client_id = format!("0x{:032x}", rand::random::<u128>());
    let forwarder = tokio::spawn(forward_events(
        inbound,
        client_id.clone(),
        out_tx.clone(),
        retired_tx.clone(),
    ));
    subscriptions.insert(client_id.clone(), ClientSubscription { forwarder });

    let body = JsonRpcResponse::success(
        serde_json::Value::String(client_id),
        Arc::clone(&request.id),
    );
    send_json(out_tx, &to_value(&body));
}

fn handle_unsubscribe(
    request: &JsonRpcRequest,
    out_tx: &mpsc::UnboundedSender<Message>,
    subscriptions: &mut HashMap<String, ClientSubscription>,
) {
    let target = request
        .params
        .as_ref()
        .and_then(|p| p.as_array())
        .and_then(|a| a.first())
        .and_then(|v| v.as_str());

    let removed = match target {
        Some(id) => subscriptions.remove(id).is_some(),
        None => false,
    };
    let body =
        JsonRpcResponse::success(serde_json::Value::Bool(removed), Arc::clone(&request.id));
    send_json(out_tx, &to_value(&body));
}

/// Turns hub events into client notifications until the feed terminates.
///
/// An involuntary termination (the upstream feed failed or died) is relayed
/// to the client as an error notification on its subscription id before the
/// forwarder retires itself from the session map.
async fn forward_events(
    mut inbound: InboundSubscription,
    client_id: String,
    out_tx: mpsc::UnboundedSender<Message>,
    retired_tx: mpsc::UnboundedSender<String>,
) {
    while let Some(event) = inbound.next_event().await {
        match event {
            SubscriptionEvent::Activated => {}
            SubscriptionEvent::Data(payload) => {
                let note = serde_json::json!({
                    "jsonrpc": "2.0",
                    "method": "eth_subscription",
                    "params": { "subscription": client_id, "result": payload },
                });
                if out_tx.send(Message::Text(note.to_string())).is_err() {
                    break;
                }
            }
            SubscriptionEvent::Terminated(reason) => {
                tracing::debug!(
                    key = %inbound.key(),
                    reason = reason.as_str(),
                    "upstream feed terminated, ending client subscription"
                );
                if matches!(
                    reason,
                    TerminationReason::Failed(_) | TerminationReason::Aborted(_)
                ) {
                    let note = serde_json::json!({
                        "jsonrpc": "2.0",
                        "method": "eth_subscription",
                        "params": {
                            "subscription": client_id,
                            "error": {
                                "code": error_codes::SUBSCRIPTION_REJECTED,
                                "message": format!("subscription terminated: {reason}"),
                            },
                        },
                    });
                    let _ = out_tx.send(Message::Text(note.to_string()));
                }
                break;
            }
        }
    }
    let _ = retired_tx.send(client_id);
}

fn error_body(code: i32, message: String) -> serde_json::Value {
    to_value(&JsonRpcResponse::error(code, message, Arc::new(serde_json::Value::Null)))
}

fn to_value(response: &JsonRpcResponse) -> serde_json::Value {
    serde_json::to_value(response).unwrap_or(serde_json::Value::Null)
}

fn send_json(out_tx: &mpsc::UnboundedSender<Message>, body: &serde_json::Value) {
    let _ = out_tx.send(Message::Text(body.to_string()));
}
