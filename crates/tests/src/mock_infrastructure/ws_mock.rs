//! Mock WebSocket node speaking just enough of the subscription protocol:
//! it acks `eth_subscribe`, acks `eth_unsubscribe`, and pushes notifications
//! injected by the test.

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::{net::TcpListener, sync::broadcast};
use tokio_tungstenite::{accept_async, tungstenite::Message};

const UPSTREAM_SUB_ID: &str = "0xfeedc0de";

/// A WebSocket node accepting any number of connections.
pub struct WsNodeMock {
    url: String,
    subscribe_count: Arc<AtomicUsize>,
    unsubscribe_count: Arc<AtomicUsize>,
    notifications: broadcast::Sender<serde_json::Value>,
    close: broadcast::Sender<()>,
}

impl WsNodeMock {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock ws node");
        let addr = listener.local_addr().expect("local addr");
        let subscribe_count = Arc::new(AtomicUsize::new(0));
        let unsubscribe_count = Arc::new(AtomicUsize::new(0));
        let (notifications, _) = broadcast::channel(64);
        let (close, _) = broadcast::channel(4);

        let subs = Arc::clone(&subscribe_count);
        let unsubs = Arc::clone(&unsubscribe_count);
        let notify_tx = notifications.clone();
        let close_tx = close.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let subs = Arc::clone(&subs);
                let unsubs = Arc::clone(&unsubs);
                let notify_rx = notify_tx.subscribe();
                let close_rx = close_tx.subscribe();
                tokio::spawn(async move {
                    let _ = serve_connection(socket, subs, unsubs, notify_rx, close_rx).await;
                });
            }
        });

        Self {
            url: format!("ws://{addr}/"),
            subscribe_count,
            unsubscribe_count,
            notifications,
            close,
        }
    }

    pub fn url(&self) -> String {
        self.url.clone()
    }

    /// Number of `eth_subscribe` requests received across all connections.
    pub fn subscribe_count(&self) -> usize {
        self.subscribe_count.load(Ordering::SeqCst)
    }

    pub fn unsubscribe_count(&self) -> usize {
        self.unsubscribe_count.load(Ordering::SeqCst)
    }

    /// Pushes a notification payload to every active subscription.
    pub fn push(&self, payload: serde_json::Value) {
        let _ = self.notifications.send(payload);
    }

    /// Drops every open connection without a close handshake, as a node
    /// restart would.
    pub fn drop_connections(&self) {
        let _ = self.close.send(());
    }
}

async fn serve_connection(
    socket: tokio::net::TcpStream,
    subscribe_count: Arc<AtomicUsize>,
    unsubscribe_count: Arc<AtomicUsize>,
    mut notifications: broadcast::Receiver<serde_json::Value>,
    mut close: broadcast::Receiver<()>,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let stream = accept_async(socket).await?;
    let (mut sink, mut read) = stream.split();
    let mut subscribed = false;

    loop {
        tokio::select! {
            frame = read.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e),
                };
                let request: serde_json::Value = match serde_json::from_str(&text) {
                    Ok(request) => request,
                    Err(_) => continue,
                };
                let id = request.get("id").cloned().unwrap_or(json!(null));
                match request.get("method").and_then(serde_json::Value::as_str) {
                    Some("eth_subscribe") => {
                        subscribe_count.fetch_add(1, Ordering::SeqCst);
                        subscribed = true;
                        let ack = json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "result": UPSTREAM_SUB_ID,
                        });
                        sink.send(Message::Text(ack.to_string())).await?;
                    }
                    Some("eth_unsubscribe") => {
                        unsubscribe_count.fetch_add(1, Ordering::SeqCst);
                        subscribed = false;
                        let ack = json!({ "jsonrpc": "2.0", "id": id, "result": true });
                        sink.send(Message::Text(ack.to_string())).await?;
                    }
                    _ => {
                        let err = json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "error": { "code": -32601, "message": "Method not found" },
                        });
                        sink.send(Message::Text(err.to_string())).await?;
                    }
                }
            }
            payload = notifications.recv() => {
                let Ok(payload) = payload else { return Ok(()) };
                if !subscribed {
                    continue;
                }
                let note = json!({
                    "jsonrpc": "2.0",
                    "method": "eth_subscription",
                    "params": { "subscription": UPSTREAM_SUB_ID, "result": payload },
                });
                sink.send(Message::Text(note.to_string())).await?;
            }
            _ = close.recv() => {
                // Returning drops the stream mid-conversation.
                return Ok(());
            }
        }
    }
}
