//! The single upstream WebSocket subscription behind a key.
//!
//! Lifecycle: `Activating` while connecting and waiting for the subscribe
//! ack, `Active` once the upstream assigns an id, `Terminated` forever after.
//! Termination is sticky: late attachers get the terminal event replayed so
//! they fail fast instead of hanging on a dead feed.

use crate::subs::{SubscriptionEvent, SubscriptionKey, TerminationReason};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Request ids on the upstream socket.
const SUBSCRIBE_ID: u64 = 1;
const UNSUBSCRIBE_ID: u64 = 2;

/// Lifecycle state of the upstream subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundState {
    /// Connecting or waiting for the subscribe acknowledgement.
    Activating,
    /// Live; `upstream_id` is the provider-assigned subscription id.
    Active { upstream_id: String },
    /// Finished. Sticky: the reason is replayed to late attachers.
    Terminated(TerminationReason),
}

enum Command {
    Unsubscribe,
}

/// One upstream subscription with fan-out to attached inbounds.
pub struct OutboundSubscription {
    key: SubscriptionKey,
    state: Mutex<OutboundState>,
    inbounds: Mutex<HashMap<u64, mpsc::UnboundedSender<SubscriptionEvent>>>,
    next_attach_id: AtomicU64,
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl std::fmt::Debug for OutboundSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundSubscription")
            .field("key", &self.key)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl OutboundSubscription {
    /// Creates the subscription and spawns its connection task.
    ///
    /// `ws_urls` are tried in order with `connect_timeout` each. `on_exit`
    /// runs exactly once when the task finishes, whatever the reason; the
    /// hub uses it to drop its registry entry.
    pub fn spawn<F>(
        key: SubscriptionKey,
        ws_urls: Vec<String>,
        connect_timeout: Duration,
        on_exit: F,
    ) -> Arc<Self>
    where
        F: FnOnce(&Arc<OutboundSubscription>) + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let subscription = Arc::new(Self {
            key,
            state: Mutex::new(OutboundState::Activating),
            inbounds: Mutex::new(HashMap::new()),
            next_attach_id: AtomicU64::new(1),
            cmd_tx,
        });

        let task_handle = Arc::clone(&subscription);
        tokio::spawn(async move {
            task_handle.run(ws_urls, connect_timeout, cmd_rx).await;
            on_exit(&task_handle);
        });

        subscription
    }

    #[must_use]
    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    #[must_use]
    pub fn state(&self) -> OutboundState {
        self.state.lock().clone()
    }

    /// Attaches a new inbound, returning its id and event stream.
    ///
    /// Attaching to an `Active` subscription delivers `Activated`
    /// immediately; attaching to a `Terminated` one delivers the terminal
    /// event and nothing else.
    pub fn attach(&self) -> (u64, mpsc::UnboundedReceiver<SubscriptionEvent>) {
        let attach_id = self.next_attach_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut inbounds = self.inbounds.lock();
        match &*self.state.lock() {
            OutboundState::Activating => {
                inbounds.insert(attach_id, tx);
            }
            OutboundState::Active { .. } => {
                let _ = tx.send(SubscriptionEvent::Activated);
                inbounds.insert(attach_id, tx);
            }
            OutboundState::Terminated(reason) => {
                let _ = tx.send(SubscriptionEvent::Terminated(reason.clone()));
            }
        }
        (attach_id, rx)
    }

    /// Detaches an inbound. The last detach tears the upstream subscription
    /// down: the state flips to `Terminated(Unsubscribed)` right away and
    /// the connection task unsubscribes and exits.
    pub fn detach(&self, attach_id: u64) {
        let now_empty = {
            let mut inbounds = self.inbounds.lock();
            inbounds.remove(&attach_id);
            inbounds.is_empty()
        };
        if !now_empty {
            return;
        }

        {
            let mut state = self.state.lock();
            if matches!(*state, OutboundState::Terminated(_)) {
                return;
            }
            *state = OutboundState::Terminated(TerminationReason::Unsubscribed);
        }
        tracing::debug!(key = %self.key, "last inbound detached, unsubscribing upstream");
        let _ = self.cmd_tx.send(Command::Unsubscribe);
    }

    #[must_use]
    pub fn inbound_count(&self) -> usize {
        self.inbounds.lock().len()
    }

    fn broadcast(&self, event: &SubscriptionEvent) {
        for sender in self.inbounds.lock().values() {
            let _ = sender.send(event.clone());
        }
    }

    /// Marks the subscription terminated (if it is not already), notifying
    /// and dropping every attached inbound.
    fn terminate(&self, reason: TerminationReason) {
        {
            let mut state = self.state.lock();
            if matches!(*state, OutboundState::Terminated(_)) {
                return;
            }
            *state = OutboundState::Terminated(reason.clone());
        }
        tracing::debug!(key = %self.key, reason = reason.as_str(), "outbound subscription terminated");
        let inbounds: Vec<_> = self.inbounds.lock().drain().collect();
        for (_, sender) in inbounds {
            let _ = sender.send(SubscriptionEvent::Terminated(reason.clone()));
        }
    }

    fn activate(&self, upstream_id: String) {
        {
            let mut state = self.state.lock();
            if !matches!(*state, OutboundState::Activating) {
                return;
            }
            *state = OutboundState::Active { upstream_id: upstream_id.clone() };
        }
        tracing::debug!(key = %self.key, upstream_id = %upstream_id, "outbound subscription active");
        self.broadcast(&SubscriptionEvent::Activated);
    }

    async fn run(
        self: &Arc<Self>,
        ws_urls: Vec<String>,
        connect_timeout: Duration,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    ) {
        let mut stream = None;
        for url in &ws_urls {
            match tokio::time::timeout(connect_timeout, connect_async(url)).await {
                Ok(Ok((ws, _))) => {
                    stream = Some(ws);
                    break;
                }
                Ok(Err(e)) => {
                    tracing::warn!(key = %self.key, error = %e, "WebSocket connect failed");
                }
                Err(_) => {
                    tracing::warn!(key = %self.key, timeout_ms = connect_timeout.as_millis() as u64, "WebSocket connect timed out");
                }
            }
        }
        let Some(stream) = stream else {
            self.terminate(TerminationReason::Failed(format!(
                "no WebSocket endpoint reachable ({} tried)",
                ws_urls.len()
            )));
            return;
        };

        let (mut sink, mut read) = stream.split();

        let subscribe = serde_json::json!({
            "jsonrpc": "2.0",
            "id": SUBSCRIBE_ID,
            "method": "eth_subscribe",
            "params": [self.key.kind],
        });
        if let Err(e) = sink.send(Message::Text(subscribe.to_string())).await {
            self.terminate(TerminationReason::Failed(format!("subscribe send failed: {e}")));
            return;
        }

        // Activation phase: wait for the subscribe ack.
        let upstream_id = loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        // Every inbound left before activation; just close.
                        Some(Command::Unsubscribe) | None => return,
                    }
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            let value: serde_json::Value = match serde_json::from_str(&text) {
                                Ok(value) => value,
                                Err(e) => {
                                    self.terminate(TerminationReason::Failed(format!(
                                        "malformed subscribe ack: {e}"
                                    )));
                                    return;
                                }
                            };
                            if value.get("id").and_then(serde_json::Value::as_u64) != Some(SUBSCRIBE_ID) {
                                continue;
                            }
                            if let Some(id) = value.get("result").and_then(serde_json::Value::as_str) {
                                break id.to_string();
                            }
                            let detail = value
                                .get("error")
                                .map_or_else(|| text.clone(), ToString::to_string);
                            self.terminate(TerminationReason::Failed(format!(
                                "upstream rejected subscribe: {detail}"
                            )));
                            return;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            self.terminate(TerminationReason::Failed(
                                "connection closed before subscribe ack".to_string(),
                            ));
                            return;
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            self.terminate(TerminationReason::Failed(format!(
                                "connection error before subscribe ack: {e}"
                            )));
                            return;
                        }
                    }
                }
            }
        };

        self.activate(upstream_id.clone());

        // Active phase: fan out notifications until unsubscribe or failure.
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(Command::Unsubscribe) | None => {
                            let unsubscribe = serde_json::json!({
                                "jsonrpc": "2.0",
                                "id": UNSUBSCRIBE_ID,
                                "method": "eth_unsubscribe",
                                "params": [upstream_id],
                            });
                            // Best effort: the socket is closing either way.
                            let _ = sink.send(Message::Text(unsubscribe.to_string())).await;
                            let _ = sink.close().await;
                            return;
                        }
                    }
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            let value: serde_json::Value = match serde_json::from_str(&text) {
                                Ok(value) => value,
                                Err(e) => {
                                    self.terminate(TerminationReason::Aborted(format!(
                                        "malformed notification: {e}"
                                    )));
                                    return;
                                }
                            };
                            if value.get("method").and_then(serde_json::Value::as_str) !=
                                Some("eth_subscription")
                            {
                                continue;
                            }
                            let params = &value["params"];
                            if params.get("subscription").and_then(serde_json::Value::as_str) !=
                                Some(upstream_id.as_str())
                            {
                                continue;
                            }
                            let Some(payload) = params.get("result") else {
                                self.terminate(TerminationReason::Aborted(
                                    "notification without result".to_string(),
                                ));
                                return;
                            };
                            self.broadcast(&SubscriptionEvent::Data(payload.clone()));
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            self.terminate(TerminationReason::Aborted(
                                "upstream closed the connection".to_string(),
                            ));
                            return;
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            self.terminate(TerminationReason::Aborted(format!(
                                "connection error: {e}"
                            )));
                            return;
                        }
                    }
                }
            }
        }
    }
}
