//! WebSocket subscription sharing.
//!
//! Many clients subscribing to the same feed (`newHeads` on mainnet, say)
//! share a single upstream subscription. The pieces:
//!
//! - [`SubscriptionKey`]: identity of a shareable feed (chain + kind)
//! - [`OutboundSubscription`](outbound::OutboundSubscription): the one
//!   upstream WebSocket subscription per key, with its lifecycle state
//! - [`InboundSubscription`](inbound::InboundSubscription): a client-side
//!   handle receiving events fanned out from the outbound
//! - [`SubscriptionHub`](hub::SubscriptionHub): the registry guaranteeing at
//!   most one live outbound per key

pub mod hub;
pub mod inbound;
pub mod outbound;

pub use hub::SubscriptionHub;
pub use inbound::InboundSubscription;
pub use outbound::{OutboundState, OutboundSubscription};

/// Identity of a shareable subscription: one upstream feed per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub chain_id: u64,
    /// Subscription kind, e.g. `"newHeads"`.
    pub kind: String,
}

impl SubscriptionKey {
    /// Builds a key from `eth_subscribe` params.
    ///
    /// Only parameterless kinds (a single string element) are shareable;
    /// filtered subscriptions like `logs` with a filter object are rejected.
    pub fn from_params(
        chain_id: u64,
        params: Option<&serde_json::Value>,
    ) -> Result<Self, SubscribeError> {
        let array = params
            .and_then(|p| p.as_array())
            .ok_or_else(|| SubscribeError::UnsupportedParams(render_params(params)))?;
        match array.as_slice() {
            [serde_json::Value::String(kind)] => {
                Ok(Self { chain_id, kind: kind.clone() })
            }
            _ => Err(SubscribeError::UnsupportedParams(render_params(params))),
        }
    }
}

impl std::fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.chain_id, self.kind)
    }
}

fn render_params(params: Option<&serde_json::Value>) -> String {
    params.map_or_else(|| "null".to_string(), ToString::to_string)
}

/// Why an outbound subscription ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// Never became active: connect or subscribe handshake failed.
    Failed(String),
    /// Was active, then the upstream connection broke or misbehaved.
    Aborted(String),
    /// The last inbound detached and the gateway unsubscribed upstream.
    Unsubscribed,
}

impl TerminationReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::Failed(_) => "failed",
            TerminationReason::Aborted(_) => "aborted",
            TerminationReason::Unsubscribed => "unsubscribed",
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationReason::Failed(detail) => write!(f, "failed: {detail}"),
            TerminationReason::Aborted(detail) => write!(f, "aborted: {detail}"),
            TerminationReason::Unsubscribed => write!(f, "unsubscribed"),
        }
    }
}

/// Events fanned out to inbound subscriptions.
#[derive(Debug, Clone)]
pub enum SubscriptionEvent {
    /// The upstream subscription is live.
    Activated,
    /// One notification payload from the upstream feed.
    Data(serde_json::Value),
    /// The outbound subscription is gone; no further events will arrive.
    Terminated(TerminationReason),
}

/// Failures establishing an inbound subscription.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SubscribeError {
    #[error("unsupported subscription params: {0}")]
    UnsupportedParams(String),
    #[error("no provider offers a WebSocket endpoint for chain {0}")]
    NoWsEndpoint(u64),
}
