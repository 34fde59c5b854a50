//! Client-side subscription handle.
//!
//! One [`InboundSubscription`] per client `eth_subscribe`. It owns nothing
//! upstream: events arrive over a channel fed by the shared outbound, and
//! dropping the handle detaches it (the last detach tears the upstream
//! subscription down).

use crate::subs::{outbound::OutboundSubscription, SubscriptionEvent, SubscriptionKey};
use std::sync::Arc;
use tokio::sync::mpsc;

/// A client's attachment to a shared outbound subscription.
#[derive(Debug)]
pub struct InboundSubscription {
    attach_id: u64,
    outbound: Arc<OutboundSubscription>,
    events: mpsc::UnboundedReceiver<SubscriptionEvent>,
    detached: bool,
}

impl InboundSubscription {
    pub(crate) fn attach(outbound: Arc<OutboundSubscription>) -> Self {
        let (attach_id, events) = outbound.attach();
        Self { attach_id, outbound, events, detached: false }
    }

    #[must_use]
    pub fn key(&self) -> &SubscriptionKey {
        self.outbound.key()
    }

    /// Next event from the shared feed.
    ///
    /// `None` after a `Terminated` event has been consumed and the channel
    /// drained, or after detaching.
    pub async fn next_event(&mut self) -> Option<SubscriptionEvent> {
        self.events.recv().await
    }

    /// Detaches from the outbound. Idempotent.
    pub fn detach(&mut self) {
        if !self.detached {
            self.detached = true;
            self.outbound.detach(self.attach_id);
            self.events.close();
        }
    }

    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.detached
    }
}

impl Drop for InboundSubscription {
    fn drop(&mut self) {
        self.detach();
    }
}
