//! Capability-typed transport seam for the realtime feed.
//!
//! The channel manager's state machine is written against this interface so
//! it never sees transport-specific event names; the WebSocket backing lives
//! in `websocket.rs` and tests drive the manager with an in-memory transport.

use crate::error::FeedError;
use crate::model::SessionId;
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

/// Events a live subscription delivers to its owner. `Error` and `Closed`
/// are terminal for the physical subscription that produced them.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Raw text payload of one inbound channel event.
    Message(String),
    /// Channel-level failure reported by the transport.
    Error(String),
    /// The remote end closed the channel.
    Closed,
}

/// One live subscription: the exclusive release handle plus the inbound
/// event stream.
pub struct Subscription {
    pub handle: SubscriptionHandle,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Exclusive owner-side handle for one subscription. Releasing is
/// idempotent; dropping the handle releases it.
pub struct SubscriptionHandle {
    close_tx: Option<oneshot::Sender<()>>,
}

impl SubscriptionHandle {
    pub fn new(close_tx: oneshot::Sender<()>) -> Self {
        Self {
            close_tx: Some(close_tx),
        }
    }

    /// Signal the transport to tear the subscription down. Safe to call
    /// more than once; only the first call has any effect.
    pub fn release(&mut self) {
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(());
        }
    }

    pub fn is_released(&self) -> bool {
        self.close_tx.is_none()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Publish/subscribe client interface: subscribe to the topic for one
/// session and receive its events until released.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Open a subscription scoped to `session_id`. Returning `Ok` is the
    /// acknowledgment that the channel is live.
    async fn subscribe(&self, session_id: &SessionId) -> Result<Subscription, FeedError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_is_idempotent_and_observable() {
        let (tx, mut rx) = oneshot::channel();
        let mut handle = SubscriptionHandle::new(tx);
        assert!(!handle.is_released());
        handle.release();
        assert!(handle.is_released());
        handle.release();
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn dropping_the_handle_releases_it() {
        let (tx, mut rx) = oneshot::channel();
        drop(SubscriptionHandle::new(tx));
        assert!(rx.try_recv().is_ok());
    }
}
