//! Session-scoped realtime update feed: transport seam, WebSocket backing,
//! and the subscription lifecycle manager.

mod manager;
mod transport;
mod websocket;

pub use manager::{ChannelManager, ManagerNotice};
pub use transport::{RealtimeTransport, Subscription, SubscriptionHandle, TransportEvent};
pub use websocket::WebSocketTransport;
