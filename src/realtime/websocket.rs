//! WebSocket implementation of the realtime transport.

use crate::config::RealtimeConfig;
use crate::error::FeedError;
use crate::model::SessionId;
use crate::realtime::transport::{RealtimeTransport, Subscription, SubscriptionHandle, TransportEvent};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

pub struct WebSocketTransport {
    cfg: RealtimeConfig,
}

impl WebSocketTransport {
    pub fn new(cfg: RealtimeConfig) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl RealtimeTransport for WebSocketTransport {
    async fn subscribe(&self, session_id: &SessionId) -> Result<Subscription, FeedError> {
        let url = self.cfg.channel_url(session_id)?;
        debug!(%url, "opening websocket subscription");
        let (socket, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| FeedError::Channel(format!("connect failed: {e}")))?;
        info!(%session_id, "websocket subscription established");

        let (event_tx, events) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = oneshot::channel();
        tokio::spawn(drive_socket(socket, event_tx, close_rx));

        Ok(Subscription {
            handle: SubscriptionHandle::new(close_tx),
            events,
        })
    }
}

/// Pump the socket until the owner releases the handle or the connection
/// ends. Every text frame is forwarded verbatim; interpretation belongs to
/// the channel manager.
async fn drive_socket(
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    mut close_rx: oneshot::Receiver<()>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            _ = &mut close_rx => {
                let _ = ws_tx.send(Message::Close(None)).await;
                debug!("subscription released, websocket closed");
                return;
            }
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if event_tx.send(TransportEvent::Message(text)).is_err() {
                        return;
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = ws_tx.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) => {
                    let _ = event_tx.send(TransportEvent::Closed);
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "websocket error");
                    let _ = event_tx.send(TransportEvent::Error(e.to_string()));
                    return;
                }
                None => {
                    let _ = event_tx.send(TransportEvent::Closed);
                    return;
                }
            }
        }
    }
}
