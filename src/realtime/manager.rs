//! Subscription lifecycle for the session-scoped update feed.
//!
//! At most one subscription is active at any time and it is always bound to
//! the most recently issued session id. Each physical subscription gets a
//! generation number; notices from an older generation (late events, stale
//! resubscription timers) are ignored, which is what stops a delayed
//! resubscription from resurrecting and appending to a newer session's feed.

use crate::model::{ChannelStatus, FeedEvent, SessionId, UpdateMessage};
use crate::realtime::transport::{RealtimeTransport, TransportEvent};
use crate::realtime::SubscriptionHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Out-of-band notices delivered to the owner's select loop. Carrying the
/// generation lets the manager discard anything from a replaced subscription.
#[derive(Debug)]
pub enum ManagerNotice {
    Transport {
        generation: u64,
        event: TransportEvent,
    },
    /// The fixed post-error delay elapsed; attempt the single resubscription.
    ResubscribeDue { generation: u64 },
}

struct Active {
    session_id: SessionId,
    generation: u64,
    handle: SubscriptionHandle,
    reader: tokio::task::JoinHandle<()>,
    /// True once a resubscription timer exists for this subscription; a
    /// second consecutive error must not stack another one.
    resubscribe_pending: bool,
}

pub struct ChannelManager {
    transport: Arc<dyn RealtimeTransport>,
    feed_tx: mpsc::UnboundedSender<FeedEvent>,
    notice_tx: mpsc::UnboundedSender<ManagerNotice>,
    resubscribe_delay: Duration,
    state: ChannelStatus,
    active: Option<Active>,
    generation: u64,
}

impl ChannelManager {
    pub fn new(
        transport: Arc<dyn RealtimeTransport>,
        feed_tx: mpsc::UnboundedSender<FeedEvent>,
        notice_tx: mpsc::UnboundedSender<ManagerNotice>,
        resubscribe_delay: Duration,
    ) -> Self {
        Self {
            transport,
            feed_tx,
            notice_tx,
            resubscribe_delay,
            state: ChannelStatus::Idle,
            active: None,
            generation: 0,
        }
    }

    pub fn status(&self) -> ChannelStatus {
        self.state
    }

    /// Open a subscription for a new session. The previous handle (if any)
    /// is always released first, even mid-resubscription.
    pub async fn subscribe(&mut self, session_id: SessionId) -> Result<(), crate::error::FeedError> {
        self.release();
        self.set_state(ChannelStatus::Subscribing);
        self.open(session_id).await
    }

    /// Release the active subscription. Idempotent; safe on teardown and
    /// before every new submission.
    pub fn release(&mut self) {
        if let Some(mut active) = self.active.take() {
            debug!(session_id = %active.session_id, "releasing subscription");
            active.handle.release();
            active.reader.abort();
            self.set_state(ChannelStatus::Closed);
        }
    }

    pub async fn handle_notice(&mut self, notice: ManagerNotice) {
        match notice {
            ManagerNotice::Transport { generation, event } => {
                self.handle_transport_event(generation, event).await
            }
            ManagerNotice::ResubscribeDue { generation } => {
                self.handle_resubscribe_due(generation).await
            }
        }
    }

    async fn open(&mut self, session_id: SessionId) -> Result<(), crate::error::FeedError> {
        self.generation += 1;
        let generation = self.generation;
        match self.transport.subscribe(&session_id).await {
            Ok(sub) => {
                let reader = tokio::spawn(forward_events(
                    generation,
                    sub.events,
                    self.notice_tx.clone(),
                ));
                self.active = Some(Active {
                    session_id,
                    generation,
                    handle: sub.handle,
                    reader,
                    resubscribe_pending: false,
                });
                self.set_state(ChannelStatus::Subscribed);
                Ok(())
            }
            Err(e) => {
                self.set_state(ChannelStatus::Closed);
                Err(e)
            }
        }
    }

    async fn handle_transport_event(&mut self, generation: u64, event: TransportEvent) {
        let (current_generation, session_id) = match &self.active {
            Some(a) => (a.generation, a.session_id.clone()),
            None => return,
        };
        if generation != current_generation {
            debug!(generation, current_generation, "dropping stale transport event");
            return;
        }

        match event {
            TransportEvent::Message(raw) => {
                let Some(frame) = parse_update_frame(&raw) else {
                    debug!("ignoring event with unexpected shape");
                    return;
                };
                if let Some(sid) = &frame.session_id {
                    if sid != session_id.as_str() {
                        debug!(event_session = %sid, "dropping event for different session");
                        return;
                    }
                }
                let _ = self
                    .feed_tx
                    .send(FeedEvent::Update(UpdateMessage::received_now(frame.message)));
            }
            TransportEvent::Error(reason) => {
                let pending = self
                    .active
                    .as_ref()
                    .map(|a| a.resubscribe_pending)
                    .unwrap_or(true);
                if pending {
                    debug!("resubscription already pending, not stacking another");
                    return;
                }
                warn!(%reason, "channel error, scheduling one resubscription");
                if let Some(a) = self.active.as_mut() {
                    a.resubscribe_pending = true;
                }
                self.set_state(ChannelStatus::Error);
                let notice_tx = self.notice_tx.clone();
                let delay = self.resubscribe_delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = notice_tx.send(ManagerNotice::ResubscribeDue { generation });
                });
            }
            TransportEvent::Closed => {
                debug!(%session_id, "channel closed by remote");
                self.release();
            }
        }
    }

    async fn handle_resubscribe_due(&mut self, generation: u64) {
        let session_id = match &self.active {
            Some(a) if a.generation == generation && a.resubscribe_pending => a.session_id.clone(),
            _ => {
                debug!(generation, "ignoring stale resubscription timer");
                return;
            }
        };
        self.set_state(ChannelStatus::Resubscribing);
        if let Some(mut failed) = self.active.take() {
            failed.handle.release();
            failed.reader.abort();
        }
        if let Err(e) = self.open(session_id).await {
            // Degraded endpoint for this session: the feed stalls with no
            // further messages and no additional attempts.
            warn!(error = %e, "resubscription failed, feed stalled for this session");
        }
    }

    fn set_state(&mut self, state: ChannelStatus) {
        if self.state != state {
            self.state = state;
            let _ = self.feed_tx.send(FeedEvent::Channel(state));
        }
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.handle.release();
            active.reader.abort();
        }
    }
}

async fn forward_events(
    generation: u64,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    notice_tx: mpsc::UnboundedSender<ManagerNotice>,
) {
    while let Some(event) = events.recv().await {
        let terminal = matches!(event, TransportEvent::Error(_) | TransportEvent::Closed);
        if notice_tx
            .send(ManagerNotice::Transport { generation, event })
            .is_err()
        {
            return;
        }
        if terminal {
            return;
        }
    }
}

struct UpdateFrame {
    message: String,
    session_id: Option<String>,
}

/// Interpret one inbound event payload. Two shapes are accepted: the generic
/// broadcast `{"message": ..., "session_id"?: ...}` and the database-change
/// relay `{"new": {"message": ..., "session_id": ...}}`. Anything else is
/// not an update and yields `None`.
fn parse_update_frame(raw: &str) -> Option<UpdateFrame> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    let body = value.get("new").unwrap_or(&value);
    let message = body.get("message")?.as_str()?.to_string();
    let session_id = body
        .get("session_id")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    Some(UpdateFrame {
        message,
        session_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Severity;
    use crate::realtime::testing::MockTransport;

    fn new_manager(
        transport: &MockTransport,
        delay: Duration,
    ) -> (
        ChannelManager,
        mpsc::UnboundedReceiver<FeedEvent>,
        mpsc::UnboundedReceiver<ManagerNotice>,
        mpsc::UnboundedSender<ManagerNotice>,
    ) {
        let (feed_tx, feed_rx) = mpsc::unbounded_channel();
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let manager = ChannelManager::new(
            Arc::new(transport.clone()),
            feed_tx,
            notice_tx.clone(),
            delay,
        );
        (manager, feed_rx, notice_rx, notice_tx)
    }

    /// Apply every notice that is already queued or becomes available within
    /// a short window. Keeps the tests single-threaded and deterministic.
    async fn pump(manager: &mut ChannelManager, notice_rx: &mut mpsc::UnboundedReceiver<ManagerNotice>) {
        loop {
            tokio::task::yield_now().await;
            match notice_rx.try_recv() {
                Ok(notice) => manager.handle_notice(notice).await,
                Err(_) => {
                    tokio::task::yield_now().await;
                    match notice_rx.try_recv() {
                        Ok(notice) => manager.handle_notice(notice).await,
                        Err(_) => break,
                    }
                }
            }
        }
    }

    fn drain_updates(feed_rx: &mut mpsc::UnboundedReceiver<FeedEvent>) -> Vec<UpdateMessage> {
        let mut out = Vec::new();
        while let Ok(ev) = feed_rx.try_recv() {
            if let FeedEvent::Update(m) = ev {
                out.push(m);
            }
        }
        out
    }

    #[test]
    fn parses_broadcast_and_database_change_variants() {
        let f = parse_update_frame(r#"{"message":"Processing started"}"#).unwrap();
        assert_eq!(f.message, "Processing started");
        assert_eq!(f.session_id, None);

        let f =
            parse_update_frame(r#"{"message":"hello","session_id":"sess-1"}"#).unwrap();
        assert_eq!(f.session_id.as_deref(), Some("sess-1"));

        let f = parse_update_frame(
            r#"{"new":{"message":"row inserted","session_id":"sess-2"},"old":null}"#,
        )
        .unwrap();
        assert_eq!(f.message, "row inserted");
        assert_eq!(f.session_id.as_deref(), Some("sess-2"));

        assert!(parse_update_frame("not json").is_none());
        assert!(parse_update_frame(r#"{"status":"ok"}"#).is_none());
        assert!(parse_update_frame(r#"{"message":42}"#).is_none());
    }

    #[tokio::test]
    async fn appends_own_session_events_and_drops_foreign_ones() {
        let transport = MockTransport::default();
        let (mut manager, mut feed_rx, mut notice_rx, _tx) =
            new_manager(&transport, Duration::from_secs(5));

        manager.subscribe(SessionId::new("sess-42")).await.unwrap();
        let sub = transport.subscription(0);
        sub.emit(TransportEvent::Message(
            r#"{"message":"Processing started","session_id":"sess-42"}"#.into(),
        ));
        sub.emit(TransportEvent::Message(
            r#"{"message":"someone else","session_id":"sess-99"}"#.into(),
        ));
        sub.emit(TransportEvent::Message(r#"{"message":"untagged"}"#.into()));
        sub.emit(TransportEvent::Message(
            r#"{"message":"Error: rate limited","session_id":"sess-42"}"#.into(),
        ));
        pump(&mut manager, &mut notice_rx).await;

        let updates = drain_updates(&mut feed_rx);
        let texts: Vec<&str> = updates.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["Processing started", "untagged", "Error: rate limited"]);
        assert_eq!(updates[0].severity, Severity::Info);
        assert_eq!(updates[2].severity, Severity::Error);
    }

    #[tokio::test]
    async fn new_session_releases_previous_handle_first() {
        let transport = MockTransport::default();
        let (mut manager, _feed_rx, mut notice_rx, _tx) =
            new_manager(&transport, Duration::from_secs(5));

        manager.subscribe(SessionId::new("sess-1")).await.unwrap();
        manager.subscribe(SessionId::new("sess-2")).await.unwrap();
        pump(&mut manager, &mut notice_rx).await;

        assert_eq!(transport.subscription_count(), 2);
        assert!(transport.subscription(0).released());
        assert!(!transport.subscription(1).released());
        assert_eq!(manager.status(), ChannelStatus::Subscribed);
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let transport = MockTransport::default();
        let (mut manager, _feed_rx, _notice_rx, _tx) =
            new_manager(&transport, Duration::from_secs(5));

        manager.subscribe(SessionId::new("sess-1")).await.unwrap();
        manager.release();
        manager.release();
        assert!(transport.subscription(0).released());
        assert_eq!(manager.status(), ChannelStatus::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn channel_error_triggers_one_resubscription_after_the_delay() {
        let transport = MockTransport::default();
        let (mut manager, _feed_rx, mut notice_rx, _tx) =
            new_manager(&transport, Duration::from_secs(5));

        manager.subscribe(SessionId::new("sess-1")).await.unwrap();
        transport
            .subscription(0)
            .emit(TransportEvent::Error("broken pipe".into()));
        pump(&mut manager, &mut notice_rx).await;
        assert_eq!(manager.status(), ChannelStatus::Error);

        // Not yet: the fixed delay has not elapsed.
        tokio::time::advance(Duration::from_secs(4)).await;
        pump(&mut manager, &mut notice_rx).await;
        assert_eq!(transport.subscription_count(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        pump(&mut manager, &mut notice_rx).await;
        assert_eq!(transport.subscription_count(), 2);
        assert_eq!(transport.subscription(1).session_id().as_str(), "sess-1");
        assert_eq!(manager.status(), ChannelStatus::Subscribed);
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_errors_do_not_stack_resubscriptions() {
        let transport = MockTransport::default();
        let (mut manager, _feed_rx, mut notice_rx, tx) =
            new_manager(&transport, Duration::from_secs(5));

        manager.subscribe(SessionId::new("sess-1")).await.unwrap();
        let sub = transport.subscription(0);
        sub.emit(TransportEvent::Error("first".into()));
        pump(&mut manager, &mut notice_rx).await;
        // A second error from the same subscription while one timer is
        // pending must not schedule another attempt.
        tx.send(ManagerNotice::Transport {
            generation: 1,
            event: TransportEvent::Error("second".into()),
        })
        .unwrap();
        pump(&mut manager, &mut notice_rx).await;

        tokio::time::advance(Duration::from_secs(6)).await;
        pump(&mut manager, &mut notice_rx).await;
        assert_eq!(transport.subscription_count(), 2);

        tokio::time::advance(Duration::from_secs(6)).await;
        pump(&mut manager, &mut notice_rx).await;
        assert_eq!(transport.subscription_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_resubscription_never_resurrects_into_a_new_session() {
        let transport = MockTransport::default();
        let (mut manager, mut feed_rx, mut notice_rx, _tx) =
            new_manager(&transport, Duration::from_secs(5));

        manager.subscribe(SessionId::new("sess-old")).await.unwrap();
        transport
            .subscription(0)
            .emit(TransportEvent::Error("flaky".into()));
        pump(&mut manager, &mut notice_rx).await;

        // A new submission replaces the session while the timer is pending.
        manager.subscribe(SessionId::new("sess-new")).await.unwrap();
        let _ = drain_updates(&mut feed_rx);

        tokio::time::advance(Duration::from_secs(6)).await;
        pump(&mut manager, &mut notice_rx).await;

        // No third subscription: the stale timer was ignored.
        assert_eq!(transport.subscription_count(), 2);
        assert_eq!(transport.subscription(1).session_id().as_str(), "sess-new");
        assert_eq!(manager.status(), ChannelStatus::Subscribed);

        // Late events from the replaced subscription are dropped.
        transport.subscription(0).emit(TransportEvent::Message(
            r#"{"message":"ghost","session_id":"sess-old"}"#.into(),
        ));
        pump(&mut manager, &mut notice_rx).await;
        assert!(drain_updates(&mut feed_rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_resubscription_stalls_without_further_attempts() {
        let transport = MockTransport::default();
        let (mut manager, _feed_rx, mut notice_rx, _tx) =
            new_manager(&transport, Duration::from_secs(5));

        manager.subscribe(SessionId::new("sess-1")).await.unwrap();
        transport
            .subscription(0)
            .emit(TransportEvent::Error("flaky".into()));
        pump(&mut manager, &mut notice_rx).await;

        transport.fail_next_subscribe();
        tokio::time::advance(Duration::from_secs(6)).await;
        pump(&mut manager, &mut notice_rx).await;
        assert_eq!(manager.status(), ChannelStatus::Closed);

        tokio::time::advance(Duration::from_secs(30)).await;
        pump(&mut manager, &mut notice_rx).await;
        // Still only the original attempt plus the one failed retry.
        assert_eq!(transport.subscription_count(), 1);
    }
}
