//! Submission lifecycle controller.
//!
//! Owns the session lifecycle and emits feed events for presentation layers:
//! release the previous subscription, clear the feed, start the run, then
//! subscribe to the new session's channel.

use crate::backend::BackendClient;
use crate::model::{FeedEvent, ProcessRequest, UpdateMessage};
use crate::realtime::{ChannelManager, RealtimeTransport};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::warn;

/// Commands emitted by UI layers to control the feed lifecycle.
#[derive(Debug, Clone)]
pub enum UiCommand {
    Submit(ProcessRequest),
    Quit,
}

pub async fn run_controller(
    backend: BackendClient,
    transport: Arc<dyn RealtimeTransport>,
    resubscribe_delay: Duration,
    feed_tx: UnboundedSender<FeedEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();
    let mut manager = ChannelManager::new(transport, feed_tx.clone(), notice_tx, resubscribe_delay);

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(UiCommand::Submit(request)) => {
                    // Interest in the previous session is dropped before
                    // anything else happens, even mid-resubscription, and the
                    // feed is cleared before the request is dispatched so a
                    // prior run's messages never bleed into the new one.
                    manager.release();
                    let _ = feed_tx.send(FeedEvent::FeedCleared);
                    match backend.start_processing(&request).await {
                        Ok(session_id) => {
                            let _ = feed_tx.send(FeedEvent::SessionStarted {
                                session_id: session_id.clone(),
                            });
                            if let Err(e) = manager.subscribe(session_id).await {
                                let _ = feed_tx.send(FeedEvent::Update(UpdateMessage::received_now(
                                    format!("Error subscribing to updates: {e}"),
                                )));
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "submission failed");
                            let _ = feed_tx.send(FeedEvent::SubmissionFailed {
                                reason: e.to_string(),
                            });
                            let _ = feed_tx.send(FeedEvent::Update(UpdateMessage::received_now(
                                "Error initiating processing. Please check your inputs and try again.",
                            )));
                        }
                    }
                }
                Some(UiCommand::Quit) | None => {
                    manager.release();
                    break;
                }
            },
            Some(notice) = notice_rx.recv() => {
                manager.handle_notice(notice).await;
            }
        }
    }

    Ok(())
}
