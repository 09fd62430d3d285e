use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Job submission payload for `POST /process`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub video_ids: Vec<String>,
    pub num_videos: u32,
    pub num_comments: u32,
    pub num_tags: u32,
    pub clustering_strength: f64,
}

/// Success body of `POST /process`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub session_id: SessionId,
}

/// Server-issued opaque identifier for one processing run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Display classification for a feed line.
///
/// Derived from the message text, not from a structured field, so it is a
/// presentation heuristic only (benign messages containing "error" are
/// flagged too). It carries no behavioral weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Error,
}

impl Severity {
    /// Case-insensitive substring check for the word "error".
    pub fn classify(text: &str) -> Self {
        if text.to_lowercase().contains("error") {
            Severity::Error
        } else {
            Severity::Info
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Error => "ERROR",
        }
    }
}

/// One user-visible line of progress text, timestamped at local receipt.
#[derive(Debug, Clone)]
pub struct UpdateMessage {
    pub text: String,
    pub received_at: OffsetDateTime,
    pub severity: Severity,
}

impl UpdateMessage {
    /// Build a message stamped with the local receipt time (UTC fallback
    /// when the local offset cannot be determined).
    pub fn received_now(text: impl Into<String>) -> Self {
        let text = text.into();
        let severity = Severity::classify(&text);
        Self {
            text,
            received_at: OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc()),
            severity,
        }
    }
}

/// Channel lifecycle as reported to presentation layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Idle,
    Subscribing,
    Subscribed,
    /// Transport reported a failure; one resubscription is pending.
    Error,
    Resubscribing,
    Closed,
}

impl ChannelStatus {
    pub fn label(self) -> &'static str {
        match self {
            ChannelStatus::Idle => "idle",
            ChannelStatus::Subscribing => "subscribing",
            ChannelStatus::Subscribed => "subscribed",
            ChannelStatus::Error => "channel error",
            ChannelStatus::Resubscribing => "resubscribing",
            ChannelStatus::Closed => "closed",
        }
    }
}

/// Events emitted by the controller and channel manager, consumed by the
/// TUI and text presentation layers.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// The message list must be reset. Sent at the start of every
    /// submission, before the request is dispatched.
    FeedCleared,
    SessionStarted { session_id: SessionId },
    Update(UpdateMessage),
    Channel(ChannelStatus),
    /// The start-processing call failed; shown as a transient notice.
    SubmissionFailed { reason: String },
}
