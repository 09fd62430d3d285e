use thiserror::Error;

/// Classified failures of the update-feed subsystem.
///
/// Initialization and submission errors are recovered at the view layer and
/// shown to the user; channel errors are recovered locally by the channel
/// manager's single scheduled resubscription.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Realtime endpoint or its configuration is missing/invalid. Raised
    /// before any submission is possible.
    #[error("initialization failed: {0}")]
    Initialization(String),

    /// The start-processing call failed (network error, non-success status,
    /// or malformed response body).
    #[error("submission failed: {0}")]
    Submission(String),

    /// The realtime transport reported a failure.
    #[error("channel failure: {0}")]
    Channel(String),
}

impl FeedError {
    pub fn is_initialization(&self) -> bool {
        matches!(self, FeedError::Initialization(_))
    }
}
