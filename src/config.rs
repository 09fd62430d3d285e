use crate::cli::Cli;
use crate::error::FeedError;
use crate::model::SessionId;
use std::time::Duration;
use url::Url;

/// Resolved process-wide configuration. Built once at startup and injected
/// into the components that need it; there is no implicit global client.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend_url: Url,
    pub realtime: RealtimeConfig,
    pub resubscribe_delay: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
}

/// Connection settings for the realtime messaging service.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    pub url: Url,
    pub api_key: Option<String>,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and environment. A missing
    /// realtime endpoint is an explicit initialization failure, not a silent
    /// no-op: the feed cannot work without it.
    pub fn from_cli(args: &Cli) -> Result<Self, FeedError> {
        let backend_url = Url::parse(&args.backend_url)
            .map_err(|e| FeedError::Initialization(format!("invalid backend URL: {e}")))?;

        let raw = args.realtime_url.as_deref().ok_or_else(|| {
            FeedError::Initialization(
                "realtime endpoint not configured (set --realtime-url or YTPROC_REALTIME_URL)"
                    .into(),
            )
        })?;
        let realtime_url = Url::parse(raw)
            .map_err(|e| FeedError::Initialization(format!("invalid realtime URL: {e}")))?;
        match realtime_url.scheme() {
            "ws" | "wss" | "http" | "https" => {}
            other => {
                return Err(FeedError::Initialization(format!(
                    "unsupported realtime URL scheme '{other}'"
                )))
            }
        }

        Ok(Self {
            backend_url,
            realtime: RealtimeConfig {
                url: realtime_url,
                api_key: args.realtime_key.clone(),
            },
            resubscribe_delay: Duration::from(args.resubscribe_delay),
            request_timeout: Duration::from(args.request_timeout),
            user_agent: format!("ytproc-cli/{}", env!("CARGO_PKG_VERSION")),
        })
    }
}

impl RealtimeConfig {
    /// Build the channel URL for one session: `ws(s)://host/ws/{session_id}`,
    /// with the API key appended as a query parameter when configured.
    pub fn channel_url(&self, session_id: &SessionId) -> Result<Url, FeedError> {
        let mut url = self.url.clone();
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(FeedError::Channel(format!(
                    "unsupported realtime URL scheme '{other}'"
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| FeedError::Channel("could not set websocket scheme".into()))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| FeedError::Channel("realtime URL cannot be a base".into()))?;
            segments.pop_if_empty().push("ws").push(session_id.as_str());
        }
        if let Some(key) = &self.api_key {
            url.query_pairs_mut().append_pair("apikey", key);
        }
        Ok(url)
    }
}
