//! Session initiation against the external processing backend.

use crate::config::AppConfig;
use crate::error::FeedError;
use crate::model::{ProcessRequest, ProcessResponse, SessionId};
use tracing::{debug, info};
use url::Url;

/// Thin HTTP client around the backend's `POST /process` endpoint. Issues
/// exactly one outbound call per submission and returns the server-issued
/// session identifier.
pub struct BackendClient {
    http: reqwest::Client,
    base_url: Url,
}

impl BackendClient {
    pub fn new(cfg: &AppConfig) -> Result<Self, FeedError> {
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(cfg.request_timeout)
            .build()
            .map_err(|e| FeedError::Initialization(format!("http client: {e}")))?;
        Ok(Self {
            http,
            base_url: cfg.backend_url.clone(),
        })
    }

    /// Start one processing run. On success the returned session id scopes
    /// the realtime subscription that follows; on failure no session id
    /// exists and no subscription may be opened.
    pub async fn start_processing(&self, req: &ProcessRequest) -> Result<SessionId, FeedError> {
        let url = self
            .base_url
            .join("process")
            .map_err(|e| FeedError::Submission(format!("invalid endpoint: {e}")))?;
        debug!(%url, videos = req.video_ids.len(), "submitting processing request");

        let resp = self
            .http
            .post(url)
            .json(req)
            .send()
            .await
            .map_err(|e| FeedError::Submission(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FeedError::Submission(format!(
                "backend returned {status}"
            )));
        }

        let body: ProcessResponse = resp
            .json()
            .await
            .map_err(|e| FeedError::Submission(format!("malformed response body: {e}")))?;
        info!(session_id = %body.session_id, "processing session started");
        Ok(body.session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(backend_url: &str) -> AppConfig {
        let args = Cli::parse_from([
            "ytproc-cli",
            "--backend-url",
            backend_url,
            "--realtime-url",
            "ws://localhost:9999",
        ]);
        AppConfig::from_cli(&args).unwrap()
    }

    fn request() -> ProcessRequest {
        ProcessRequest {
            video_ids: vec!["abc123".into()],
            num_videos: 5,
            num_comments: 10,
            num_tags: 3,
            clustering_strength: 0.5,
        }
    }

    #[tokio::test]
    async fn start_processing_returns_session_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/process"))
            .and(body_json(serde_json::json!({
                "video_ids": ["abc123"],
                "num_videos": 5,
                "num_comments": 10,
                "num_tags": 3,
                "clustering_strength": 0.5,
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "session_id": "sess-42"
                })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = BackendClient::new(&config(&server.uri())).unwrap();
        let sid = client.start_processing(&request()).await.unwrap();
        assert_eq!(sid, SessionId::new("sess-42"));
    }

    #[tokio::test]
    async fn non_success_status_is_a_submission_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/process"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = BackendClient::new(&config(&server.uri())).unwrap();
        let err = client.start_processing(&request()).await.unwrap_err();
        assert!(matches!(err, FeedError::Submission(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn malformed_body_is_a_submission_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/process"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = BackendClient::new(&config(&server.uri())).unwrap();
        let err = client.start_processing(&request()).await.unwrap_err();
        assert!(matches!(err, FeedError::Submission(_)), "got {err:?}");
    }
}
