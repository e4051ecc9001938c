//! REST commands consumed alongside the event channel.
//!
//! Commands are fire-and-forget: their effect arrives later as channel
//! events, so only success or failure is reported here.

use std::time::Duration;

use reqwest::{Client as HttpClient, Response};
use serde::Deserialize;
use url::Url;

use pickr_core::config::ServerConfig;
use pickr_core::error::{AppError, ErrorKind};
use pickr_core::result::AppResult;
use pickr_core::types::QueueId;

/// Error body returned by the backend.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the crawler REST endpoints.
#[derive(Debug, Clone)]
pub struct CrawlerApi {
    http_client: HttpClient,
    base_url: Url,
}

impl CrawlerApi {
    /// Create a new client.
    pub fn new(base_url: Url, timeout: Duration) -> AppResult<Self> {
        let http_client = HttpClient::builder()
            .user_agent(concat!("pickr/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AppError::with_source(ErrorKind::Internal, "Failed to create HTTP client", e)
            })?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    /// Create a client from the server section of the configuration.
    pub fn from_config(server: &ServerConfig) -> AppResult<Self> {
        let base_url = Url::parse(&server.base_url)?;
        Self::new(
            base_url,
            Duration::from_secs(server.request_timeout_seconds),
        )
    }

    /// Get the base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// URL of the cancel endpoint for one queue entry.
    pub fn cancel_url(&self, queue_id: &QueueId) -> AppResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::configuration("server.base_url cannot carry a path"))?
            .pop_if_empty()
            .extend(["api", "crawler", "queue", queue_id.as_str(), "cancel"]);
        Ok(url)
    }

    /// Ask the backend to cancel a queue entry.
    ///
    /// The resulting state change arrives as `queue:job_cancelled`.
    pub async fn cancel_queue_item(&self, queue_id: &QueueId) -> AppResult<()> {
        let url = self.cancel_url(queue_id)?;
        let response = self
            .http_client
            .post(url.clone())
            .send()
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Command,
                    format!("Cancel request for queue item {queue_id} failed: {e}"),
                    e,
                )
            })?;
        self.handle_response(queue_id, response).await
    }

    async fn handle_response(&self, queue_id: &QueueId, response: Response) -> AppResult<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
        let detail = body
            .message
            .or(body.error)
            .unwrap_or_else(|| text.trim().to_string());
        Err(AppError::command(format!(
            "Cancel of queue item {queue_id} rejected with {status}: {detail}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(base: &str) -> CrawlerApi {
        CrawlerApi::new(Url::parse(base).unwrap(), Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_cancel_url() {
        let url = api("http://localhost:4000")
            .cancel_url(&QueueId::from("q-12"))
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:4000/api/crawler/queue/q-12/cancel");
    }

    #[test]
    fn test_cancel_url_escapes_and_keeps_prefix() {
        let url = api("http://backend/pickr/")
            .cancel_url(&QueueId::from("a/b c"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://backend/pickr/api/crawler/queue/a%2Fb%20c/cancel"
        );
    }
}
