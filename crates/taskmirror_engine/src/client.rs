//! `reqwest`-backed HTTP client.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::http::{HttpClient, HttpResponse, TransportFailure};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::Client;
use std::time::Duration;

/// Production HTTP client.
///
/// Applies the configured User-Agent and per-request timeout.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    /// Builds a client from a sync configuration.
    pub fn new(config: &SyncConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()
            .map_err(|e| SyncError::InvalidRequest(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wraps an existing `reqwest` client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn post(
        &self,
        url: &str,
        bearer: &str,
        body: String,
    ) -> Result<HttpResponse, TransportFailure> {
        let response = self
            .client
            .post(url)
            .bearer_auth(bearer)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status().as_u16();
        let retry_after = parse_retry_after(response.headers(), Utc::now());
        let body = response.text().await.map_err(classify)?;

        Ok(HttpResponse {
            status,
            retry_after,
            body,
        })
    }
}

fn classify(err: reqwest::Error) -> TransportFailure {
    if err.is_timeout() {
        TransportFailure::Timeout
    } else if err.is_connect() {
        TransportFailure::Connect(err.to_string())
    } else {
        TransportFailure::Other(err.to_string())
    }
}

/// Parses a `Retry-After` header given as seconds or as an HTTP date.
fn parse_retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(secs) = value.parse::<f64>() {
        return Duration::try_from_secs_f64(secs).ok();
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}
