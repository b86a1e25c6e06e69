//! HTTP client for the chat backend
//!
//! Wraps reqwest::Client with base URL, bearer auth, per-request timeout
//! and retry with backoff for idempotent requests.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;

use crate::config::Config;

/// First retry delay; doubles per attempt.
const RETRY_BASE_DELAY_MS: u64 = 250;
/// Doublings stop here (16s), however many retries are configured.
const MAX_RETRY_DOUBLINGS: u32 = 6;

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    retries: u32,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to build HTTP client")?;

        if config.auth_token.is_none() {
            tracing::warn!("No auth token configured; requests are sent unauthenticated");
        }

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: config.auth_token.clone(),
            retries: config.request_retries,
        })
    }

    /// Absolute URL for a path built from escaped segments.
    pub fn url(&self, segments: &[&str], query: &[(&str, String)]) -> Result<String> {
        let mut url = url::Url::parse(&self.base_url)
            .with_context(|| format!("Invalid API base URL: {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("API base URL cannot have path segments"))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url.to_string())
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token {
            Some(ref token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// GET and decode JSON, retrying transport errors and 5xx with backoff.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut attempt = 0u32;
        loop {
            match self.get_once(url).await {
                Ok(resp) => {
                    return resp
                        .json()
                        .await
                        .with_context(|| format!("Failed to parse response from {}", url));
                }
                Err(e) if attempt < self.retries && is_retryable(&e) => {
                    let delay = retry_delay(attempt);
                    tracing::debug!("GET {} failed ({:#}), retrying in {:?}", url, e, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once(&self, url: &str) -> Result<reqwest::Response> {
        tracing::debug!("GET {}", url);
        let resp = self
            .authorize(self.http.get(url))
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;
        check_response(resp, url).await
    }

    /// POST a JSON body and decode the JSON response. Never retried.
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        tracing::debug!("POST {}", url);
        let resp = self
            .authorize(self.http.post(url))
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))?;
        let resp = check_response(resp, url).await?;
        resp.json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }
}

/// Error raised for a non-success HTTP status.
#[derive(Debug, thiserror::Error)]
#[error("HTTP {status} for {url}: {body}")]
pub struct HttpStatusError {
    pub status: u16,
    pub url: String,
    pub body: String,
}

/// Check HTTP response status code and return a clear error on failure.
async fn check_response(resp: reqwest::Response, url: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        bail!(
            "401 Unauthorized for {}. Token may be invalid -- run 'supervisor-chat configure --token <token>'.",
            url
        );
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(HttpStatusError {
            status: status.as_u16(),
            url: url.to_string(),
            body,
        }
        .into());
    }
    Ok(resp)
}

/// Transport failures, timeouts and server errors are worth another attempt.
fn is_retryable(err: &anyhow::Error) -> bool {
    if let Some(status) = err.downcast_ref::<HttpStatusError>() {
        return status.status >= 500;
    }
    err.chain()
        .any(|cause| cause.downcast_ref::<reqwest::Error>().is_some())
}

fn retry_delay(attempt: u32) -> Duration {
    Duration::from_millis(RETRY_BASE_DELAY_MS << attempt.min(MAX_RETRY_DOUBLINGS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_is_capped() {
        assert_eq!(retry_delay(0), Duration::from_millis(250));
        assert_eq!(retry_delay(2), Duration::from_millis(1000));
        assert_eq!(retry_delay(6), Duration::from_secs(16));
        assert_eq!(retry_delay(64), Duration::from_secs(16));
        assert_eq!(retry_delay(u32::MAX), Duration::from_secs(16));
    }

    fn client(base: &str) -> ApiClient {
        let config = Config {
            api_base_url: base.to_string(),
            ..Config::default()
        };
        ApiClient::new(&config).unwrap()
    }

    #[test]
    fn test_url_escapes_segments() {
        let c = client("https://api.example.com/v1/");
        let url = c
            .url(&["chat", "C 1", "S/2"], &[("size", "50".to_string())])
            .unwrap();
        assert_eq!(url, "https://api.example.com/v1/chat/C%201/S%2F2?size=50");
    }

    #[test]
    fn test_url_without_query() {
        let c = client("http://localhost:8080");
        let url = c.url(&["chat", "send", "C1", "S1"], &[]).unwrap();
        assert_eq!(url, "http://localhost:8080/chat/send/C1/S1");
    }

    #[test]
    fn test_status_errors_retry_only_on_5xx() {
        let server: anyhow::Error = HttpStatusError {
            status: 503,
            url: "u".into(),
            body: String::new(),
        }
        .into();
        let client_side: anyhow::Error = HttpStatusError {
            status: 404,
            url: "u".into(),
            body: String::new(),
        }
        .into();
        assert!(is_retryable(&server));
        assert!(!is_retryable(&client_side));
        assert!(!is_retryable(&anyhow::anyhow!("parse failure")));
    }
}
