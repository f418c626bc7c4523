use crate::config::ProviderConfig;
use crate::source::error::SourceError;
use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::iter::Take;
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, warn};
use url::Url;

const MAX_BACKOFF: Duration = Duration::from_secs(10);

pub struct HttpClient {
    inner: reqwest::Client,
    config: ProviderConfig,
}

impl HttpClient {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            // Yahoo hands out a session cookie on first contact
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner,
            config: config.clone(),
        })
    }

    /// GET `url` and decode the JSON body, retrying transient failures.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, SourceError> {
        let mut attempt = 0u32;

        RetryIf::start(
            self.backoff(),
            move || {
                attempt += 1;
                self.get_once(url, attempt)
            },
            |e: &SourceError| {
                let retry = e.is_transient();
                if retry {
                    warn!("{} (will retry)", e);
                }
                retry
            },
        )
        .await
    }

    fn backoff(&self) -> Take<ExponentialBackoff> {
        ExponentialBackoff::from_millis(2)
            .factor((self.config.retry_delay_ms / 2).max(1))
            .max_delay(MAX_BACKOFF)
            .take(self.config.max_retries as usize)
    }

    async fn get_once<T: DeserializeOwned>(&self, url: &Url, attempt: u32) -> Result<T, SourceError> {
        debug!("GET {} (attempt {})", url, attempt);

        let resp = self
            .inner
            .get(url.clone())
            .send()
            .await
            .map_err(|source| SourceError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status,
                url: url.to_string(),
            });
        }

        let body = resp.text().await.map_err(|source| SourceError::Transport {
            url: url.to_string(),
            source,
        })?;

        serde_json::from_str(&body).map_err(|e| SourceError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

/// Yahoo answers unknown symbols with a 404; callers treat that as "no data".
pub fn is_not_found(err: &SourceError) -> bool {
    matches!(err, SourceError::Status { status, .. } if *status == StatusCode::NOT_FOUND)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::mock::{http_response, serve_http};
    use std::sync::atomic::Ordering;

    #[test]
    fn test_backoff_is_bounded() {
        let config = ProviderConfig {
            max_retries: 3,
            retry_delay_ms: 500,
            ..ProviderConfig::default()
        };
        let client = HttpClient::new(&config).unwrap();
        let delays: Vec<Duration> = client.backoff().collect();

        assert_eq!(delays.len(), 3);
        assert_eq!(delays[0], Duration::from_millis(500));
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d <= MAX_BACKOFF));
    }

    #[test]
    fn test_no_retries_configured() {
        let config = ProviderConfig {
            max_retries: 0,
            ..ProviderConfig::default()
        };
        let client = HttpClient::new(&config).unwrap();
        assert_eq!(client.backoff().count(), 0);
    }

    fn fast_client(max_retries: u32) -> HttpClient {
        let config = ProviderConfig {
            max_retries,
            retry_delay_ms: 2,
            ..ProviderConfig::default()
        };
        HttpClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_transient_statuses_are_retried_until_success() {
        let (url, hits) = serve_http(vec![
            http_response("503 Service Unavailable", "{}"),
            http_response("429 Too Many Requests", "{}"),
            http_response("200 OK", r#"{"ok":true}"#),
        ])
        .await;

        let body: serde_json::Value = fast_client(2).get_json(&url).await.unwrap();

        assert_eq!(body["ok"], true);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let (url, hits) = serve_http(vec![
            http_response("404 Not Found", "{}"),
            http_response("200 OK", "{}"),
        ])
        .await;

        let err = fast_client(2)
            .get_json::<serde_json::Value>(&url)
            .await
            .unwrap_err();

        assert!(is_not_found(&err));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_stop_after_max_retries() {
        let (url, hits) = serve_http(vec![
            http_response("503 Service Unavailable", "{}"),
            http_response("503 Service Unavailable", "{}"),
            http_response("503 Service Unavailable", "{}"),
            http_response("200 OK", "{}"),
        ])
        .await;

        let err = fast_client(2)
            .get_json::<serde_json::Value>(&url)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SourceError::Status { status, .. } if status == StatusCode::SERVICE_UNAVAILABLE
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_undecodable_body_is_a_decode_error() {
        let (url, hits) = serve_http(vec![http_response("200 OK", "<html>")]).await;

        let err = fast_client(2)
            .get_json::<serde_json::Value>(&url)
            .await
            .unwrap_err();

        assert!(matches!(err, SourceError::Decode { .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
