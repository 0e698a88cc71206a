//! HTTP transport with retry.
//!
//! Key features:
//! - Exponential backoff on connection errors, 5xx and 429
//! - Immediate failure on other 4xx
//! - JSON documents and raw tile bytes over the same client

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Client, StatusCode};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::stats::RunStats;

/// Source of remote documents and tile bytes.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the raw body at `url`.
    async fn fetch_bytes(&self, url: &str) -> Result<Bytes, TransferError>;

    /// Fetch and decode a JSON document.
    async fn fetch_json(&self, url: &str) -> Result<Value, TransferError> {
        let bytes = self.fetch_bytes(url).await?;
        serde_json::from_slice(&bytes).map_err(|e| TransferError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

/// Fetcher over `reqwest`, retrying transient failures.
pub struct HttpFetcher {
    client: Client,
    config: TransferConfig,
    stats: Arc<RunStats>,
}

impl HttpFetcher {
    pub fn new(config: TransferConfig, stats: Arc<RunStats>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent.clone())
            .pool_max_idle_per_host(8)
            .tcp_nodelay(true)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            config,
            stats,
        })
    }

    async fn fetch_once(&self, url: &str) -> Result<Bytes, TransferError> {
        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/ld+json, application/json, image/*, */*")
            .send()
            .await
            .map_err(|e| TransferError::Connection {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        match response.status() {
            StatusCode::OK => {}
            status if status.is_success() => {
                debug!(url = %url, status = %status, "Unexpected success status");
            }
            status => {
                return Err(TransferError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }
        }

        response.bytes().await.map_err(|e| TransferError::Connection {
            url: url.to_string(),
            message: format!("Error reading response body: {}", e),
        })
    }
}

/// Delay before retry number `retry` (1-based), doubling up to `max`.
pub fn backoff_delay(initial: Duration, max: Duration, retry: u32) -> Duration {
    let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
    initial.saturating_mul(factor).min(max)
}

/// Run `attempt` until it succeeds, fails permanently, or the retry budget
/// of `config` is spent.
pub async fn with_retry<F, Fut>(
    config: &TransferConfig,
    stats: &RunStats,
    mut attempt: F,
) -> Result<Bytes, TransferError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Bytes, TransferError>>,
{
    let mut retry_count = 0;

    loop {
        match attempt().await {
            Ok(bytes) => return Ok(bytes),
            Err(e) if e.is_retryable() && retry_count < config.max_retries => {
                retry_count += 1;
                let delay = backoff_delay(
                    config.initial_retry_delay(),
                    config.max_retry_delay(),
                    retry_count,
                );

                warn!(
                    error = %e,
                    retry = retry_count,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Transfer failed, retrying"
                );
                stats.record_retry();

                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(skip(self), fields(url = %url))]
    async fn fetch_bytes(&self, url: &str) -> Result<Bytes, TransferError> {
        with_retry(&self.config, &self.stats, || self.fetch_once(url)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_retries(max_retries: u32) -> TransferConfig {
        TransferConfig {
            max_retries,
            initial_retry_delay_ms: 1,
            max_retry_delay_ms: 2,
            ..Default::default()
        }
    }

    fn status(status: u16) -> TransferError {
        TransferError::Status {
            url: "https://images.example.org/iiif/img/info.json".to_string(),
            status,
        }
    }

    #[test]
    fn test_backoff_doubles_until_cap() {
        let initial = Duration::from_millis(500);
        let max = Duration::from_secs(3);

        assert_eq!(backoff_delay(initial, max, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(initial, max, 2), Duration::from_millis(1000));
        assert_eq!(backoff_delay(initial, max, 3), Duration::from_millis(2000));
        assert_eq!(backoff_delay(initial, max, 4), max);
        assert_eq!(backoff_delay(initial, max, 60), max);
    }

    #[tokio::test]
    async fn test_connection_errors_exhaust_retries() {
        let stats = RunStats::new();
        let attempts = AtomicU32::new(0);

        let result = with_retry(&quick_retries(2), &stats, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async {
                Err(TransferError::Connection {
                    url: "https://images.example.org/iiif/img/info.json".to_string(),
                    message: "connection refused".to_string(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(TransferError::Connection { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(stats.snapshot().transfer_retries, 2);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let stats = RunStats::new();
        let attempts = AtomicU32::new(0);

        let result = with_retry(&quick_retries(5), &stats, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(status(404)) }
        })
        .await;

        assert!(matches!(result, Err(TransferError::Status { status: 404, .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(stats.snapshot().transfer_retries, 0);
    }

    #[tokio::test]
    async fn test_transient_errors_recover() {
        let stats = RunStats::new();
        let attempts = AtomicU32::new(0);

        let result = with_retry(&quick_retries(5), &stats, || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(status(503))
                } else {
                    Ok(Bytes::from_static(b"jpeg"))
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), Bytes::from_static(b"jpeg"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(stats.snapshot().transfer_retries, 2);
    }
}
