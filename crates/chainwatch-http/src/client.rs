//! HTTP JSON-RPC client backed by `reqwest`.
//!
//! Features:
//! - Automatic retry with backoff for transient errors
//! - Per-request timeout (the only timeout a drift poll gets)
//! - Token-free endpoint label for logs

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use chainwatch_core::policy::{RetryConfig, RetryPolicy};
use chainwatch_core::{CommitmentLevel, SlotSource, WatchError};

use crate::rpc::{JsonRpcRequest, JsonRpcResponse};

/// Configuration for `HttpSlotClient`.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub retry: RetryConfig,
    pub request_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::exponential(Duration::from_millis(200), Duration::from_secs(2), 2.0)
                .with_max_retries(3),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// JSON-RPC client used as the drift reference.
pub struct HttpSlotClient {
    url: String,
    label: String,
    http: reqwest::Client,
    retry: RetryPolicy,
    request_timeout: Duration,
    next_id: AtomicU64,
}

impl HttpSlotClient {
    /// Create a client for the given JSON-RPC endpoint URL. The URL may embed
    /// an access token; it is never logged.
    pub fn new(url: impl Into<String>, config: HttpClientConfig) -> Result<Self, WatchError> {
        let url = url.into();
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| WatchError::Http(e.to_string()))?;

        Ok(Self {
            label: endpoint_label(&url),
            url,
            http,
            retry: RetryPolicy::new(config.retry),
            request_timeout: config.request_timeout,
            next_id: AtomicU64::new(1),
        })
    }

    fn map_reqwest(&self, e: reqwest::Error) -> WatchError {
        if e.is_timeout() {
            WatchError::Timeout {
                ms: self.request_timeout.as_millis() as u64,
            }
        } else if e.is_decode() {
            // a body that is not JSON-RPC will not improve on retry
            WatchError::Decode(e.without_url().to_string())
        } else {
            WatchError::Http(e.without_url().to_string())
        }
    }

    async fn send_once(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, WatchError> {
        let resp = self
            .http
            .post(&self.url)
            .json(req)
            .send()
            .await
            .map_err(|e| self.map_reqwest(e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(WatchError::Http(format!("HTTP {status}: {body}")));
        }

        resp.json::<JsonRpcResponse>()
            .await
            .map_err(|e| self.map_reqwest(e))
    }

    /// Send a request, retrying transient failures.
    pub async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, WatchError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.send_once(&req).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_retryable() => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            endpoint = %self.label,
                            method = %req.method,
                            "retrying request"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(
                            attempt,
                            error = %e,
                            endpoint = %self.label,
                            "max retries exceeded"
                        );
                        return Err(e);
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }

    fn decode<T: DeserializeOwned>(&self, resp: JsonRpcResponse) -> Result<T, WatchError> {
        let result = resp.into_result().map_err(|e| WatchError::Rpc {
            code: e.code,
            message: e.message,
        })?;
        Ok(serde_json::from_value(result)?)
    }
}

#[async_trait]
impl SlotSource for HttpSlotClient {
    fn endpoint(&self) -> &str {
        &self.label
    }

    async fn current_slot(&self, commitment: CommitmentLevel) -> Result<u64, WatchError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let resp = self.send(JsonRpcRequest::get_slot(id, commitment)).await?;
        self.decode(resp)
    }
}

/// `scheme://host[:port]` without path or query, which may hold a token.
fn endpoint_label(url: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(parsed) => {
            let host = parsed.host_str().unwrap_or_default();
            match parsed.port() {
                Some(port) => format!("{}://{host}:{port}", parsed.scheme()),
                None => format!("{}://{host}", parsed.scheme()),
            }
        }
        Err(_) => "<invalid url>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_drops_path_and_token() {
        assert_eq!(
            endpoint_label("https://node.example/abcd-secret-token"),
            "https://node.example"
        );
        assert_eq!(endpoint_label("http://127.0.0.1:8899/tok"), "http://127.0.0.1:8899");
        assert_eq!(endpoint_label("not a url"), "<invalid url>");
    }

    #[test]
    fn default_config_retries_three_times() {
        let config = HttpClientConfig::default();
        assert_eq!(config.retry.max_retries, Some(3));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }
}
