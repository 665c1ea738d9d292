//! HTTP client with request pacing and upstream status classification.
//!
//! Wraps reqwest with:
//! - A token-bucket pacer (the portal tolerates roughly one request per second)
//! - Status classification into transient, rate-limited and permanent failures
//! - Empty-body detection, since the portal sometimes answers 200 with nothing
//! - A fixed user agent and default timeout

use crate::config::{NetworkConfig, UpstreamConfig};
use crate::{ModSyncError, Result};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{header, Client, Response, StatusCode};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

/// HTTP client used for all upstream traffic.
pub struct HttpClient {
    client: Client,
    /// Request pacer; `None` disables pacing.
    pacer: Option<DefaultDirectRateLimiter>,
    /// Default timeout for requests.
    default_timeout: Duration,
}

impl HttpClient {
    /// Create a new HTTP client with default configuration.
    pub fn new() -> Result<Self> {
        Self::with_timeout(NetworkConfig::REQUEST_TIMEOUT)
    }

    /// Create a new HTTP client with a custom default timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .user_agent(UpstreamConfig::USER_AGENT)
            .build()
            .map_err(|e| ModSyncError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                cause: None,
            })?;

        Ok(Self {
            client,
            pacer: Some(Self::build_pacer(
                NetworkConfig::REQUESTS_PER_SECOND,
                NetworkConfig::REQUEST_BURST,
            )),
            default_timeout: timeout,
        })
    }

    /// Replace the pacer with a custom rate, or disable pacing with `None`.
    pub fn with_pacing(mut self, pacing: Option<(u32, u32)>) -> Self {
        self.pacer = pacing.map(|(per_second, burst)| Self::build_pacer(per_second, burst));
        self
    }

    fn build_pacer(per_second: u32, burst: u32) -> DefaultDirectRateLimiter {
        let rate = NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
        RateLimiter::direct(Quota::per_second(rate).allow_burst(burst))
    }

    /// GET a URL and return the response if its status is a success.
    pub async fn get(&self, url: &str) -> Result<Response> {
        self.get_with_timeout(url, self.default_timeout).await
    }

    /// GET with an explicit whole-request timeout (used for large downloads).
    pub async fn get_with_timeout(&self, url: &str, timeout: Duration) -> Result<Response> {
        self.pace().await;

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModSyncError::Timeout(timeout)
                } else {
                    ModSyncError::Network {
                        message: format!("GET {} failed: {}", url, e),
                        cause: Some(e.to_string()),
                    }
                }
            })?;

        Self::check_response_status(response, url)
    }

    /// GET a URL and return its body, treating a zero-length body as a
    /// transient failure rather than an empty result.
    pub async fn get_body(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.get(url).await?;
        let body = response.bytes().await.map_err(|e| ModSyncError::Network {
            message: format!("Failed to read body of {}: {}", url, e),
            cause: Some(e.to_string()),
        })?;

        if body.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(ModSyncError::UpstreamTransient {
                message: format!("empty response body from {}", url),
            });
        }

        debug!("GET {} -> {} bytes", url, body.len());
        Ok(body.to_vec())
    }

    /// Check if an HTTP status code indicates a retryable error.
    pub fn is_retryable_status(status: StatusCode) -> bool {
        matches!(status.as_u16(), 408 | 429 | 500 | 502 | 503 | 504)
    }

    /// Check if an HTTP status code indicates a permanent failure.
    pub fn is_permanent_failure(status: StatusCode) -> bool {
        matches!(status.as_u16(), 400 | 401 | 403 | 404 | 410)
    }

    async fn pace(&self) {
        if let Some(ref pacer) = self.pacer {
            pacer.until_ready().await;
        }
    }

    fn check_response_status(response: Response, url: &str) -> Result<Response> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok());

            return Err(ModSyncError::RateLimited {
                service: extract_domain(url),
                retry_after_secs: retry_after,
            });
        }

        if Self::is_retryable_status(status) {
            return Err(ModSyncError::UpstreamTransient {
                message: format!("HTTP {} from {}", status.as_u16(), url),
            });
        }

        Err(ModSyncError::UpstreamStatus {
            status: status.as_u16(),
            url: url.to_string(),
        })
    }
}

/// Extract domain from a URL.
pub fn extract_domain(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.host_str().unwrap_or("unknown").to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            extract_domain("https://gamebanana.com/apiv11/Mod/1/ProfilePage"),
            "gamebanana.com"
        );
        assert_eq!(extract_domain("invalid-url"), "unknown");
    }

    #[test]
    fn test_retryable_status_codes() {
        assert!(HttpClient::is_retryable_status(StatusCode::REQUEST_TIMEOUT));
        assert!(HttpClient::is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(HttpClient::is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(HttpClient::is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(HttpClient::is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(HttpClient::is_retryable_status(StatusCode::GATEWAY_TIMEOUT));

        assert!(!HttpClient::is_retryable_status(StatusCode::OK));
        assert!(!HttpClient::is_retryable_status(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_permanent_failure_status_codes() {
        assert!(HttpClient::is_permanent_failure(StatusCode::NOT_FOUND));
        assert!(HttpClient::is_permanent_failure(StatusCode::GONE));
        assert!(!HttpClient::is_permanent_failure(StatusCode::SERVICE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn test_client_with_timeout() {
        let client = HttpClient::with_timeout(Duration::from_secs(5))
            .unwrap()
            .with_pacing(None);
        assert_eq!(client.default_timeout, Duration::from_secs(5));
        assert!(client.pacer.is_none());
    }
}
