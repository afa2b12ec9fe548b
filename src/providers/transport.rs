//! Shared HTTP plumbing for provider adapters.
//!
//! Every adapter funnels its upstream calls through [`ProviderHttp`]: one
//! `reqwest` client with fixed deadlines, the adapter's minute budget, and a
//! retry loop implementing the common policy: up to 3 attempts with 1s/2s/4s
//! backoff on timeouts, transport errors and 5xx; 429 honours `Retry-After`
//! (capped at 60s); 401 and 404 are terminal and never retried.

use crate::error::{AggregatorError, Result};
use crate::models::DataProvider;
use crate::rate_limit::MinuteBudget;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// Total request deadline
const TOTAL_TIMEOUT: Duration = Duration::from_secs(30);
/// Connect deadline
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Retry attempts per call
const MAX_ATTEMPTS: u32 = 3;

const USER_AGENT: &str = concat!("market-aggregator/", env!("CARGO_PKG_VERSION"));

/// Rate-limited HTTP gateway for one provider.
pub struct ProviderHttp {
    provider: DataProvider,
    http: Client,
    budget: MinuteBudget,
}

impl ProviderHttp {
    /// Build the gateway with the shared client configuration.
    pub fn new(provider: DataProvider, per_minute: u32) -> Result<Self> {
        Self::with_headers(provider, per_minute, HeaderMap::new())
    }

    /// Build the gateway with extra default headers (header-based auth).
    pub fn with_headers(
        provider: DataProvider,
        per_minute: u32,
        headers: HeaderMap,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(TOTAL_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(AggregatorError::Http)?;

        Ok(Self {
            provider,
            http,
            budget: MinuteBudget::new(per_minute),
        })
    }

    /// The provider this gateway serves
    pub fn provider(&self) -> DataProvider {
        self.provider
    }

    /// The configured per-minute budget
    pub fn rate_limit_per_minute(&self) -> u32 {
        self.budget.per_minute()
    }

    /// GET a JSON document with rate limiting and the shared retry policy.
    ///
    /// Retriable failures are retried with exponential backoff; once the
    /// attempt budget is spent the last transport failure escalates into a
    /// circuit-tripping [`AggregatorError::Provider`]. Rate-limit exhaustion
    /// surfaces as [`AggregatorError::RateLimited`] and does not trip.
    pub async fn get_json(&self, url: &str, params: &[(&str, &str)]) -> Result<serde_json::Value> {
        let mut attempt = 0;
        loop {
            self.budget.acquire().await;

            debug!(
                provider = %self.provider,
                url = %url,
                attempt = attempt + 1,
                "Provider request"
            );

            let error = match self.attempt(url, params).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            attempt += 1;
            if !error.is_retriable() || attempt == MAX_ATTEMPTS {
                return Err(self.finalize(error));
            }

            // Rate-limit errors wait out Retry-After; everything else
            // retriable backs off 1s, 2s, 4s.
            let delay = match &error {
                AggregatorError::RateLimited { .. } => error.retry_after_secs().unwrap_or(60),
                _ => 1u64 << (attempt - 1),
            };
            warn!(
                provider = %self.provider,
                error = %error,
                retry_in_secs = delay,
                "Retriable provider failure"
            );
            tokio::time::sleep(Duration::from_secs(delay)).await;
        }
    }

    async fn attempt(&self, url: &str, params: &[(&str, &str)]) -> Result<serde_json::Value> {
        let response = self
            .http
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        match response.status() {
            StatusCode::OK => response.json().await.map_err(|e| AggregatorError::Provider {
                provider: self.provider,
                context: format!("invalid JSON response: {e}"),
            }),
            StatusCode::TOO_MANY_REQUESTS => Err(AggregatorError::RateLimited {
                provider: self.provider,
                retry_after: parse_retry_after(response.headers()),
            }),
            StatusCode::UNAUTHORIZED => Err(AggregatorError::AuthenticationFailed {
                provider: self.provider,
                context: format!("401 from {url}"),
            }),
            StatusCode::NOT_FOUND => Err(AggregatorError::DataNotFound {
                symbol: None,
                context: format!("404 from {url}"),
            }),
            status if status.is_server_error() => Err(AggregatorError::ServerError {
                provider: self.provider,
                status: status.as_u16(),
            }),
            status => Err(AggregatorError::Provider {
                provider: self.provider,
                context: format!("unexpected status {status}"),
            }),
        }
    }

    fn transport_error(&self, error: reqwest::Error) -> AggregatorError {
        if error.is_timeout() {
            AggregatorError::Timeout {
                timeout_ms: TOTAL_TIMEOUT.as_millis() as u64,
            }
        } else {
            AggregatorError::Http(error)
        }
    }

    /// Escalate exhausted transport failures into circuit-tripping provider
    /// errors; auth, not-found and rate-limit errors keep their kind.
    fn finalize(&self, error: AggregatorError) -> AggregatorError {
        match error {
            e @ AggregatorError::RateLimited { .. } => e,
            other => other.escalate(self.provider),
        }
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}
