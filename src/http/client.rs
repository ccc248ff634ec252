//! Retrying transport
//!
//! Issues one logical POST request (JSON or form body) and retries it on
//! any failure:
//! - 429 rate limiting
//! - non-2xx statuses
//! - connection, timeout and body read errors
//!
//! Every retry waits `base_delay * 2^attempt` (zero-based attempt), capped at
//! `max_backoff`. There is no sleep after the final attempt.

use super::rate_limit::{RateLimiter, RateLimiterConfig};
use super::sleep::{Sleeper, TokioSleeper};
use crate::error::{Error, Result};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Maximum characters of a response body kept in logs and errors
const BODY_SNIPPET_LEN: usize = 500;

/// Configuration for the retrying transport
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-request timeout
    pub timeout: Duration,
    /// Total attempts per logical request (including the first)
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on every attempt
    pub base_delay: Duration,
    /// Upper bound for a single backoff delay
    pub max_backoff: Duration,
    /// Optional client-side rate limiter
    pub rate_limit: Option<RateLimiterConfig>,
    /// User agent string
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_backoff: Duration::from_secs(512),
            rate_limit: None,
            user_agent: format!("tiktok-research/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl TransportConfig {
    /// Create a new config builder
    pub fn builder() -> TransportConfigBuilder {
        TransportConfigBuilder::default()
    }

    /// Delay before retrying after the given zero-based attempt
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        std::cmp::min(self.base_delay.saturating_mul(factor), self.max_backoff)
    }
}

/// Builder for transport config
#[derive(Default)]
pub struct TransportConfigBuilder {
    config: TransportConfig,
}

impl TransportConfigBuilder {
    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set total attempts
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    /// Set backoff base delay and cap
    pub fn backoff(mut self, base_delay: Duration, max_backoff: Duration) -> Self {
        self.config.base_delay = base_delay;
        self.config.max_backoff = max_backoff;
        self
    }

    /// Set rate limiter
    pub fn rate_limit(mut self, config: RateLimiterConfig) -> Self {
        self.config.rate_limit = Some(config);
        self
    }

    /// Set user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Build the config
    pub fn build(self) -> TransportConfig {
        self.config
    }
}

/// Configuration for a single request
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    /// Query parameters
    pub query: HashMap<String, String>,
    /// Request headers
    pub headers: HashMap<String, String>,
    /// Request body (JSON)
    pub body: Option<Value>,
    /// Form-encoded body, used instead of `body` when set
    pub form: Option<Vec<(String, String)>>,
}

impl RequestConfig {
    /// Create a new request config
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a query parameter
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Add a header
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Add an `Authorization: Bearer` header
    #[must_use]
    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {token}"))
    }

    /// Set JSON body
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Set a form-encoded body
    #[must_use]
    pub fn form<K, V>(mut self, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.form = Some(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }
}

/// A successful response with its body already read
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Raw response body
    pub body: String,
}

/// Transport that retries a single logical request with exponential backoff
pub struct RetryingTransport {
    client: Client,
    config: TransportConfig,
    sleeper: Arc<dyn Sleeper>,
    rate_limiter: Option<RateLimiter>,
}

impl RetryingTransport {
    /// Create a transport with the given configuration
    pub fn new(config: TransportConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self::with_client(client, config))
    }

    /// Create a transport on top of an existing reqwest client
    ///
    /// The client's own timeout and user agent apply; the config only
    /// drives retries and rate limiting.
    pub fn with_client(client: Client, config: TransportConfig) -> Self {
        let rate_limiter = config.rate_limit.as_ref().map(RateLimiter::new);

        Self {
            client,
            config,
            sleeper: Arc::new(TokioSleeper),
            rate_limiter,
        }
    }

    /// Replace the sleeper used between attempts
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Get the underlying reqwest client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the transport configuration
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// POST a request, retrying until it succeeds or attempts run out
    pub async fn send(&self, url: &str, request: &RequestConfig) -> Result<HttpResponse> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 0..max_attempts {
            if let Some(ref limiter) = self.rate_limiter {
                limiter.wait().await;
            }

            let mut req = self.client.post(url);
            if !request.query.is_empty() {
                req = req.query(&request.query);
            }
            for (key, value) in &request.headers {
                req = req.header(key.as_str(), value.as_str());
            }
            if let Some(ref form) = request.form {
                req = req.form(form);
            } else if let Some(ref body) = request.body {
                req = req.json(body);
            }

            match req.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        last_error = "rate limited (HTTP 429)".to_string();
                        self.wait_before_retry(attempt, max_attempts, &last_error)
                            .await;
                        continue;
                    }

                    match response.text().await {
                        Ok(body) if status.is_success() => {
                            debug!(url, status = status.as_u16(), attempt, "Request succeeded");
                            return Ok(HttpResponse {
                                status: status.as_u16(),
                                body,
                            });
                        }
                        Ok(body) => {
                            last_error =
                                Error::http_status(status.as_u16(), snippet(&body)).to_string();
                        }
                        Err(e) => {
                            last_error = format!("failed to read response body: {e}");
                        }
                    }
                }
                Err(e) => {
                    last_error = Error::Http(e).to_string();
                }
            }

            self.wait_before_retry(attempt, max_attempts, &last_error)
                .await;
        }

        error!(url, attempts = max_attempts, error = %last_error, "Max retries exceeded");
        Err(Error::TransportExhausted {
            attempts: max_attempts,
            last_error,
        })
    }

    /// Back off after a failed attempt, unless it was the last one
    async fn wait_before_retry(&self, attempt: u32, max_attempts: u32, reason: &str) {
        if attempt + 1 >= max_attempts {
            return;
        }

        let delay = self.config.backoff_for(attempt);
        warn!(
            "Request failed (attempt {}/{}): {reason}. Retrying in {:?}",
            attempt + 1,
            max_attempts,
            delay
        );
        self.sleeper.sleep(delay).await;
    }
}

impl std::fmt::Debug for RetryingTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingTransport")
            .field("config", &self.config)
            .field("sleeper", &self.sleeper)
            .field("has_rate_limiter", &self.rate_limiter.is_some())
            .finish_non_exhaustive()
    }
}

/// Truncate a response body for logging, respecting char boundaries
pub fn snippet(body: &str) -> String {
    match body.char_indices().nth(BODY_SNIPPET_LEN) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
