//! Token manager implementation
//!
//! Owns the access token and renews it on demand.

use super::types::{ClientCredentials, Credential};
use crate::error::{Error, Result};
use crate::http::{snippet, RequestConfig, RetryingTransport, Sleeper, TransportConfig};
use crate::types::{Clock, SystemClock};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info};

/// How long a freshly issued token is trusted
///
/// The server's own `expires_in` is ignored.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

/// Owns the single access token for a client
pub struct TokenManager {
    /// Client key and secret
    credentials: ClientCredentials,
    /// Token endpoint URL
    token_url: String,
    /// Trusted lifetime of each token
    ttl: chrono::Duration,
    /// Transport for token requests
    transport: RetryingTransport,
    /// Time source for expiry checks
    clock: Arc<dyn Clock>,
    /// Current credential, if any
    cached: RwLock<Option<Credential>>,
}

impl TokenManager {
    /// Create a token manager for the given token endpoint
    ///
    /// Each exchange is tried once.
    pub fn new(credentials: ClientCredentials, token_url: impl Into<String>) -> Self {
        let transport = RetryingTransport::with_client(
            Client::new(),
            TransportConfig::builder().max_attempts(1).build(),
        );
        Self::with_transport(credentials, token_url, transport)
    }

    /// Create a token manager whose exchanges retry through `transport`
    pub fn with_transport(
        credentials: ClientCredentials,
        token_url: impl Into<String>,
        transport: RetryingTransport,
    ) -> Self {
        Self {
            credentials,
            token_url: token_url.into(),
            ttl: chrono::Duration::seconds(DEFAULT_TOKEN_TTL.as_secs() as i64),
            transport,
            clock: Arc::new(SystemClock),
            cached: RwLock::new(None),
        }
    }

    /// Override the trusted token lifetime
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(1));
        self
    }

    /// Override the time source
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the sleeper used between exchange attempts
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.transport = self.transport.with_sleeper(sleeper);
        self
    }

    /// Return a credential that is valid right now, refreshing if needed
    pub async fn ensure_valid(&self) -> Result<Credential> {
        {
            let cached = self.cached.read().await;
            if let Some(credential) = cached.as_ref() {
                if credential.is_valid_at(self.clock.now()) {
                    return Ok(credential.clone());
                }
            }
        }

        let mut cached = self.cached.write().await;

        // Another caller may have refreshed while we waited for the lock
        if let Some(credential) = cached.as_ref() {
            if credential.is_valid_at(self.clock.now()) {
                return Ok(credential.clone());
            }
        }

        self.refresh_locked(&mut cached).await
    }

    /// Exchange the client key and secret for a new token
    pub async fn refresh(&self) -> Result<Credential> {
        let mut cached = self.cached.write().await;
        self.refresh_locked(&mut cached).await
    }

    /// Peek at the current credential without refreshing
    pub async fn current(&self) -> Option<Credential> {
        self.cached.read().await.clone()
    }

    /// Drop the current credential
    pub async fn clear(&self) {
        *self.cached.write().await = None;
    }

    /// Get the token endpoint URL
    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    async fn refresh_locked(&self, slot: &mut Option<Credential>) -> Result<Credential> {
        info!(token_url = %self.token_url, "Refreshing access token");

        // A failed refresh must not leave the old token behind
        *slot = None;

        match self.exchange().await {
            Ok(credential) => {
                info!(expires_at = %credential.expires_at(), "Token successfully refreshed");
                *slot = Some(credential.clone());
                Ok(credential)
            }
            Err(e) => {
                error!(error = %e, "Failed to get access token");
                Err(e)
            }
        }
    }

    async fn exchange(&self) -> Result<Credential> {
        let request = RequestConfig::new()
            .header("Cache-Control", "no-cache")
            .form([
                ("client_key", self.credentials.client_key.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ]);

        let response = match self.transport.send(&self.token_url, &request).await {
            Ok(response) => response,
            Err(Error::TransportExhausted {
                attempts,
                last_error,
            }) => {
                return Err(Error::auth(format!(
                    "token request failed after {attempts} attempt(s): {last_error}"
                )));
            }
            Err(e) => return Err(Error::auth(format!("token request failed: {e}"))),
        };

        let token: TokenResponse = serde_json::from_str(&response.body).map_err(|e| {
            Error::auth(format!(
                "unexpected token response ({e}): {}",
                snippet(&response.body)
            ))
        })?;

        if token.access_token.is_empty() {
            return Err(Error::auth("token response contained an empty access_token"));
        }

        Ok(Credential::new(token.access_token, self.clock.now(), self.ttl))
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("credentials", &self.credentials)
            .field("token_url", &self.token_url)
            .field("ttl", &self.ttl)
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

/// OAuth2 token response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}
