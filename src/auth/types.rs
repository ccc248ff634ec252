//! Auth types

use chrono::{DateTime, Utc};

/// Client key and secret issued for a research application
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    /// Client key
    pub client_key: String,
    /// Client secret
    pub client_secret: String,
}

impl ClientCredentials {
    /// Create credentials from a key and secret
    pub fn new(client_key: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_key: client_key.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_key", &self.client_key)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// An access token together with the moment it was issued
///
/// Replaced as a whole on refresh; never updated field by field.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// The bearer token
    pub token: String,
    /// When the token was obtained
    pub issued_at: DateTime<Utc>,
    /// How long the token is trusted for
    pub ttl: chrono::Duration,
}

impl Credential {
    /// Create a new credential
    pub fn new(token: impl Into<String>, issued_at: DateTime<Utc>, ttl: chrono::Duration) -> Self {
        Self {
            token: token.into(),
            issued_at,
            ttl,
        }
    }

    /// Instant after which the credential must not be used
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issued_at + self.ttl
    }

    /// Check whether the credential may still be sent at `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("ttl", &self.ttl)
            .finish()
    }
}
