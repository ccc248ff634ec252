//! Client configuration
//!
//! Loaded from YAML; every field has a default so an empty document is a
//! valid configuration apart from the credentials, which may instead come
//! from `TIKTOK_CLIENT_KEY` and `TIKTOK_CLIENT_SECRET`.
//!
//! ```yaml
//! credentials:
//!   client_key: abc
//!   client_secret: def
//! http:
//!   max_attempts: 10
//!   rate_limit:
//!     requests_per_second: 2
//! output:
//!   root: TikTok_Data
//! ```

use crate::auth::ClientCredentials;
use crate::error::{Error, Result, ResultExt};
use crate::http::{RateLimiterConfig, TransportConfig};
use crate::pagination::{PaginatorConfig, DEFAULT_MAX_ROUNDS};
use crate::query::MAX_PAGE_SIZE;
use crate::types::OptionStringExt;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Environment variable holding the client key
pub const CLIENT_KEY_ENV: &str = "TIKTOK_CLIENT_KEY";

/// Environment variable holding the client secret
pub const CLIENT_SECRET_ENV: &str = "TIKTOK_CLIENT_SECRET";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Complete client configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Client key and secret
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Endpoint locations
    #[serde(default)]
    pub api: ApiConfig,

    /// Transport settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Token lifetime
    #[serde(default)]
    pub token: TokenConfig,

    /// Pagination limits
    #[serde(default)]
    pub pagination: PaginationConfig,

    /// Where documents, logs and exports go
    #[serde(default)]
    pub output: OutputConfig,
}

impl ClientConfig {
    /// Load from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_yaml_str(&text)
    }

    /// Parse from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Fill missing credentials from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    /// Fill missing credentials from a lookup function
    ///
    /// Values already present in the file win.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.credentials.client_key.clone().none_if_empty().is_none() {
            self.credentials.client_key = lookup(CLIENT_KEY_ENV).none_if_empty();
        }
        if self.credentials.client_secret.clone().none_if_empty().is_none() {
            self.credentials.client_secret = lookup(CLIENT_SECRET_ENV).none_if_empty();
        }
    }

    /// Check everything that can be checked without the network
    pub fn validate(&self) -> Result<()> {
        self.client_credentials()?;
        self.api.base()?;
        for (name, path) in [
            ("api.token_path", &self.api.token_path),
            ("api.video_path", &self.api.video_path),
            ("api.comment_path", &self.api.comment_path),
        ] {
            if path.trim().is_empty() {
                return Err(Error::missing_field(name));
            }
        }
        if self.http.max_attempts == 0 {
            return Err(Error::config("http.max_attempts must be at least 1"));
        }
        if self.token.ttl_secs == 0 {
            return Err(Error::config("token.ttl_secs must be positive"));
        }
        if self.pagination.page_size == 0 || self.pagination.page_size > MAX_PAGE_SIZE {
            return Err(Error::config(format!(
                "pagination.page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        if self.pagination.max_rounds == 0 {
            return Err(Error::config("pagination.max_rounds must be positive"));
        }
        if let Some(ref limit) = self.http.rate_limit {
            if limit.requests_per_second == 0 {
                return Err(Error::config(
                    "http.rate_limit.requests_per_second must be positive",
                ));
            }
        }
        Ok(())
    }

    /// Credentials, or an error naming the missing one
    pub fn client_credentials(&self) -> Result<ClientCredentials> {
        let key = self
            .credentials
            .client_key
            .clone()
            .none_if_empty()
            .ok_or_else(|| Error::missing_field("credentials.client_key"))?;
        let secret = self
            .credentials
            .client_secret
            .clone()
            .none_if_empty()
            .ok_or_else(|| Error::missing_field("credentials.client_secret"))?;
        Ok(ClientCredentials::new(key, secret))
    }

    /// Transport settings
    pub fn transport_config(&self) -> TransportConfig {
        let mut builder = TransportConfig::builder()
            .timeout(Duration::from_secs(self.http.timeout_secs))
            .max_attempts(self.http.max_attempts)
            .backoff(
                Duration::from_millis(self.http.base_delay_ms),
                Duration::from_secs(self.http.max_backoff_secs),
            );
        if let Some(ref limit) = self.http.rate_limit {
            builder = builder.rate_limit(limit.clone());
        }
        if let Some(ref agent) = self.http.user_agent {
            builder = builder.user_agent(agent.clone());
        }
        builder.build()
    }

    /// Paginator settings
    pub fn paginator_config(&self) -> PaginatorConfig {
        PaginatorConfig {
            max_rounds: self.pagination.max_rounds,
        }
    }

    /// Transport settings for token exchanges
    pub fn token_transport_config(&self) -> TransportConfig {
        let mut config = self.transport_config();
        config.max_attempts = self.token.max_attempts;
        config
    }

    /// Trusted token lifetime
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token.ttl_secs)
    }
}

// ============================================================================
// Sections
// ============================================================================

/// Client credentials
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Client key
    #[serde(default)]
    pub client_key: Option<String>,

    /// Client secret
    #[serde(default)]
    pub client_secret: Option<String>,
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("client_key", &self.client_key)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Endpoint locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Scheme and host of the API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Token endpoint path
    #[serde(default = "default_token_path")]
    pub token_path: String,

    /// Video query endpoint path
    #[serde(default = "default_video_path")]
    pub video_path: String,

    /// Comment list endpoint path
    #[serde(default = "default_comment_path")]
    pub comment_path: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_path: default_token_path(),
            video_path: default_video_path(),
            comment_path: default_comment_path(),
        }
    }
}

impl ApiConfig {
    /// Token endpoint URL
    pub fn token_url(&self) -> Result<String> {
        self.join(&self.token_path)
    }

    /// Video query endpoint URL
    pub fn video_url(&self) -> Result<String> {
        self.join(&self.video_path)
    }

    /// Comment list endpoint URL
    pub fn comment_url(&self) -> Result<String> {
        self.join(&self.comment_path)
    }

    fn base(&self) -> Result<Url> {
        let url = Url::parse(&self.base_url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "api.base_url must be http or https, got '{}'",
                url.scheme()
            )));
        }
        Ok(url)
    }

    fn join(&self, path: &str) -> Result<String> {
        Ok(self.base()?.join(path)?.to_string())
    }
}

fn default_base_url() -> String {
    "https://open.tiktokapis.com".to_string()
}

fn default_token_path() -> String {
    "/v2/oauth/token/".to_string()
}

fn default_video_path() -> String {
    "/v2/research/video/query/".to_string()
}

fn default_comment_path() -> String {
    "/v2/research/video/comment/list/".to_string()
}

/// Transport settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Attempts per request, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Backoff cap in seconds
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,

    /// Optional client-side rate limit
    #[serde(default)]
    pub rate_limit: Option<RateLimiterConfig>,

    /// Custom user agent
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_backoff_secs: default_max_backoff_secs(),
            rate_limit: None,
            user_agent: None,
        }
    }
}

fn default_timeout() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    10
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_backoff_secs() -> u64 {
    512
}

/// Token settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Seconds a fresh token is trusted
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Attempts per token exchange, backing off like page requests
    #[serde(default = "default_token_attempts")]
    pub max_attempts: u32,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_attempts: default_token_attempts(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_token_attempts() -> u32 {
    3
}

/// Pagination limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Items per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Requests per fetch before giving up
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_rounds: default_max_rounds(),
        }
    }
}

fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}

fn default_max_rounds() -> usize {
    DEFAULT_MAX_ROUNDS
}

/// Output locations
///
/// Relative entries are resolved against `root`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Base directory
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Video documents
    #[serde(default = "default_videos_dir")]
    pub videos_dir: PathBuf,

    /// Comment documents
    #[serde(default = "default_comments_dir")]
    pub comments_dir: PathBuf,

    /// Videos whose fetch failed
    #[serde(default = "default_video_error_log")]
    pub video_error_log: PathBuf,

    /// Comment fetches that failed
    #[serde(default = "default_comment_error_log")]
    pub comment_error_log: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            videos_dir: default_videos_dir(),
            comments_dir: default_comments_dir(),
            video_error_log: default_video_error_log(),
            comment_error_log: default_comment_error_log(),
        }
    }
}

impl OutputConfig {
    /// Output rooted somewhere else, keeping the default layout
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Directory of video documents
    pub fn videos_path(&self) -> PathBuf {
        self.root.join(&self.videos_dir)
    }

    /// Directory of comment documents
    pub fn comments_path(&self) -> PathBuf {
        self.root.join(&self.comments_dir)
    }

    /// Video error log file
    pub fn video_error_log_path(&self) -> PathBuf {
        self.root.join(&self.video_error_log)
    }

    /// Comment error log file
    pub fn comment_error_log_path(&self) -> PathBuf {
        self.root.join(&self.comment_error_log)
    }

    /// Default export file, e.g. `video_data.csv`
    pub fn export_path(&self, stem: &str, extension: &str) -> PathBuf {
        self.root.join(format!("{stem}.{extension}"))
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("TikTok_Data")
}

fn default_videos_dir() -> PathBuf {
    PathBuf::from("video_data")
}

fn default_comments_dir() -> PathBuf {
    PathBuf::from("comments_data")
}

fn default_video_error_log() -> PathBuf {
    PathBuf::from("error_log_entities.txt")
}

fn default_comment_error_log() -> PathBuf {
    PathBuf::from("error_log_comments.txt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn test_empty_yaml_is_default() {
        let config = ClientConfig::from_yaml_str("").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.http.max_attempts, 10);
        assert_eq!(config.token.ttl_secs, 3600);
        assert_eq!(config.token.max_attempts, 3);
        assert_eq!(config.pagination.page_size, 100);
        assert_eq!(config.pagination.max_rounds, 10_000);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r"
credentials:
  client_key: key-from-file
  client_secret: secret-from-file
api:
  base_url: http://localhost:8080
http:
  timeout_secs: 5
  max_attempts: 4
  base_delay_ms: 250
  max_backoff_secs: 8
  rate_limit:
    requests_per_second: 2
    burst_size: 3
token:
  ttl_secs: 1800
  max_attempts: 2
pagination:
  page_size: 50
  max_rounds: 20
output:
  root: /data/tiktok
";
        let config = ClientConfig::from_yaml_str(yaml).unwrap();
        config.validate().unwrap();

        assert_eq!(
            config.api.video_url().unwrap(),
            "http://localhost:8080/v2/research/video/query/"
        );
        assert_eq!(
            config.api.token_url().unwrap(),
            "http://localhost:8080/v2/oauth/token/"
        );

        let transport = config.transport_config();
        assert_eq!(transport.timeout, Duration::from_secs(5));
        assert_eq!(transport.max_attempts, 4);
        assert_eq!(transport.base_delay, Duration::from_millis(250));
        assert_eq!(transport.max_backoff, Duration::from_secs(8));
        assert_eq!(transport.rate_limit, Some(RateLimiterConfig::new(2, 3)));

        assert_eq!(config.token_ttl(), Duration::from_secs(1800));
        let token_transport = config.token_transport_config();
        assert_eq!(token_transport.max_attempts, 2);
        assert_eq!(token_transport.base_delay, Duration::from_millis(250));
        assert_eq!(config.paginator_config().max_rounds, 20);
        assert_eq!(
            config.output.videos_path(),
            PathBuf::from("/data/tiktok/video_data")
        );
        assert_eq!(
            config.output.comment_error_log_path(),
            PathBuf::from("/data/tiktok/error_log_comments.txt")
        );
    }

    #[test]
    fn test_default_endpoints() {
        let api = ApiConfig::default();
        assert_eq!(
            api.comment_url().unwrap(),
            "https://open.tiktokapis.com/v2/research/video/comment/list/"
        );
    }

    #[test]
    fn test_env_fills_missing_credentials_only() {
        let env: HashMap<&str, &str> = [
            (CLIENT_KEY_ENV, "env-key"),
            (CLIENT_SECRET_ENV, "env-secret"),
        ]
        .into_iter()
        .collect();
        let lookup = |name: &str| env.get(name).map(|v| (*v).to_string());

        let mut from_env = ClientConfig::default();
        from_env.apply_env_with(lookup);
        let creds = from_env.client_credentials().unwrap();
        assert_eq!(creds.client_key, "env-key");
        assert_eq!(creds.client_secret, "env-secret");

        let mut from_file = ClientConfig::from_yaml_str(
            "credentials:\n  client_key: file-key\n  client_secret: ''\n",
        )
        .unwrap();
        from_file.apply_env_with(lookup);
        let creds = from_file.client_credentials().unwrap();
        assert_eq!(creds.client_key, "file-key");
        assert_eq!(creds.client_secret, "env-secret");
    }

    #[test]
    fn test_missing_credentials_fail_validation() {
        let mut config = ClientConfig::default();
        config.apply_env_with(|_| None);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::MissingConfigField { ref field } if field == "credentials.client_key"));
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let base = ClientConfig {
            credentials: CredentialsConfig {
                client_key: Some("k".to_string()),
                client_secret: Some("s".to_string()),
            },
            ..ClientConfig::default()
        };
        base.validate().unwrap();

        let mut bad_url = base.clone();
        bad_url.api.base_url = "not a url".to_string();
        assert!(matches!(bad_url.validate(), Err(Error::InvalidUrl(_))));

        let mut bad_scheme = base.clone();
        bad_scheme.api.base_url = "ftp://example.com".to_string();
        assert!(matches!(bad_scheme.validate(), Err(Error::Config { .. })));

        let mut bad_page = base.clone();
        bad_page.pagination.page_size = 101;
        assert!(bad_page.validate().is_err());

        let mut bad_attempts = base.clone();
        bad_attempts.http.max_attempts = 0;
        assert!(bad_attempts.validate().is_err());

        let mut bad_rate = base;
        bad_rate.http.rate_limit = Some(RateLimiterConfig::new(0, 1));
        assert!(bad_rate.validate().is_err());
    }

    #[test]
    fn test_invalid_yaml_is_parse_error() {
        let err = ClientConfig::from_yaml_str("http: [unclosed").unwrap_err();
        assert!(matches!(err, Error::YamlParse(_)));
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let creds = CredentialsConfig {
            client_key: Some("k".to_string()),
            client_secret: Some("super-secret".to_string()),
        };
        let debug = format!("{creds:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "pagination:\n  max_rounds: 7\n").unwrap();
        let config = ClientConfig::from_file(&path).unwrap();
        assert_eq!(config.pagination.max_rounds, 7);

        assert!(ClientConfig::from_file(dir.path().join("missing.yaml")).is_err());
    }
}
