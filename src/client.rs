//! Research API client
//!
//! Wires the token manager, transport and paginator together behind one
//! type. A client owns exactly one token; fetches run one at a time.

use crate::auth::{Credential, TokenManager};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::http::{RetryingTransport, Sleeper};
use crate::output::{comment_file_name, video_file_name, ErrorLog};
use crate::pagination::{Endpoint, FetchOutcome, FetchRequest, Paginator};
use crate::query::{comment_query, Mode, VideoQueryBuilder, COMMENT_FIELDS, VIDEO_FIELDS};
use crate::types::Clock;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Result key of the video endpoint
const VIDEOS_KEY: &str = "videos";

/// Result key of the comment endpoint
const COMMENTS_KEY: &str = "comments";

/// Client for the research API
#[derive(Debug)]
pub struct ResearchClient {
    config: ClientConfig,
    tokens: TokenManager,
    transport: RetryingTransport,
    video_endpoint: Endpoint,
    comment_endpoint: Endpoint,
    video_errors: ErrorLog,
    comment_errors: ErrorLog,
}

impl ResearchClient {
    /// Build a client without contacting the API
    ///
    /// The first token is requested by the first fetch.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let transport = RetryingTransport::new(config.transport_config())?;
        let tokens = TokenManager::with_transport(
            config.client_credentials()?,
            config.api.token_url()?,
            RetryingTransport::with_client(
                transport.inner().clone(),
                config.token_transport_config(),
            ),
        )
        .with_ttl(config.token_ttl());

        Ok(Self {
            video_endpoint: Endpoint::new(config.api.video_url()?, VIDEO_FIELDS, VIDEOS_KEY),
            comment_endpoint: Endpoint::new(
                config.api.comment_url()?,
                COMMENT_FIELDS,
                COMMENTS_KEY,
            ),
            video_errors: ErrorLog::new(config.output.video_error_log_path()),
            comment_errors: ErrorLog::new(config.output.comment_error_log_path()),
            config,
            tokens,
            transport,
        })
    }

    /// Build a client and authenticate immediately
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let client = Self::new(config)?;
        client.authenticate().await?;
        Ok(client)
    }

    /// Exchange the credentials for a fresh token now
    pub async fn authenticate(&self) -> Result<Credential> {
        self.tokens.refresh().await
    }

    /// Replace the sleeper used between retries
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.tokens = self.tokens.with_sleeper(Arc::clone(&sleeper));
        self.transport = self.transport.with_sleeper(sleeper);
        self
    }

    /// Replace the clock used for token expiry
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.tokens = self.tokens.with_clock(clock);
        self
    }

    /// Active configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Token manager of this client
    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Start a video query using the configured page size
    pub fn video_query<I, S>(
        &self,
        mode: Mode,
        entities: I,
        start_date: &str,
        end_date: &str,
    ) -> VideoQueryBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        VideoQueryBuilder::new(mode, entities, start_date, end_date)
            .page_size(self.config.pagination.page_size)
    }

    /// Fetch every video matching a query
    pub async fn fetch_videos(&self, builder: &VideoQueryBuilder) -> Result<FetchOutcome> {
        let query = builder.build()?;
        let file_name = video_file_name(
            builder.entities(),
            builder.start_date(),
            builder.end_date(),
        );

        let request = FetchRequest {
            endpoint: self.video_endpoint.clone(),
            entity: builder.entity_label(),
            query,
            output_path: self.config.output.videos_path().join(file_name),
        };

        self.paginator(&self.video_errors).fetch(request).await
    }

    /// Fetch every reachable comment on one video
    pub async fn fetch_comments(&self, video_id: &str) -> Result<FetchOutcome> {
        let query = comment_query(video_id)?.with_page_size(self.config.pagination.page_size);
        let video_id = video_id.trim();

        let request = FetchRequest {
            endpoint: self.comment_endpoint.clone(),
            entity: video_id.to_string(),
            query,
            output_path: self
                .config
                .output
                .comments_path()
                .join(comment_file_name(video_id)),
        };

        self.paginator(&self.comment_errors).fetch(request).await
    }

    /// Run several video queries
    ///
    /// A failing query never stops the rest, except an authentication
    /// failure: the remaining queries are then skipped.
    pub async fn fetch_videos_batch(&self, queries: &[VideoQueryBuilder]) -> BatchReport {
        let mut report = BatchReport::default();
        for (i, builder) in queries.iter().enumerate() {
            let entity = builder.entity_label();
            info!(entity = %entity, index = i + 1, of = queries.len(), "Fetching videos");
            if report.record(entity, self.fetch_videos(builder).await) {
                report.skip(queries[i + 1..].iter().map(VideoQueryBuilder::entity_label));
                break;
            }
        }
        report.log_summary("videos");
        report
    }

    /// Fetch comments for several videos
    ///
    /// A failing video never stops the rest, except an authentication
    /// failure: the remaining videos are then skipped.
    pub async fn fetch_comments_batch<S: AsRef<str>>(&self, video_ids: &[S]) -> BatchReport {
        let mut report = BatchReport::default();
        for (i, video_id) in video_ids.iter().enumerate() {
            let video_id = video_id.as_ref();
            info!(video_id, index = i + 1, of = video_ids.len(), "Fetching comments");
            if report.record(video_id.to_string(), self.fetch_comments(video_id).await) {
                report.skip(video_ids[i + 1..].iter().map(|v| v.as_ref().to_string()));
                break;
            }
        }
        report.log_summary("comments");
        report
    }

    fn paginator<'a>(&'a self, errors: &'a ErrorLog) -> Paginator<'a> {
        Paginator::new(&self.tokens, &self.transport)
            .with_config(self.config.paginator_config())
            .with_error_log(errors)
    }
}

// ============================================================================
// Batch Report
// ============================================================================

/// An entity whose fetch returned an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    /// Entity id
    pub entity: String,
    /// Error message
    pub error: String,
}

/// Results of a batch, one entry per entity
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Fetches that ran to a terminal status, aborted ones included
    pub outcomes: Vec<FetchOutcome>,
    /// Fetches that returned an error
    pub failures: Vec<BatchFailure>,
    /// Entities never attempted because authentication failed first
    pub skipped: Vec<String>,
}

impl BatchReport {
    /// Record one result; returns whether authentication failed
    fn record(&mut self, entity: String, result: Result<FetchOutcome>) -> bool {
        match result {
            Ok(outcome) => {
                let auth_failed = outcome.status.is_auth_failure();
                if outcome.is_aborted() {
                    warn!(entity = %entity, status = %outcome.status, "Fetch aborted, partial results kept");
                }
                self.outcomes.push(outcome);
                auth_failed
            }
            Err(e) => {
                error!(entity = %entity, error = %e, "Fetch failed");
                let auth_failed = matches!(e, Error::Auth { .. });
                self.failures.push(BatchFailure {
                    entity,
                    error: e.to_string(),
                });
                auth_failed
            }
        }
    }

    fn skip(&mut self, entities: impl Iterator<Item = String>) {
        self.skipped.extend(entities);
        if !self.skipped.is_empty() {
            error!(skipped = self.skipped.len(), "Authentication failed, skipping remaining entities");
        }
    }

    fn log_summary(&self, what: &str) {
        info!(
            what,
            entities = self.outcomes.len() + self.failures.len() + self.skipped.len(),
            items = self.total_items(),
            aborted = self.aborted().count(),
            failed = self.failures.len(),
            skipped = self.skipped.len(),
            "Batch finished"
        );
    }

    /// Items fetched across all entities
    pub fn total_items(&self) -> usize {
        self.outcomes.iter().map(FetchOutcome::len).sum()
    }

    /// Fetches cut short by an error status
    pub fn aborted(&self) -> impl Iterator<Item = &FetchOutcome> {
        self.outcomes.iter().filter(|o| o.is_aborted())
    }

    /// Whether every entity completed without error or abort
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.skipped.is_empty() && self.aborted().next().is_none()
    }
}
