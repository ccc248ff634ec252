//! Cursor paginator
//!
//! Drives one fetch from the first page to a terminal status, then
//! persists whatever was collected.

use super::types::{
    api_error, AbortReason, Envelope, FetchOutcome, FetchRequest, FetchStatus,
};
use crate::auth::TokenManager;
use crate::error::{Error, Result};
use crate::http::{RequestConfig, RetryingTransport};
use crate::output::{write_documents, ErrorLog};
use tracing::{debug, error, info, warn};

/// Default upper bound on requests per fetch
pub const DEFAULT_MAX_ROUNDS: usize = 10_000;

/// Paginator configuration
#[derive(Debug, Clone)]
pub struct PaginatorConfig {
    /// Requests per fetch before giving up
    pub max_rounds: usize,
}

impl Default for PaginatorConfig {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }
}

/// Pages through one endpoint for one entity at a time
#[derive(Debug)]
pub struct Paginator<'a> {
    tokens: &'a TokenManager,
    transport: &'a RetryingTransport,
    config: PaginatorConfig,
    error_log: Option<&'a ErrorLog>,
}

impl<'a> Paginator<'a> {
    /// Create a paginator using the given token manager and transport
    pub fn new(tokens: &'a TokenManager, transport: &'a RetryingTransport) -> Self {
        Self {
            tokens,
            transport,
            config: PaginatorConfig::default(),
            error_log: None,
        }
    }

    /// Replace the configuration
    #[must_use]
    pub fn with_config(mut self, config: PaginatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Record entities whose responses could not be parsed
    #[must_use]
    pub fn with_error_log(mut self, log: &'a ErrorLog) -> Self {
        self.error_log = Some(log);
        self
    }

    /// Fetch every page for the request and persist the result
    ///
    /// Persistence failures, and authentication failures before the first
    /// page, are returned as errors. Everything else ends the loop with a
    /// [`FetchStatus`], keeping the pages already collected.
    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchOutcome> {
        let FetchRequest {
            endpoint,
            entity,
            mut query,
            output_path,
        } = request;

        let mut items = Vec::new();
        let mut pages = 0usize;
        let mut rounds = 0usize;

        info!(entity = %entity, url = %endpoint.url, "Starting fetch");

        let status = loop {
            if query.cursor_exhausted() {
                info!(entity = %entity, cursor = query.cursor, "Cursor ceiling reached");
                break FetchStatus::CursorLimit;
            }
            if rounds >= self.config.max_rounds {
                warn!(entity = %entity, rounds, "Maximum rounds reached, stopping");
                break FetchStatus::RoundLimit;
            }
            rounds += 1;

            let credential = match self.tokens.ensure_valid().await {
                Ok(credential) => credential,
                Err(Error::Auth { message }) if !items.is_empty() => {
                    error!(entity = %entity, total = items.len(), error = %message, "Token refresh failed mid-fetch");
                    break FetchStatus::Aborted(AbortReason::Auth { message });
                }
                Err(e) => return Err(e),
            };
            let request = RequestConfig::new()
                .query("fields", endpoint.fields.as_str())
                .bearer(&credential.token)
                .header("Content-Type", "application/json")
                .json(query.to_body()?);

            debug!(entity = %entity, cursor = query.cursor, search_id = %query.search_id, "Requesting page");

            let response = match self.transport.send(&endpoint.url, &request).await {
                Ok(response) => response,
                Err(Error::TransportExhausted {
                    attempts,
                    last_error,
                }) => {
                    error!(entity = %entity, attempts, error = %last_error, "Giving up on page");
                    break FetchStatus::Aborted(AbortReason::TransportExhausted {
                        attempts,
                        message: last_error,
                    });
                }
                Err(e) => return Err(e),
            };

            let page = match Envelope::parse(response.status, &response.body, &endpoint.result_key)
            {
                Ok(Envelope::Page(page)) => page,
                Ok(Envelope::Missing { key }) => {
                    warn!(
                        entity = %entity,
                        missing = %key,
                        api_error = ?api_error(&response.body),
                        "Unexpected {} response, stopping",
                        endpoint.result_key
                    );
                    break FetchStatus::SoftStop;
                }
                Err(Error::ResponseParse {
                    status,
                    message,
                    body,
                }) => {
                    error!(
                        entity = %entity,
                        status,
                        error = %message,
                        body = %body,
                        "Error parsing {} response",
                        endpoint.result_key
                    );
                    self.record_failure(&entity).await;
                    break FetchStatus::Aborted(AbortReason::ResponseParse { status, body });
                }
                Err(e) => return Err(e),
            };

            pages += 1;
            items.extend(page.items);
            info!(entity = %entity, page = pages, total = items.len(), "Fetched {} {}", items.len(), endpoint.result_key);

            let moved = query.advance(page.cursor, &page.search_id);

            if query.ceiling_reached(items.len()) {
                info!(entity = %entity, total = items.len(), "Result ceiling reached");
                break FetchStatus::CeilingReached;
            }
            if !page.has_more {
                break FetchStatus::Exhausted;
            }
            if !moved {
                warn!(
                    entity = %entity,
                    cursor = query.cursor,
                    "Server reported more pages without advancing the cursor, stopping"
                );
                break FetchStatus::Stalled;
            }
        };

        let output_path = if items.is_empty() {
            warn!(entity = %entity, status = %status, "No {} retrieved", endpoint.result_key);
            None
        } else {
            write_documents(&output_path, &items).await?;
            info!(
                entity = %entity,
                total = items.len(),
                path = %output_path.display(),
                "Saved {} {}",
                items.len(),
                endpoint.result_key
            );
            Some(output_path)
        };

        Ok(FetchOutcome {
            entity,
            items,
            pages,
            status,
            output_path,
        })
    }

    async fn record_failure(&self, entity: &str) {
        if let Some(log) = self.error_log {
            if let Err(e) = log.append(entity).await {
                error!(entity, log = %log.path().display(), error = %e, "Failed to write error log");
            }
        }
    }
}
