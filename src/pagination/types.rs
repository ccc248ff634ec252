//! Pagination types
//!
//! The request side ([`PageQuery`]), the parsed response envelope
//! ([`PageResponse`]) and the result of a whole fetch ([`FetchOutcome`]).

use crate::error::{Error, Result};
use crate::http::snippet;
use crate::query::{QueryFilter, MAX_PAGE_SIZE};
use crate::types::{JsonObject, JsonValue};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

// ============================================================================
// Request
// ============================================================================

/// Body of one paginated request, advanced in place between pages
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageQuery {
    /// Entity-specific filter, flattened into the body
    #[serde(flatten)]
    pub filter: QueryFilter,
    /// Items per page
    pub max_count: u32,
    /// Position in the result set
    pub cursor: u64,
    /// Server-side search session, empty until the first page
    pub search_id: String,
    /// Stop once at least this many items were fetched
    #[serde(skip)]
    pub result_ceiling: Option<usize>,
    /// Never request a cursor at or beyond this position
    #[serde(skip)]
    pub cursor_ceiling: Option<u64>,
}

impl PageQuery {
    /// First-page query for a filter
    pub fn new(filter: QueryFilter) -> Self {
        Self {
            filter,
            max_count: MAX_PAGE_SIZE,
            cursor: 0,
            search_id: String::new(),
            result_ceiling: None,
            cursor_ceiling: None,
        }
    }

    /// Set the page size, clamped to what the API accepts
    #[must_use]
    pub fn with_page_size(mut self, size: u32) -> Self {
        self.max_count = size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Set the result ceiling
    #[must_use]
    pub fn with_result_ceiling(mut self, ceiling: Option<usize>) -> Self {
        self.result_ceiling = ceiling;
        self
    }

    /// Set the cursor ceiling
    #[must_use]
    pub fn with_cursor_ceiling(mut self, ceiling: u64) -> Self {
        self.cursor_ceiling = Some(ceiling);
        self
    }

    /// Move to the position reported by a page
    ///
    /// Returns `false` when neither the cursor nor the search id changed.
    pub fn advance(&mut self, cursor: u64, search_id: &str) -> bool {
        let moved = self.cursor != cursor || self.search_id != search_id;
        self.cursor = cursor;
        self.search_id = search_id.to_string();
        moved
    }

    /// Whether the next request would reach the cursor ceiling
    pub fn cursor_exhausted(&self) -> bool {
        self.cursor_ceiling
            .is_some_and(|ceiling| self.cursor >= ceiling)
    }

    /// Whether `total` items satisfy the result ceiling
    pub fn ceiling_reached(&self, total: usize) -> bool {
        self.result_ceiling.is_some_and(|ceiling| total >= ceiling)
    }

    /// Serialize to the JSON request body
    pub fn to_body(&self) -> Result<JsonValue> {
        Ok(serde_json::to_value(self)?)
    }
}

// ============================================================================
// Response
// ============================================================================

/// One parsed page of results
#[derive(Debug, Clone, PartialEq)]
pub struct PageResponse {
    /// Result items in server order
    pub items: Vec<JsonValue>,
    /// Server says more pages exist
    pub has_more: bool,
    /// Cursor for the next page
    pub cursor: u64,
    /// Search session for the next page
    pub search_id: String,
}

/// What a response body turned out to be
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// A well-formed page
    Page(PageResponse),
    /// The body is valid but carries no page; treated as end of data
    Missing {
        /// Which key was absent
        key: String,
    },
}

impl Envelope {
    /// Parse a response body
    ///
    /// Structural problems are hard errors. A missing `data` object or
    /// result key is a soft stop.
    pub fn parse(status: u16, body: &str, result_key: &str) -> Result<Self> {
        let fail = |message: String| Error::response_parse(status, message, snippet(body));

        let value: JsonValue = serde_json::from_str(body)
            .map_err(|e| fail(format!("body is not valid JSON: {e}")))?;
        let root = value
            .as_object()
            .ok_or_else(|| fail("body is not a JSON object".to_string()))?;

        let data = match root.get("data") {
            None | Some(JsonValue::Null) => {
                return Ok(Envelope::Missing {
                    key: "data".to_string(),
                })
            }
            Some(JsonValue::Object(data)) => data,
            Some(_) => return Err(fail("'data' is not an object".to_string())),
        };

        let items = match data.get(result_key) {
            None | Some(JsonValue::Null) => {
                return Ok(Envelope::Missing {
                    key: result_key.to_string(),
                })
            }
            Some(JsonValue::Array(items)) => items.clone(),
            Some(_) => return Err(fail(format!("'{result_key}' is not an array"))),
        };

        let has_more = match data.get("has_more") {
            None | Some(JsonValue::Null) => false,
            Some(JsonValue::Bool(b)) => *b,
            Some(_) => return Err(fail("'has_more' is not a boolean".to_string())),
        };

        let cursor = match data.get("cursor") {
            None | Some(JsonValue::Null) => 0,
            Some(v) => v
                .as_u64()
                .ok_or_else(|| fail("'cursor' is not a non-negative integer".to_string()))?,
        };

        let search_id = match data.get("search_id") {
            None | Some(JsonValue::Null) => String::new(),
            Some(JsonValue::String(s)) => s.clone(),
            // Search ids are large integers; some responses carry them unquoted
            Some(JsonValue::Number(n)) => n.to_string(),
            Some(_) => return Err(fail("'search_id' is not a string".to_string())),
        };

        Ok(Envelope::Page(PageResponse {
            items,
            has_more,
            cursor,
            search_id,
        }))
    }
}

/// Extract the API's own `error` object, if any, for logging
pub fn api_error(body: &str) -> Option<JsonObject> {
    let value: JsonValue = serde_json::from_str(body).ok()?;
    value.get("error")?.as_object().cloned()
}

// ============================================================================
// Outcome
// ============================================================================

/// Why a fetch was cut short
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// A response body could not be understood
    ResponseParse {
        /// HTTP status of the bad response
        status: u16,
        /// Truncated body
        body: String,
    },
    /// The transport gave up on a page
    TransportExhausted {
        /// Attempts made
        attempts: u32,
        /// Last failure
        message: String,
    },
    /// The token could not be renewed after pages were already fetched
    Auth {
        /// Refresh failure
        message: String,
    },
}

/// How a fetch ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    /// Server reported no more pages
    Exhausted,
    /// The result ceiling was reached
    CeilingReached,
    /// The upstream cursor ceiling was reached
    CursorLimit,
    /// The envelope lacked the expected key
    SoftStop,
    /// Server kept reporting more pages without moving the cursor
    Stalled,
    /// The maximum number of rounds was reached
    RoundLimit,
    /// Cut short by an error; fetched pages were kept
    Aborted(AbortReason),
}

impl FetchStatus {
    /// Whether the fetch ended because of an error
    pub fn is_aborted(&self) -> bool {
        matches!(self, FetchStatus::Aborted(_))
    }

    /// Whether the fetch ended because the token could not be renewed
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, FetchStatus::Aborted(AbortReason::Auth { .. }))
    }
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchStatus::Exhausted => f.write_str("exhausted"),
            FetchStatus::CeilingReached => f.write_str("result ceiling reached"),
            FetchStatus::CursorLimit => f.write_str("cursor limit reached"),
            FetchStatus::SoftStop => f.write_str("response missing data"),
            FetchStatus::Stalled => f.write_str("cursor stalled"),
            FetchStatus::RoundLimit => f.write_str("round limit reached"),
            FetchStatus::Aborted(AbortReason::ResponseParse { status, .. }) => {
                write!(f, "aborted: unparseable response (HTTP {status})")
            }
            FetchStatus::Aborted(AbortReason::TransportExhausted { attempts, message }) => {
                write!(f, "aborted after {attempts} attempts: {message}")
            }
            FetchStatus::Aborted(AbortReason::Auth { message }) => {
                write!(f, "aborted: token refresh failed: {message}")
            }
        }
    }
}

/// Result of fetching every page for one entity
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Entity the fetch was for
    pub entity: String,
    /// All items, in server order
    pub items: Vec<JsonValue>,
    /// Pages successfully parsed
    pub pages: usize,
    /// How the fetch ended
    pub status: FetchStatus,
    /// Where the items were written; `None` when there were none
    pub output_path: Option<PathBuf>,
}

impl FetchOutcome {
    /// Number of items fetched
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing was fetched
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether the fetch ended because of an error
    pub fn is_aborted(&self) -> bool {
        self.status.is_aborted()
    }
}

// ============================================================================
// Endpoint
// ============================================================================

/// A paginated research endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Full URL without query string
    pub url: String,
    /// Comma-separated field list sent as `?fields=`
    pub fields: String,
    /// Key of the result array inside `data`
    pub result_key: String,
}

impl Endpoint {
    /// Create an endpoint
    pub fn new(
        url: impl Into<String>,
        fields: impl Into<String>,
        result_key: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            fields: fields.into(),
            result_key: result_key.into(),
        }
    }
}

/// Everything needed for one fetch
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Endpoint to page through
    pub endpoint: Endpoint,
    /// Entity id, used in logs and the error log
    pub entity: String,
    /// First-page query
    pub query: PageQuery,
    /// Where to write the collected items
    pub output_path: PathBuf,
}
