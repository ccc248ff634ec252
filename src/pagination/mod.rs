//! Pagination module
//!
//! Cursor-based pagination over the research endpoints. Each request
//! carries the cursor and search id returned by the previous page; the
//! loop ends when the server runs out of data or one of the guards trips:
//!
//! - result ceiling (enough items collected)
//! - cursor ceiling (the comment endpoint stops at 1000)
//! - stalled cursor (`has_more` without progress)
//! - round limit
//!
//! Pages already fetched are always persisted, even when a later page
//! fails.

mod paginator;
mod types;

pub use paginator::{Paginator, PaginatorConfig, DEFAULT_MAX_ROUNDS};
pub use types::{
    api_error, AbortReason, Endpoint, Envelope, FetchOutcome, FetchRequest, FetchStatus,
    PageQuery, PageResponse,
};

#[cfg(test)]
mod tests;
