// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # tiktok-research
//!
//! Client for the TikTok Research API: fetches videos and comments through
//! cursor pagination, survives rate limiting and token expiry, and keeps
//! every page it already has when something goes wrong.
//!
//! ## Features
//!
//! - **Token lifecycle**: client-credentials tokens, renewed transparently
//! - **Retry**: exponential backoff on 429s, server errors and network failures
//! - **Pagination**: cursor and search-session tracking with stall, round and
//!   cursor-ceiling guards
//! - **Persistence**: one JSON array document per fetch, written atomically
//! - **Export**: joined CSV or Parquet tables through Arrow
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tiktok_research::output::id_string;
//! use tiktok_research::{ClientConfig, Mode, ResearchClient, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut config = ClientConfig::from_file("tiktok.yaml")?;
//!     config.apply_env();
//!
//!     let client = ResearchClient::connect(config).await?;
//!     let query = client
//!         .video_query(Mode::Username, ["nasa"], "20240101", "20240131")
//!         .regions(["US"]);
//!
//!     let outcome = client.fetch_videos(&query).await?;
//!     println!("{} videos, {}", outcome.len(), outcome.status);
//!
//!     let ids: Vec<String> = outcome
//!         .items
//!         .iter()
//!         .filter_map(|v| v.get("id").and_then(id_string))
//!         .collect();
//!     let report = client.fetch_comments_batch(&ids).await;
//!     println!("{} comments", report.total_items());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        ResearchClient                        │
//! │   fetch_videos()   fetch_comments()   *_batch() → BatchReport │
//! └──────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────┬────────────────┴──┬──────────────┬────────────┐
//! │    Query    │     Paginator     │     Auth     │   Output   │
//! ├─────────────┼───────────────────┼──────────────┼────────────┤
//! │ Mode        │ PageQuery         │ TokenManager │ Documents  │
//! │ Conditions  │ Envelope parsing  │ Credential   │ Error log  │
//! │ Date range  │ Ceilings, stalls  │ Clock        │ CSV/Parquet│
//! └─────────────┴─────────┬─────────┴──────────────┴────────────┘
//!                         │
//!               ┌─────────┴─────────┐
//!               │ RetryingTransport │
//!               │ backoff, limiter  │
//!               └───────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and the clock abstraction
pub mod types;

/// Configuration loading and validation
pub mod config;

/// Token management
pub mod auth;

/// HTTP transport with retry and rate limiting
pub mod http;

/// Cursor pagination
pub mod pagination;

/// Query builders
pub mod query;

/// Documents, error logs and exports
pub mod output;

/// High-level client
pub mod client;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

// Re-export commonly used types
pub use client::{BatchFailure, BatchReport, ResearchClient};
pub use config::ClientConfig;
pub use pagination::{FetchOutcome, FetchStatus};
pub use query::{Mode, VideoQueryBuilder};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
