//! CLI module
//!
//! Command-line interface for fetching and exporting research data.
//!
//! # Commands
//!
//! - `videos` - Fetch videos by account or hashtag
//! - `comments` - Fetch comments for fetched (or listed) videos
//! - `export` - Flatten documents into a CSV or Parquet table
//! - `token` - Check that the credentials work

mod commands;
mod runner;

pub use commands::{Cli, Commands, ExportKind, MessageFormat};
pub use runner::Runner;
