//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// TikTok Research API client
#[derive(Parser, Debug)]
#[command(name = "tiktok-research")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (YAML)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Output root directory (overrides `output.root`)
    #[arg(short, long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Message format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: MessageFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch videos by account or hashtag
    Videos {
        /// Selection mode: `username` or `hashtag_name`
        #[arg(short, long, default_value = "username")]
        mode: String,

        /// Accounts or hashtags (comma-separated)
        #[arg(short, long, value_delimiter = ',', required = true)]
        entities: Vec<String>,

        /// First day, YYYYMMDD
        #[arg(long)]
        start_date: String,

        /// Last day, YYYYMMDD
        #[arg(long)]
        end_date: String,

        /// Only videos with these hashtags (username mode)
        #[arg(long, value_delimiter = ',')]
        filter_hashtags: Vec<String>,

        /// Only videos from these region codes
        #[arg(long, value_delimiter = ',')]
        regions: Vec<String>,

        /// Stop after at least this many videos per entity
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Fetch comments for videos
    Comments {
        /// Video ids (comma-separated); defaults to every fetched video
        #[arg(long, value_delimiter = ',')]
        video_ids: Vec<String>,

        /// Directory of video documents to take ids from
        #[arg(long)]
        from_videos: Option<PathBuf>,
    },

    /// Export fetched documents as a table
    Export {
        /// What to export
        #[arg(value_enum)]
        kind: ExportKind,

        /// Table format: `csv` or `parquet`
        #[arg(long, default_value = "csv")]
        table_format: String,

        /// Output file (defaults to `<root>/<kind>_data.<ext>`)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Do not join comments to videos
        #[arg(long)]
        no_join: bool,
    },

    /// Request an access token and report its expiry
    Token,
}

/// Document set to export
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportKind {
    /// Video documents
    Videos,
    /// Comment documents
    Comments,
}

/// Format of progress messages on stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum MessageFormat {
    /// JSON output (one message per line)
    Json,
    /// Human-readable output
    Pretty,
}
