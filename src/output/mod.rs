//! Output module
//!
//! Everything that touches the filesystem.
//!
//! # Overview
//!
//! - Persisting fetch results as JSON array documents
//! - The append-only error log of failed entities
//! - Reading documents back (video ids, usernames)
//! - Exporting documents to CSV or Parquet through Arrow

mod document;
mod error_log;
mod export;
mod reader;

pub use document::{
    comment_file_name, read_documents, video_file_entities, video_file_name, write_documents,
    COMMENT_SUFFIX, VIDEO_SUFFIX,
};
pub use error_log::ErrorLog;
pub use export::{
    comment_rows, export_comments, export_videos, rows_to_batch, video_rows, video_url,
    write_table, ExportFormat, ExportSummary,
};
pub use reader::{
    get_usernames, get_video_ids, id_string, list_documents, read_documents_in, Document,
};
