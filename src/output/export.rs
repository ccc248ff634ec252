//! Tabular export of persisted documents
//!
//! Flattens a directory of documents into one table, written as CSV or
//! Parquet through Arrow. Top-level scalar fields become typed columns;
//! nested values (hashtag lists, effect ids) are kept as JSON text. Id
//! columns are always text so 64-bit ids survive spreadsheet tools.
//!
//! Videos gain an `account` column (taken from the document name) and a
//! `video_url`. Comments are joined to videos on `video_id` to pick up
//! `username` and `video_url`.

use super::document::video_file_entities;
use super::reader::{id_string, read_documents_in};
use crate::error::{Error, Result, ResultExt};
use crate::types::{JsonObject, JsonValue};
use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::csv::WriterBuilder;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

/// Columns exported as text regardless of their JSON type
const TEXT_COLUMNS: &[&str] = &["id", "video_id", "parent_comment_id"];

/// Public URL of a video
pub fn video_url(username: &str, id: &str) -> String {
    format!("https://www.tiktok.com/@{username}/video/{id}")
}

// ============================================================================
// Format
// ============================================================================

/// Output table format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportFormat {
    /// Comma-separated values with a header row
    #[default]
    Csv,
    /// Snappy-compressed Parquet
    Parquet,
}

impl ExportFormat {
    /// File extension without the dot
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Parquet => "parquet",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "parquet" => Ok(ExportFormat::Parquet),
            other => Err(Error::output(format!(
                "unknown export format '{other}', expected 'csv' or 'parquet'"
            ))),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// What an export produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    /// Written file
    pub path: PathBuf,
    /// Data rows
    pub rows: usize,
    /// Columns
    pub columns: usize,
}

// ============================================================================
// Row assembly
// ============================================================================

/// Video rows from a directory of video documents
pub fn video_rows(videos_dir: &Path) -> Result<Vec<JsonObject>> {
    let mut rows = Vec::new();
    for document in read_documents_in(videos_dir)? {
        let stem = document.stem();
        let account = video_file_entities(&stem).to_string();

        for record in document.records {
            let JsonValue::Object(mut row) = record else {
                continue;
            };
            let url = match (
                row.get("username").and_then(JsonValue::as_str),
                row.get("id").and_then(id_string),
            ) {
                (Some(username), Some(id)) => Some(video_url(username, &id)),
                _ => None,
            };
            row.insert("account".to_string(), JsonValue::String(account.clone()));
            if let Some(url) = url {
                row.insert("video_url".to_string(), JsonValue::String(url));
            }
            rows.push(row);
        }
    }
    Ok(rows)
}

/// Comment rows, joined to videos when a video directory is given
pub fn comment_rows(comments_dir: &Path, videos_dir: Option<&Path>) -> Result<Vec<JsonObject>> {
    let owners = match videos_dir {
        Some(dir) => video_owners(dir)?,
        None => HashMap::new(),
    };

    let mut rows = Vec::new();
    let mut unmatched = 0usize;
    for document in read_documents_in(comments_dir)? {
        for record in document.records {
            let JsonValue::Object(mut row) = record else {
                continue;
            };
            let owner = row
                .get("video_id")
                .and_then(id_string)
                .and_then(|id| owners.get(&id).map(|name| (id, name)));
            match owner {
                Some((id, username)) => {
                    row.insert("username".to_string(), JsonValue::String(username.clone()));
                    row.insert(
                        "video_url".to_string(),
                        JsonValue::String(video_url(username, &id)),
                    );
                }
                None => unmatched += 1,
            }
            rows.push(row);
        }
    }

    if videos_dir.is_some() && unmatched > 0 {
        warn!(unmatched, "Comments without a matching video");
    }
    Ok(rows)
}

fn video_owners(videos_dir: &Path) -> Result<HashMap<String, String>> {
    let mut owners = HashMap::new();
    for document in read_documents_in(videos_dir)? {
        for record in &document.records {
            if let (Some(id), Some(username)) = (
                record.get("id").and_then(id_string),
                record.get("username").and_then(JsonValue::as_str),
            ) {
                owners.entry(id).or_insert_with(|| username.to_string());
            }
        }
    }
    Ok(owners)
}

// ============================================================================
// Arrow conversion
// ============================================================================

/// Convert rows into a record batch
///
/// Columns appear in first-seen order. Rows missing a column get a null.
pub fn rows_to_batch(rows: &[JsonObject]) -> Result<RecordBatch> {
    let mut columns: Vec<(String, DataType)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in rows {
        for (key, value) in row {
            let inferred = infer_type(key, value);
            match index.get(key) {
                Some(&i) => columns[i].1 = merge_types(&columns[i].1, &inferred),
                None => {
                    index.insert(key.clone(), columns.len());
                    columns.push((key.clone(), inferred));
                }
            }
        }
    }

    let fields: Vec<Field> = columns
        .iter()
        .map(|(name, dtype)| {
            // All-null columns are written as empty text
            let dtype = if *dtype == DataType::Null {
                DataType::Utf8
            } else {
                dtype.clone()
            };
            Field::new(name, dtype, true)
        })
        .collect();
    let schema = Arc::new(Schema::new(fields));

    if rows.is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }

    let arrays = schema
        .fields()
        .iter()
        .map(|field| {
            let values: Vec<Option<&JsonValue>> = rows
                .iter()
                .map(|row| row.get(field.name()).filter(|v| !v.is_null()))
                .collect();
            build_array(&values, field.data_type())
        })
        .collect::<Vec<ArrayRef>>();

    RecordBatch::try_new(schema, arrays)
        .map_err(|e| Error::output(format!("Failed to create RecordBatch: {e}")))
}

fn infer_type(key: &str, value: &JsonValue) -> DataType {
    if TEXT_COLUMNS.contains(&key) {
        return DataType::Utf8;
    }
    match value {
        JsonValue::Null => DataType::Null,
        JsonValue::Bool(_) => DataType::Boolean,
        JsonValue::Number(n) if n.is_i64() => DataType::Int64,
        // u64 beyond i64 would lose digits as a float
        JsonValue::Number(n) if n.is_u64() => DataType::Utf8,
        JsonValue::Number(_) => DataType::Float64,
        JsonValue::String(_) | JsonValue::Array(_) | JsonValue::Object(_) => DataType::Utf8,
    }
}

fn merge_types(a: &DataType, b: &DataType) -> DataType {
    match (a, b) {
        (a, b) if a == b => a.clone(),
        (DataType::Null, other) | (other, DataType::Null) => other.clone(),
        (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => {
            DataType::Float64
        }
        _ => DataType::Utf8,
    }
}

fn build_array(values: &[Option<&JsonValue>], data_type: &DataType) -> ArrayRef {
    match data_type {
        DataType::Boolean => Arc::new(
            values
                .iter()
                .map(|v| v.and_then(JsonValue::as_bool))
                .collect::<BooleanArray>(),
        ),
        DataType::Int64 => Arc::new(
            values
                .iter()
                .map(|v| v.and_then(JsonValue::as_i64))
                .collect::<Int64Array>(),
        ),
        DataType::Float64 => Arc::new(
            values
                .iter()
                .map(|v| v.and_then(JsonValue::as_f64))
                .collect::<Float64Array>(),
        ),
        _ => Arc::new(
            values
                .iter()
                .map(|v| {
                    v.map(|v| match v {
                        JsonValue::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                })
                .collect::<StringArray>(),
        ),
    }
}

// ============================================================================
// Writers
// ============================================================================

/// Write a batch to `path` in the given format, creating parent directories
pub fn write_table(batch: &RecordBatch, path: &Path, format: ExportFormat) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;

    match format {
        ExportFormat::Csv => {
            let mut writer = WriterBuilder::new().with_header(true).build(file);
            writer.write(batch)?;
        }
        ExportFormat::Parquet => {
            let props = WriterProperties::builder()
                .set_compression(Compression::SNAPPY)
                .build();
            let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
            writer.write(batch)?;
            writer.close()?;
        }
    }
    Ok(())
}

/// Export every video document in `videos_dir`
///
/// Returns `None` without writing anything when there are no videos.
pub fn export_videos(
    videos_dir: &Path,
    output: &Path,
    format: ExportFormat,
) -> Result<Option<ExportSummary>> {
    let rows = video_rows(videos_dir)?;
    write_rows(&rows, output, format, "videos")
}

/// Export every comment document in `comments_dir`
///
/// With `videos_dir`, comments pick up the owning video's `username` and
/// `video_url`.
pub fn export_comments(
    comments_dir: &Path,
    videos_dir: Option<&Path>,
    output: &Path,
    format: ExportFormat,
) -> Result<Option<ExportSummary>> {
    let rows = comment_rows(comments_dir, videos_dir)?;
    write_rows(&rows, output, format, "comments")
}

fn write_rows(
    rows: &[JsonObject],
    output: &Path,
    format: ExportFormat,
    what: &str,
) -> Result<Option<ExportSummary>> {
    if rows.is_empty() {
        warn!(what, "Nothing to export");
        return Ok(None);
    }

    let batch = rows_to_batch(rows)?;
    write_table(&batch, output, format)?;
    info!(what, rows = batch.num_rows(), path = %output.display(), %format, "Exported table");

    Ok(Some(ExportSummary {
        path: output.to_path_buf(),
        rows: batch.num_rows(),
        columns: batch.num_columns(),
    }))
}
