//! JSON document persistence
//!
//! Every fetch produces exactly one document: a JSON array of the raw
//! records, written whole. Writes go to a sibling temp file first and are
//! renamed into place, so a crash never leaves a half-written document.

use crate::error::{Error, Result, ResultExt};
use crate::types::JsonValue;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Suffix of video documents
pub const VIDEO_SUFFIX: &str = "_videos.json";

/// Suffix of comment documents
pub const COMMENT_SUFFIX: &str = "_comments.json";

/// File name for a video fetch
///
/// `["a b", "c/d"]` from 20240101 to 20240131 becomes
/// `a_b-c_d_20240101_20240131_videos.json`.
pub fn video_file_name(entities: &[String], start_date: &str, end_date: &str) -> String {
    format!(
        "{}_{start_date}_{end_date}{VIDEO_SUFFIX}",
        safe_name(&entities.join("-"))
    )
}

/// Entity part of a video document stem
///
/// Inverse of [`video_file_name`]: `nasa_official_20240101_20240131_videos`
/// gives `nasa_official`. Stems that do not follow the naming come back
/// unchanged.
pub fn video_file_entities(stem: &str) -> &str {
    let parsed = stem
        .strip_suffix(VIDEO_SUFFIX.trim_end_matches(".json"))
        .and_then(|rest| {
            let mut parts = rest.rsplitn(3, '_');
            let end = parts.next()?;
            let start = parts.next()?;
            let entities = parts.next()?;
            [start, end]
                .iter()
                .all(|d| d.len() == 8 && d.bytes().all(|b| b.is_ascii_digit()))
                .then_some(entities)
        });
    parsed.unwrap_or(stem)
}

/// File name for a comment fetch
pub fn comment_file_name(video_id: &str) -> String {
    format!("{}{COMMENT_SUFFIX}", safe_name(video_id))
}

fn safe_name(raw: &str) -> String {
    raw.replace(['/', '\\', ' '], "_")
}

/// Write records as one JSON array document, replacing any existing file
pub async fn write_documents(path: &Path, records: &[JsonValue]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    let bytes = serde_json::to_vec(records)?;
    let tmp = temp_path(path);

    fs::write(&tmp, &bytes)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("renaming {} to {}", tmp.display(), path.display()))?;

    Ok(())
}

/// Read a document written by [`write_documents`]
pub async fn read_documents(path: &Path) -> Result<Vec<JsonValue>> {
    let bytes = fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    parse_documents(path, &bytes)
}

/// Parse document bytes, requiring a top-level array
pub(crate) fn parse_documents(path: &Path, bytes: &[u8]) -> Result<Vec<JsonValue>> {
    match serde_json::from_slice(bytes)? {
        JsonValue::Array(records) => Ok(records),
        _ => Err(Error::output(format!(
            "{} does not contain a JSON array",
            path.display()
        ))),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
