//! Readers over directories of persisted documents
//!
//! Used to chain fetches (video ids drive comment fetches) and to build
//! exports. Unreadable documents are logged and skipped so one bad file
//! does not hide the rest of a directory.

use super::document::parse_documents;
use crate::error::{Result, ResultExt};
use crate::types::JsonValue;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// A document and the records it holds
#[derive(Debug, Clone)]
pub struct Document {
    /// Source file
    pub path: PathBuf,
    /// Records in file order
    pub records: Vec<JsonValue>,
}

impl Document {
    /// File name without the `.json` extension
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// JSON documents directly inside `dir`, sorted by file name
///
/// Hidden files (`.DS_Store` and friends) and temp files are ignored.
pub fn list_documents(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with('.') || !name.ends_with(".json") || !path.is_file() {
            continue;
        }
        paths.push(path);
    }
    paths.sort();
    Ok(paths)
}

/// Load every readable document in `dir`
pub fn read_documents_in(dir: &Path) -> Result<Vec<Document>> {
    let mut documents = Vec::new();
    for path in list_documents(dir)? {
        let loaded = fs::read(&path)
            .map_err(Into::into)
            .and_then(|bytes| parse_documents(&path, &bytes));
        match loaded {
            Ok(records) => documents.push(Document { path, records }),
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable document"),
        }
    }
    Ok(documents)
}

/// Ids of every video in a directory of video documents, in file order
pub fn get_video_ids(dir: &Path) -> Result<Vec<String>> {
    Ok(read_documents_in(dir)?
        .iter()
        .flat_map(|doc| doc.records.iter())
        .filter_map(|record| record.get("id").and_then(id_string))
        .collect())
}

/// Distinct usernames in a directory of video documents, first seen first
pub fn get_usernames(dir: &Path) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    Ok(read_documents_in(dir)?
        .iter()
        .flat_map(|doc| doc.records.iter())
        .filter_map(|record| record.get("username").and_then(JsonValue::as_str))
        .filter(|name| seen.insert(name.to_string()))
        .map(String::from)
        .collect())
}

/// Render an id as text
///
/// Ids are 64-bit integers on the wire but are handled as strings
/// everywhere else.
pub fn id_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}
