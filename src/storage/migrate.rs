//! One-time import of the legacy JSON memory layout.
//!
//! Older stores kept an `index.json` plus one JSON file per entry under
//! `entries/`. When that layout is discovered next to the database, its
//! entries are imported once and the index file is renamed so later opens
//! ignore it.

use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::info;

use crate::models::{Entry, EntryId};
use crate::storage::MemoryDb;
use crate::{Error, Result};

/// Imports a legacy `index.json` + `entries/` layout into the database.
///
/// Returns the number of entries imported (0 when no legacy index exists).
/// After a successful import the index file is renamed to
/// `index.json.migrated`.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] when the index exists but cannot be
/// read or renamed. Individual malformed entries are skipped.
pub fn migrate_legacy_index(db: &MemoryDb, dir: &Path) -> Result<usize> {
    let index_path = dir.join("index.json");
    if !index_path.is_file() {
        return Ok(0);
    }

    let raw = fs::read_to_string(&index_path).map_err(|e| Error::op("read_legacy_index", e))?;
    let index: Vec<Value> =
        serde_json::from_str(&raw).map_err(|e| Error::op("parse_legacy_index", e))?;

    let entries_dir = dir.join("entries");
    let mut entries = Vec::new();

    for record in index {
        let Some(id) = record.get("id").and_then(Value::as_str).map(str::to_string) else {
            continue;
        };

        // Prefer the full per-entry file; fall back to index metadata with
        // empty content when it is gone.
        let entry_value = fs::read_to_string(entries_dir.join(format!("{id}.json")))
            .ok()
            .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
            .unwrap_or(record);

        let content = entry_value
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let entry = Entry {
            id: EntryId::new(id.as_str()),
            summary: entry_value
                .get("summary")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            tags: entry_value
                .get("tags")
                .and_then(Value::as_array)
                .map(|tags| {
                    tags.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            timestamp: entry_value
                .get("timestamp")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
            source: entry_value
                .get("source")
                .and_then(Value::as_str)
                .unwrap_or("text")
                .to_string(),
            source_name: entry_value
                .get("source_name")
                .and_then(Value::as_str)
                .map(str::to_string),
            char_count: content.chars().count(),
            content,
            chunks: None,
        };

        entries.push(entry);
    }

    // One deferred transaction for the whole import; ids already present
    // from a prior partial run are skipped inside the batch.
    let imported = db.insert_batch(&entries)?;

    fs::rename(&index_path, dir.join("index.json.migrated"))
        .map_err(|e| Error::op("retire_legacy_index", e))?;
    info!(imported, "migrated legacy JSON index into memory.db");
    Ok(imported)
}
