//! `SQLite` + FTS5 memory database.
//!
//! A single database file owns all persistent memory state. Full-text
//! search runs over an external-content FTS5 table with Porter stemming
//! and Unicode normalization; triggers keep the index consistent with the
//! `entries` table under insert, delete, and update. Cross-process safety
//! comes from WAL mode plus a 5-second busy timeout; within a process the
//! connection is mutex-confined and never crosses threads.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use regex::Regex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::{debug, warn};

use crate::models::{ContentChunk, Entry, EntryId, EntryMeta};
use crate::{Error, Result};

/// BM25 column weights: summary 3, tags 2, content 1.
const BM25_WEIGHTS: &str = "bm25(entries_fts, 3.0, 2.0, 1.0)";

/// The memory database handle.
pub struct MemoryDb {
    /// Mutex-confined connection; `rusqlite::Connection` is not `Sync` and
    /// must never be shared across threads.
    conn: Mutex<Connection>,
    /// Database path (`None` for in-memory stores).
    db_path: Option<PathBuf>,
    /// Set when an integrity check detects index drift; the store refuses
    /// writes until repaired.
    read_only: AtomicBool,
}

/// One search result: entry metadata plus its BM25 rank (lower is better).
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// The matched entry, metadata only.
    pub meta: EntryMeta,
    /// Ascending BM25 rank (FTS5 convention: more negative is better).
    pub rank: f64,
}

/// Aggregate statistics about the store.
#[derive(Debug, Clone)]
pub struct DbStats {
    /// Total entries.
    pub total_entries: u64,
    /// Sum of `char_count` across entries.
    pub total_chars: u64,
    /// Mean `char_count`.
    pub avg_chars: u64,
    /// Smallest entry.
    pub min_chars: u64,
    /// Largest entry.
    pub max_chars: u64,
    /// Oldest entry timestamp.
    pub oldest_timestamp: f64,
    /// Newest entry timestamp.
    pub newest_timestamp: f64,
    /// Entries and chars per source type.
    pub by_source: Vec<(String, u64, u64)>,
    /// Top tags by frequency.
    pub top_tags: Vec<(String, u64)>,
    /// Distinct tag count.
    pub unique_tags: u64,
    /// Entry counts per size bucket: small, medium, large, huge.
    pub size_distribution: [u64; 4],
    /// Database file size in bytes (0 for in-memory).
    pub db_file_size: u64,
}

impl MemoryDb {
    /// Opens (and lazily creates) the database under `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] when the directory or database
    /// cannot be created, [`Error::Busy`] on lock timeout.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| Error::op("create_memory_dir", e))?;
        let db_path = dir.join("memory.db");

        let conn = Connection::open(&db_path).map_err(map_sqlite_err("open_db"))?;
        let db = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
            read_only: AtomicBool::new(false),
        };
        db.initialize()?;

        // One-time import of the legacy JSON index, if present.
        if let Err(e) = crate::storage::migrate_legacy_index(&db, dir) {
            warn!(error = %e, "legacy index migration failed; continuing with empty store");
        }
        Ok(db)
    }

    /// Opens an in-memory database (tests and ephemeral use).
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] when initialization fails.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(map_sqlite_err("open_db_memory"))?;
        let db = Self {
            conn: Mutex::new(conn),
            db_path: None,
            read_only: AtomicBool::new(false),
        };
        db.initialize()?;
        Ok(db)
    }

    /// Returns the database path (`None` for in-memory).
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.lock();

        // WAL for concurrent readers, 5 s busy timeout for writer contention.
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        let _ = conn.pragma_update(None, "busy_timeout", "5000");

        conn.execute(
            "CREATE TABLE IF NOT EXISTS entries (
                id TEXT PRIMARY KEY,
                summary TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                timestamp REAL NOT NULL,
                source TEXT NOT NULL DEFAULT 'text',
                source_name TEXT,
                char_count INTEGER NOT NULL DEFAULT 0,
                content TEXT NOT NULL DEFAULT '',
                chunks TEXT
            )",
            [],
        )
        .map_err(map_sqlite_err("create_entries_table"))?;

        // FTS5 virtual tables do not support IF NOT EXISTS reliably; probe
        // sqlite_master first. TEXT PRIMARY KEY still has an implicit rowid,
        // which the external-content sync below relies on.
        let fts_exists: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type='table' AND name='entries_fts'",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_sqlite_err("probe_fts_table"))?;

        if fts_exists.is_none() {
            conn.execute(
                "CREATE VIRTUAL TABLE entries_fts USING fts5(
                    summary,
                    tags,
                    content,
                    content='entries',
                    content_rowid='rowid',
                    tokenize='porter unicode61'
                )",
                [],
            )
            .map_err(map_sqlite_err("create_fts_table"))?;
        }

        conn.execute_batch(
            "CREATE TRIGGER IF NOT EXISTS entries_ai AFTER INSERT ON entries BEGIN
                INSERT INTO entries_fts(rowid, summary, tags, content)
                VALUES (new.rowid, new.summary, new.tags, new.content);
            END;

            CREATE TRIGGER IF NOT EXISTS entries_ad AFTER DELETE ON entries BEGIN
                INSERT INTO entries_fts(entries_fts, rowid, summary, tags, content)
                VALUES ('delete', old.rowid, old.summary, old.tags, old.content);
            END;

            CREATE TRIGGER IF NOT EXISTS entries_au AFTER UPDATE ON entries BEGIN
                INSERT INTO entries_fts(entries_fts, rowid, summary, tags, content)
                VALUES ('delete', old.rowid, old.summary, old.tags, old.content);
                INSERT INTO entries_fts(rowid, summary, tags, content)
                VALUES (new.rowid, new.summary, new.tags, new.content);
            END;",
        )
        .map_err(map_sqlite_err("create_fts_triggers"))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_entries_timestamp ON entries(timestamp DESC)",
            [],
        )
        .map_err(map_sqlite_err("create_timestamp_index"))?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_entries_source_name ON entries(source_name)",
            [],
        )
        .map_err(map_sqlite_err("create_source_name_index"))?;

        Ok(())
    }

    /// Inserts a new entry atomically.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] for a duplicate id and
    /// [`Error::IndexInconsistency`] when the store is read-only.
    pub fn insert(&self, entry: &Entry) -> Result<()> {
        self.ensure_writable()?;
        let conn = self.lock();
        insert_row(&conn, entry)?;
        debug!(entry_id = %entry.id, chars = entry.char_count, "entry inserted");
        Ok(())
    }

    /// Inserts many entries inside one deferred transaction. Entries whose
    /// id already exists are skipped; any other failure rolls the batch
    /// back. Returns how many rows were inserted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexInconsistency`] when the store is read-only
    /// and SQL errors otherwise.
    pub fn insert_batch(&self, entries: &[Entry]) -> Result<usize> {
        self.ensure_writable()?;
        let conn = self.lock();

        conn.execute_batch("BEGIN DEFERRED")
            .map_err(map_sqlite_err("begin_batch_insert"))?;

        let mut inserted = 0;
        for entry in entries {
            match insert_row(&conn, entry) {
                Ok(()) => inserted += 1,
                Err(Error::Conflict(_)) => {},
                Err(e) => {
                    let _ = conn.execute_batch("ROLLBACK");
                    return Err(e);
                },
            }
        }

        conn.execute_batch("COMMIT")
            .map_err(map_sqlite_err("commit_batch_insert"))?;
        debug!(inserted, total = entries.len(), "batch insert committed");
        Ok(inserted)
    }

    /// Deletes an entry. Returns whether anything was removed; deleting an
    /// absent id is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexInconsistency`] when the store is read-only.
    pub fn delete(&self, id: &EntryId) -> Result<bool> {
        self.ensure_writable()?;
        let conn = self.lock();
        let removed = conn
            .execute("DELETE FROM entries WHERE id = ?1", params![id.as_str()])
            .map_err(map_sqlite_err("delete_entry"))?;
        Ok(removed > 0)
    }

    /// Loads a full entry by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] on SQL failure.
    pub fn get(&self, id: &EntryId) -> Result<Option<Entry>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id, summary, tags, timestamp, source, source_name, char_count, content, chunks
             FROM entries WHERE id = ?1",
            params![id.as_str()],
            row_to_entry,
        )
        .optional()
        .map_err(map_sqlite_err("get_entry"))
    }

    /// Loads just the content of an entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown id.
    pub fn get_content(&self, id: &EntryId) -> Result<String> {
        let conn = self.lock();
        conn.query_row(
            "SELECT content FROM entries WHERE id = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(map_sqlite_err("get_entry_content"))?
        .ok_or_else(|| Error::not_found(format!("memory entry {id}")))
    }

    /// Full-text search with BM25 ranking.
    ///
    /// The query string is tokenized and each term is quoted, so callers
    /// never compose raw FTS syntax. Results come back in ascending rank
    /// order (lower BM25 is better), ties broken by newer timestamp. With
    /// `tags`, only entries carrying every requested tag as an exact
    /// element are returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] on SQL failure.
    pub fn search(&self, query: &str, tags: &[String], limit: usize) -> Result<Vec<SearchHit>> {
        let Some(match_expr) = build_match_expr(query) else {
            return Ok(Vec::new());
        };

        let conn = self.lock();
        let tag_filter = tag_filter_clause(tags.len());
        let sql = format!(
            "SELECT e.id, e.summary, e.tags, e.timestamp, e.source, e.source_name, e.char_count,
                    {BM25_WEIGHTS} AS rank
             FROM entries_fts fts
             JOIN entries e ON e.rowid = fts.rowid
             WHERE entries_fts MATCH ?1{tag_filter}
             ORDER BY rank, e.timestamp DESC
             LIMIT ?{}",
            tags.len() + 2
        );

        let mut stmt = conn.prepare(&sql).map_err(map_sqlite_err("prepare_search"))?;
        let params_iter = std::iter::once(match_expr)
            .chain(tags.iter().map(|t| t.trim().to_lowercase()))
            .chain(std::iter::once(limit.to_string()));

        let rows = stmt
            .query_map(params_from_iter(params_iter), |row| {
                let meta = row_to_meta(row)?;
                let rank: f64 = row.get(7)?;
                Ok(SearchHit { meta, rank })
            })
            .map_err(map_sqlite_err("execute_search"))?;

        let mut hits = Vec::new();
        for row in rows {
            hits.push(row.map_err(map_sqlite_err("read_search_row"))?);
        }
        Ok(hits)
    }

    /// Chronological listing, newest first, with optional exact-tag
    /// filtering and pagination. Returns `(metas, total_matching)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] on SQL failure.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn list(
        &self,
        tags: &[String],
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<EntryMeta>, usize)> {
        let conn = self.lock();

        let (total, rows_sql, param_tags): (i64, String, Vec<String>) = if tags.is_empty() {
            let total = conn
                .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))
                .map_err(map_sqlite_err("count_entries"))?;
            (
                total,
                "SELECT id, summary, tags, timestamp, source, source_name, char_count
                 FROM entries ORDER BY timestamp DESC LIMIT ?1 OFFSET ?2"
                    .to_string(),
                Vec::new(),
            )
        } else {
            let tag_params: Vec<String> =
                tags.iter().map(|t| t.trim().to_lowercase()).collect();

            // Exact element match via json_each: substring collisions like
            // "mcp" vs "mcp-server" never pass.
            let where_clause = (1..=tags.len())
                .map(|i| {
                    format!("EXISTS (SELECT 1 FROM json_each(e.tags) j WHERE j.value = ?{i})")
                })
                .collect::<Vec<_>>()
                .join(" AND ");

            let total = conn
                .query_row(
                    &format!("SELECT COUNT(*) FROM entries e WHERE {where_clause}"),
                    params_from_iter(tag_params.iter()),
                    |row| row.get(0),
                )
                .map_err(map_sqlite_err("count_tagged_entries"))?;

            let rows_sql = format!(
                "SELECT e.id, e.summary, e.tags, e.timestamp, e.source, e.source_name, e.char_count
                 FROM entries e WHERE {where_clause}
                 ORDER BY e.timestamp DESC LIMIT ?{} OFFSET ?{}",
                tags.len() + 1,
                tags.len() + 2,
            );
            (total, rows_sql, tag_params)
        };

        let mut stmt = conn.prepare(&rows_sql).map_err(map_sqlite_err("prepare_list"))?;
        let params_iter = param_tags
            .into_iter()
            .chain([limit.to_string(), offset.to_string()]);
        let rows = stmt
            .query_map(params_from_iter(params_iter), row_to_meta)
            .map_err(map_sqlite_err("execute_list"))?;

        let mut metas = Vec::new();
        for row in rows {
            metas.push(row.map_err(map_sqlite_err("read_list_row"))?);
        }
        Ok((metas, total as usize))
    }

    /// Entries sharing a `source_name`, newest first (metadata only).
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] on SQL failure.
    pub fn find_by_source_name(&self, source_name: &str) -> Result<Vec<EntryMeta>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, summary, tags, timestamp, source, source_name, char_count
                 FROM entries WHERE source_name = ?1 ORDER BY timestamp DESC",
            )
            .map_err(map_sqlite_err("prepare_find_by_source"))?;
        let rows = stmt
            .query_map(params![source_name], row_to_meta)
            .map_err(map_sqlite_err("find_by_source"))?;

        let mut metas = Vec::new();
        for row in rows {
            metas.push(row.map_err(map_sqlite_err("read_source_row"))?);
        }
        Ok(metas)
    }

    /// Counts per tag, sorted by descending frequency then name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] on SQL failure.
    pub fn tag_histogram(&self) -> Result<Vec<(String, u64)>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT j.value, COUNT(*) FROM entries e, json_each(e.tags) j
                 GROUP BY j.value ORDER BY COUNT(*) DESC, j.value ASC",
            )
            .map_err(map_sqlite_err("prepare_tag_histogram"))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(map_sqlite_err("tag_histogram"))?;

        let mut counts = Vec::new();
        for row in rows {
            let (tag, count) = row.map_err(map_sqlite_err("read_tag_row"))?;
            #[allow(clippy::cast_sign_loss)]
            counts.push((tag, count as u64));
        }
        Ok(counts)
    }

    /// Total entry count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] on SQL failure.
    pub fn count_entries(&self) -> Result<u64> {
        let conn = self.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))
            .map_err(map_sqlite_err("count_entries"))?;
        #[allow(clippy::cast_sign_loss)]
        Ok(count as u64)
    }

    /// Verifies the FTS index row count matches the entries table.
    ///
    /// On drift the store flips to read-only mode and every subsequent
    /// write fails until the database is repaired out of band.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexInconsistency`] on drift.
    pub fn integrity_check(&self) -> Result<()> {
        let (entries, indexed) = {
            let conn = self.lock();
            let entries: i64 = conn
                .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))
                .map_err(map_sqlite_err("count_entries"))?;
            let indexed: i64 = conn
                .query_row("SELECT COUNT(*) FROM entries_fts", [], |row| row.get(0))
                .map_err(map_sqlite_err("count_fts_rows"))?;
            (entries, indexed)
        };

        if entries != indexed {
            self.read_only.store(true, Ordering::SeqCst);
            #[allow(clippy::cast_sign_loss)]
            return Err(Error::IndexInconsistency {
                entries: entries as u64,
                indexed: indexed as u64,
            });
        }
        // A clean check lifts read-only mode (repair happened out of band).
        self.read_only.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Aggregate statistics for the `stats` command.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] on SQL failure.
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub fn stats(&self) -> Result<DbStats> {
        let conn = self.lock();

        let (total_entries, total_chars, avg_chars, min_chars, max_chars, oldest, newest) = conn
            .query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(char_count), 0),
                        COALESCE(AVG(char_count), 0),
                        COALESCE(MIN(char_count), 0),
                        COALESCE(MAX(char_count), 0),
                        COALESCE(MIN(timestamp), 0),
                        COALESCE(MAX(timestamp), 0)
                 FROM entries",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, f64>(5)?,
                        row.get::<_, f64>(6)?,
                    ))
                },
            )
            .map_err(map_sqlite_err("stats_overview"))?;

        let mut by_source = Vec::new();
        {
            let mut stmt = conn
                .prepare(
                    "SELECT source, COUNT(*), COALESCE(SUM(char_count), 0)
                     FROM entries GROUP BY source ORDER BY COUNT(*) DESC",
                )
                .map_err(map_sqlite_err("prepare_stats_sources"))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)? as u64,
                        row.get::<_, i64>(2)? as u64,
                    ))
                })
                .map_err(map_sqlite_err("stats_sources"))?;
            for row in rows {
                by_source.push(row.map_err(map_sqlite_err("read_source_stats"))?);
            }
        }

        let size_distribution = conn
            .query_row(
                "SELECT
                    SUM(CASE WHEN char_count < 2048 THEN 1 ELSE 0 END),
                    SUM(CASE WHEN char_count >= 2048 AND char_count < 10240 THEN 1 ELSE 0 END),
                    SUM(CASE WHEN char_count >= 10240 AND char_count < 51200 THEN 1 ELSE 0 END),
                    SUM(CASE WHEN char_count >= 51200 THEN 1 ELSE 0 END)
                 FROM entries",
                [],
                |row| {
                    Ok([
                        row.get::<_, Option<i64>>(0)?.unwrap_or(0) as u64,
                        row.get::<_, Option<i64>>(1)?.unwrap_or(0) as u64,
                        row.get::<_, Option<i64>>(2)?.unwrap_or(0) as u64,
                        row.get::<_, Option<i64>>(3)?.unwrap_or(0) as u64,
                    ])
                },
            )
            .map_err(map_sqlite_err("stats_sizes"))?;

        drop(conn);
        let tag_counts = self.tag_histogram()?;
        let unique_tags = tag_counts.len() as u64;
        let top_tags = tag_counts.into_iter().take(15).collect();

        let db_file_size = self
            .db_path
            .as_ref()
            .and_then(|p| p.metadata().ok())
            .map_or(0, |m| m.len());

        Ok(DbStats {
            total_entries: total_entries as u64,
            total_chars: total_chars as u64,
            avg_chars: avg_chars.round() as u64,
            min_chars: min_chars as u64,
            max_chars: max_chars as u64,
            oldest_timestamp: oldest,
            newest_timestamp: newest,
            by_source,
            top_tags,
            unique_tags,
            size_distribution,
            db_file_size,
        })
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.read_only.load(Ordering::SeqCst) {
            // Re-check: either the drift persists (error) or a repair
            // happened out of band and writes may resume.
            self.integrity_check()?;
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("memory db mutex was poisoned, recovering");
                poisoned.into_inner()
            },
        }
    }
}

/// Builds a quoted-safe FTS5 MATCH expression from free text.
///
/// Terms are OR-joined: any term may match, BM25 handles relevance. Each
/// term is wrapped in double quotes so user text can never inject FTS5
/// operators.
fn build_match_expr(query: &str) -> Option<String> {
    let word_re = Regex::new(r"[a-zA-Z_][a-zA-Z0-9_]*").expect("static pattern");
    let words: Vec<String> = word_re
        .find_iter(&query.to_lowercase())
        .map(|m| m.as_str().to_string())
        .filter(|w| w.len() >= 2)
        .collect();
    if words.is_empty() {
        return None;
    }
    Some(
        words
            .iter()
            .map(|w| format!("\"{}\"", w.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

/// Exact-element tag filter appended to search SQL, one `json_each`
/// subquery per requested tag, parameters starting at ?2.
fn tag_filter_clause(tag_count: usize) -> String {
    (0..tag_count)
        .map(|i| {
            format!(
                " AND EXISTS (SELECT 1 FROM json_each(e.tags) j WHERE j.value = ?{})",
                i + 2
            )
        })
        .collect()
}

/// Executes one entry INSERT on an already-held connection, mapping a
/// primary-key violation to [`Error::Conflict`].
fn insert_row(conn: &Connection, entry: &Entry) -> Result<()> {
    let tags_json =
        serde_json::to_string(&entry.tags).map_err(|e| Error::op("serialize_tags", e))?;
    let chunks_json = match &entry.chunks {
        Some(chunks) => {
            Some(serde_json::to_string(chunks).map_err(|e| Error::op("serialize_chunks", e))?)
        },
        None => None,
    };

    #[allow(clippy::cast_possible_wrap)]
    let result = conn.execute(
        "INSERT INTO entries (id, summary, tags, timestamp, source, source_name, char_count, content, chunks)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            entry.id.as_str(),
            entry.summary,
            tags_json,
            entry.timestamp,
            entry.source,
            entry.source_name.as_deref(),
            entry.char_count as i64,
            entry.content,
            chunks_json.as_deref(),
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(Error::Conflict(format!("duplicate entry id {}", entry.id)))
        },
        Err(e) => Err(map_sqlite_err("insert_entry")(e)),
    }
}

fn row_to_meta(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryMeta> {
    let tags_json: String = row.get(2)?;
    let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();
    #[allow(clippy::cast_sign_loss)]
    Ok(EntryMeta {
        id: EntryId::new(row.get::<_, String>(0)?),
        summary: row.get(1)?,
        tags,
        timestamp: row.get(3)?,
        source: row.get(4)?,
        source_name: row.get(5)?,
        char_count: row.get::<_, i64>(6)? as usize,
    })
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<Entry> {
    let tags_json: String = row.get(2)?;
    let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();
    let chunks_json: Option<String> = row.get(8)?;
    let chunks: Option<Vec<ContentChunk>> =
        chunks_json.and_then(|raw| serde_json::from_str(&raw).ok());
    #[allow(clippy::cast_sign_loss)]
    Ok(Entry {
        id: EntryId::new(row.get::<_, String>(0)?),
        summary: row.get(1)?,
        tags,
        timestamp: row.get(3)?,
        source: row.get(4)?,
        source_name: row.get(5)?,
        char_count: row.get::<_, i64>(6)? as usize,
        content: row.get(7)?,
        chunks,
    })
}

/// Maps rusqlite errors onto the crate error kinds; lock timeouts become
/// [`Error::Busy`] so callers know a retry is reasonable.
fn map_sqlite_err(operation: &'static str) -> impl Fn(rusqlite::Error) -> Error {
    move |e| match &e {
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == rusqlite::ErrorCode::DatabaseBusy
                || inner.code == rusqlite::ErrorCode::DatabaseLocked =>
        {
            Error::Busy(format!("database locked during {operation}"))
        },
        _ => Error::op(operation, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, summary: &str, tags: &[&str], content: &str) -> Entry {
        Entry {
            id: EntryId::new(id),
            summary: summary.to_string(),
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
            timestamp: 1_700_000_000.0,
            source: "text".to_string(),
            source_name: None,
            char_count: content.chars().count(),
            content: content.to_string(),
            chunks: None,
        }
    }

    #[test]
    fn test_insert_and_get() {
        let db = MemoryDb::in_memory().unwrap();
        db.insert(&entry("m_000000000001", "a note", &["ops"], "deploy steps"))
            .unwrap();

        let loaded = db.get(&EntryId::new("m_000000000001")).unwrap().unwrap();
        assert_eq!(loaded.summary, "a note");
        assert_eq!(loaded.tags, vec!["ops"]);
        assert_eq!(loaded.content, "deploy steps");
    }

    #[test]
    fn test_duplicate_id_is_conflict() {
        let db = MemoryDb::in_memory().unwrap();
        let e = entry("m_000000000001", "a", &[], "x");
        db.insert(&e).unwrap();
        assert!(matches!(db.insert(&e), Err(Error::Conflict(_))));
    }

    #[test]
    fn test_insert_batch_skips_duplicates() {
        let db = MemoryDb::in_memory().unwrap();
        db.insert(&entry("m_000000000001", "pre-existing", &[], "x")).unwrap();

        let batch = vec![
            entry("m_000000000001", "dup", &[], "x"),
            entry("m_000000000002", "new one", &[], "y"),
            entry("m_000000000003", "another", &[], "z"),
        ];
        let inserted = db.insert_batch(&batch).unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(db.count_entries().unwrap(), 3);
        // The pre-existing row was not clobbered by the duplicate.
        let kept = db.get(&EntryId::new("m_000000000001")).unwrap().unwrap();
        assert_eq!(kept.summary, "pre-existing");
    }

    #[test]
    fn test_delete_is_idempotent() {
        let db = MemoryDb::in_memory().unwrap();
        db.insert(&entry("m_000000000001", "a", &[], "x")).unwrap();
        assert!(db.delete(&EntryId::new("m_000000000001")).unwrap());
        assert!(!db.delete(&EntryId::new("m_000000000001")).unwrap());
    }

    #[test]
    fn test_fts_stays_consistent_under_churn() {
        let db = MemoryDb::in_memory().unwrap();
        for i in 0..10 {
            db.insert(&entry(
                &format!("m_{i:012}"),
                &format!("note {i}"),
                &["churn"],
                "content body",
            ))
            .unwrap();
        }
        for i in 0..5 {
            db.delete(&EntryId::new(format!("m_{i:012}"))).unwrap();
        }
        db.integrity_check().unwrap();
        assert_eq!(db.count_entries().unwrap(), 5);
    }

    #[test]
    fn test_search_finds_by_summary_token() {
        let db = MemoryDb::in_memory().unwrap();
        db.insert(&entry(
            "m_000000000001",
            "Deploy prerequisites",
            &["deploy", "ops"],
            "The deploy requires running migrations first",
        ))
        .unwrap();
        db.insert(&entry(
            "m_000000000002",
            "Lunch menu",
            &["food"],
            "sandwiches on thursday",
        ))
        .unwrap();

        let hits = db.search("migrations deploy", &[], 20).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].meta.id.as_str(), "m_000000000001");
    }

    #[test]
    fn test_search_porter_stemming_conflates_forms() {
        let db = MemoryDb::in_memory().unwrap();
        db.insert(&entry(
            "m_000000000001",
            "auth work",
            &[],
            "authentication flows were refactored",
        ))
        .unwrap();

        let hits = db.search("authenticate", &[], 10).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_search_is_quote_safe() {
        let db = MemoryDb::in_memory().unwrap();
        db.insert(&entry("m_000000000001", "notes", &[], "plain text")).unwrap();
        // FTS5 operators in the query must not produce a syntax error.
        let hits = db.search("text AND \"unclosed OR (", &[], 10).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_search_rank_ordering_and_monotonicity() {
        let db = MemoryDb::in_memory().unwrap();
        db.insert(&entry(
            "m_00000000000a",
            "kafka tuning",
            &[],
            "kafka kafka kafka partitions brokers kafka",
        ))
        .unwrap();
        db.insert(&entry(
            "m_00000000000b",
            "misc notes",
            &[],
            "one kafka mention in a sea of other words about other things",
        ))
        .unwrap();

        let hits = db.search("kafka", &[], 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].meta.id.as_str(), "m_00000000000a");
        assert!(hits[0].rank <= hits[1].rank);

        // Reinforcing the first entry's text must not worsen its standing.
        db.insert(&entry(
            "m_00000000000c",
            "kafka tuning again",
            &[],
            "kafka kafka kafka partitions brokers kafka",
        ))
        .unwrap();
        let hits = db.search("kafka", &[], 10).unwrap();
        assert_eq!(hits.last().unwrap().meta.id.as_str(), "m_00000000000b");
    }

    #[test]
    fn test_tag_filter_is_exact_element_match() {
        let db = MemoryDb::in_memory().unwrap();
        db.insert(&entry("m_000000000001", "mcp notes", &["mcp"], "protocol details"))
            .unwrap();
        db.insert(&entry(
            "m_000000000002",
            "server notes",
            &["mcp-server"],
            "protocol details",
        ))
        .unwrap();

        let (metas, total) = db.list(&["mcp".to_string()], 0, 50).unwrap();
        assert_eq!(total, 1);
        assert_eq!(metas[0].id.as_str(), "m_000000000001");

        let hits = db.search("protocol", &["mcp".to_string()], 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].meta.id.as_str(), "m_000000000001");
    }

    #[test]
    fn test_list_newest_first_with_pagination() {
        let db = MemoryDb::in_memory().unwrap();
        for i in 0..5 {
            let mut e = entry(&format!("m_{i:012}"), &format!("note {i}"), &[], "x");
            e.timestamp = 1_700_000_000.0 + f64::from(i);
            db.insert(&e).unwrap();
        }

        let (metas, total) = db.list(&[], 0, 2).unwrap();
        assert_eq!(total, 5);
        assert_eq!(metas[0].summary, "note 4");
        let (page2, _) = db.list(&[], 2, 2).unwrap();
        assert_eq!(page2[0].summary, "note 2");
    }

    #[test]
    fn test_tag_histogram_sorted() {
        let db = MemoryDb::in_memory().unwrap();
        db.insert(&entry("m_000000000001", "a", &["rust", "ops"], "x")).unwrap();
        db.insert(&entry("m_000000000002", "b", &["rust"], "x")).unwrap();

        let counts = db.tag_histogram().unwrap();
        assert_eq!(counts[0], ("rust".to_string(), 2));
        assert_eq!(counts[1], ("ops".to_string(), 1));
    }

    #[test]
    fn test_find_by_source_name() {
        let db = MemoryDb::in_memory().unwrap();
        let mut e = entry("m_000000000001", "a", &[], "x");
        e.source_name = Some("session-42.jsonl".to_string());
        db.insert(&e).unwrap();

        let found = db.find_by_source_name("session-42.jsonl").unwrap();
        assert_eq!(found.len(), 1);
        assert!(db.find_by_source_name("other.jsonl").unwrap().is_empty());
    }

    #[test]
    fn test_stats_buckets() {
        let db = MemoryDb::in_memory().unwrap();
        db.insert(&entry("m_000000000001", "small", &[], "tiny")).unwrap();
        let mut big = entry("m_000000000002", "big", &[], "");
        big.content = "x".repeat(60_000);
        big.char_count = 60_000;
        db.insert(&big).unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.size_distribution[0], 1);
        assert_eq!(stats.size_distribution[3], 1);
        assert_eq!(stats.max_chars, 60_000);
    }

    #[test]
    fn test_empty_query_returns_nothing() {
        let db = MemoryDb::in_memory().unwrap();
        db.insert(&entry("m_000000000001", "a", &[], "x")).unwrap();
        assert!(db.search("!!! ???", &[], 10).unwrap().is_empty());
    }

    #[test]
    fn test_chunks_roundtrip() {
        let db = MemoryDb::in_memory().unwrap();
        let mut e = entry("m_000000000001", "chunked", &[], "abc");
        e.chunks = Some(vec![ContentChunk {
            chunk_id: "mc_0123456789".to_string(),
            start_char: 0,
            end_char: 3,
            char_count: 3,
            preview: "abc".to_string(),
        }]);
        db.insert(&e).unwrap();

        let loaded = db.get(&EntryId::new("m_000000000001")).unwrap().unwrap();
        assert_eq!(loaded.chunks.unwrap()[0].chunk_id, "mc_0123456789");
    }
}
