//! The strategy store: learned patterns and the recall performance log.
//!
//! Purely textual state. The patterns document is free text the
//! orchestrator edits to accumulate retrieval heuristics; the core serves
//! it verbatim before each recall and never parses it. The performance log
//! is append-only JSONL, one record per recall session.

use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const PATTERNS_FILE: &str = "learned_patterns.md";
const PERFORMANCE_FILE: &str = "performance.jsonl";

/// One appended performance record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceRecord {
    /// Seconds since the Unix epoch; stamped at append time.
    #[serde(default)]
    pub timestamp: f64,
    /// The recall query that was run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Search terms the orchestrator actually used.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search_terms: Vec<String>,
    /// Entries the search returned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries_found: Option<u32>,
    /// Entries that turned out relevant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries_relevant: Option<u32>,
    /// Subagents dispatched for this recall.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subagents_dispatched: Option<u32>,
    /// Free-text strategy notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Store for the learned-patterns document and performance log.
#[derive(Debug, Clone)]
pub struct StrategyStore {
    dir: PathBuf,
}

impl StrategyStore {
    /// Creates a store rooted at `dir` (created lazily on first append).
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the patterns document.
    #[must_use]
    pub fn patterns_path(&self) -> PathBuf {
        self.dir.join(PATTERNS_FILE)
    }

    /// Returns the learned-patterns document verbatim, or a pointer line
    /// when none exists yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] when the file exists but cannot
    /// be read.
    pub fn show(&self) -> Result<String> {
        let path = self.patterns_path();
        if !path.is_file() {
            return Ok(format!(
                "No learned patterns yet. File: {}",
                path.display()
            ));
        }
        fs::read_to_string(&path).map_err(|e| Error::op("read_learned_patterns", e))
    }

    /// Formats the last `max` performance records, newest last.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] when the log cannot be read.
    pub fn log(&self, max: usize) -> Result<String> {
        let path = self.dir.join(PERFORMANCE_FILE);
        if !path.is_file() {
            return Ok("No performance records yet.".to_string());
        }
        let raw = fs::read_to_string(&path).map_err(|e| Error::op("read_performance_log", e))?;

        let records: Vec<PerformanceRecord> = raw
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        if records.is_empty() {
            return Ok("No performance records yet.".to_string());
        }

        let start = records.len().saturating_sub(max);
        let mut lines = vec![format!(
            "Performance log: {} records (showing last {})\n",
            records.len(),
            records.len() - start
        )];
        for record in &records[start..] {
            let mut parts = Vec::new();
            if let Some(query) = &record.query {
                parts.push(format!("query=\"{query}\""));
            }
            if !record.search_terms.is_empty() {
                parts.push(format!("terms=[{}]", record.search_terms.join(", ")));
            }
            if let Some(found) = record.entries_found {
                parts.push(format!("found={found}"));
            }
            if let Some(relevant) = record.entries_relevant {
                parts.push(format!("relevant={relevant}"));
            }
            if let Some(subagents) = record.subagents_dispatched {
                parts.push(format!("subagents={subagents}"));
            }
            lines.push(format!("  [{:.0}] {}", record.timestamp, parts.join(" ")));
            if let Some(notes) = &record.notes {
                lines.push(format!("         {notes}"));
            }
        }
        Ok(lines.join("\n"))
    }

    /// Appends one performance record, stamping the current time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] when the append fails.
    pub fn perf(&self, mut record: PerformanceRecord) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| Error::op("create_strategies_dir", e))?;
        record.timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        let line =
            serde_json::to_string(&record).map_err(|e| Error::op("serialize_perf_record", e))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(PERFORMANCE_FILE))
            .map_err(|e| Error::op("open_performance_log", e))?;
        writeln!(file, "{line}").map_err(|e| Error::op("append_performance_log", e))?;
        Ok(())
    }

    /// Overwrites the learned-patterns document (last writer wins).
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] when the write fails.
    pub fn write_patterns(&self, text: &str) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| Error::op("create_strategies_dir", e))?;
        fs::write(self.patterns_path(), text).map_err(|e| Error::op("write_learned_patterns", e))
    }

    /// The store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
