//! The analysis-session store.
//!
//! Each analysis session lives in its own directory under the session
//! root. Every CLI invocation is a separate OS process, so state is read
//! and written whole; writes go through a temp file and an atomic rename
//! so a killed process never leaves a half-written `state.json`.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::models::{
    IterationRecord, Manifest, ResultRecord, SessionId, SessionState, SessionStatus,
};
use crate::{Error, Result};

const STATE_FILE: &str = "state.json";

/// Store for analysis sessions, rooted at a directory it exclusively owns.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    /// Creates a store rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The default session root: `mnemo-sessions` under the OS temp dir.
    /// Sessions are host-local and may be garbage-collected on reboot.
    #[must_use]
    pub fn default_root() -> PathBuf {
        std::env::temp_dir().join("mnemo-sessions")
    }

    /// Returns the store root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the directory for a session id.
    #[must_use]
    pub fn session_dir(&self, id: &SessionId) -> PathBuf {
        self.root.join(id.as_str())
    }

    /// Returns the manifest path for a session id.
    #[must_use]
    pub fn manifest_path(&self, id: &SessionId) -> PathBuf {
        self.session_dir(id).join("manifest.json")
    }

    /// Creates a fresh session for a query over a target path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] when the session directory or
    /// state file cannot be created.
    pub fn init(&self, query: &str, target_path: &Path) -> Result<SessionState> {
        if query.trim().is_empty() {
            return Err(Error::InvalidArgument("query must not be empty".to_string()));
        }

        let session_id = SessionId::generate();
        let dir = self.session_dir(&session_id);
        fs::create_dir_all(&dir).map_err(|e| Error::op("create_session_dir", e))?;

        let state = SessionState {
            session_id: session_id.clone(),
            query: query.to_string(),
            target_path: target_path
                .canonicalize()
                .unwrap_or_else(|_| target_path.to_path_buf()),
            created_at: now(),
            iterations: Vec::new(),
            results: BTreeMap::new(),
            status: SessionStatus::Active,
            final_answer: None,
            completed_at: None,
        };
        self.save(&state)?;
        debug!(session_id = %session_id, "session initialized");
        Ok(state)
    }

    /// Loads session state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown session id.
    pub fn load(&self, id: &SessionId) -> Result<SessionState> {
        let path = self.session_dir(id).join(STATE_FILE);
        if !path.is_file() {
            return Err(Error::not_found(format!("session {id}")));
        }
        let raw = fs::read_to_string(&path).map_err(|e| Error::op("read_session_state", e))?;
        serde_json::from_str(&raw).map_err(|e| Error::op("parse_session_state", e))
    }

    /// Upserts a keyed result and appends an iteration record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] when the session is finalized; the
    /// state on disk is left unchanged.
    pub fn add_result(&self, id: &SessionId, key: &str, value: &str) -> Result<()> {
        let mut state = self.load(id)?;
        if !state.is_active() {
            return Err(Error::Conflict(format!(
                "session {id} is finalized; results are frozen"
            )));
        }

        let t = now();
        state.results.insert(
            key.to_string(),
            ResultRecord {
                value: value.to_string(),
                added_at: t,
            },
        );
        state.iterations.push(IterationRecord {
            timestamp: t,
            key: key.to_string(),
            value: summarize_value(value),
        });
        self.save(&state)
    }

    /// Marks the session finalized and records the answer. Further result
    /// writes fail with [`Error::Conflict`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] when the session is already finalized.
    pub fn finalize(&self, id: &SessionId, answer: Option<&str>) -> Result<()> {
        let mut state = self.load(id)?;
        if !state.is_active() {
            return Err(Error::Conflict(format!("session {id} is already finalized")));
        }
        state.status = SessionStatus::Finalized;
        state.final_answer = answer.map(str::to_string);
        state.completed_at = Some(now());
        self.save(&state)
    }

    /// Persists a chunk manifest alongside the session state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown session.
    pub fn store_manifest(&self, id: &SessionId, manifest: &Manifest) -> Result<PathBuf> {
        // Confirm the session exists before writing next to it.
        let _ = self.load(id)?;
        crate::chunk::save_manifest(manifest, &self.session_dir(id))
    }

    fn save(&self, state: &SessionState) -> Result<()> {
        let dir = self.session_dir(&state.session_id);
        let json = serde_json::to_string_pretty(state).map_err(|e| Error::op("serialize_session", e))?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| Error::op("create_temp_state", e))?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| Error::op("write_temp_state", e))?;
        tmp.persist(dir.join(STATE_FILE))
            .map_err(|e| Error::op("persist_session_state", e))?;
        Ok(())
    }
}

/// Formats a concise status display for the orchestrator.
#[must_use]
pub fn format_status(state: &SessionState) -> String {
    let mut lines = vec![
        format!("Session: {}", state.session_id),
        format!("Query: {}", state.query),
        format!("Target: {}", state.target_path.display()),
        format!(
            "Status: {}",
            match state.status {
                SessionStatus::Active => "active",
                SessionStatus::Finalized => "finalized",
            }
        ),
        format!("Iterations: {}", state.iterations.len()),
        format!("Results: {} entries", state.results.len()),
    ];
    if let Some(last) = state.iterations.last() {
        lines.push(format!("Last action: {}", last.key));
    }
    lines.join("\n")
}

/// Formats the full record -- iteration log, results, final answer -- within
/// a character budget, dropping trailing results first.
#[must_use]
pub fn format_summary(state: &SessionState, max_chars: usize) -> String {
    let mut lines = vec![
        format!("Session: {}", state.session_id),
        format!("Query: {}", state.query),
        format!("Target: {}", state.target_path.display()),
        format!(
            "Status: {}",
            match state.status {
                SessionStatus::Active => "active",
                SessionStatus::Finalized => "finalized",
            }
        ),
        format!("Iterations: {}", state.iterations.len()),
        String::new(),
    ];

    if !state.iterations.is_empty() {
        lines.push("Iteration Log:".to_string());
        for it in &state.iterations {
            let snippet: String = it.value.chars().take(100).collect();
            lines.push(format!("  [{}] {}", it.key, snippet));
        }
        lines.push(String::new());
    }

    if !state.results.is_empty() {
        lines.push(format!("Results ({} entries):", state.results.len()));
        for (idx, (key, record)) in state.results.iter().enumerate() {
            let mut preview: String = record.value.chars().take(200).collect();
            if record.value.chars().count() > 200 {
                preview.push_str("...");
            }
            lines.push(format!("  {key}:"));
            for value_line in preview.lines() {
                lines.push(format!("    {value_line}"));
            }
            lines.push(String::new());

            let current: usize = lines.iter().map(|l| l.len() + 1).sum();
            if current > max_chars.saturating_sub(200) {
                let remaining = state.results.len() - idx - 1;
                if remaining > 0 {
                    lines.push(format!("  ... and {remaining} more results"));
                }
                break;
            }
        }
    }

    if let Some(answer) = &state.final_answer {
        lines.push("Final Answer:".to_string());
        let head: String = answer.chars().take(500).collect();
        for answer_line in head.lines() {
            lines.push(format!("  {answer_line}"));
        }
    }

    crate::output::bound_output_at("result", &lines.join("\n"), max_chars)
}

fn summarize_value(value: &str) -> String {
    let flat = value.split_whitespace().collect::<Vec<_>>().join(" ");
    flat.chars().take(120).collect()
}

fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, SessionStore) {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("sessions"));
        (dir, store)
    }

    #[test]
    fn test_init_creates_state() {
        let (_guard, store) = store();
        let state = store.init("find the auth flow", Path::new("/tmp")).unwrap();
        assert_eq!(state.session_id.as_str().len(), 12);
        assert!(state.is_active());

        let loaded = store.load(&state.session_id).unwrap();
        assert_eq!(loaded.query, "find the auth flow");
    }

    #[test]
    fn test_init_rejects_empty_query() {
        let (_guard, store) = store();
        assert!(store.init("   ", Path::new("/tmp")).is_err());
    }

    #[test]
    fn test_unknown_session_is_not_found() {
        let (_guard, store) = store();
        let err = store.load(&SessionId::new("000000000000")).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_results_upsert_and_iterations_append() {
        let (_guard, store) = store();
        let state = store.init("q", Path::new("/tmp")).unwrap();
        let id = &state.session_id;

        store.add_result(id, "k1", "v1").unwrap();
        store.add_result(id, "k2", "v2").unwrap();
        store.add_result(id, "k1", "v1-updated").unwrap();

        let loaded = store.load(id).unwrap();
        assert_eq!(loaded.results.len(), 2);
        assert_eq!(loaded.results["k1"].value, "v1-updated");
        // The iteration log never loses records to upserts.
        assert_eq!(loaded.iterations.len(), 3);
        assert!(loaded
            .iterations
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_finalize_freezes_results() {
        let (_guard, store) = store();
        let state = store.init("q", Path::new("/tmp")).unwrap();
        let id = &state.session_id;

        store.add_result(id, "k1", "v1").unwrap();
        store.finalize(id, Some("the answer")).unwrap();

        let err = store.add_result(id, "k2", "v2").unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        // State unchanged by the failed write.
        let loaded = store.load(id).unwrap();
        assert_eq!(loaded.results.len(), 1);
        assert_eq!(loaded.final_answer.as_deref(), Some("the answer"));
        assert!(loaded.completed_at.is_some());
    }

    #[test]
    fn test_double_finalize_conflicts() {
        let (_guard, store) = store();
        let state = store.init("q", Path::new("/tmp")).unwrap();
        store.finalize(&state.session_id, None).unwrap();
        assert!(matches!(
            store.finalize(&state.session_id, None),
            Err(Error::Conflict(_))
        ));
    }

    #[test]
    fn test_state_file_is_always_valid_json() {
        // Atomicity proxy: after many writes the state file parses clean.
        let (_guard, store) = store();
        let state = store.init("q", Path::new("/tmp")).unwrap();
        for i in 0..50 {
            store
                .add_result(&state.session_id, &format!("k{i}"), &"x".repeat(2000))
                .unwrap();
            let raw = std::fs::read_to_string(
                store.session_dir(&state.session_id).join("state.json"),
            )
            .unwrap();
            let _: SessionState = serde_json::from_str(&raw).unwrap();
        }
    }

    #[test]
    fn test_status_and_summary_formatting() {
        let (_guard, store) = store();
        let state = store.init("what breaks?", Path::new("/tmp")).unwrap();
        store.add_result(&state.session_id, "finding", "a\nb\nc").unwrap();

        let loaded = store.load(&state.session_id).unwrap();
        let status = format_status(&loaded);
        assert!(status.contains("what breaks?"));
        assert!(status.contains("Results: 1 entries"));

        let summary = format_summary(&loaded, 4000);
        assert!(summary.contains("finding"));
        assert!(summary.len() <= 4000);
    }

    #[test]
    fn test_summary_is_bounded_with_huge_results() {
        let (_guard, store) = store();
        let state = store.init("q", Path::new("/tmp")).unwrap();
        store
            .add_result(&state.session_id, "huge", &"y".repeat(100_000))
            .unwrap();

        let loaded = store.load(&state.session_id).unwrap();
        let summary = format_summary(&loaded, 4000);
        assert!(summary.len() <= 4000);
    }

    #[test]
    fn test_store_manifest_requires_session() {
        let (_guard, store) = store();
        let manifest = Manifest {
            strategy: "lines".to_string(),
            source: PathBuf::from("/tmp/f"),
            total_lines: Some(1),
            total_files: None,
            chunks: vec![],
        };
        assert!(store
            .store_manifest(&SessionId::new("ffffffffffff"), &manifest)
            .is_err());

        let state = store.init("q", Path::new("/tmp")).unwrap();
        let path = store.store_manifest(&state.session_id, &manifest).unwrap();
        assert!(path.ends_with("manifest.json"));
        assert!(path.is_file());
    }
}
