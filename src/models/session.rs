//! Analysis-session state.
//!
//! A session captures one recursive-analysis query: the original question,
//! a strictly-appending iteration log, keyed subagent findings, and an
//! optional final answer. Every CLI invocation is a separate OS process, so
//! all of this round-trips through `state.json`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Unique identifier for an analysis session (12 hex chars).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Creates a session ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh session ID.
    #[must_use]
    pub fn generate() -> Self {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        Self(hex[..12].to_string())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Accepting result writes.
    Active,
    /// Frozen; further result writes are a conflict.
    Finalized,
}

/// One record in the strictly-appending iteration log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    /// The result key (or action name) this iteration touched.
    pub key: String,
    /// A short value or summary for the iteration.
    pub value: String,
}

/// A stored finding, keyed by name; last write wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRecord {
    /// The finding text (opaque to the core).
    pub value: String,
    /// When the value was last written.
    pub added_at: f64,
}

/// The full persisted state of an analysis session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    /// The session id.
    pub session_id: SessionId,
    /// The original analysis query.
    pub query: String,
    /// Resolved target path of the analysis.
    pub target_path: PathBuf,
    /// Creation time, seconds since the Unix epoch.
    pub created_at: f64,
    /// Strictly-appending iteration log.
    pub iterations: Vec<IterationRecord>,
    /// Keyed results; last write wins per key.
    pub results: BTreeMap<String, ResultRecord>,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Final answer, set by finalize.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,
    /// When the session was finalized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<f64>,
}

impl SessionState {
    /// Whether this session still accepts result writes.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_are_twelve_hex() {
        let id = SessionId::generate();
        assert_eq!(id.as_str().len(), 12);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::Active).unwrap(),
            "\"active\""
        );
        assert_eq!(
            serde_json::to_string(&SessionStatus::Finalized).unwrap(),
            "\"finalized\""
        );
    }

    #[test]
    fn test_state_roundtrip() {
        let mut state = SessionState {
            session_id: SessionId::new("abc123def456"),
            query: "where is auth handled?".to_string(),
            target_path: PathBuf::from("/repo"),
            created_at: 1_700_000_000.0,
            iterations: vec![],
            results: BTreeMap::new(),
            status: SessionStatus::Active,
            final_answer: None,
            completed_at: None,
        };
        state.results.insert(
            "auth_files".to_string(),
            ResultRecord {
                value: "src/auth.rs".to_string(),
                added_at: 1_700_000_001.0,
            },
        );

        let json = serde_json::to_string(&state).unwrap();
        let parsed: SessionState = serde_json::from_str(&json).unwrap();
        assert!(parsed.is_active());
        assert_eq!(parsed.results["auth_files"].value, "src/auth.rs");
    }
}
