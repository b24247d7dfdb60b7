//! # Mnemo
//!
//! An external-memory and recursive-analysis engine for LLM orchestrators.
//!
//! Mnemo lets an orchestrating model reason about bodies of text far larger
//! than its context window, and gives it a persistent, searchable knowledge
//! store that survives across sessions. The core discipline: raw content
//! never enters the orchestrator's working context -- only metadata, chunk
//! manifests, and bounded summaries do. Content inspection is delegated to
//! disposable subordinate agents via extract commands.
//!
//! ## Features
//!
//! - Metadata-only scanning with language detection and structure outlines
//! - Seven content-free chunking strategies with deterministic chunk ids
//! - Targeted extraction by line range, chunk id, or regex with context
//! - Analysis sessions persisted across short-lived CLI invocations
//! - SQLite + FTS5 persistent memory with BM25 ranking and Porter stemming
//! - Session-transcript export, archival, and semantic tagging
//! - A hard 4 KB bound on every orchestrator-facing result
//!
//! ## Example
//!
//! ```rust,ignore
//! use mnemo::services::{MemoryService, RememberRequest};
//! use mnemo::storage::MemoryDb;
//!
//! let service = MemoryService::new(MemoryDb::open("/home/me/.mnemo/memory")?);
//! let stored = service.remember(RememberRequest {
//!     content: "The deploy requires running migrations first".to_string(),
//!     ..Default::default()
//! })?;
//! println!("{}", stored.id);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use std::error::Error as StdError;
use std::fmt;

// Module declarations
pub mod chunk;
pub mod commands;
pub mod config;
pub mod export;
pub mod extract;
pub mod llm;
pub mod mcp;
pub mod models;
pub mod observability;
pub mod output;
pub mod scan;
pub mod services;
pub mod session;
pub mod storage;

// Re-exports for convenience
pub use config::MnemoConfig;
pub use llm::LlmProvider;
pub use models::{Chunk, ChunkSpan, Entry, EntryId, EntryMeta, Manifest, SessionId, SizeCategory};
pub use services::{MemoryService, StrategyStore};
pub use session::SessionStore;
pub use storage::MemoryDb;

/// Error type for mnemo operations.
#[derive(Debug)]
pub enum Error {
    /// A referenced id, file, or session does not exist.
    NotFound {
        /// Description of what was looked up.
        what: String,
    },
    /// Invalid input was provided (bad regex, bad range, unknown strategy).
    InvalidArgument(String),
    /// A mutation conflicted with existing state (finalized session,
    /// duplicate id).
    Conflict(String),
    /// The database lock timeout was exceeded; the caller may retry.
    Busy(String),
    /// The full-text index has drifted from the entries table. The store is
    /// read-only until repaired.
    IndexInconsistency {
        /// Row count of the entries table.
        entries: u64,
        /// Row count of the FTS index.
        indexed: u64,
    },
    /// A collaborator (LLM endpoint) failed; callers fall back where a
    /// fallback exists.
    External {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
    /// An internal operation failed (IO, SQL).
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { what } => write!(f, "not found: {what}"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::Conflict(msg) => write!(f, "conflict: {msg}"),
            Self::Busy(msg) => write!(f, "busy: {msg}"),
            Self::IndexInconsistency { entries, indexed } => write!(
                f,
                "index inconsistency: {entries} entries but {indexed} indexed rows; store is read-only until repaired"
            ),
            Self::External { operation, cause } => {
                write!(f, "external call '{operation}' failed: {cause}")
            },
            Self::OperationFailed { operation, cause } => {
                write!(f, "operation '{operation}' failed: {cause}")
            },
        }
    }
}

impl StdError for Error {}

/// Result type alias for mnemo operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Builds an [`Error::NotFound`] from anything describable.
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Builds an [`Error::OperationFailed`] from an operation name and cause.
    #[must_use]
    pub fn op(operation: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            cause: cause.to_string(),
        }
    }
}
