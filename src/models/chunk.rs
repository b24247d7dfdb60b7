//! Chunk descriptors and manifests.
//!
//! A chunk is content-free: it describes a slice of a target (by line range
//! or by file group) without carrying the text itself. Chunk ids are
//! deterministic hashes so they stay stable across runs for identical
//! inputs.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// Number of hex characters in a chunk id.
const CHUNK_ID_LEN: usize = 16;

/// A content-free descriptor of a slice of the analysis target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic chunk id (16 hex chars).
    pub chunk_id: String,
    /// What the chunk covers.
    #[serde(flatten)]
    pub span: ChunkSpan,
    /// Estimated character count of the covered content.
    pub char_count: usize,
    /// Short orientation excerpt (first meaningful line, ≤ 120 chars).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    /// Function name, heading title, or other label when the strategy
    /// produces one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// The two shapes a chunk can take.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChunkSpan {
    /// A 1-indexed inclusive line range of a single file.
    Lines {
        /// The file the range refers to.
        source_file: PathBuf,
        /// First line (≥ 1).
        start_line: usize,
        /// Last line (≥ `start_line`).
        end_line: usize,
    },
    /// A named group of files.
    Files {
        /// Group name (directory, language, or `group_N`).
        group_name: String,
        /// Member file paths.
        files: Vec<PathBuf>,
        /// Sum of member line counts.
        total_lines: usize,
    },
}

impl Chunk {
    /// Returns the line range when this is a line-span chunk.
    #[must_use]
    pub fn line_range(&self) -> Option<(&PathBuf, usize, usize)> {
        match &self.span {
            ChunkSpan::Lines {
                source_file,
                start_line,
                end_line,
            } => Some((source_file, *start_line, *end_line)),
            ChunkSpan::Files { .. } => None,
        }
    }
}

/// Computes the deterministic id for a line-range chunk.
///
/// The preimage is `source:start:end`, hashed with SHA-256 and truncated to
/// 16 hex chars. Stable across runs and hosts for identical inputs.
#[must_use]
pub fn line_chunk_id(source: &str, start: usize, end: usize) -> String {
    hash_id(&format!("{source}:{start}:{end}"))
}

/// Computes the deterministic id for a file-group chunk
/// (preimage `group_name:file_count`).
#[must_use]
pub fn group_chunk_id(group_name: &str, file_count: usize) -> String {
    hash_id(&format!("{group_name}:{file_count}"))
}

fn hash_id(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..CHUNK_ID_LEN].to_string()
}

/// An ordered collection of chunks over a target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// The strategy that produced this manifest.
    pub strategy: String,
    /// The file or directory that was chunked.
    pub source: PathBuf,
    /// Total lines of the source, when the strategy is line-based.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_lines: Option<usize>,
    /// Total files grouped, when the strategy is file-based.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_files: Option<usize>,
    /// The chunks, in source order.
    pub chunks: Vec<Chunk>,
}

impl Manifest {
    /// Number of chunks in the manifest.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Finds a chunk by id.
    #[must_use]
    pub fn find(&self, chunk_id: &str) -> Option<&Chunk> {
        self.chunks.iter().find(|c| c.chunk_id == chunk_id)
    }
}

/// A descriptor for a char-range slice of a stored memory entry.
///
/// Large entries are split at blank-line boundaries when stored; the chunk
/// list is persisted with the entry so `memory-extract --chunk-id` can
/// return one slice without the orchestrator seeing the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentChunk {
    /// Chunk id (`mc_` + 10 hex chars, deterministic per entry and range).
    pub chunk_id: String,
    /// Start offset into the content, in chars.
    pub start_char: usize,
    /// End offset (exclusive), in chars.
    pub end_char: usize,
    /// Chars covered.
    pub char_count: usize,
    /// Short orientation excerpt.
    pub preview: String,
}

impl ContentChunk {
    /// Computes the deterministic id for an entry-content chunk.
    #[must_use]
    pub fn make_id(entry_id: &str, start: usize, end: usize) -> String {
        let digest = Sha256::digest(format!("{entry_id}:{start}:{end}").as_bytes());
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        format!("mc_{}", &hex[..10])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_ids_are_deterministic() {
        let a = line_chunk_id("/tmp/a.rs", 1, 50);
        let b = line_chunk_id("/tmp/a.rs", 1, 50);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_chunk_ids_differ_by_range() {
        assert_ne!(line_chunk_id("/tmp/a.rs", 1, 50), line_chunk_id("/tmp/a.rs", 1, 51));
        assert_ne!(line_chunk_id("/tmp/a.rs", 1, 50), line_chunk_id("/tmp/b.rs", 1, 50));
    }

    #[test]
    fn test_group_chunk_ids() {
        let id = group_chunk_id("src", 7);
        assert_eq!(id, group_chunk_id("src", 7));
        assert_ne!(id, group_chunk_id("src", 8));
    }

    #[test]
    fn test_manifest_roundtrip_and_lookup() {
        let chunk = Chunk {
            chunk_id: line_chunk_id("a.md", 1, 10),
            span: ChunkSpan::Lines {
                source_file: PathBuf::from("a.md"),
                start_line: 1,
                end_line: 10,
            },
            char_count: 240,
            preview: Some("# Title".to_string()),
            label: Some("Title".to_string()),
        };
        let manifest = Manifest {
            strategy: "headings".to_string(),
            source: PathBuf::from("a.md"),
            total_lines: Some(10),
            total_files: None,
            chunks: vec![chunk.clone()],
        };

        let json = serde_json::to_string_pretty(&manifest).unwrap();
        let parsed: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.chunk_count(), 1);
        let found = parsed.find(&chunk.chunk_id).unwrap();
        assert_eq!(found.line_range().unwrap().1, 1);
        assert_eq!(found.line_range().unwrap().2, 10);
    }

    #[test]
    fn test_file_group_span_roundtrip() {
        let chunk = Chunk {
            chunk_id: group_chunk_id("rust", 2),
            span: ChunkSpan::Files {
                group_name: "rust".to_string(),
                files: vec![PathBuf::from("a.rs"), PathBuf::from("b.rs")],
                total_lines: 300,
            },
            char_count: 9000,
            preview: None,
            label: None,
        };
        let json = serde_json::to_string(&chunk).unwrap();
        let parsed: Chunk = serde_json::from_str(&json).unwrap();
        assert!(parsed.line_range().is_none());
        match parsed.span {
            ChunkSpan::Files { files, .. } => assert_eq!(files.len(), 2),
            ChunkSpan::Lines { .. } => panic!("expected file group span"),
        }
    }

    #[test]
    fn test_content_chunk_id_prefix() {
        let id = ContentChunk::make_id("m_0123456789ab", 0, 5000);
        assert!(id.starts_with("mc_"));
        assert_eq!(id.len(), 13);
    }
}
