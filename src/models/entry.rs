//! Memory entry types and identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::chunk::ContentChunk;

/// Unique identifier for a memory entry (`m_` + 12 hex chars).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    /// Creates an entry ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh globally-unique entry ID.
    #[must_use]
    pub fn generate() -> Self {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("m_{}", &hex[..12]))
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EntryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EntryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A persisted memory entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    /// Unique identifier.
    pub id: EntryId,
    /// Short human summary (at most ~200 chars, commonly ≤ 80).
    pub summary: String,
    /// Lowercase tags; duplicates collapsed, insertion order preserved.
    pub tags: Vec<String>,
    /// Creation time, seconds since the Unix epoch.
    pub timestamp: f64,
    /// Origin descriptor (`text`, `file`, `stdin`, `session`, ...).
    pub source: String,
    /// Optional source name used for deduplication (filename, URL).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    /// Length of `content` in Unicode scalar values.
    pub char_count: usize,
    /// The stored content.
    pub content: String,
    /// Content-chunk descriptors, present only for large entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<Vec<ContentChunk>>,
}

impl Entry {
    /// Returns the metadata view of this entry (no content, no chunks).
    #[must_use]
    pub fn meta(&self) -> EntryMeta {
        EntryMeta {
            id: self.id.clone(),
            summary: self.summary.clone(),
            tags: self.tags.clone(),
            timestamp: self.timestamp,
            source: self.source.clone(),
            source_name: self.source_name.clone(),
            char_count: self.char_count,
        }
    }
}

/// Metadata-only view of an entry, safe to hand to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryMeta {
    /// Unique identifier.
    pub id: EntryId,
    /// Short human summary.
    pub summary: String,
    /// Lowercase tags.
    pub tags: Vec<String>,
    /// Creation time, seconds since the Unix epoch.
    pub timestamp: f64,
    /// Origin descriptor.
    pub source: String,
    /// Optional source name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    /// Length of the content in Unicode scalar values.
    pub char_count: usize,
}

impl EntryMeta {
    /// Returns the size category for this entry's content.
    #[must_use]
    pub fn size_category(&self) -> SizeCategory {
        SizeCategory::from_char_count(self.char_count)
    }
}

/// Size classification the orchestrator uses to pick a retrieval strategy:
/// direct read, grep pre-filter, or recursive analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeCategory {
    /// Under 2 KiB -- safe to read directly.
    Small,
    /// Under 10 KiB -- still cheap to read.
    Medium,
    /// Under 50 KiB -- grep pre-filter recommended.
    Large,
    /// 50 KiB and up -- recursive analysis territory.
    Huge,
}

impl SizeCategory {
    /// Classifies a character count.
    #[must_use]
    pub const fn from_char_count(chars: usize) -> Self {
        if chars < 2_048 {
            Self::Small
        } else if chars < 10_240 {
            Self::Medium
        } else if chars < 51_200 {
            Self::Large
        } else {
            Self::Huge
        }
    }

    /// Returns the lowercase category name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::Huge => "huge",
        }
    }
}

impl fmt::Display for SizeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_well_formed() {
        let id = EntryId::generate();
        assert!(id.as_str().starts_with("m_"));
        assert_eq!(id.as_str().len(), 14);
        assert!(id.as_str()[2..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = EntryId::generate();
        let b = EntryId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_size_category_boundaries() {
        assert_eq!(SizeCategory::from_char_count(0), SizeCategory::Small);
        assert_eq!(SizeCategory::from_char_count(2_047), SizeCategory::Small);
        assert_eq!(SizeCategory::from_char_count(2_048), SizeCategory::Medium);
        assert_eq!(SizeCategory::from_char_count(10_239), SizeCategory::Medium);
        assert_eq!(SizeCategory::from_char_count(10_240), SizeCategory::Large);
        assert_eq!(SizeCategory::from_char_count(51_199), SizeCategory::Large);
        assert_eq!(SizeCategory::from_char_count(51_200), SizeCategory::Huge);
    }

    #[test]
    fn test_meta_strips_content() {
        let entry = Entry {
            id: EntryId::new("m_abcabcabcabc"),
            summary: "a note".to_string(),
            tags: vec!["ops".to_string()],
            timestamp: 1_700_000_000.0,
            source: "text".to_string(),
            source_name: None,
            char_count: 6,
            content: "secret".to_string(),
            chunks: None,
        };
        let meta = entry.meta();
        assert_eq!(meta.id, entry.id);
        assert_eq!(meta.char_count, 6);
        let json = serde_json::to_string(&meta).unwrap();
        assert!(!json.contains("secret"));
    }
}
