//! The memory service: remember, recall, extract, forget.
//!
//! Sits between the CLI/tool surface and the database. Generates tags and
//! summaries when the caller omits them, annotates recall hits with size
//! categories so the orchestrator can pick a retrieval strategy, and keeps
//! the grep-within-entry path cheap (one regex pass, bounded output).

use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;
use tracing::debug;

use crate::extract::grep_lines;
use crate::models::{ContentChunk, Entry, EntryId, EntryMeta, SizeCategory};
use crate::storage::MemoryDb;
use crate::{Error, Result};

/// Entries above this size get a content-chunk list stored alongside them.
const CHUNK_THRESHOLD: usize = 10_000;
/// Target size of one content chunk.
const CONTENT_CHUNK_TARGET: usize = 5_000;

/// Words excluded from auto-tagging and query tokenization.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "that", "this", "with", "from", "are", "was", "were", "been", "being",
    "have", "has", "had", "does", "did", "will", "would", "could", "should", "may", "might",
    "can", "shall", "not", "but", "into", "about", "than", "then", "when", "where", "which",
    "while", "also", "each", "other", "some", "such", "only", "very", "just", "over", "after",
    "before", "between", "through", "during", "without", "again", "further", "once", "here",
    "there", "all", "both", "more", "most", "same", "own", "too", "any", "how", "what", "who",
    "whom", "why", "these", "those", "above", "below", "under", "use", "used", "using",
    "because", "like", "make", "made",
];

/// A request to store a memory.
#[derive(Debug, Clone, Default)]
pub struct RememberRequest {
    /// The content to store. Must be non-empty.
    pub content: String,
    /// Tags; generated from the content when `None`.
    pub tags: Option<Vec<String>>,
    /// Summary; generated from the content when `None`.
    pub summary: Option<String>,
    /// Origin descriptor (`text`, `file`, `stdin`, `session`, ...).
    pub source: String,
    /// Optional source name for later deduplication.
    pub source_name: Option<String>,
}

/// What `remember` stored.
#[derive(Debug, Clone)]
pub struct RememberResult {
    /// The new entry id.
    pub id: EntryId,
    /// The (possibly generated) summary.
    pub summary: String,
    /// The (possibly generated) tags.
    pub tags: Vec<String>,
    /// Content length in chars.
    pub char_count: usize,
}

/// High-level memory operations over the database.
pub struct MemoryService {
    db: MemoryDb,
}

impl MemoryService {
    /// Wraps a database handle.
    #[must_use]
    pub const fn new(db: MemoryDb) -> Self {
        Self { db }
    }

    /// Direct access to the underlying database.
    #[must_use]
    pub const fn db(&self) -> &MemoryDb {
        &self.db
    }

    /// Stores a memory entry, generating tags and a summary when absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for empty content.
    pub fn remember(&self, request: RememberRequest) -> Result<RememberResult> {
        if request.content.trim().is_empty() {
            return Err(Error::InvalidArgument("content must not be empty".to_string()));
        }

        let summary = match request.summary {
            Some(s) => truncate_chars(&s, 80),
            None => auto_summary(&request.content),
        };
        let tags = match request.tags {
            Some(tags) => normalize_tags(&tags),
            None => auto_tags(&request.content),
        };

        let id = EntryId::generate();
        let char_count = request.content.chars().count();
        let chunks = (char_count > CHUNK_THRESHOLD)
            .then(|| chunk_content(&request.content, id.as_str()));

        let source = if request.source.is_empty() {
            "text".to_string()
        } else {
            request.source
        };

        let entry = Entry {
            id: id.clone(),
            summary: summary.clone(),
            tags: tags.clone(),
            timestamp: now(),
            source,
            source_name: request.source_name,
            char_count,
            content: request.content,
            chunks,
        };
        self.db.insert(&entry)?;
        debug!(entry_id = %id, chars = char_count, "memory stored");

        Ok(RememberResult {
            id,
            summary,
            tags,
            char_count,
        })
    }

    /// Searches memory and formats hits with size annotations.
    ///
    /// Hits in the `large`/`huge` buckets get a trailing guidance block:
    /// the orchestrator is expected to grep-prefilter those entries before
    /// dispatching a subagent at them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] on search failure.
    pub fn recall(&self, query: &str, tags: &[String], max: usize) -> Result<String> {
        let hits = self.db.search(query, tags, max)?;
        if hits.is_empty() {
            return Ok("No matching memories found.".to_string());
        }

        let mut lines = vec![format!("Found {} matching memories:\n", hits.len())];
        for hit in &hits {
            let category = hit.meta.size_category();
            let mut line = format!(
                "  [{:>6.2}] {}  {}",
                -hit.rank,
                hit.meta.id,
                hit.meta.summary
            );
            if !hit.meta.tags.is_empty() {
                line.push_str(&format!("  [{}]", hit.meta.tags.join(", ")));
            }
            line.push_str(&format!("  ({} chars, {category})", hit.meta.char_count));
            lines.push(line);
        }

        let large: Vec<&EntryMeta> = hits
            .iter()
            .map(|h| &h.meta)
            .filter(|m| matches!(m.size_category(), SizeCategory::Large | SizeCategory::Huge))
            .collect();
        if !large.is_empty() {
            lines.push(String::new());
            lines.push(format!(
                "Note: {} of {} results are large. Grep-prefilter before dispatching a subagent:",
                large.len(),
                hits.len()
            ));
            lines.push("  mnemo memory-extract <id> --grep \"keyword\"".to_string());
            for meta in large {
                lines.push(format!(
                    "  {}: {} chars ({})",
                    meta.id,
                    meta.char_count,
                    meta.size_category()
                ));
            }
        }

        Ok(lines.join("\n"))
    }

    /// Extracts content from an entry.
    ///
    /// Without options the full content comes back (subagent-destined, not
    /// gated). With `grep` a single case-insensitive regex pass runs over
    /// the entry content. With `chunk_id` one stored content chunk is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for unknown ids or chunk ids and
    /// [`Error::InvalidArgument`] for a bad pattern.
    pub fn memory_extract(
        &self,
        id: &EntryId,
        chunk_id: Option<&str>,
        grep: Option<&str>,
        context: usize,
    ) -> Result<String> {
        if let Some(pattern) = grep {
            let content = self.db.get_content(id)?;
            let lines: Vec<String> = content.lines().map(str::to_string).collect();
            return Ok(grep_lines(&lines, pattern, context)?.unwrap_or_else(|| {
                format!("No matches found for pattern '{pattern}' in {id}")
            }));
        }

        let entry = self
            .db
            .get(id)?
            .ok_or_else(|| Error::not_found(format!("memory entry {id}")))?;

        if let Some(chunk_id) = chunk_id {
            let chunk = entry
                .chunks
                .as_deref()
                .and_then(|chunks| chunks.iter().find(|c| c.chunk_id == chunk_id))
                .ok_or_else(|| {
                    Error::not_found(format!("chunk {chunk_id} in entry {id}"))
                })?;
            let slice: String = entry
                .content
                .chars()
                .skip(chunk.start_char)
                .take(chunk.end_char - chunk.start_char)
                .collect();
            return Ok(slice);
        }

        Ok(entry.content)
    }

    /// Deletes an entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the id does not exist.
    pub fn forget(&self, id: &EntryId) -> Result<()> {
        if self.db.delete(id)? {
            Ok(())
        } else {
            Err(Error::not_found(format!("memory entry {id}")))
        }
    }

    /// Formats a chronological listing, bounded by the caller.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] on SQL failure.
    pub fn format_list(&self, tags: &[String], offset: usize, limit: usize) -> Result<String> {
        let (metas, total) = self.db.list(tags, offset, limit)?;

        let mut header = format!("Memory Store: {total} entries total");
        if offset > 0 || metas.len() < total {
            header.push_str(&format!(
                " (showing {}-{})",
                offset + 1,
                offset + metas.len()
            ));
        }
        let mut lines = vec![header, String::new()];

        for (idx, meta) in metas.iter().enumerate() {
            let mut line = format!("  {}  {}", meta.id, meta.summary);
            if !meta.tags.is_empty() {
                line.push_str(&format!("  [{}]", meta.tags.join(", ")));
            }
            line.push_str(&format!("  ({} chars, {})", meta.char_count, meta.source));
            lines.push(line);

            let current: usize = lines.iter().map(|l| l.len() + 1).sum();
            if current > crate::output::MAX_OUTPUT - 100 {
                let remaining = metas.len() - idx - 1;
                if remaining > 0 {
                    lines.push(format!(
                        "  ... and {remaining} more entries (use --offset to paginate)"
                    ));
                }
                break;
            }
        }
        Ok(lines.join("\n"))
    }

    /// Formats the tag histogram.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] on SQL failure.
    pub fn format_tags(&self) -> Result<String> {
        let counts = self.db.tag_histogram()?;
        if counts.is_empty() {
            return Ok("No tags found. Memory store is empty.".to_string());
        }
        let mut lines = vec![format!("Tags ({} unique):\n", counts.len())];
        for (tag, count) in counts {
            lines.push(format!("  {tag}: {count}"));
        }
        Ok(lines.join("\n"))
    }
}

/// First meaningful line of the content, markdown stripped, truncated at a
/// word boundary to at most 80 chars.
#[must_use]
pub fn auto_summary(content: &str) -> String {
    let heading = Regex::new(r"^#+\s*").expect("static pattern");
    let markup = Regex::new(r"[*_`~]").expect("static pattern");

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("```") {
            continue;
        }
        let line = heading.replace(line, "");
        let line = markup.replace_all(&line, "");
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.chars().count() <= 80 {
            return line.to_string();
        }
        let head: String = line.chars().take(80).collect();
        // Prefer a word boundary when one exists in the back half.
        return match head.rfind(' ') {
            Some(pos) if pos > 40 => head[..pos].to_string(),
            _ => head,
        };
    }

    let head: String = content.chars().take(80).collect();
    let trimmed = head.trim();
    if trimmed.is_empty() {
        "(empty)".to_string()
    } else {
        trimmed.to_string()
    }
}

/// 3–6 lowercase keywords from frequent non-stopword tokens (length > 3,
/// appearing at least twice), ordered by descending frequency.
#[must_use]
pub fn auto_tags(content: &str) -> Vec<String> {
    let word_re = Regex::new(r"[a-zA-Z_][a-zA-Z0-9_]*").expect("static pattern");
    let mut freq: Vec<(String, usize)> = Vec::new();

    for m in word_re.find_iter(&content.to_lowercase()) {
        let word = m.as_str();
        if word.len() <= 3 || STOP_WORDS.contains(&word) {
            continue;
        }
        match freq.iter_mut().find(|(w, _)| w == word) {
            Some((_, count)) => *count += 1,
            None => freq.push((word.to_string(), 1)),
        }
    }

    freq.retain(|(_, count)| *count >= 2);
    freq.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    freq.into_iter().take(6).map(|(w, _)| w).collect()
}

/// Lowercases, trims, and deduplicates caller-supplied tags, preserving
/// insertion order.
#[must_use]
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// Splits large content at blank-line boundaries into ~5 KB chunks,
/// returning descriptors only.
fn chunk_content(content: &str, entry_id: &str) -> Vec<ContentChunk> {
    let blank = Regex::new(r"\n\s*\n").expect("static pattern");
    let mut chunks = Vec::new();
    let mut current_start = 0usize;
    let mut current_len = 0usize;
    let mut preview = String::new();

    let mut flush = |start: usize, len: usize, preview: &str, chunks: &mut Vec<ContentChunk>| {
        if len == 0 {
            return;
        }
        let end = start + len;
        chunks.push(ContentChunk {
            chunk_id: ContentChunk::make_id(entry_id, start, end),
            start_char: start,
            end_char: end,
            char_count: len,
            preview: preview.chars().take(80).collect::<String>().trim().to_string(),
        });
    };

    for piece in split_keeping_lengths(&blank, content) {
        let piece_len = piece.chars().count();
        if current_len > 0 && current_len + piece_len > CONTENT_CHUNK_TARGET {
            flush(current_start, current_len, &preview, &mut chunks);
            current_start += current_len;
            current_len = 0;
            preview.clear();
        }
        if current_len == 0 {
            preview = piece.chars().take(80).collect();
        }
        current_len += piece_len;
    }
    flush(current_start, current_len, &preview, &mut chunks);
    chunks
}

/// Splits on the pattern but folds each separator's length into the
/// preceding piece, so char offsets stay exact over the original content.
fn split_keeping_lengths<'a>(re: &Regex, content: &'a str) -> Vec<&'a str> {
    let mut pieces = Vec::new();
    let mut last = 0usize;
    for m in re.find_iter(content) {
        pieces.push(&content[last..m.end()]);
        last = m.end();
    }
    if last < content.len() {
        pieces.push(&content[last..]);
    }
    pieces
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
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

    fn service() -> MemoryService {
        MemoryService::new(MemoryDb::in_memory().unwrap())
    }

    #[test]
    fn test_remember_then_recall() {
        let svc = service();
        let stored = svc
            .remember(RememberRequest {
                content: "The deploy requires running migrations first".to_string(),
                tags: Some(vec!["deploy".to_string(), "ops".to_string()]),
                summary: Some("Deploy prerequisites".to_string()),
                source: "text".to_string(),
                source_name: None,
            })
            .unwrap();

        let out = svc.recall("migrations deploy", &[], 20).unwrap();
        assert!(out.contains(stored.id.as_str()));
        assert!(out.contains("small"));
    }

    #[test]
    fn test_remember_rejects_empty_content() {
        let svc = service();
        let err = svc
            .remember(RememberRequest {
                content: "   \n".to_string(),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_auto_summary_strips_markdown() {
        let content = "## The **big** `plan`\n\nbody text\n";
        assert_eq!(auto_summary(content), "The big plan");
    }

    #[test]
    fn test_auto_summary_truncates_at_word_boundary() {
        let long = "word ".repeat(40);
        let summary = auto_summary(&long);
        assert!(summary.chars().count() <= 80);
        assert!(!summary.ends_with(' '));
    }

    #[test]
    fn test_auto_summary_empty_content() {
        assert_eq!(auto_summary(""), "(empty)");
        assert_eq!(auto_summary("```\ncode only\n"), "code only");
    }

    #[test]
    fn test_auto_tags_frequency_rule() {
        let content = "kafka kafka kafka partition partition broker the the the and";
        let tags = auto_tags(content);
        assert_eq!(tags[0], "kafka");
        assert!(tags.contains(&"partition".to_string()));
        // "broker" appears once, stop words never qualify.
        assert!(!tags.contains(&"broker".to_string()));
        assert!(!tags.contains(&"the".to_string()));
        assert!(tags.len() <= 6);
    }

    #[test]
    fn test_normalize_tags_dedups_preserving_order() {
        let tags = vec![
            " Deploy ".to_string(),
            "ops".to_string(),
            "deploy".to_string(),
        ];
        assert_eq!(normalize_tags(&tags), vec!["deploy", "ops"]);
    }

    #[test]
    fn test_large_content_gets_chunk_descriptors() {
        let svc = service();
        let block = "lorem ipsum dolor sit amet ".repeat(40);
        let content = (0..20).map(|_| block.clone()).collect::<Vec<_>>().join("\n\n");
        assert!(content.chars().count() > CHUNK_THRESHOLD);

        let stored = svc
            .remember(RememberRequest {
                content: content.clone(),
                source: "text".to_string(),
                ..Default::default()
            })
            .unwrap();

        let entry = svc.db().get(&stored.id).unwrap().unwrap();
        let chunks = entry.chunks.expect("large entry should carry chunks");
        assert!(chunks.len() >= 2);

        // Chunk offsets tile the content without gaps.
        assert_eq!(chunks[0].start_char, 0);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end_char, pair[1].start_char);
        }
        assert_eq!(
            chunks.last().unwrap().end_char,
            content.chars().count()
        );

        // Extracting one chunk returns exactly its slice.
        let slice = svc
            .memory_extract(&stored.id, Some(&chunks[1].chunk_id), None, 0)
            .unwrap();
        assert_eq!(slice.chars().count(), chunks[1].char_count);
    }

    #[test]
    fn test_memory_extract_full_and_grep() {
        let svc = service();
        let stored = svc
            .remember(RememberRequest {
                content: "alpha\nbeta\nPASSWORD=secret\nbeta\nalpha".to_string(),
                source: "text".to_string(),
                ..Default::default()
            })
            .unwrap();

        let full = svc.memory_extract(&stored.id, None, None, 0).unwrap();
        assert!(full.contains("PASSWORD=secret"));

        let grepped = svc
            .memory_extract(&stored.id, None, Some("password"), 1)
            .unwrap();
        assert!(grepped.contains(">>"));
        assert!(grepped.contains("3|"));

        let empty = svc
            .memory_extract(&stored.id, None, Some("zzz_absent"), 1)
            .unwrap();
        assert!(empty.starts_with("No matches found"));
    }

    #[test]
    fn test_forget_unknown_id() {
        let svc = service();
        let err = svc.forget(&EntryId::new("m_ffffffffffff")).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_format_list_and_tags() {
        let svc = service();
        svc.remember(RememberRequest {
            content: "first note".to_string(),
            tags: Some(vec!["alpha".to_string()]),
            source: "text".to_string(),
            ..Default::default()
        })
        .unwrap();
        svc.remember(RememberRequest {
            content: "second note".to_string(),
            tags: Some(vec!["alpha".to_string(), "beta".to_string()]),
            source: "text".to_string(),
            ..Default::default()
        })
        .unwrap();

        let listing = svc.format_list(&[], 0, 50).unwrap();
        assert!(listing.contains("2 entries total"));

        let tags = svc.format_tags().unwrap();
        assert!(tags.contains("alpha: 2"));
        assert!(tags.contains("beta: 1"));
    }
}
