//! Session archival: the smart-remember pipeline.
//!
//! Two-tier storage for anything substantial: a dense summary entry (the
//! primary search target) plus the full content for drill-down, linked by
//! shared tags. The pipeline must keep working when tagging or
//! summarization fail -- the raw content is always stored.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::llm::LlmProvider;
use crate::models::EntryId;
use crate::services::memory::{normalize_tags, MemoryService, RememberRequest};
use crate::services::{summarize, tagging};
use crate::{Error, Result};

/// Content above this threshold gets two-tier storage (summary entry plus
/// full-content entry). Below it, a single tagged entry suffices.
const SUMMARY_THRESHOLD: usize = 4_000;

/// Window within which an identical re-archive is treated as a duplicate.
pub const DEDUP_WINDOW_SECS: f64 = 60.0;

/// A request for the smart-remember pipeline.
#[derive(Debug, Clone, Default)]
pub struct SmartRememberRequest {
    /// The content to store.
    pub content: String,
    /// Source type (`text`, `file`, `session`, `stdin`).
    pub source: String,
    /// Identifier for deduplication (filename, URL).
    pub source_name: Option<String>,
    /// Caller-provided tags to include.
    pub user_tags: Vec<String>,
    /// Human-readable label for the entry.
    pub label: Option<String>,
    /// Whether to replace existing entries with the same source name.
    pub dedup: bool,
}

/// What the pipeline stored.
#[derive(Debug, Clone)]
pub struct SmartRememberResult {
    /// Id of the primary (summary) entry.
    pub summary_id: EntryId,
    /// Id of the full-content entry, present only for two-tier storage.
    pub content_id: Option<EntryId>,
    /// The merged tag set.
    pub tags: Vec<String>,
}

/// Outcome of a dedup check before re-archiving a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupDecision {
    /// Nothing stored for this session yet; store fresh.
    Store,
    /// Identical content archived within the window; do nothing.
    Skip,
    /// Content differs (transcript grew); replace these entries.
    Replace(Vec<EntryId>),
}

/// Checks whether content for `source_name` needs storing, skipping, or
/// replacing, per the archival dedup contract.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] on lookup failure.
pub fn deduplicate(
    service: &MemoryService,
    source_name: &str,
    content_hash: &str,
    window_secs: f64,
) -> Result<DedupDecision> {
    let existing = service.db().find_by_source_name(source_name)?;
    if existing.is_empty() {
        return Ok(DedupDecision::Store);
    }

    let now = now();
    for meta in &existing {
        if now - meta.timestamp > window_secs {
            continue;
        }
        let content = service.db().get_content(&meta.id)?;
        if hash_content(&content) == content_hash {
            return Ok(DedupDecision::Skip);
        }
    }

    Ok(DedupDecision::Replace(
        existing.into_iter().map(|m| m.id).collect(),
    ))
}

/// Hashes content for dedup comparison.
#[must_use]
pub fn hash_content(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Runs content through the smart-remember pipeline:
/// semantic tags → summary (for large content) → store → done.
///
/// Tagging and summarization failures degrade to fallbacks inside their
/// services; the raw store itself is the only step allowed to fail.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] for empty content, storage errors
/// otherwise.
pub fn smart_remember(
    service: &MemoryService,
    provider: Option<&dyn LlmProvider>,
    request: SmartRememberRequest,
) -> Result<SmartRememberResult> {
    if request.content.trim().is_empty() {
        return Err(Error::InvalidArgument("content must not be empty".to_string()));
    }

    if request.dedup {
        if let Some(source_name) = &request.source_name {
            let existing = service.db().find_by_source_name(source_name)?;
            if !existing.is_empty() {
                info!(
                    source_name,
                    count = existing.len(),
                    "replacing existing entries for source"
                );
                for meta in existing {
                    let _ = service.db().delete(&meta.id)?;
                }
            }
        }
    }

    let semantic = tagging::extract_semantic_tags(provider, &request.content);
    let all_tags = tagging::combine_tags(&normalize_tags(&request.user_tags), &semantic);

    let char_count = request.content.chars().count();
    if char_count > SUMMARY_THRESHOLD {
        // Two-tier: a dense summary entry for search, the full content for
        // drill-down. The summary is generated from the content; on LLM
        // failure the structured fallback still yields something dense.
        let summary_text = summarize::generate_summary(provider, &request.content);

        let mut summary_tags = vec!["summary".to_string()];
        summary_tags.extend(all_tags.iter().cloned());
        let summary_label = request.label.clone().unwrap_or_else(|| {
            format!(
                "Summary: {}",
                request.source_name.as_deref().unwrap_or(&request.source)
            )
        });
        let summary_result = service.remember(RememberRequest {
            content: summary_text,
            tags: Some(summary_tags),
            summary: Some(summary_label),
            source: format!("{}-summary", request.source),
            source_name: request.source_name.clone(),
        })?;

        let mut content_tags = vec!["full-content".to_string()];
        content_tags.extend(all_tags.iter().cloned());
        let content_label = format!(
            "Full content: {}",
            request.source_name.as_deref().unwrap_or(&request.source)
        );
        let content_result = service.remember(RememberRequest {
            content: request.content,
            tags: Some(content_tags),
            summary: Some(content_label),
            source: request.source,
            source_name: request.source_name,
        })?;

        Ok(SmartRememberResult {
            summary_id: summary_result.id,
            content_id: Some(content_result.id),
            tags: all_tags,
        })
    } else {
        let result = service.remember(RememberRequest {
            content: request.content,
            tags: if all_tags.is_empty() { None } else { Some(all_tags.clone()) },
            summary: request.label,
            source: request.source,
            source_name: request.source_name,
        })?;
        Ok(SmartRememberResult {
            summary_id: result.id,
            content_id: None,
            tags: all_tags,
        })
    }
}

/// Exports, tags, and stores one session log via the smart pipeline.
///
/// Dedup uses the session filename: an identical archive inside the
/// 60-second window is skipped; a grown transcript replaces the prior
/// entries.
///
/// Returns `true` when something was stored.
///
/// # Errors
///
/// Returns export or storage errors; tagging and summarization failures
/// never abort the archive.
pub fn archive_session(
    service: &MemoryService,
    provider: Option<&dyn LlmProvider>,
    session_file: &Path,
    hook_name: &str,
    cwd: Option<&Path>,
) -> Result<bool> {
    let transcript = crate::export::export_session(session_file)?;
    if transcript.trim().is_empty() {
        warn!(hook = hook_name, "empty transcript, skipping archive");
        return Ok(false);
    }

    let session_filename = session_file
        .file_name()
        .map_or_else(|| "session.jsonl".to_string(), |n| n.to_string_lossy().into_owned());

    match deduplicate(
        service,
        &session_filename,
        &hash_content(&transcript),
        DEDUP_WINDOW_SECS,
    )? {
        DedupDecision::Skip => {
            info!(hook = hook_name, file = %session_filename, "already archived, unchanged");
            return Ok(false);
        },
        DedupDecision::Replace(ids) => {
            info!(
                hook = hook_name,
                count = ids.len(),
                "session grew, replacing prior entries"
            );
            for id in ids {
                let _ = service.db().delete(&id)?;
            }
        },
        DedupDecision::Store => {},
    }

    let project = project_name(cwd);
    let date = chrono::Local::now().format("%Y-%m-%d").to_string();
    let session_tag = stable_session_tag(&session_filename);
    let base_tags = vec![
        "conversation".to_string(),
        "session".to_string(),
        project.clone(),
        date.clone(),
        session_tag,
    ];
    let label = format!("Session: {project} on {date}");

    smart_remember(
        service,
        provider,
        SmartRememberRequest {
            content: transcript,
            source: "session".to_string(),
            source_name: Some(session_filename),
            user_tags: base_tags,
            label: Some(label),
            dedup: false, // handled above with the hash check
        },
    )?;
    Ok(true)
}

/// Project name from the enclosing git repository, or the directory name
/// when no repository is found.
#[must_use]
pub fn project_name(cwd: Option<&Path>) -> String {
    let dir = cwd.map_or_else(
        || std::env::current_dir().unwrap_or_else(|_| Path::new(".").to_path_buf()),
        Path::to_path_buf,
    );

    if let Ok(repo) = git2::Repository::discover(&dir) {
        if let Some(name) = repo
            .workdir()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
        {
            return name;
        }
    }
    dir.file_name()
        .map_or_else(|| "unknown".to_string(), |n| n.to_string_lossy().into_owned())
}

/// A stable per-session tag derived from the session filename, so the
/// summary and full-content entries stay linked across re-archives.
fn stable_session_tag(session_filename: &str) -> String {
    let digest = Sha256::digest(session_filename.as_bytes());
    let hex: String = digest.iter().take(4).map(|b| format!("{b:02x}")).collect();
    format!("s_{hex}")
}

fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
