//! Handlers for the memory verbs: remember, recall, memory-extract,
//! memory-list, memory-tags, forget, stats, export-session.

use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{Local, TimeZone};

use crate::llm::LlmProvider;
use crate::models::EntryId;
use crate::output::bound_output;
use crate::services::{archive, MemoryService, SmartRememberRequest};
use crate::{export, Error, Result};

/// Where remember content comes from.
#[derive(Debug, Clone)]
pub enum RememberInput {
    /// Positional text argument.
    Text(String),
    /// `--file PATH` (session logs are exported first).
    File(PathBuf),
    /// `--stdin`.
    Stdin,
}

/// Store content through the smart-remember pipeline.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] for empty content and IO errors for
/// unreadable files.
pub fn cmd_remember(
    service: &MemoryService,
    provider: Option<&dyn LlmProvider>,
    input: &RememberInput,
    tags: Option<&str>,
    summary: Option<&str>,
) -> Result<()> {
    let (content, source, source_name) = match input {
        RememberInput::Text(text) => (text.clone(), "text", None),
        RememberInput::File(path) => {
            // Session logs need transcript compression before storage.
            let content = if path.extension().is_some_and(|e| e == "jsonl") {
                export::export_session(path)?
            } else {
                std::fs::read_to_string(path).map_err(|e| Error::op("read_file", e))?
            };
            (content, "file", Some(path.to_string_lossy().into_owned()))
        },
        RememberInput::Stdin => {
            let mut content = String::new();
            std::io::stdin()
                .read_to_string(&mut content)
                .map_err(|e| Error::op("read_stdin", e))?;
            (content, "stdin", None)
        },
    };

    let user_tags = tags
        .map(|raw| {
            raw.split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let result = archive::smart_remember(
        service,
        provider,
        SmartRememberRequest {
            content,
            source: source.to_string(),
            source_name: source_name.clone(),
            user_tags,
            label: summary.map(str::to_string),
            dedup: source_name.is_some(),
        },
    )?;

    let mut lines = vec![
        format!("Memory stored: {}", result.summary_id),
        format!("Tags: {}", result.tags.join(", ")),
    ];
    if let Some(content_id) = result.content_id {
        lines.push(format!("Full content: {content_id}"));
    }
    println!("{}", bound_output("remember", &lines.join("\n")));
    Ok(())
}

/// Search memory and print annotated hits.
///
/// # Errors
///
/// Returns search errors from the service.
pub fn cmd_recall(service: &MemoryService, query: &str, tags: Option<&str>, max: usize) -> Result<()> {
    let tags = split_tags(tags);
    let text = service.recall(query, &tags, max)?;
    println!("{}", bound_output("recall", &text));
    Ok(())
}

/// Extract entry content: full (for a subagent, unbounded), grep
/// (bounded), or one content chunk.
///
/// # Errors
///
/// Returns [`Error::NotFound`] for unknown ids/chunks.
pub fn cmd_memory_extract(
    service: &MemoryService,
    entry_id: &str,
    chunk_id: Option<&str>,
    grep: Option<&str>,
    context: usize,
) -> Result<()> {
    let id = EntryId::new(entry_id);
    let text = service.memory_extract(&id, chunk_id, grep, context)?;
    if grep.is_some() {
        println!("{}", bound_output("memory-extract", &text));
    } else {
        // Full content and chunk slices feed subordinate agents.
        println!("{text}");
    }
    Ok(())
}

/// Print the bounded chronological listing.
///
/// # Errors
///
/// Returns listing errors from the service.
pub fn cmd_memory_list(
    service: &MemoryService,
    tags: Option<&str>,
    offset: usize,
    limit: usize,
) -> Result<()> {
    let tags = split_tags(tags);
    let text = service.format_list(&tags, offset, limit)?;
    println!("{}", bound_output("memory-list", &text));
    Ok(())
}

/// Print the tag histogram.
///
/// # Errors
///
/// Returns histogram errors from the service.
pub fn cmd_memory_tags(service: &MemoryService) -> Result<()> {
    println!("{}", bound_output("memory-tags", &service.format_tags()?));
    Ok(())
}

/// Delete an entry.
///
/// # Errors
///
/// Returns [`Error::NotFound`] for an unknown id.
pub fn cmd_forget(service: &MemoryService, entry_id: &str) -> Result<()> {
    let id = EntryId::new(entry_id);
    service.forget(&id)?;
    println!("Deleted: {id}");
    Ok(())
}

/// Print store statistics.
///
/// # Errors
///
/// Returns stats errors from the database.
#[allow(clippy::cast_possible_truncation)]
pub fn cmd_stats(service: &MemoryService) -> Result<()> {
    let stats = service.db().stats()?;

    let mut lines = vec![
        "Memory Statistics".to_string(),
        "=".repeat(40),
        String::new(),
        format!("Entries:        {}", stats.total_entries),
        format!("Total content:  {}", fmt_chars(stats.total_chars)),
        format!("Database size:  {}", fmt_bytes(stats.db_file_size)),
        format!("Unique tags:    {}", stats.unique_tags),
        String::new(),
    ];

    if stats.oldest_timestamp > 0.0 {
        let fmt_day = |ts: f64| {
            Local
                .timestamp_opt(ts as i64, 0)
                .single()
                .map_or_else(|| "?".to_string(), |d| d.format("%Y-%m-%d").to_string())
        };
        lines.push(format!(
            "Date range:     {} -> {}",
            fmt_day(stats.oldest_timestamp),
            fmt_day(stats.newest_timestamp)
        ));
        lines.push(String::new());
    }

    lines.push(format!(
        "Entry sizes:    avg {}, min {}, max {}",
        fmt_chars(stats.avg_chars),
        fmt_chars(stats.min_chars),
        fmt_chars(stats.max_chars)
    ));
    lines.push(String::new());

    lines.push("Size distribution:".to_string());
    let buckets = [
        ("small (<2KB)", stats.size_distribution[0]),
        ("medium (2-10KB)", stats.size_distribution[1]),
        ("large (10-50KB)", stats.size_distribution[2]),
        ("huge (>50KB)", stats.size_distribution[3]),
    ];
    for (label, count) in buckets {
        #[allow(clippy::cast_possible_truncation)]
        let bar = "#".repeat((count.min(40)) as usize);
        lines.push(format!("  {label:<16} {count:>4}  {bar}"));
    }
    lines.push(String::new());

    if !stats.by_source.is_empty() {
        lines.push("By source:".to_string());
        for (source, count, chars) in &stats.by_source {
            lines.push(format!(
                "  {source:<12} {count:>4} entries  ({})",
                fmt_chars(*chars)
            ));
        }
        lines.push(String::new());
    }

    if !stats.top_tags.is_empty() {
        lines.push("Top tags:".to_string());
        for (tag, count) in &stats.top_tags {
            lines.push(format!("  {tag:<24} {count:>4}"));
        }
    }

    println!("{}", bound_output("stats", &lines.join("\n")));
    Ok(())
}

/// Export a session log to a readable transcript.
///
/// With `--output` the transcript is written to a file; otherwise it is
/// printed unbounded -- hooks pipe it straight into `remember`.
///
/// # Errors
///
/// Returns [`Error::NotFound`] for a missing log file.
pub fn cmd_export_session(session_file: &Path, output: Option<&Path>) -> Result<()> {
    let text = export::export_session(session_file)?;
    match output {
        Some(path) => {
            std::fs::write(path, &text).map_err(|e| Error::op("write_transcript", e))?;
            println!("Exported to {} ({} chars)", path.display(), text.chars().count());
        },
        None => println!("{text}"),
    }
    Ok(())
}

fn split_tags(tags: Option<&str>) -> Vec<String> {
    tags.map(|raw| {
        raw.split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

fn fmt_chars(chars: u64) -> String {
    if chars >= 1_000_000 {
        #[allow(clippy::cast_precision_loss)]
        return format!("{:.1}M chars", chars as f64 / 1_000_000.0);
    }
    if chars >= 1_000 {
        #[allow(clippy::cast_precision_loss)]
        return format!("{:.1}K chars", chars as f64 / 1_000.0);
    }
    format!("{chars} chars")
}

fn fmt_bytes(bytes: u64) -> String {
    if bytes >= 1_000_000 {
        #[allow(clippy::cast_precision_loss)]
        return format!("{:.1} MB", bytes as f64 / 1_000_000.0);
    }
    if bytes >= 1_000 {
        #[allow(clippy::cast_precision_loss)]
        return format!("{:.1} KB", bytes as f64 / 1_000.0);
    }
    format!("{bytes} bytes")
}
