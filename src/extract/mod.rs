//! Targeted content retrieval.
//!
//! The only module that hands real text to a caller. Three mutually
//! exclusive modes: a line range, a chunk id resolved through a manifest,
//! or a regex with a context window. Line and chunk extractions feed
//! subordinate agents and may exceed the 4 KB gate; everything the
//! orchestrator reads directly is bounded by the caller.

use std::fs;
use std::path::Path;

use regex::RegexBuilder;

use crate::models::Manifest;
use crate::{Error, Result};

/// Extracts a 1-indexed inclusive line range, clamped to the file.
///
/// Each output line carries a right-aligned line number and a `|`
/// separator. Trailing whitespace is stripped (newline normalization is
/// allowed by contract).
///
/// # Errors
///
/// Returns [`Error::NotFound`] for a missing file and
/// [`Error::InvalidArgument`] for an inverted range or an empty file.
pub fn extract_lines(path: &Path, start: usize, end: usize) -> Result<String> {
    if start > end {
        return Err(Error::InvalidArgument(format!(
            "line range {start}:{end} is inverted"
        )));
    }

    let lines = read_file_lines(path)?;
    if lines.is_empty() {
        return Err(Error::InvalidArgument(format!(
            "no content in {} for lines {start}-{end}",
            path.display()
        )));
    }

    let total = lines.len();
    let start = start.max(1).min(total);
    let end = end.min(total);

    let out: Vec<String> = lines[start - 1..end]
        .iter()
        .enumerate()
        .map(|(offset, line)| format!("{:>6}| {}", start + offset, line.trim_end()))
        .collect();
    Ok(out.join("\n"))
}

/// Extracts the slice described by a chunk id, resolved through a
/// manifest file.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when the manifest or chunk id is missing
/// and [`Error::InvalidArgument`] for a file-group chunk (those name whole
/// files; extract them individually).
pub fn extract_chunk(manifest_path: &Path, chunk_id: &str) -> Result<String> {
    let manifest = load_manifest(manifest_path)?;
    let chunk = manifest
        .find(chunk_id)
        .ok_or_else(|| Error::not_found(format!("chunk '{chunk_id}' in manifest")))?;

    let (source, start, end) = chunk.line_range().ok_or_else(|| {
        Error::InvalidArgument(format!(
            "chunk '{chunk_id}' is a file group; extract its files individually"
        ))
    })?;
    extract_lines(source, start, end)
}

/// Extracts regions matching a regex, each with `context` surrounding
/// lines. Overlapping or adjacent regions are merged, source order is
/// preserved, matching lines carry a `>>` marker.
///
/// An empty match set is not an error: the result is a single
/// "No matches found" line.
///
/// # Errors
///
/// Returns [`Error::NotFound`] for a missing file and
/// [`Error::InvalidArgument`] for an invalid pattern.
pub fn extract_grep(path: &Path, pattern: &str, context: usize) -> Result<String> {
    let lines = read_file_lines(path)?;
    let rendered = grep_lines(&lines, pattern, context)?;
    Ok(rendered.unwrap_or_else(|| {
        format!(
            "No matches found for pattern '{pattern}' in {}",
            path.display()
        )
    }))
}

/// Regex-with-context over in-memory lines. Returns `None` when nothing
/// matches so callers can phrase their own empty-set message.
///
/// Shared by file grep and grep-within-memory-entry: the memory service
/// runs the same single pass over an entry's content.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] when the pattern fails to compile.
pub fn grep_lines(lines: &[String], pattern: &str, context: usize) -> Result<Option<String>> {
    let re = RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| Error::InvalidArgument(format!("invalid regex pattern: {e}")))?;

    let matches: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| re.is_match(line))
        .map(|(i, _)| i)
        .collect();

    if matches.is_empty() {
        return Ok(None);
    }

    let regions = merge_regions(&matches, context, lines.len());
    let mut out = Vec::new();
    for (region_start, region_end) in regions {
        if !out.is_empty() {
            out.push("---".to_string());
        }
        for i in region_start..=region_end.min(lines.len() - 1) {
            let marker = if matches.binary_search(&i).is_ok() { ">>" } else { "  " };
            out.push(format!("{marker} {:>6}| {}", i + 1, lines[i].trim_end()));
        }
    }
    Ok(Some(out.join("\n")))
}

/// Merges overlapping or adjacent context windows around match indices
/// (0-based), returning inclusive `(start, end)` regions in source order.
fn merge_regions(matches: &[usize], context: usize, total_lines: usize) -> Vec<(usize, usize)> {
    let mut regions = Vec::new();
    let last_line = total_lines.saturating_sub(1);

    let mut start = matches[0].saturating_sub(context);
    let mut end = (matches[0] + context).min(last_line);

    for &idx in &matches[1..] {
        let new_start = idx.saturating_sub(context);
        let new_end = (idx + context).min(last_line);
        if new_start <= end + 1 {
            end = new_end;
        } else {
            regions.push((start, end));
            start = new_start;
            end = new_end;
        }
    }
    regions.push((start, end));
    regions
}

fn read_file_lines(path: &Path) -> Result<Vec<String>> {
    if !path.is_file() {
        return Err(Error::not_found(format!("file {}", path.display())));
    }
    let content =
        fs::read_to_string(path).map_err(|e| Error::op("read_file", e))?;
    Ok(content.lines().map(str::to_string).collect())
}

/// Loads a manifest from JSON. Accepts either the full manifest object or
/// a bare chunk array (older manifests).
fn load_manifest(path: &Path) -> Result<Manifest> {
    if !path.is_file() {
        return Err(Error::not_found(format!("manifest {}", path.display())));
    }
    let raw = fs::read_to_string(path).map_err(|e| Error::op("read_manifest", e))?;

    if let Ok(manifest) = serde_json::from_str::<Manifest>(&raw) {
        return Ok(manifest);
    }
    let chunks: Vec<crate::models::Chunk> = serde_json::from_str(&raw)
        .map_err(|e| Error::op("parse_manifest", e))?;
    Ok(Manifest {
        strategy: "unknown".to_string(),
        source: path.to_path_buf(),
        total_lines: None,
        total_files: None,
        chunks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunk_by_lines;
    use std::fs;
    use tempfile::TempDir;

    fn fixture(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_extract_lines_exact_range() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "f.txt", "one\ntwo\nthree\nfour\n");

        let out = extract_lines(&path, 2, 3).unwrap();
        assert_eq!(out, "     2| two\n     3| three");
    }

    #[test]
    fn test_extract_lines_clamps_to_file() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "f.txt", "one\ntwo\n");

        let out = extract_lines(&path, 1, 99).unwrap();
        assert_eq!(out.lines().count(), 2);
        let out = extract_lines(&path, 50, 99).unwrap();
        assert!(out.contains("two"));
    }

    #[test]
    fn test_extract_lines_inverted_range() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "f.txt", "one\n");
        assert!(matches!(
            extract_lines(&path, 5, 2),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_extract_lines_missing_file() {
        assert!(matches!(
            extract_lines(Path::new("/no/file"), 1, 2),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_grep_with_context_and_markers() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "f.txt", "alpha\nbeta\nPASSWORD=secret\nbeta\nalpha\n");

        let out = extract_grep(&path, "PASSWORD", 1).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("2|"));
        assert!(lines[1].starts_with(">>"));
        assert!(lines[1].contains("3|"));
        assert!(lines[2].contains("4|"));
    }

    #[test]
    fn test_grep_merges_overlapping_windows() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "f.txt", "hit\nx\nhit\nx\nx\nx\nx\nx\nhit\n");

        let out = extract_grep(&path, "hit", 2).unwrap();
        // First two matches merge into one region; the third is separate.
        assert_eq!(out.matches("---").count(), 1);
    }

    #[test]
    fn test_grep_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "f.txt", "a\nneedle\nb\nneedle\nc\n");
        let first = extract_grep(&path, "needle", 1).unwrap();
        let second = extract_grep(&path, "needle", 1).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_grep_no_matches_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "f.txt", "nothing here\n");
        let out = extract_grep(&path, "absent_term", 2).unwrap();
        assert!(out.starts_with("No matches found"));
    }

    #[test]
    fn test_grep_invalid_regex() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "f.txt", "text\n");
        assert!(matches!(
            extract_grep(&path, "([unclosed", 1),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_grep_case_insensitive() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "f.txt", "Error: boom\n");
        let out = extract_grep(&path, "error", 0).unwrap();
        assert!(out.contains("boom"));
    }

    #[test]
    fn test_extract_chunk_via_manifest() {
        let dir = TempDir::new().unwrap();
        let body: String = (1..=40).map(|i| format!("line {i}\n")).collect();
        let path = fixture(&dir, "f.txt", &body);
        let manifest = chunk_by_lines(&path, 10, 2).unwrap();
        let manifest_path = crate::chunk::save_manifest(&manifest, dir.path()).unwrap();

        let chunk = &manifest.chunks[1];
        let (_, start, _) = chunk.line_range().unwrap();
        let out = extract_chunk(&manifest_path, &chunk.chunk_id).unwrap();
        assert!(out.starts_with(&format!("{start:>6}|")));
    }

    #[test]
    fn test_extract_chunk_unknown_id() {
        let dir = TempDir::new().unwrap();
        let path = fixture(&dir, "f.txt", "a\nb\n");
        let manifest = chunk_by_lines(&path, 10, 2).unwrap();
        let manifest_path = crate::chunk::save_manifest(&manifest, dir.path()).unwrap();

        assert!(matches!(
            extract_chunk(&manifest_path, "ffffffffffffffff"),
            Err(Error::NotFound { .. })
        ));
    }
}
