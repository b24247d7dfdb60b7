//! Content decomposition strategies.
//!
//! Every strategy produces a [`Manifest`] of content-free chunk
//! descriptors. The orchestrator reads the manifest; only subordinate
//! agents ever see the text behind a chunk id.

pub mod recommend;

use std::collections::BTreeMap;
use std::fs;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use regex::Regex;
use walkdir::WalkDir;

use crate::models::{group_chunk_id, line_chunk_id, Chunk, ChunkSpan, Manifest};
use crate::scan::{count_lines, detect_language};
use crate::{Error, Result};

pub use recommend::{recommend_strategies, Recommendation};

/// Default lines per chunk for the `lines` strategy.
pub const DEFAULT_CHUNK_SIZE: usize = 500;
/// Default overlap for the `lines` strategy.
pub const DEFAULT_OVERLAP: usize = 50;
/// Default heading level for the `headings` strategy.
pub const DEFAULT_HEADING_LEVEL: usize = 2;
/// Default target byte size for the `semantic` and `files_balanced`
/// strategies.
pub const DEFAULT_TARGET_SIZE: usize = 50_000;

const MAX_FILE_BYTES: u64 = 5_000_000;
const PREVIEW_LEN: usize = 120;

/// The seven chunking strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStrategy {
    /// Fixed line windows with overlap.
    Lines,
    /// Group files by parent directory.
    FilesDirectory,
    /// Group files by detected language.
    FilesLanguage,
    /// Partition files into groups of roughly equal total bytes.
    FilesBalanced,
    /// Split at function/class boundaries from the structure outline.
    Functions,
    /// Split a markdown file at heading boundaries.
    Headings,
    /// Coalesce blank-line-separated blocks into adaptively-sized chunks.
    Semantic,
}

impl ChunkStrategy {
    /// The strategy name as used on the CLI and in manifests.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lines => "lines",
            Self::FilesDirectory => "files_directory",
            Self::FilesLanguage => "files_language",
            Self::FilesBalanced => "files_balanced",
            Self::Functions => "functions",
            Self::Headings => "headings",
            Self::Semantic => "semantic",
        }
    }
}

impl std::str::FromStr for ChunkStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "lines" => Ok(Self::Lines),
            "files_directory" => Ok(Self::FilesDirectory),
            "files_language" => Ok(Self::FilesLanguage),
            "files_balanced" => Ok(Self::FilesBalanced),
            "functions" => Ok(Self::Functions),
            "headings" => Ok(Self::Headings),
            "semantic" => Ok(Self::Semantic),
            other => Err(Error::InvalidArgument(format!(
                "unknown strategy '{other}' (expected lines, files_directory, files_language, files_balanced, functions, headings, or semantic)"
            ))),
        }
    }
}

/// Tunable parameters, one field per strategy knob.
#[derive(Debug, Clone)]
pub struct ChunkParams {
    /// Lines per chunk (`lines`).
    pub chunk_size: usize,
    /// Overlap lines (`lines`).
    pub overlap: usize,
    /// Heading level (`headings`).
    pub heading_level: usize,
    /// Target size in bytes (`semantic`, `files_balanced`).
    pub target_size: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
            heading_level: DEFAULT_HEADING_LEVEL,
            target_size: DEFAULT_TARGET_SIZE,
        }
    }
}

/// Runs the selected strategy over a path.
///
/// # Errors
///
/// Returns [`Error::NotFound`] for missing paths and
/// [`Error::InvalidArgument`] for parameter misuse (overlap ≥ chunk size,
/// directory passed to a file strategy, and so on).
pub fn chunk_path(path: &Path, strategy: ChunkStrategy, params: &ChunkParams) -> Result<Manifest> {
    match strategy {
        ChunkStrategy::Lines => chunk_by_lines(path, params.chunk_size, params.overlap),
        ChunkStrategy::FilesDirectory => chunk_by_files(path, FileGrouping::Directory, params.target_size),
        ChunkStrategy::FilesLanguage => chunk_by_files(path, FileGrouping::Language, params.target_size),
        ChunkStrategy::FilesBalanced => chunk_by_files(path, FileGrouping::Balanced, params.target_size),
        ChunkStrategy::Functions => chunk_by_functions(path, params.target_size),
        ChunkStrategy::Headings => chunk_by_headings(path, params.heading_level, params.target_size),
        ChunkStrategy::Semantic => chunk_by_semantic(path, params.target_size),
    }
}

/// Chunks a file into fixed-size line windows with overlap.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] when `chunk_size` is zero or
/// `overlap >= chunk_size` (the window would never advance).
pub fn chunk_by_lines(path: &Path, chunk_size: usize, overlap: usize) -> Result<Manifest> {
    if chunk_size == 0 {
        return Err(Error::InvalidArgument("chunk size must be at least 1".to_string()));
    }
    if overlap >= chunk_size {
        return Err(Error::InvalidArgument(format!(
            "overlap {overlap} must be smaller than chunk size {chunk_size}"
        )));
    }

    let file = require_file(path)?;
    let total_lines = count_lines(&file);
    let mut chunks = Vec::new();

    if total_lines > 0 {
        let lines = read_lines(&file)?;
        let mut start = 1;
        loop {
            let end = (start + chunk_size - 1).min(total_lines);
            chunks.push(make_line_chunk(&file, &lines, start, end, None));
            if end >= total_lines {
                break;
            }
            start = end - overlap + 1;
        }
    }

    Ok(Manifest {
        strategy: ChunkStrategy::Lines.as_str().to_string(),
        source: file,
        total_lines: Some(total_lines),
        total_files: None,
        chunks,
    })
}

/// How to group files in the file-based strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileGrouping {
    /// By parent directory.
    Directory,
    /// By detected language.
    Language,
    /// First-fit into byte-balanced groups.
    Balanced,
}

/// Chunks a directory into file-group chunks.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] when `path` is not a directory.
pub fn chunk_by_files(path: &Path, grouping: FileGrouping, target_size: usize) -> Result<Manifest> {
    let root = path
        .canonicalize()
        .map_err(|_| Error::not_found(format!("path {}", path.display())))?;
    if !root.is_dir() {
        return Err(Error::InvalidArgument(format!(
            "not a directory: {}",
            root.display()
        )));
    }

    let files = collect_files(&root);
    let groups = match grouping {
        FileGrouping::Directory => group_by_directory(&files),
        FileGrouping::Language => group_by_language(&files),
        FileGrouping::Balanced => group_balanced(&files, target_size.max(1)),
    };

    let total_files = files.len();
    let mut chunks = Vec::new();
    for (group_name, members) in groups {
        let total_lines: usize = members.iter().map(|f| f.lines).sum();
        #[allow(clippy::cast_possible_truncation)]
        let char_count: usize = members.iter().map(|f| f.size as usize).sum();
        let names: Vec<String> = members
            .iter()
            .take(5)
            .map(|f| {
                f.path
                    .file_name()
                    .map_or_else(String::new, |n| n.to_string_lossy().into_owned())
            })
            .collect();
        let ellipsis = if members.len() > 5 { "..." } else { "" };

        chunks.push(Chunk {
            chunk_id: group_chunk_id(&group_name, members.len()),
            span: ChunkSpan::Files {
                group_name: group_name.clone(),
                files: members.iter().map(|f| f.relative.clone()).collect(),
                total_lines,
            },
            char_count,
            preview: Some(format!(
                "{} files: {}{}",
                members.len(),
                names.join(", "),
                ellipsis
            )),
            label: Some(group_name),
        });
    }

    let strategy = match grouping {
        FileGrouping::Directory => ChunkStrategy::FilesDirectory,
        FileGrouping::Language => ChunkStrategy::FilesLanguage,
        FileGrouping::Balanced => ChunkStrategy::FilesBalanced,
    };

    Ok(Manifest {
        strategy: strategy.as_str().to_string(),
        source: root,
        total_lines: None,
        total_files: Some(total_files),
        chunks,
    })
}

/// Chunks a file at function/class boundaries from the structure outline.
///
/// Files with no detectable structure fall back to [`chunk_by_semantic`].
///
/// # Errors
///
/// Returns [`Error::NotFound`] for missing files.
pub fn chunk_by_functions(path: &Path, fallback_target: usize) -> Result<Manifest> {
    let file = require_file(path)?;
    let outline = crate::scan::structure::extract_structure(&file);
    if outline.is_empty() {
        return chunk_by_semantic(&file, fallback_target);
    }

    let lines = read_lines(&file)?;
    let total_lines = lines.len();

    let chunks = outline
        .into_iter()
        .filter(|item| item.start_line >= 1 && item.end_line >= item.start_line)
        .map(|item| {
            let end = item.end_line.min(total_lines.max(item.start_line));
            make_line_chunk(&file, &lines, item.start_line, end, Some(item.name))
        })
        .collect();

    Ok(Manifest {
        strategy: ChunkStrategy::Functions.as_str().to_string(),
        source: file,
        total_lines: Some(total_lines),
        total_files: None,
        chunks,
    })
}

/// Chunks a markdown file at heading boundaries of the given level.
///
/// Content before the first heading becomes a `(preamble)` chunk. Files
/// with no headings fall back to [`chunk_by_semantic`].
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] for a heading level outside 1–6.
pub fn chunk_by_headings(path: &Path, level: usize, fallback_target: usize) -> Result<Manifest> {
    if !(1..=6).contains(&level) {
        return Err(Error::InvalidArgument(format!(
            "heading level {level} must be between 1 and 6"
        )));
    }

    let file = require_file(path)?;
    let lines = read_lines(&file)?;
    let total_lines = lines.len();

    let pattern = Regex::new(&format!(r"^(#{{1,{level}}})\s+(.+)"))
        .map_err(|e| Error::op("compile_heading_pattern", e))?;

    let headings: Vec<(usize, String)> = lines
        .iter()
        .enumerate()
        .filter_map(|(i, line)| {
            pattern
                .captures(line)
                .map(|caps| (i + 1, caps[2].trim().to_string()))
        })
        .collect();

    if headings.is_empty() {
        return chunk_by_semantic(&file, fallback_target);
    }

    let mut chunks = Vec::new();
    if headings[0].0 > 1 {
        let preamble_end = headings[0].0 - 1;
        chunks.push(make_line_chunk(
            &file,
            &lines,
            1,
            preamble_end,
            Some("(preamble)".to_string()),
        ));
    }
    for (idx, (start, title)) in headings.iter().enumerate() {
        let end = headings
            .get(idx + 1)
            .map_or(total_lines, |(next_start, _)| next_start - 1);
        chunks.push(make_line_chunk(&file, &lines, *start, end, Some(title.clone())));
    }

    Ok(Manifest {
        strategy: ChunkStrategy::Headings.as_str().to_string(),
        source: file,
        total_lines: Some(total_lines),
        total_files: None,
        chunks,
    })
}

/// Chunks a file at blank-line boundaries into adaptively-sized chunks of
/// roughly `target_size` bytes.
///
/// # Errors
///
/// Returns [`Error::NotFound`] for missing files.
pub fn chunk_by_semantic(path: &Path, target_size: usize) -> Result<Manifest> {
    let file = require_file(path)?;
    let lines = read_lines(&file)?;
    let total_lines = lines.len();
    let target_size = target_size.max(1);

    let mut chunks = Vec::new();
    if total_lines > 0 {
        // Boundary indices are 0-based "cut points": a chunk covers
        // lines (boundary[i-1], boundary[i]].
        let mut boundaries = vec![0];
        for (i, line) in lines.iter().enumerate() {
            if i > 0 && line.trim().is_empty() {
                boundaries.push(i);
            }
        }
        boundaries.push(total_lines);

        let mut chunk_start_idx = 0;
        let mut current_chars = 0usize;
        for i in 1..boundaries.len() {
            let segment: usize = lines[boundaries[i - 1]..boundaries[i].min(total_lines)]
                .iter()
                .map(|l| l.chars().count() + 1)
                .sum();
            current_chars += segment;

            if current_chars >= target_size || i == boundaries.len() - 1 {
                let start_line = boundaries[chunk_start_idx] + 1;
                let end_line = boundaries[i];
                if end_line >= start_line {
                    chunks.push(make_line_chunk(&file, &lines, start_line, end_line, None));
                }
                chunk_start_idx = i;
                current_chars = 0;
            }
        }
    }

    Ok(Manifest {
        strategy: ChunkStrategy::Semantic.as_str().to_string(),
        source: file,
        total_lines: Some(total_lines),
        total_files: None,
        chunks,
    })
}

/// Persists a manifest as `manifest.json` in a session directory.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] when the write fails.
pub fn save_manifest(manifest: &Manifest, session_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(session_dir).map_err(|e| Error::op("create_session_dir", e))?;
    let manifest_path = session_dir.join("manifest.json");
    let json = serde_json::to_string_pretty(manifest).map_err(|e| Error::op("serialize_manifest", e))?;
    fs::write(&manifest_path, json).map_err(|e| Error::op("write_manifest", e))?;
    Ok(manifest_path)
}

/// Formats a manifest into a bounded chunk listing for the orchestrator.
#[must_use]
pub fn format_manifest(manifest: &Manifest) -> String {
    let mut lines = vec![
        format!("Strategy: {}", manifest.strategy),
        format!("Chunks: {}", manifest.chunk_count()),
    ];
    if let Some(total) = manifest.total_lines {
        lines.push(format!("Total lines: {total}"));
    }
    if let Some(total) = manifest.total_files {
        lines.push(format!("Total files: {total}"));
    }
    lines.push(String::new());

    for chunk in &manifest.chunks {
        let mut info = format!("  {}", chunk.chunk_id);
        if let Some(label) = &chunk.label {
            info.push_str(&format!(" [{label}]"));
        }
        if let Some((_, start, end)) = chunk.line_range() {
            info.push_str(&format!(" L{start}-{end}"));
        }
        info.push_str(&format!(" ({} chars)", chunk.char_count));
        if let Some(preview) = &chunk.preview {
            let short: String = preview.chars().take(60).collect();
            info.push_str(&format!("  {short}"));
        }
        lines.push(info);
    }

    lines.join("\n")
}

// --- Helpers ---

fn require_file(path: &Path) -> Result<PathBuf> {
    let resolved = path
        .canonicalize()
        .map_err(|_| Error::not_found(format!("file {}", path.display())))?;
    if !resolved.is_file() {
        return Err(Error::InvalidArgument(format!(
            "not a file: {}",
            resolved.display()
        )));
    }
    Ok(resolved)
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path).map_err(|e| Error::op("read_file", e))?;
    let mut lines = Vec::new();
    for line in BufReader::new(file).lines() {
        lines.push(line.map_err(|e| Error::op("read_file", e))?);
    }
    Ok(lines)
}

fn make_line_chunk(
    source: &Path,
    lines: &[String],
    start: usize,
    end: usize,
    label: Option<String>,
) -> Chunk {
    let char_count = lines[start - 1..end.min(lines.len())]
        .iter()
        .map(|l| l.chars().count() + 1)
        .sum();
    Chunk {
        chunk_id: line_chunk_id(&source.to_string_lossy(), start, end),
        span: ChunkSpan::Lines {
            source_file: source.to_path_buf(),
            start_line: start,
            end_line: end,
        },
        char_count,
        preview: preview_at(lines, start),
        label,
    }
}

/// First non-blank trimmed line at or after `start_line`, capped at 120
/// chars. Looks at most six lines ahead.
fn preview_at(lines: &[String], start_line: usize) -> Option<String> {
    for line in lines.iter().skip(start_line - 1).take(6) {
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            let mut preview: String = trimmed.chars().take(PREVIEW_LEN).collect();
            if trimmed.chars().count() > PREVIEW_LEN {
                preview.push_str("...");
            }
            return Some(preview);
        }
    }
    None
}

pub(crate) struct CollectedFile {
    pub path: PathBuf,
    pub relative: PathBuf,
    pub size: u64,
    pub lines: usize,
    pub language: &'static str,
}

pub(crate) fn collect_files(root: &Path) -> Vec<CollectedFile> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            !(e.file_type().is_dir() && crate::scan::is_skipped_dir(&name))
        });

    for entry in walker.filter_map(std::result::Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(crate::scan::is_skipped_extension)
        {
            continue;
        }
        let Ok(meta) = entry.metadata() else { continue };
        if meta.len() > MAX_FILE_BYTES {
            continue;
        }

        files.push(CollectedFile {
            relative: path.strip_prefix(root).unwrap_or(path).to_path_buf(),
            size: meta.len(),
            lines: count_lines(path),
            language: detect_language(path),
            path: path.to_path_buf(),
        });
    }
    files
}

fn group_by_directory(files: &[CollectedFile]) -> BTreeMap<String, Vec<&CollectedFile>> {
    let mut groups: BTreeMap<String, Vec<&CollectedFile>> = BTreeMap::new();
    for f in files {
        let parent = f
            .relative
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| "(root)".to_string(), |p| p.to_string_lossy().into_owned());
        groups.entry(parent).or_default().push(f);
    }
    groups
}

fn group_by_language(files: &[CollectedFile]) -> BTreeMap<String, Vec<&CollectedFile>> {
    let mut groups: BTreeMap<String, Vec<&CollectedFile>> = BTreeMap::new();
    for f in files {
        groups.entry(f.language.to_string()).or_default().push(f);
    }
    groups
}

/// First-fit byte balancing: files sorted size-descending (path as a
/// stable tie-break) are placed into the first group with room.
fn group_balanced(files: &[CollectedFile], target_size: usize) -> BTreeMap<String, Vec<&CollectedFile>> {
    let mut sorted: Vec<&CollectedFile> = files.iter().collect();
    sorted.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.relative.cmp(&b.relative)));

    let mut order: Vec<String> = Vec::new();
    let mut groups: BTreeMap<String, Vec<&CollectedFile>> = BTreeMap::new();
    let mut sizes: Vec<u64> = Vec::new();

    for f in sorted {
        let mut placed = false;
        for (idx, name) in order.iter().enumerate() {
            if sizes[idx] + f.size <= target_size as u64 {
                groups.get_mut(name).expect("group exists").push(f);
                sizes[idx] += f.size;
                placed = true;
                break;
            }
        }
        if !placed {
            let name = format!("group_{}", order.len());
            order.push(name.clone());
            sizes.push(f.size);
            groups.insert(name, vec![f]);
        }
    }
    groups
}
