//! Metadata production -- never outputs file content.
//!
//! Scans paths to produce bounded-size metadata: file trees, sizes, line
//! counts, languages, and structure outlines. The scanner is the first step
//! of every analysis: the orchestrator sees the shape of the target, never
//! its text.

pub mod structure;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::{Error, Result};
pub use structure::StructureItem;

/// Files larger than this are skipped entirely.
const MAX_FILE_BYTES: u64 = 5_000_000;

/// Extension → language name table.
pub const LANGUAGE_MAP: &[(&str, &str)] = &[
    ("py", "python"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("go", "go"),
    ("rs", "rust"),
    ("rb", "ruby"),
    ("java", "java"),
    ("kt", "kotlin"),
    ("c", "c"),
    ("h", "c"),
    ("cpp", "cpp"),
    ("hpp", "cpp"),
    ("cs", "csharp"),
    ("swift", "swift"),
    ("php", "php"),
    ("lua", "lua"),
    ("sh", "shell"),
    ("bash", "shell"),
    ("zsh", "shell"),
    ("md", "markdown"),
    ("mdx", "markdown"),
    ("json", "json"),
    ("yaml", "yaml"),
    ("yml", "yaml"),
    ("toml", "toml"),
    ("xml", "xml"),
    ("html", "html"),
    ("css", "css"),
    ("scss", "scss"),
    ("sql", "sql"),
    ("r", "r"),
    ("ex", "elixir"),
    ("exs", "elixir"),
    ("erl", "erlang"),
    ("hs", "haskell"),
    ("ml", "ocaml"),
    ("scala", "scala"),
    ("clj", "clojure"),
    ("dart", "dart"),
    ("vue", "vue"),
    ("svelte", "svelte"),
];

/// Directory names never descended into.
const SKIP_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
    "env",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    ".ruff_cache",
    "dist",
    "build",
    ".next",
    ".nuxt",
    "target",
    "vendor",
    ".cargo",
    ".gradle",
    "coverage",
    ".nyc_output",
    "egg-info",
];

/// Binary or otherwise unreadable extensions.
const SKIP_EXTENSIONS: &[&str] = &[
    "pyc", "pyo", "so", "dylib", "dll", "exe", "bin", "o", "a", "class", "jar", "war", "ear",
    "zip", "tar", "gz", "bz2", "xz", "7z", "rar", "png", "jpg", "jpeg", "gif", "bmp", "ico",
    "svg", "webp", "mp3", "mp4", "wav", "avi", "mov", "pdf", "doc", "docx", "xls", "xlsx",
    "ppt", "pptx", "woff", "woff2", "ttf", "eot", "lock",
];

/// Detects a language from a file path's extension.
#[must_use]
pub fn detect_language(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return "unknown";
    };
    let ext = ext.to_lowercase();
    LANGUAGE_MAP
        .iter()
        .find(|(e, _)| *e == ext)
        .map_or("unknown", |(_, lang)| *lang)
}

/// Counts lines without holding the file in memory.
#[must_use]
pub fn count_lines(path: &Path) -> usize {
    let Ok(file) = File::open(path) else {
        return 0;
    };
    BufReader::new(file).lines().count()
}

/// Per-language aggregate counts.
#[derive(Debug, Clone, Default)]
pub struct LanguageStats {
    /// Number of files.
    pub files: usize,
    /// Total lines across those files.
    pub lines: usize,
    /// Total bytes across those files.
    pub bytes: u64,
}

/// Metadata for one scanned file.
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Path relative to the scan target (absolute for single-file scans).
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
    /// Line count.
    pub lines: usize,
    /// Detected language.
    pub language: &'static str,
    /// Structure outline (functions, classes) with line numbers.
    pub structure: Vec<StructureItem>,
}

/// The full result of a scan: metadata only, no content.
#[derive(Debug, Clone)]
pub struct ScanReport {
    /// The scanned path.
    pub target: PathBuf,
    /// Whether the target is a single file.
    pub is_file: bool,
    /// Files visited.
    pub total_files: usize,
    /// Lines across all visited files.
    pub total_lines: usize,
    /// Bytes across all visited files.
    pub total_bytes: u64,
    /// Per-language breakdown, sorted by descending line count.
    pub languages: Vec<(String, LanguageStats)>,
    /// Per-file metadata.
    pub tree: Vec<FileInfo>,
    /// Directory skeleton, relative to the target.
    pub directories: Vec<PathBuf>,
    /// Unreadable paths encountered; the scan continued past each.
    pub errors: Vec<String>,
}

/// Scans a path and produces a metadata summary.
///
/// Directories are walked up to `max_depth` levels; VCS/build directories,
/// binary extensions, and files over 5 MB are skipped. Unreadable entries
/// yield a single error record each and the scan continues.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when the path does not exist.
pub fn scan_path(path: &Path, max_depth: usize) -> Result<ScanReport> {
    let target = path
        .canonicalize()
        .map_err(|_| Error::not_found(format!("path {}", path.display())))?;

    if target.is_file() {
        return Ok(scan_single_file(&target));
    }
    Ok(scan_directory(&target, max_depth))
}

fn scan_single_file(path: &Path) -> ScanReport {
    let size = path.metadata().map_or(0, |m| m.len());
    let language = detect_language(path);
    let lines = count_lines(path);
    let structure = structure::extract_structure(path);

    let mut languages = BTreeMap::new();
    languages.insert(
        language.to_string(),
        LanguageStats {
            files: 1,
            lines,
            bytes: size,
        },
    );

    ScanReport {
        target: path.to_path_buf(),
        is_file: true,
        total_files: 1,
        total_lines: lines,
        total_bytes: size,
        languages: languages.into_iter().collect(),
        tree: vec![FileInfo {
            path: path.to_path_buf(),
            size,
            lines,
            language,
            structure,
        }],
        directories: Vec::new(),
        errors: Vec::new(),
    }
}

/// Whether a directory name belongs to the skip list (VCS, build output,
/// virtualenvs, hidden directories).
#[must_use]
pub fn is_skipped_dir(name: &str) -> bool {
    SKIP_DIRS.contains(&name) || name.starts_with('.')
}

/// Whether a file extension is on the binary/unreadable skip list.
#[must_use]
pub fn is_skipped_extension(ext: &str) -> bool {
    SKIP_EXTENSIONS.contains(&ext.to_lowercase().as_str())
}

fn should_skip_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(is_skipped_extension)
}

fn scan_directory(root: &Path, max_depth: usize) -> ScanReport {
    let mut tree = Vec::new();
    let mut directories = Vec::new();
    let mut languages: BTreeMap<String, LanguageStats> = BTreeMap::new();
    let mut errors = Vec::new();
    let mut total_lines = 0;
    let mut total_bytes = 0;

    let walker = WalkDir::new(root)
        .max_depth(max_depth.max(1))
        .sort_by(|a, b| {
            // Directories first, then case-insensitive name order.
            let a_dir = a.file_type().is_dir();
            let b_dir = b.file_type().is_dir();
            b_dir
                .cmp(&a_dir)
                .then_with(|| a.file_name().to_ascii_lowercase().cmp(&b.file_name().to_ascii_lowercase()))
        })
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            !(e.file_type().is_dir() && is_skipped_dir(&name))
        });

    for item in walker {
        let entry = match item {
            Ok(entry) => entry,
            Err(e) => {
                errors.push(e.to_string());
                continue;
            },
        };
        if entry.depth() == 0 {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_path_buf();

        if entry.file_type().is_dir() {
            directories.push(rel);
            continue;
        }
        if !entry.file_type().is_file() || should_skip_file(entry.path()) {
            continue;
        }

        let size = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(e) => {
                errors.push(format!("{}: {e}", rel.display()));
                continue;
            },
        };
        if size > MAX_FILE_BYTES {
            continue;
        }

        let language = detect_language(entry.path());
        let lines = count_lines(entry.path());
        let structure = structure::extract_structure(entry.path());

        total_lines += lines;
        total_bytes += size;
        let stats = languages.entry(language.to_string()).or_default();
        stats.files += 1;
        stats.lines += lines;
        stats.bytes += size;

        tree.push(FileInfo {
            path: rel,
            size,
            lines,
            language,
            structure,
        });
    }

    let mut languages: Vec<_> = languages.into_iter().collect();
    languages.sort_by(|a, b| b.1.lines.cmp(&a.1.lines).then_with(|| a.0.cmp(&b.0)));

    ScanReport {
        target: root.to_path_buf(),
        is_file: false,
        total_files: tree.len(),
        total_lines,
        total_bytes,
        languages,
        tree,
        directories,
        errors,
    }
}

/// Formats a scan report into a bounded human-readable summary.
///
/// Always fits within `max_chars`, dropping trailing file rows first.
#[must_use]
pub fn format_report(report: &ScanReport, max_chars: usize) -> String {
    let mut lines = vec![
        format!("Target: {}", report.target.display()),
        format!(
            "Type: {}",
            if report.is_file { "file" } else { "directory" }
        ),
        format!("Files: {}", report.total_files),
        format!("Lines: {}", group_thousands(report.total_lines)),
        format!("Size: {}", format_bytes(report.total_bytes)),
        String::new(),
    ];

    if !report.languages.is_empty() {
        lines.push("Languages:".to_string());
        for (lang, stats) in &report.languages {
            lines.push(format!(
                "  {lang}: {} files, {} lines",
                stats.files,
                group_thousands(stats.lines)
            ));
        }
        lines.push(String::new());
    }

    if !report.directories.is_empty() {
        lines.push(format!("Directories ({}):", report.directories.len()));
        for dir in report.directories.iter().take(30) {
            lines.push(format!("  {}/", dir.display()));
        }
        if report.directories.len() > 30 {
            lines.push(format!("  ... and {} more", report.directories.len() - 30));
        }
        lines.push(String::new());
    }

    if !report.errors.is_empty() {
        lines.push(format!("Unreadable ({}):", report.errors.len()));
        for err in report.errors.iter().take(5) {
            lines.push(format!("  {err}"));
        }
        lines.push(String::new());
    }

    if !report.tree.is_empty() {
        lines.push(format!("Files ({}):", report.tree.len()));
        for (idx, f) in report.tree.iter().enumerate() {
            let mut struct_summary = String::new();
            if !f.structure.is_empty() {
                let names: Vec<&str> = f
                    .structure
                    .iter()
                    .take(5)
                    .map(|s| s.name.as_str())
                    .collect();
                let ellipsis = if f.structure.len() > 5 { "..." } else { "" };
                struct_summary = format!(" [{}{}]", names.join(", "), ellipsis);
            }
            lines.push(format!(
                "  {} ({} lines, {}){}",
                f.path.display(),
                f.lines,
                f.language,
                struct_summary
            ));

            let current: usize = lines.iter().map(|l| l.len() + 1).sum();
            if current > max_chars.saturating_sub(200) {
                let remaining = report.tree.len() - idx - 1;
                if remaining > 0 {
                    lines.push(format!("  ... and {remaining} more files"));
                }
                break;
            }
        }
    }

    let result = lines.join("\n");
    crate::output::bound_output_at("scan", &result, max_chars)
}

fn format_bytes(size: u64) -> String {
    if size < 1024 {
        return format!("{size} B");
    }
    #[allow(clippy::cast_precision_loss)]
    let mut value = size as f64;
    for unit in ["KB", "MB", "GB"] {
        value /= 1024.0;
        if value < 1024.0 {
            return format!("{value:.1} {unit}");
        }
    }
    format!("{:.1} TB", value / 1024.0)
}

fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
