//! Strategy recommendation.
//!
//! Simple predicates over scan metadata produce a ranked list of
//! `(strategy, rationale)` pairs. Ties favor strategies with smaller
//! chunks, so the orchestrator's default pick stays cheap to delegate.

use std::path::Path;

use crate::chunk::{collect_files, ChunkStrategy};
use crate::scan::{count_lines, detect_language, structure};
use crate::{Error, Result};

/// A ranked strategy suggestion.
#[derive(Debug, Clone)]
pub struct Recommendation {
    /// The suggested strategy.
    pub strategy: ChunkStrategy,
    /// One-line rationale.
    pub reason: String,
    /// Rank; 1 is the strongest suggestion.
    pub priority: usize,
}

/// Recommends chunking strategies for a path.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when the path does not exist.
pub fn recommend_strategies(path: &Path) -> Result<Vec<Recommendation>> {
    let target = path
        .canonicalize()
        .map_err(|_| Error::not_found(format!("path {}", path.display())))?;

    let mut recommendations = if target.is_file() {
        recommend_for_file(&target)
    } else {
        recommend_for_directory(&target)
    };
    recommendations.sort_by_key(|r| r.priority);
    Ok(recommendations)
}

fn recommend_for_file(path: &Path) -> Vec<Recommendation> {
    let language = detect_language(path);
    let lines = count_lines(path);
    let mut recommendations = Vec::new();

    if language == "markdown" {
        recommendations.push(Recommendation {
            strategy: ChunkStrategy::Headings,
            reason: "markdown file -- heading boundaries are natural splits".to_string(),
            priority: 1,
        });
    } else if matches!(
        language,
        "python" | "javascript" | "typescript" | "go" | "rust" | "java" | "kotlin" | "ruby"
    ) {
        let outline = structure::extract_structure(path);
        if !outline.is_empty() {
            recommendations.push(Recommendation {
                strategy: ChunkStrategy::Functions,
                reason: format!(
                    "found {} functions/classes -- structural boundaries are ideal",
                    outline.len()
                ),
                priority: 1,
            });
        }
    }

    if lines > 200 {
        let priority = if recommendations.is_empty() { 1 } else { 2 };
        recommendations.push(Recommendation {
            strategy: ChunkStrategy::Semantic,
            reason: "blank-line boundaries give natural paragraph/block splits".to_string(),
            priority,
        });
    }

    let priority = if recommendations.is_empty() { 1 } else { 3 };
    recommendations.push(Recommendation {
        strategy: ChunkStrategy::Lines,
        reason: format!("fixed-size windows ({lines} lines total)"),
        priority,
    });

    recommendations
}

fn recommend_for_directory(path: &Path) -> Vec<Recommendation> {
    let files = collect_files(path);
    let total_lines: usize = files.iter().map(|f| f.lines).sum();
    let language_count = {
        let mut langs: Vec<&str> = files.iter().map(|f| f.language).collect();
        langs.sort_unstable();
        langs.dedup();
        langs.len()
    };

    let mut recommendations = Vec::new();
    if files.len() <= 50 {
        recommendations.push(Recommendation {
            strategy: ChunkStrategy::FilesDirectory,
            reason: format!("small project ({} files) -- group by directory", files.len()),
            priority: 1,
        });
    } else if language_count > 3 {
        recommendations.push(Recommendation {
            strategy: ChunkStrategy::FilesLanguage,
            reason: format!("multi-language project ({language_count} languages) -- group by language"),
            priority: 1,
        });
    } else {
        recommendations.push(Recommendation {
            strategy: ChunkStrategy::FilesBalanced,
            reason: format!(
                "large project ({} files, {total_lines} lines) -- balanced groups",
                files.len()
            ),
            priority: 1,
        });
    }

    if recommendations[0].strategy != ChunkStrategy::FilesDirectory {
        recommendations.push(Recommendation {
            strategy: ChunkStrategy::FilesDirectory,
            reason: "group files by directory for structural analysis".to_string(),
            priority: 2,
        });
    }

    recommendations
}

/// Formats recommendations for the orchestrator.
#[must_use]
pub fn format_recommendations(path: &Path, recommendations: &[Recommendation]) -> String {
    let mut lines = vec![format!("Recommended strategies for: {}\n", path.display())];
    for r in recommendations {
        lines.push(format!("  [{}] {}: {}", r.priority, r.strategy.as_str(), r.reason));
    }
    lines.join("\n")
}
