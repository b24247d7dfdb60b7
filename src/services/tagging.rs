//! Semantic tag extraction for transcripts.
//!
//! Asks an LLM for 5–10 topical tags; any failure drops to a keyword
//! extractor built from a technical-term whitelist. Long transcripts are
//! truncated head-60% / tail-40% -- openings and closings carry the most
//! context.

use regex::Regex;
use tracing::debug;

use crate::llm::LlmProvider;

/// Maximum transcript chars sent to the LLM.
const MAX_TRANSCRIPT_CHARS: usize = 10_000;
/// Maximum tags returned.
const MAX_TAGS: usize = 10;

const TAG_PROMPT_HEADER: &str = "Analyze this conversation transcript and extract 5-10 semantic tags.

Focus on:
- Technical topics discussed (e.g., sqlite, hooks, mcp-server)
- Specific features or components mentioned (e.g., authentication, caching, api)
- Technologies and tools used (e.g., python, typescript, docker)
- Types of work done (e.g., debugging, architecture-decision, refactoring, testing)
- Key decisions or solutions reached (e.g., performance-optimization, bug-fix)

Return ONLY a comma-separated list of lowercase tags, no explanation.
Keep tags specific and meaningful for future search.

Example output:
sqlite,hooks,memory-optimization,architecture-decision,python,debugging,performance

Conversation transcript:
---
";

/// Technical terms the fallback extractor is allowed to surface.
const TECH_KEYWORDS: &[&str] = &[
    "mcp", "hook", "hooks", "memory", "recall", "sqlite", "database", "api", "authentication",
    "auth", "testing", "test", "debugging", "performance", "optimization", "refactoring",
    "architecture", "python", "javascript", "typescript", "rust", "react", "node", "docker",
    "git", "github", "commit", "branch", "merge", "pull-request", "bug", "fix", "feature",
    "implementation", "deployment", "server", "client", "frontend", "backend", "middleware",
    "cache", "caching", "session", "semantic", "tagging", "tags",
];

/// Extracts 5–10 semantic tags from a transcript.
///
/// With a provider, the transcript (symmetrically truncated when over
/// 10 KB) goes to the LLM; on any failure the keyword fallback runs
/// instead, so this never errors.
#[must_use]
pub fn extract_semantic_tags(provider: Option<&dyn LlmProvider>, transcript: &str) -> Vec<String> {
    if let Some(provider) = provider {
        let truncated = truncate_head_tail(transcript, MAX_TRANSCRIPT_CHARS);
        let prompt = format!("{TAG_PROMPT_HEADER}{truncated}\n---\n\nTags:");
        match provider.complete(&prompt) {
            Ok(response) => {
                let tags = parse_tag_response(&response);
                if !tags.is_empty() {
                    return tags;
                }
            },
            Err(e) => {
                debug!(error = %e, "semantic tagging fell back to keyword extraction");
            },
        }
    }
    extract_keywords_fallback(transcript)
}

/// Keeps the head 60% and tail 40% of the budget when text is over it.
#[must_use]
pub fn truncate_head_tail(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let head_size = max_chars * 6 / 10;
    let tail_size = max_chars - head_size;
    let head: String = text.chars().take(head_size).collect();
    let tail: String = text
        .chars()
        .skip(total - tail_size)
        .collect();
    format!("{head}\n...[middle truncated]...\n{tail}")
}

/// Parses a comma-separated tag response, stripping code fences and
/// filtering noise words.
fn parse_tag_response(response: &str) -> Vec<String> {
    const NOISE: &[&str] = &["the", "and", "or", "but", "with", "for", "to", "in", "on", "at"];

    let line = response
        .lines()
        .find(|l| !l.trim().is_empty() && !l.trim_start().starts_with("```"))
        .unwrap_or("");

    let mut tags = Vec::new();
    for raw in line.split(',') {
        let tag = raw.trim().to_lowercase();
        if tag.len() > 2 && !NOISE.contains(&tag.as_str()) && !tags.contains(&tag) {
            tags.push(tag);
        }
        if tags.len() == MAX_TAGS {
            break;
        }
    }
    tags
}

/// Keyword fallback: whitelist terms ranked by frequency, plus a few
/// pattern-derived tags.
#[must_use]
pub fn extract_keywords_fallback(transcript: &str) -> Vec<String> {
    let word_re = Regex::new(r"\b[a-z]+(?:-[a-z]+)*\b").expect("static pattern");
    let lower = transcript.to_lowercase();

    let mut freq: Vec<(String, usize)> = Vec::new();
    for m in word_re.find_iter(&lower) {
        let word = m.as_str();
        if word.len() <= 2 || !TECH_KEYWORDS.contains(&word) {
            continue;
        }
        match freq.iter_mut().find(|(w, _)| w == word) {
            Some((_, count)) => *count += 1,
            None => freq.push((word.to_string(), 1)),
        }
    }
    freq.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut tags: Vec<String> = freq.into_iter().take(MAX_TAGS).map(|(w, _)| w).collect();

    if (lower.contains("bug") || lower.contains("fix")) && !tags.iter().any(|t| t == "bug-fix") {
        tags.push("bug-fix".to_string());
    }
    if lower.contains("test") && !tags.iter().any(|t| t == "testing") {
        tags.push("testing".to_string());
    }
    if lower.contains("refactor") && !tags.iter().any(|t| t == "refactoring") {
        tags.push("refactoring".to_string());
    }

    tags.truncate(MAX_TAGS);
    tags
}

/// Merges base tags with semantic tags, dropping duplicates while keeping
/// insertion order.
#[must_use]
pub fn combine_tags(base_tags: &[String], semantic_tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in base_tags.iter().chain(semantic_tags) {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, Result};

    struct FixedProvider(Option<String>);

    impl LlmProvider for FixedProvider {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn complete(&self, _prompt: &str) -> Result<String> {
            self.0.clone().ok_or_else(|| Error::External {
                operation: "fixed".to_string(),
                cause: "unavailable".to_string(),
            })
        }
    }

    #[test]
    fn test_llm_tags_are_parsed_and_cleaned() {
        let provider = FixedProvider(Some(
            "```\nsqlite, Hooks, the, db-migration, sqlite\n```".to_string(),
        ));
        let tags = extract_semantic_tags(Some(&provider), "transcript text");
        assert_eq!(tags, vec!["sqlite", "hooks", "db-migration"]);
    }

    #[test]
    fn test_provider_failure_falls_back() {
        let provider = FixedProvider(None);
        let tags = extract_semantic_tags(
            Some(&provider),
            "we spent the session debugging the sqlite cache and writing a test",
        );
        assert!(tags.contains(&"sqlite".to_string()));
        assert!(tags.contains(&"testing".to_string()));
    }

    #[test]
    fn test_no_provider_uses_fallback() {
        let tags = extract_semantic_tags(None, "refactor the docker deployment");
        assert!(tags.contains(&"docker".to_string()));
        assert!(tags.contains(&"refactoring".to_string()));
    }

    #[test]
    fn test_fallback_caps_at_ten() {
        let text = TECH_KEYWORDS.join(" ");
        let tags = extract_keywords_fallback(&text);
        assert!(tags.len() <= 10);
    }

    #[test]
    fn test_truncate_head_tail_split() {
        let text: String = (0..1000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let out = truncate_head_tail(&text, 100);
        assert!(out.contains("[middle truncated]"));
        // 60/40 split of the budget.
        let parts: Vec<&str> = out.split("\n...[middle truncated]...\n").collect();
        assert_eq!(parts[0].chars().count(), 60);
        assert_eq!(parts[1].chars().count(), 40);
    }

    #[test]
    fn test_truncate_short_text_untouched() {
        assert_eq!(truncate_head_tail("short", 100), "short");
    }

    #[test]
    fn test_combine_tags_dedups() {
        let base = vec!["conversation".to_string(), "session".to_string()];
        let semantic = vec!["Session".to_string(), "sqlite".to_string()];
        assert_eq!(
            combine_tags(&base, &semantic),
            vec!["conversation", "session", "sqlite"]
        );
    }
}
