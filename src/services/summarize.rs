//! Session summaries from conversation transcripts.
//!
//! Produces a ~2–5 KB highlights document used as the primary search
//! target in two-tier storage. LLM-based when a provider is reachable,
//! otherwise structured pattern extraction over the compact transcript
//! format.

use std::collections::BTreeSet;

use regex::Regex;
use tracing::debug;

use crate::llm::LlmProvider;
use crate::services::tagging::truncate_head_tail;

/// Maximum transcript chars sent to the LLM.
const MAX_INPUT_CHARS: usize = 15_000;

const SUMMARY_PROMPT_HEADER: &str = "Summarize this conversation into a concise session report (~2000-4000 characters).

Structure your summary as:

## Session Summary
One paragraph overview of what was accomplished.

## Key Decisions
- Bullet points of decisions made and why

## Problems Solved
- What issues were encountered and how they were resolved

## Files Modified
- List of files created, edited, or deleted (if mentioned)

## Open Items
- Anything left unfinished or flagged for future work

Rules:
- Be specific: include names, paths, numbers, and technical details
- Skip pleasantries and filler -- only substantive content
- If the conversation is mostly Q&A or exploration with no decisions, say so
- Keep total output under 4000 characters

Conversation:
---
";

/// Generates a session summary, falling back to pattern extraction when
/// the LLM is unreachable. Never errors.
#[must_use]
pub fn generate_summary(provider: Option<&dyn LlmProvider>, transcript: &str) -> String {
    if let Some(provider) = provider {
        let truncated = truncate_head_tail(transcript, MAX_INPUT_CHARS);
        let prompt = format!("{SUMMARY_PROMPT_HEADER}{truncated}\n---\n\nSummary:");
        match provider.complete(&prompt) {
            Ok(summary) if !summary.trim().is_empty() => return summary,
            Ok(_) => {},
            Err(e) => debug!(error = %e, "summary generation fell back to pattern extraction"),
        }
    }
    extract_summary_fallback(transcript)
}

/// Structured fallback: parses the compact `[HH:MM] Role:` transcript
/// format and pulls out questions, decision sentences, commits, and
/// modified files.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn extract_summary_fallback(transcript: &str) -> String {
    let header_re = Regex::new(r"^\[[\d:]+\]\s+(User|Claude):").expect("static pattern");
    let decision_re = Regex::new(
        r"(?i)(decided|let's go with|the approach is|we'll use|going with|chose|choosing|settled on|the plan is|agreed to|the solution|implemented|the fix is|resolved by)",
    )
    .expect("static pattern");
    let commit_re =
        Regex::new(r#"\[Tool: Bash\] .*?git commit -m ["']?(.*?)(?:["']|$)"#).expect("static pattern");
    let file_re = Regex::new(r"\[Tool: (?:Write|Edit)\]\s+(.+)").expect("static pattern");

    // Parse messages from the compact format.
    let mut messages: Vec<(String, String)> = Vec::new();
    let mut current_role: Option<String> = None;
    let mut current_text: Vec<&str> = Vec::new();
    for line in transcript.lines() {
        if let Some(caps) = header_re.captures(line) {
            if let Some(role) = current_role.take() {
                messages.push((role, current_text.join("\n").trim().to_string()));
            }
            current_role = Some(caps[1].to_string());
            current_text.clear();
        } else if current_role.is_some() {
            current_text.push(line);
        }
    }
    if let Some(role) = current_role {
        messages.push((role, current_text.join("\n").trim().to_string()));
    }

    let mut user_questions = Vec::new();
    let mut decisions = Vec::new();
    let mut commits = Vec::new();
    let mut files_modified = BTreeSet::new();

    for (role, text) in &messages {
        if role == "User" {
            for sentence in text.split(['.', '!']) {
                let sentence = sentence.trim();
                if sentence.ends_with('?') && sentence.len() > 20 {
                    user_questions.push(sentence.to_string());
                }
            }
        }
        if role == "Claude" {
            for sentence in text.lines() {
                if decision_re.is_match(sentence) && sentence.len() > 30 {
                    decisions.push(truncate(sentence.trim(), 200));
                }
            }
        }
        for caps in commit_re.captures_iter(text) {
            let msg = truncate(&caps[1], 150);
            if !msg.is_empty() {
                commits.push(msg);
            }
        }
        for caps in file_re.captures_iter(text) {
            files_modified.insert(caps[1].trim().to_string());
        }
    }

    let substantive: Vec<&(String, String)> =
        messages.iter().filter(|(_, t)| t.len() > 50).collect();

    let mut parts = vec!["## Session Summary".to_string()];
    if let Some((_, first_user)) = substantive.iter().find(|(r, _)| r == "User") {
        parts.push(format!("Session started with: {}", truncate(first_user, 200)));
    }
    parts.push(format!("Total messages: {}", messages.len()));
    parts.push(String::new());

    if !user_questions.is_empty() {
        parts.push("## Key Questions".to_string());
        for q in user_questions.iter().take(8) {
            parts.push(format!("- {}", truncate(q, 200)));
        }
        parts.push(String::new());
    }

    if !decisions.is_empty() {
        parts.push("## Key Decisions".to_string());
        for d in decisions.iter().take(8) {
            parts.push(format!("- {d}"));
        }
        parts.push(String::new());
    }

    if !commits.is_empty() {
        parts.push("## Commits".to_string());
        for c in commits.iter().take(6) {
            parts.push(format!("- {c}"));
        }
        parts.push(String::new());
    }

    if !files_modified.is_empty() {
        parts.push("## Files Modified".to_string());
        for f in files_modified.iter().take(15) {
            parts.push(format!("- {f}"));
        }
        parts.push(String::new());
    }

    // Little structure found: quote opening and closing exchanges instead.
    if decisions.is_empty() && commits.is_empty() {
        parts.push("## Notable Exchanges".to_string());
        for (role, text) in substantive.iter().take(3) {
            parts.push(format!("**{role}:** {}", truncate(text, 300)));
            parts.push(String::new());
        }
        if substantive.len() > 6 {
            parts.push("...".to_string());
            for (role, text) in &substantive[substantive.len() - 2..] {
                parts.push(format!("**{role}:** {}", truncate(text, 300)));
                parts.push(String::new());
            }
        }
    }

    parts.join("\n")
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
