//! Transcript export: session JSONL → compressed readable text.
//!
//! Reads the host runtime's line-delimited session log, keeps the actual
//! conversation, and strips everything else. Typical compression is well
//! over 20× against the raw log; the passes below are where that comes
//! from:
//!
//! - drop tool results and system/hook records entirely
//! - collapse streamed assistant records, keeping the longest variant
//! - one-line tool-call summaries
//! - strip system reminders, command XML wrappers, skill-prompt injections
//! - collapse trivial user confirmations
//! - truncate pasted terminal output

use std::fs;
use std::path::Path;

use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::{Error, Result};

/// User messages that add no information.
const TRIVIAL_CONFIRMATIONS: &[&str] = &[
    "yes", "yeah", "yep", "yup", "y", "ok", "okay", "k", "sure", "sounds good", "go ahead",
    "do it", "proceed", "go for it", "looks good", "lgtm", "approved", "confirm", "continue",
    "next", "perfect", "great", "thanks", "thank you", "cool", "nice", "awesome", "right",
    "correct", "exactly", "agreed", "fine", "done", "got it",
];

struct RawMessage {
    role: String,
    timestamp: String,
    texts: Vec<String>,
    tool_calls: Vec<String>,
}

impl RawMessage {
    fn has_text(&self) -> bool {
        self.texts.iter().any(|t| !t.trim().is_empty())
    }

    fn combined(&self) -> String {
        self.texts
            .iter()
            .filter(|t| !t.trim().is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn text_len(&self) -> usize {
        self.texts.iter().map(String::len).sum()
    }
}

/// Converts a session JSONL file into a compressed conversation
/// transcript.
///
/// # Errors
///
/// Returns [`Error::NotFound`] for a missing file. Malformed records are
/// skipped with one warning each.
pub fn export_session(jsonl_path: &Path) -> Result<String> {
    if !jsonl_path.is_file() {
        return Err(Error::not_found(format!("session log {}", jsonl_path.display())));
    }
    let raw = fs::read_to_string(jsonl_path).map_err(|e| Error::op("read_session_log", e))?;

    let messages = parse_messages(&raw);
    let deduped = collapse_streaming(messages);
    let compressed = compress(deduped);

    let mut out = vec![
        format!("# Session Transcript ({} messages)", compressed.len()),
        format!("# Source: {}", jsonl_path.display()),
        String::new(),
    ];
    for (role, timestamp, text) in compressed {
        let short_ts = compact_timestamp(&timestamp);
        let label = if role == "user" { "User" } else { "Claude" };
        out.push(format!("[{short_ts}] {label}:"));
        out.push(text);
        out.push(String::new());
    }
    Ok(out.join("\n"))
}

fn parse_messages(raw: &str) -> Vec<RawMessage> {
    let mut messages = Vec::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(record) = serde_json::from_str::<Value>(line) else {
            warn!("skipping malformed session log record");
            continue;
        };

        let msg_type = record.get("type").and_then(Value::as_str).unwrap_or("");
        if msg_type != "user" && msg_type != "assistant" {
            continue;
        }

        let timestamp = record
            .get("timestamp")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let message = record.get("message").cloned().unwrap_or(Value::Null);
        let role = message
            .get("role")
            .and_then(Value::as_str)
            .unwrap_or(msg_type)
            .to_string();
        let (texts, tool_calls) = extract_content(message.get("content").unwrap_or(&Value::Null));

        let msg = RawMessage {
            role,
            timestamp,
            texts,
            tool_calls,
        };
        if !msg.has_text() && msg.tool_calls.is_empty() {
            continue;
        }
        // Very short assistant streaming artifacts carry no signal.
        if msg.role == "assistant" && msg.combined().len() < 3 && msg.tool_calls.is_empty() {
            continue;
        }
        messages.push(msg);
    }
    messages
}

fn extract_content(content: &Value) -> (Vec<String>, Vec<String>) {
    match content {
        Value::String(s) => {
            let text = strip_command_xml(&strip_system_reminders(s.trim()));
            (vec![text], Vec::new())
        },
        Value::Array(blocks) => {
            let mut texts = Vec::new();
            let mut tool_calls = Vec::new();
            for block in blocks {
                match block {
                    Value::Object(obj) => match obj.get("type").and_then(Value::as_str) {
                        Some("text") => {
                            let text = obj.get("text").and_then(Value::as_str).unwrap_or("");
                            let text = strip_system_reminders(text.trim());
                            if is_skill_prompt(&text) {
                                continue;
                            }
                            let text = strip_command_xml(&text);
                            if !text.is_empty() {
                                texts.push(text);
                            }
                        },
                        Some("tool_use") => {
                            let name = obj.get("name").and_then(Value::as_str).unwrap_or("unknown");
                            let input = obj.get("input").cloned().unwrap_or(Value::Null);
                            tool_calls.push(summarize_tool_call(name, &input));
                        },
                        // Tool results are dropped entirely.
                        _ => {},
                    },
                    Value::String(s) => {
                        let text = strip_system_reminders(s.trim());
                        if !text.is_empty() && !is_skill_prompt(&text) {
                            texts.push(text);
                        }
                    },
                    _ => {},
                }
            }
            (texts, tool_calls)
        },
        _ => (Vec::new(), Vec::new()),
    }
}

/// One-line summary of a tool invocation: name plus its leading argument.
fn summarize_tool_call(name: &str, input: &Value) -> String {
    let arg = match name {
        "Bash" => input
            .get("command")
            .and_then(Value::as_str)
            .map(|c| c.chars().take(200).collect::<String>()),
        "Read" | "Write" | "Edit" => input
            .get("file_path")
            .and_then(Value::as_str)
            .map(str::to_string),
        "Task" => input
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
        "Grep" | "Glob" => input
            .get("pattern")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    };
    match arg {
        Some(arg) => format!("[Tool: {name}] {arg}"),
        None => format!("[Tool: {name}]"),
    }
}

fn strip_system_reminders(text: &str) -> String {
    let re = Regex::new(r"(?s)<system-reminder>.*?</system-reminder>").expect("static pattern");
    re.replace_all(text, "").trim().to_string()
}

/// Unwraps command-message XML down to the `/command args` the user typed.
fn strip_command_xml(text: &str) -> String {
    let re = Regex::new(
        r"(?s)^<command-message>\s*\S+\s*</command-message>\s*<command-name>\s*/(\S+)\s*</command-name>\s*(?:<command-args>\s*(.*?)\s*</command-args>)?",
    )
    .expect("static pattern");
    match re.captures(text) {
        Some(caps) => {
            let name = &caps[1];
            let args = caps.get(2).map_or("", |m| m.as_str());
            format!("/{name} {args}").trim().to_string()
        },
        None => text.to_string(),
    }
}

/// Skill prompts are large instructional blocks injected by slash
/// commands -- useful to the agent, noise in memory. Heuristic: big block
/// with at least two marker phrases.
fn is_skill_prompt(text: &str) -> bool {
    const INDICATORS: &[&str] = &[
        "Base directory for this skill:",
        "CLI Quick Reference",
        "## Step 1:",
        "## Parse Arguments",
        "You are retrieving",
        "You are performing",
        "**Your job:**",
        "**All commands must be prefixed with:**",
    ];
    if text.len() < 500 {
        return false;
    }
    INDICATORS.iter().filter(|ind| text.contains(*ind)).count() >= 2
}

fn is_trivial_confirmation(text: &str) -> bool {
    let normalized = text
        .trim()
        .to_lowercase()
        .trim_end_matches(['.', '!', ','])
        .to_string();
    if TRIVIAL_CONFIRMATIONS.contains(&normalized.as_str()) {
        return true;
    }
    normalized.len() < 20
        && TRIVIAL_CONFIRMATIONS
            .iter()
            .any(|c| normalized.starts_with(c))
}

fn strip_boilerplate(text: &str) -> String {
    let re = Regex::new(
        r"(?i)^(Let me |I'll |I will |Sure[,!] |Great[,!] |Perfect[,!] |Absolutely[,!] |Of course[,!] |Good question[,!] |Great question[,!] |Excellent[,!] |Alright[,!] )(check|look|help|take a look|examine|review|investigate|search|explore|read|see|find|get|start|do that|handle that)[^.]*?\.\s*",
    )
    .expect("static pattern");
    re.replace(text, "").trim().to_string()
}

/// Detects pasted terminal output in user messages and keeps only the
/// head and tail.
fn compress_pasted_output(text: &str) -> String {
    let indicator = Regex::new(
        r#"^[$❯>]|^\s*(error|Error|ERROR|warning|Warning|WARN|Traceback|at [\w.]+\(|File "|npm ERR|FAILED|PASS|✓|✗|\d+\s+(passing|failing|pending))"#,
    )
    .expect("static pattern");

    let lines: Vec<&str> = text.split('\n').collect();
    if lines.len() < 10 {
        return text.to_string();
    }
    let terminal_lines = lines.iter().filter(|l| indicator.is_match(l)).count();
    if terminal_lines * 10 < lines.len() * 3 {
        return text.to_string();
    }

    let omitted = lines.len() - 6;
    let mut out: Vec<&str> = lines[..3].to_vec();
    let marker = format!("[...{omitted} lines of terminal output...]");
    let mut result: Vec<String> = out.drain(..).map(str::to_string).collect();
    result.push(marker);
    result.extend(lines[lines.len() - 3..].iter().map(|l| (*l).to_string()));
    result.join("\n")
}

/// Streaming writes many incremental assistant records; keep only the
/// longest of each consecutive assistant run.
fn collapse_streaming(messages: Vec<RawMessage>) -> Vec<RawMessage> {
    let mut deduped: Vec<RawMessage> = Vec::new();
    let mut iter = messages.into_iter().peekable();

    while let Some(msg) = iter.next() {
        if msg.role == "assistant" {
            let mut best = msg;
            while let Some(next) = iter.peek() {
                if next.role != "assistant" {
                    break;
                }
                let next = iter.next().expect("peeked");
                if next.text_len() > best.text_len() {
                    best = next;
                }
            }
            deduped.push(best);
        } else {
            deduped.push(msg);
        }
    }
    deduped
}

fn compress(messages: Vec<RawMessage>) -> Vec<(String, String, String)> {
    let mut out = Vec::new();
    for msg in messages {
        let combined = msg.combined();
        if msg.role == "user" {
            if is_trivial_confirmation(&combined) {
                out.push((msg.role, msg.timestamp, "[User confirmed]".to_string()));
                continue;
            }
            out.push((
                msg.role,
                msg.timestamp,
                compress_pasted_output(&combined),
            ));
        } else {
            // Tool-call-only messages shrink to a tool roster line.
            if !msg.has_text() && !msg.tool_calls.is_empty() {
                let names: Vec<String> = msg
                    .tool_calls
                    .iter()
                    .map(|tc| {
                        tc.trim_start_matches("[Tool: ")
                            .split(']')
                            .next()
                            .unwrap_or("unknown")
                            .to_string()
                    })
                    .collect();
                out.push((
                    msg.role,
                    msg.timestamp,
                    format!("[Ran {} tools: {}]", names.len(), names.join(", ")),
                ));
                continue;
            }

            let mut text = strip_boilerplate(&combined);
            if !msg.tool_calls.is_empty() {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(&msg.tool_calls.join("\n"));
            }
            if !text.trim().is_empty() {
                out.push((msg.role, msg.timestamp, text));
            }
        }
    }
    out
}

/// `2024-05-04T10:23:45.123Z` → `10:23`.
fn compact_timestamp(timestamp: &str) -> String {
    let head: String = timestamp.chars().take(19).collect();
    let ts = head.replace('T', " ");
    if ts.len() >= 16 {
        ts[11..16].to_string()
    } else {
        ts
    }
}
