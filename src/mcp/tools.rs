//! Tool definitions and dispatch.
//!
//! Five tools mirror the memory-service verbs. Every result is bounded
//! text; the orchestrator on the other side of the pipe is never handed
//! more than 4 KB.

use serde_json::{json, Value};

use crate::models::EntryId;
use crate::output::bound_output;
use crate::services::{MemoryService, RememberRequest};
use crate::Result;

/// The tool roster advertised by `tools/list`.
#[must_use]
pub fn tool_definitions() -> Value {
    json!([
        {
            "name": "mnemo_recall",
            "description": "Search persistent memory for past conversations, decisions, and knowledge. Use when the user asks about previous work, or proactively before starting on a topic. Returns matching entries with relevance scores and size categories.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Keywords or phrases to search for"},
                    "tags": {"type": "string", "description": "Optional comma-separated tags to filter by"},
                    "max_results": {"type": "integer", "description": "Maximum results (default: 10)", "default": 10}
                },
                "required": ["query"]
            }
        },
        {
            "name": "mnemo_remember",
            "description": "Store knowledge or a decision in persistent memory for future recall. Provide descriptive tags and a clear summary.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "content": {"type": "string", "description": "The content to store"},
                    "tags": {"type": "string", "description": "Comma-separated tags (e.g. 'architecture,auth,decision')"},
                    "summary": {"type": "string", "description": "Short description (under 80 chars)"}
                },
                "required": ["content"]
            }
        },
        {
            "name": "mnemo_memory_list",
            "description": "Browse the memory store: entry ids, summaries, tags, and sizes. Use for an overview or to find entries by tag.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "tags": {"type": "string", "description": "Optional comma-separated tags to filter by"},
                    "limit": {"type": "integer", "description": "Maximum entries to show (default: 20)", "default": 20}
                }
            }
        },
        {
            "name": "mnemo_memory_extract",
            "description": "Extract the content of a memory entry by id, optionally grepping within it. Use after mnemo_recall returns ids.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "entry_id": {"type": "string", "description": "The memory entry id (e.g. 'm_abc123def456')"},
                    "grep": {"type": "string", "description": "Optional regex to search within the entry"},
                    "context": {"type": "integer", "description": "Context lines around grep matches (default: 3)", "default": 3}
                },
                "required": ["entry_id"]
            }
        },
        {
            "name": "mnemo_forget",
            "description": "Delete a memory entry by id.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "entry_id": {"type": "string", "description": "The memory entry id to delete"}
                },
                "required": ["entry_id"]
            }
        }
    ])
}

/// Dispatches one tool call, returning bounded text.
///
/// # Errors
///
/// Returns the underlying service error; the server turns it into an
/// error string for the client.
pub fn dispatch_tool(service: &MemoryService, name: &str, arguments: &Value) -> Result<String> {
    let text = match name {
        "mnemo_recall" => {
            let query = str_arg(arguments, "query");
            let tags = tag_list(arguments);
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            let max = arguments
                .get("max_results")
                .and_then(Value::as_u64)
                .unwrap_or(10) as usize;
            service.recall(&query, &tags, max)?
        },
        "mnemo_remember" => {
            let tags = {
                let tags = tag_list(arguments);
                if tags.is_empty() { None } else { Some(tags) }
            };
            let summary = opt_str_arg(arguments, "summary");
            let result = service.remember(RememberRequest {
                content: str_arg(arguments, "content"),
                tags,
                summary,
                source: "text".to_string(),
                source_name: None,
            })?;
            format!(
                "Memory stored: {}\nSummary: {}\nTags: {}",
                result.id,
                result.summary,
                result.tags.join(", ")
            )
        },
        "mnemo_memory_list" => {
            let tags = tag_list(arguments);
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            let limit = arguments
                .get("limit")
                .and_then(Value::as_u64)
                .unwrap_or(20) as usize;
            service.format_list(&tags, 0, limit)?
        },
        "mnemo_memory_extract" => {
            let id = EntryId::new(str_arg(arguments, "entry_id"));
            let grep = opt_str_arg(arguments, "grep");
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            let context = arguments
                .get("context")
                .and_then(Value::as_u64)
                .unwrap_or(3) as usize;
            service.memory_extract(&id, None, grep.as_deref(), context)?
        },
        "mnemo_forget" => {
            let id = EntryId::new(str_arg(arguments, "entry_id"));
            service.forget(&id)?;
            format!("Deleted: {id}")
        },
        other => format!("Unknown tool: {other}"),
    };
    Ok(bound_output(name, &text))
}

fn str_arg(arguments: &Value, key: &str) -> String {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn opt_str_arg(arguments: &Value, key: &str) -> Option<String> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn tag_list(arguments: &Value) -> Vec<String> {
    arguments
        .get("tags")
        .and_then(Value::as_str)
        .map(|raw| {
            raw.split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryDb;

    fn service() -> MemoryService {
        MemoryService::new(MemoryDb::in_memory().unwrap())
    }

    #[test]
    fn test_remember_recall_roundtrip() {
        let svc = service();
        let stored = dispatch_tool(
            &svc,
            "mnemo_remember",
            &json!({"content": "the gateway speaks protobuf", "tags": "gateway,protocol"}),
        )
        .unwrap();
        assert!(stored.contains("Memory stored: m_"));

        let found = dispatch_tool(
            &svc,
            "mnemo_recall",
            &json!({"query": "gateway protobuf"}),
        )
        .unwrap();
        assert!(found.contains("gateway"));
    }

    #[test]
    fn test_extract_and_forget() {
        let svc = service();
        dispatch_tool(
            &svc,
            "mnemo_remember",
            &json!({"content": "alpha\nSECRET=x\nomega"}),
        )
        .unwrap();
        let listing = dispatch_tool(&svc, "mnemo_memory_list", &json!({})).unwrap();
        let id = listing
            .split_whitespace()
            .find(|w| w.starts_with("m_"))
            .unwrap()
            .to_string();

        let grepped = dispatch_tool(
            &svc,
            "mnemo_memory_extract",
            &json!({"entry_id": id, "grep": "secret", "context": 0}),
        )
        .unwrap();
        assert!(grepped.contains("SECRET=x"));

        let gone = dispatch_tool(&svc, "mnemo_forget", &json!({"entry_id": id})).unwrap();
        assert!(gone.starts_with("Deleted:"));
    }

    #[test]
    fn test_unknown_tool_is_soft_error() {
        let svc = service();
        let out = dispatch_tool(&svc, "mnemo_bogus", &json!({})).unwrap();
        assert!(out.contains("Unknown tool"));
    }

    #[test]
    fn test_outputs_are_bounded() {
        let svc = service();
        dispatch_tool(
            &svc,
            "mnemo_remember",
            &json!({"content": "needle ".repeat(20_000)}),
        )
        .unwrap();
        let out = dispatch_tool(&svc, "mnemo_recall", &json!({"query": "needle"})).unwrap();
        assert!(out.len() <= crate::output::MAX_OUTPUT);
    }

    #[test]
    fn test_tool_definitions_cover_five_tools() {
        let defs = tool_definitions();
        assert_eq!(defs.as_array().unwrap().len(), 5);
    }
}
