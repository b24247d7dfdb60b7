//! Line-delimited JSON-RPC 2.0 server over stdio.
//!
//! One blocking loop: read a line, dispatch, write a response. No async
//! runtime -- the core has no suspension points and the protocol here is
//! strictly request/response.

use std::io::{BufRead, Write};

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::services::MemoryService;
use crate::Result;

use super::tools::{dispatch_tool, tool_definitions};

const PROTOCOL_VERSION: &str = "2024-11-05";

/// Runs the tool server until stdin closes.
///
/// # Errors
///
/// Returns [`crate::Error::OperationFailed`] when stdout becomes
/// unwritable; per-request failures are reported to the client instead.
pub fn run_server(service: &MemoryService) -> Result<()> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    run_loop(service, stdin.lock(), stdout.lock())
}

fn run_loop(
    service: &MemoryService,
    reader: impl BufRead,
    mut writer: impl Write,
) -> Result<()> {
    for line in reader.lines() {
        let line = line.map_err(|e| crate::Error::op("read_rpc_request", e))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(request) = serde_json::from_str::<Value>(line) else {
            warn!("skipping malformed JSON-RPC request");
            continue;
        };

        if let Some(response) = handle_request(service, &request) {
            let serialized = serde_json::to_string(&response)
                .map_err(|e| crate::Error::op("serialize_rpc_response", e))?;
            writeln!(writer, "{serialized}").map_err(|e| crate::Error::op("write_rpc_response", e))?;
            writer
                .flush()
                .map_err(|e| crate::Error::op("flush_rpc_response", e))?;
        }
    }
    Ok(())
}

fn handle_request(service: &MemoryService, request: &Value) -> Option<Value> {
    let method = request.get("method").and_then(Value::as_str).unwrap_or("");
    let id = request.get("id").cloned();
    let params = request.get("params").cloned().unwrap_or_else(|| json!({}));

    debug!(method, "rpc request");
    match method {
        "initialize" => Some(json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "mnemo", "version": env!("CARGO_PKG_VERSION")}
            }
        })),
        "tools/list" => Some(json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {"tools": tool_definitions()}
        })),
        "tools/call" => {
            let name = params.get("name").and_then(Value::as_str).unwrap_or("");
            let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
            let (text, is_error) = match dispatch_tool(service, name, &arguments) {
                Ok(text) => (text, false),
                Err(e) => (format!("Error: {e}"), true),
            };
            Some(json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "content": [{"type": "text", "text": text}],
                    "isError": is_error
                }
            }))
        },
        // Notifications carry no id and expect no response.
        _ if id.is_none() => None,
        other => Some(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": -32601, "message": format!("Method not found: {other}")}
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryDb;

    fn service() -> MemoryService {
        MemoryService::new(MemoryDb::in_memory().unwrap())
    }

    fn roundtrip(service: &MemoryService, requests: &[Value]) -> Vec<Value> {
        let input: String = requests
            .iter()
            .map(|r| format!("{r}\n"))
            .collect();
        let mut output = Vec::new();
        run_loop(service, input.as_bytes(), &mut output).unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_initialize_handshake() {
        let svc = service();
        let responses = roundtrip(
            &svc,
            &[json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}})],
        );
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[0]["result"]["serverInfo"]["name"], "mnemo");
    }

    #[test]
    fn test_tools_list_and_call() {
        let svc = service();
        let responses = roundtrip(
            &svc,
            &[
                json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}),
                json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call",
                       "params": {"name": "mnemo_remember",
                                  "arguments": {"content": "a fact to keep"}}}),
            ],
        );
        assert_eq!(responses[0]["result"]["tools"].as_array().unwrap().len(), 5);
        let text = responses[1]["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("Memory stored"));
        assert_eq!(responses[1]["result"]["isError"], false);
    }

    #[test]
    fn test_tool_error_is_reported_not_raised() {
        let svc = service();
        let responses = roundtrip(
            &svc,
            &[json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call",
                     "params": {"name": "mnemo_forget",
                                "arguments": {"entry_id": "m_doesnotexist"}}})],
        );
        assert_eq!(responses[0]["result"]["isError"], true);
        let text = responses[0]["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("not found"));
    }

    #[test]
    fn test_unknown_method_and_notification() {
        let svc = service();
        let responses = roundtrip(
            &svc,
            &[
                json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
                json!({"jsonrpc": "2.0", "id": 9, "method": "bogus/verb"}),
            ],
        );
        // The notification got no response; the unknown method got -32601.
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["error"]["code"], -32601);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let svc = service();
        let input = "this is not json\n{\"jsonrpc\": \"2.0\", \"id\": 1, \"method\": \"initialize\"}\n";
        let mut output = Vec::new();
        run_loop(&svc, input.as_bytes(), &mut output).unwrap();
        assert_eq!(String::from_utf8(output).unwrap().lines().count(), 1);
    }
}
