//! MCP tool source: connects to an MCP server over stdio or Streamable HTTP
//! and implements `ToolSource` via `tools/list`/`tools/call` (spec §4.2).
//!
//! Grounded in the teacher's `tool_source::mcp::McpToolSource` — same
//! stdio-vs-HTTP session split, same JSON-RPC result parsing — adapted so
//! every entry point is `async fn` (the teacher's stdio path uses
//! `task::block_in_place`; here the blocking stdio calls run on
//! `spawn_blocking` instead, since `ToolSource::call_tool` is `async` end to
//! end in this runtime).

mod pool;
mod session;
mod session_http;

use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use mcp_core::ResultMessage;
use serde_json::Value;

pub use pool::{McpServerSpec, Pool, PoolConfig};
pub use session::{McpSession, McpSessionError};
pub use session_http::McpHttpSession;

use crate::error::{AgentError, ErrorKind, Result};
use crate::message::ToolDefinition;

use super::{ToolContext, ToolSource};

enum McpSessionKind {
    Stdio(Arc<StdMutex<McpSession>>),
    Http(Arc<McpHttpSession>),
}

/// Tool source backed by one MCP server, over stdio or Streamable HTTP.
pub struct McpToolSource {
    server_name: String,
    session: McpSessionKind,
}

fn transport_err(message: impl Into<String>) -> AgentError {
    AgentError::new(ErrorKind::TransportError, message)
}

impl McpToolSource {
    /// Spawns the MCP server over stdio and performs the initialize
    /// handshake. Blocking work runs on a dedicated blocking thread so the
    /// caller's async task is never stalled.
    pub async fn new(command: impl Into<String>, args: Vec<String>) -> Result<Self> {
        Self::new_with_env(command, args, Vec::<(String, String)>::new(), false).await
    }

    pub async fn new_with_env(
        command: impl Into<String>,
        args: Vec<String>,
        env: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
        stderr_verbose: bool,
    ) -> Result<Self> {
        let command = command.into();
        let server_name = command.clone();
        let env: Vec<(String, String)> = env
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let session = tokio::task::spawn_blocking(move || {
            McpSession::new(command, args, Some(env), stderr_verbose)
        })
        .await
        .map_err(|e| transport_err(format!("mcp stdio spawn task panicked: {e}")))?
        .map_err(|e| transport_err(e.to_string()))?;
        Ok(Self {
            server_name,
            session: McpSessionKind::Stdio(Arc::new(StdMutex::new(session))),
        })
    }

    pub async fn new_http(
        url: impl Into<String>,
        headers: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Result<Self> {
        let url = url.into();
        let session = McpHttpSession::new(url.clone(), headers).await?;
        Ok(Self {
            server_name: url,
            session: McpSessionKind::Http(Arc::new(session)),
        })
    }

    async fn stdio_call(
        session: &Arc<StdMutex<McpSession>>,
        id: String,
        method: &'static str,
        params: Value,
    ) -> Result<ResultMessage> {
        let session = Arc::clone(session);
        tokio::task::spawn_blocking(move || {
            let mut guard = session.lock().expect("mcp stdio session lock poisoned");
            guard
                .send_request(&id, method, params)
                .map_err(|e| transport_err(e.to_string()))?;
            guard
                .wait_for_result(&id, std::time::Duration::from_secs(30))
                .map_err(|e| transport_err(e.to_string()))?
                .ok_or_else(|| transport_err(format!("timeout waiting for {method}")))
        })
        .await
        .map_err(|e| transport_err(format!("mcp stdio task panicked: {e}")))?
    }
}

#[async_trait]
impl ToolSource for McpToolSource {
    fn source_name(&self) -> &str {
        &self.server_name
    }

    async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        let result = match &self.session {
            McpSessionKind::Stdio(session) => {
                Self::stdio_call(
                    session,
                    "kairos-tools-list".to_string(),
                    "tools/list",
                    Value::Object(serde_json::Map::new()),
                )
                .await?
            }
            McpSessionKind::Http(http) => {
                http.request(
                    "kairos-tools-list",
                    "tools/list",
                    Value::Object(serde_json::Map::new()),
                )
                .await?
            }
        };
        parse_list_tools_result(result)
    }

    async fn call_tool(&self, _ctx: &ToolContext, name: &str, arguments: Value) -> Result<String> {
        let id = format!("kairos-call-{name}");
        let params = serde_json::json!({ "name": name, "arguments": arguments });
        let result = match &self.session {
            McpSessionKind::Stdio(session) => Self::stdio_call(session, id, "tools/call", params).await?,
            McpSessionKind::Http(http) => http.request(&id, "tools/call", params).await?,
        };
        parse_call_tool_result(result)
    }
}

fn parse_list_tools_result(result: ResultMessage) -> Result<Vec<ToolDefinition>> {
    if let Some(err) = result.error {
        return Err(AgentError::new(ErrorKind::ProtocolError, err.message));
    }
    let tools_value = result
        .result
        .and_then(|r| r.get("tools").cloned())
        .ok_or_else(|| transport_err("no tools in response"))?;
    let tools_array = tools_value
        .as_array()
        .ok_or_else(|| transport_err("tools not an array"))?;
    let mut defs = Vec::with_capacity(tools_array.len());
    for t in tools_array {
        let obj = t
            .as_object()
            .ok_or_else(|| transport_err("tool item not an object"))?;
        let name = obj.get("name").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let description = obj
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let parameters = obj
            .get("inputSchema")
            .cloned()
            .unwrap_or(Value::Object(serde_json::Map::new()));
        defs.push(ToolDefinition { name, description, parameters });
    }
    Ok(defs)
}

fn parse_call_tool_result(result: ResultMessage) -> Result<String> {
    if let Some(err) = result.error {
        return Err(AgentError::new(ErrorKind::ProtocolError, err.message));
    }
    let result_value = result.result.ok_or_else(|| transport_err("no result in tools/call response"))?;
    if result_value.get("isError").and_then(|v| v.as_bool()).unwrap_or(false) {
        let msg = result_value
            .get("content")
            .and_then(|c| c.as_array())
            .and_then(|a| a.first())
            .and_then(|b| b.get("text").and_then(|t| t.as_str()))
            .unwrap_or("tool returned error")
            .to_string();
        return Err(AgentError::new(ErrorKind::ToolFailure, msg));
    }
    let mut text_parts = Vec::new();
    if let Some(content_array) = result_value.get("content").and_then(|c| c.as_array()) {
        for block in content_array {
            if block.get("type").and_then(|t| t.as_str()) == Some("text") {
                if let Some(t) = block.get("text").and_then(|v| v.as_str()) {
                    text_parts.push(t);
                }
            }
        }
    }
    let mut text = text_parts.join("\n").trim().to_string();
    if text.is_empty() {
        if let Some(structured) = result_value.get("structuredContent") {
            text = serde_json::to_string(structured).unwrap_or_default();
        }
    }
    if text.is_empty() {
        return Err(transport_err("no text or structuredContent in tools/call response"));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcp_core::ErrorObject;

    #[test]
    fn parse_list_tools_result_success_maps_fields() {
        let result = ResultMessage::success(
            "1",
            serde_json::json!({
                "tools": [
                    {
                        "name": "read_file",
                        "description": "Read file content",
                        "inputSchema": {"type":"object","properties":{"path":{"type":"string"}}}
                    }
                ]
            }),
        );
        let tools = parse_list_tools_result(result).unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "read_file");
        assert_eq!(tools[0].description, "Read file content");
    }

    #[test]
    fn parse_list_tools_result_propagates_jsonrpc_error() {
        let err = ResultMessage::failure("1", ErrorObject::new(-32000, "rpc failed", None));
        let result = parse_list_tools_result(err).unwrap_err();
        assert_eq!(result.kind, ErrorKind::ProtocolError);
    }

    #[test]
    fn parse_call_tool_result_joins_text_blocks() {
        let result = ResultMessage::success(
            "1",
            serde_json::json!({
                "content": [
                    {"type":"text","text":"line1"},
                    {"type":"image","text":"ignored"},
                    {"type":"text","text":"line2"}
                ]
            }),
        );
        let out = parse_call_tool_result(result).unwrap();
        assert_eq!(out, "line1\nline2");
    }

    #[test]
    fn parse_call_tool_result_errors_on_is_error() {
        let result = ResultMessage::success(
            "1",
            serde_json::json!({
                "isError": true,
                "content": [{"type":"text","text":"boom"}]
            }),
        );
        let err = parse_call_tool_result(result).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ToolFailure);
        assert_eq!(err.message, "boom");
    }

    #[tokio::test]
    async fn new_invalid_stdio_command_returns_transport_error() {
        let err = McpToolSource::new("_nonexistent_mcp_command_xyz_".to_string(), vec![])
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::TransportError);
    }
}
