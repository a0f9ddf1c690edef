//! MCP session over Streamable HTTP: POST one JSON-RPC message per call,
//! accepting either an `application/json` or `text/event-stream` response.
//!
//! Grounded in the teacher's `tool_source::mcp::session_http::McpHttpSession`,
//! unchanged at the wire level.

use std::sync::Mutex;

use mcp_core::{MessageId, NotificationMessage, RequestMessage, ResultMessage};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AgentError, Result};

const MCP_PROTOCOL_VERSION: &str = "2025-11-25";
const INITIALIZE_REQUEST_ID: &str = "kairos-mcp-initialize";

#[derive(Debug, Deserialize)]
struct JsonRpcErrorBody {
    #[allow(dead_code)]
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    id: Option<MessageId>,
    result: Option<Value>,
    error: Option<JsonRpcErrorBody>,
}

fn transport_err(message: impl Into<String>) -> AgentError {
    AgentError::new(crate::error::ErrorKind::TransportError, message)
}

fn parse_json_rpc_from_body(
    body: &str,
    content_type: Option<&reqwest::header::HeaderValue>,
) -> Result<JsonRpcResponse> {
    let is_sse = content_type
        .and_then(|v| v.to_str().ok())
        .map(|s| s.contains("text/event-stream"))
        .unwrap_or(false);

    if is_sse {
        let mut data_buffer = String::new();
        for line in body.lines() {
            if let Some(data) = line.strip_prefix("data: ") {
                if data == "[DONE]" || data.is_empty() {
                    if !data_buffer.is_empty() {
                        if let Ok(r) = serde_json::from_str::<JsonRpcResponse>(&data_buffer) {
                            if r.result.is_some() || r.error.is_some() {
                                return Ok(r);
                            }
                        }
                        data_buffer.clear();
                    }
                    continue;
                }
                if data_buffer.is_empty() {
                    data_buffer = data.to_string();
                } else {
                    data_buffer.push('\n');
                    data_buffer.push_str(data);
                }
                if let Ok(r) = serde_json::from_str::<JsonRpcResponse>(&data_buffer) {
                    if r.result.is_some() || r.error.is_some() {
                        return Ok(r);
                    }
                }
            } else if line.trim().is_empty() && !data_buffer.is_empty() {
                if let Ok(r) = serde_json::from_str::<JsonRpcResponse>(&data_buffer) {
                    if r.result.is_some() || r.error.is_some() {
                        return Ok(r);
                    }
                }
                data_buffer.clear();
            }
        }
        if !data_buffer.is_empty() {
            if let Ok(r) = serde_json::from_str::<JsonRpcResponse>(&data_buffer) {
                if r.result.is_some() || r.error.is_some() {
                    return Ok(r);
                }
            }
        }
        Err(transport_err("SSE stream: no JSON-RPC response (result/error) found"))
    } else {
        serde_json::from_str(body).map_err(|e| transport_err(format!("response json: {e}")))
    }
}

/// MCP session over Streamable HTTP; safe to build and use from async code,
/// no subprocess involved.
pub struct McpHttpSession {
    client: Client,
    url: String,
    headers: Vec<(String, String)>,
    session_id: Mutex<Option<String>>,
}

impl McpHttpSession {
    pub async fn new(
        url: impl Into<String>,
        headers: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Result<Self> {
        let url = url.into();
        let headers: Vec<(String, String)> = headers
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| transport_err(e.to_string()))?;
        let mut session = Self {
            client,
            url,
            headers,
            session_id: Mutex::new(None),
        };
        session.initialize().await?;
        Ok(session)
    }

    async fn initialize(&mut self) -> Result<()> {
        let params = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "clientInfo": {
                "name": "kairos-mcp",
                "version": env!("CARGO_PKG_VERSION")
            }
        });
        let request = RequestMessage::new(INITIALIZE_REQUEST_ID, "initialize", params);
        let body = serde_json::to_vec(&request).map_err(|e| transport_err(e.to_string()))?;
        let resp = self
            .post(body)
            .await
            .map_err(|e| transport_err(e.to_string()))?;
        let status = resp.status();
        if let Some(id) = resp
            .headers()
            .get("MCP-Session-Id")
            .and_then(|v| v.to_str().ok())
            .map(String::from)
        {
            *self.session_id.lock().expect("session id lock poisoned") = Some(id);
        }
        if status == reqwest::StatusCode::ACCEPTED {
            return Ok(());
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(transport_err(format!(
                "initialize HTTP {status}: {}",
                if text.is_empty() { "no body" } else { &text }
            )));
        }
        let content_type = resp.headers().get("content-type").cloned();
        let text = resp
            .text()
            .await
            .map_err(|e| transport_err(format!("initialize response body: {e}")))?;
        let _ = parse_json_rpc_from_body(&text, content_type.as_ref())
            .map_err(|e| transport_err(format!("initialize {e}")))?;

        let notification = NotificationMessage::new("notifications/initialized", Some(json!({})));
        let notif_body =
            serde_json::to_vec(&notification).map_err(|e| transport_err(e.to_string()))?;
        let resp2 = self
            .post(notif_body)
            .await
            .map_err(|e| transport_err(e.to_string()))?;
        let status2 = resp2.status();
        if status2 != reqwest::StatusCode::ACCEPTED && !status2.is_success() {
            let text = resp2.text().await.unwrap_or_default();
            return Err(transport_err(format!(
                "notifications/initialized HTTP {status2}: {}",
                if text.is_empty() { "no body" } else { &text }
            )));
        }
        Ok(())
    }

    async fn post(&self, body: Vec<u8>) -> std::result::Result<reqwest::Response, reqwest::Error> {
        let mut req = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .header("MCP-Protocol-Version", MCP_PROTOCOL_VERSION)
            .body(body);
        for (k, v) in &self.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        if let Some(sid) = self.session_id.lock().expect("session id lock poisoned").clone() {
            req = req.header("MCP-Session-Id", sid.as_str());
        }
        req.send().await
    }

    /// Sends one JSON-RPC request and returns the parsed result.
    pub async fn request(&self, id: &str, method: &str, params: Value) -> Result<ResultMessage> {
        let request = RequestMessage::new(id, method, params);
        let body = serde_json::to_vec(&request).map_err(|e| transport_err(e.to_string()))?;
        let resp = self.post(body).await.map_err(|e| transport_err(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(transport_err(format!(
                "{method} HTTP {status}: {}",
                if text.is_empty() { "no body" } else { &text }
            )));
        }
        let content_type = resp.headers().get("content-type").cloned();
        let text = resp
            .text()
            .await
            .map_err(|e| transport_err(format!("{method} response body: {e}")))?;
        let parsed = parse_json_rpc_from_body(&text, content_type.as_ref())?;
        Ok(match parsed.error {
            Some(err) => ResultMessage::failure(
                MessageId::from(id),
                mcp_core::ErrorObject::new(err.code, err.message, None),
            ),
            None => ResultMessage::success(MessageId::from(id), parsed.result.unwrap_or(Value::Null)),
        })
    }
}
