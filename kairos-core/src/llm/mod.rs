//! The LLMProvider surface (spec §4.1): single-shot and streaming chat, with
//! tool-call results and usage reporting.
//!
//! Grounded in the teacher's `LlmClient` trait (`invoke` / `invoke_stream`),
//! generalized from "assistant text + tool_calls" to the full
//! `ChatRequest`/`ChatResponse` shape spec §3 requires, and from a single
//! streaming signature to the chunked `StreamChunk` sequence spec §3/§4.1
//! requires (content deltas, tool-call deltas, terminal usage).
//!
//! No concrete vendor adapter ships here — spec §1 scopes "provider adapters
//! for specific LLM vendors" out; only this contract and a `MockProvider`
//! (for tests, grounded in the teacher's `MockLlm`) are implemented.

mod mock;

pub use mock::{MockProvider, ScriptedTurn};

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, ErrorKind, Result};
use crate::message::{Message, ToolCall, ToolDefinition};

/// Token usage for one LLM call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt: u32,
    pub completion: u32,
    pub total: u32,
}

/// `{model, messages, tools?, temperature?}` (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
            temperature: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// `{content, tool_calls?, usage}` (spec §3).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
}

impl ChatResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// One frame of a streaming chat response. The terminal chunk carries
/// `done = true` and `usage_final`.
#[derive(Clone, Debug, Default)]
pub struct StreamChunk {
    pub content_delta: Option<String>,
    pub tool_calls_delta: Vec<ToolCallDelta>,
    pub done: bool,
    pub usage_final: Option<Usage>,
    pub error: Option<String>,
}

/// Delta for one tool call, keyed by its position (`index`) in the assistant
/// turn so callers can aggregate deltas into complete `ToolCall`s.
#[derive(Clone, Debug, Default)]
pub struct ToolCallDelta {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments_delta: String,
}

/// Failure kinds a provider maps its own transport onto (spec §4.1).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderFailureKind {
    Transport,
    Auth,
    RateLimit,
    InvalidRequest,
    ServerError,
}

impl ProviderFailureKind {
    pub fn into_error_kind(self) -> ErrorKind {
        match self {
            ProviderFailureKind::Transport => ErrorKind::TransportError,
            ProviderFailureKind::Auth => ErrorKind::Unauthorized,
            ProviderFailureKind::RateLimit => ErrorKind::RateLimit,
            ProviderFailureKind::InvalidRequest => ErrorKind::InvalidInput,
            ProviderFailureKind::ServerError => ErrorKind::Internal,
        }
    }
}

/// A language-model backend: single-shot and (optionally) streaming chat.
///
/// Idempotent retries are NOT assumed safe — LLM calls may bill twice — so
/// the runtime never retries a `chat`/`chat_stream` call on the caller's
/// behalf (spec §4.1, §7).
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// One complete turn: request in, full response out (including usage).
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;

    /// Streaming variant. Default implementation calls `chat` and replays it
    /// as a single content chunk plus a terminal chunk carrying usage,
    /// matching the teacher's `LlmClient::invoke_stream` default.
    async fn chat_stream(&self, request: ChatRequest) -> Result<BoxStream<'static, StreamChunk>> {
        let response = self.chat(request).await?;
        let chunks = vec![
            StreamChunk {
                content_delta: if response.content.is_empty() {
                    None
                } else {
                    Some(response.content.clone())
                },
                tool_calls_delta: response
                    .tool_calls
                    .iter()
                    .enumerate()
                    .map(|(index, tc)| ToolCallDelta {
                        index,
                        id: Some(tc.id.clone()),
                        name: Some(tc.name.clone()),
                        arguments_delta: tc.arguments.clone(),
                    })
                    .collect(),
                done: false,
                usage_final: None,
                error: None,
            },
            StreamChunk {
                content_delta: None,
                tool_calls_delta: Vec::new(),
                done: true,
                usage_final: Some(response.usage),
                error: None,
            },
        ];
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

/// Maps a provider failure onto the runtime's error taxonomy. Vendor
/// adapters call this instead of constructing `AgentError` directly, so the
/// `recoverable` flag stays consistent across providers.
pub fn provider_error(kind: ProviderFailureKind, message: impl Into<String>) -> AgentError {
    let recoverable = matches!(
        kind,
        ProviderFailureKind::Transport | ProviderFailureKind::RateLimit
    );
    AgentError::new(kind.into_error_kind(), message).recoverable(recoverable)
}

/// Aggregates streamed tool-call deltas (grouped by `index`) into complete
/// `ToolCall`s, in index order. Used by the Agent Loop's streaming variant
/// (spec §4.5 "Streaming variant").
pub fn aggregate_tool_call_deltas(deltas: &[ToolCallDelta]) -> Vec<ToolCall> {
    use std::collections::BTreeMap;

    let mut by_index: BTreeMap<usize, (String, String, String)> = BTreeMap::new();
    for delta in deltas {
        let entry = by_index
            .entry(delta.index)
            .or_insert_with(|| (String::new(), String::new(), String::new()));
        if let Some(id) = &delta.id {
            entry.0 = id.clone();
        }
        if let Some(name) = &delta.name {
            entry.1 = name.clone();
        }
        entry.2.push_str(&delta.arguments_delta);
    }
    by_index
        .into_values()
        .map(|(id, name, arguments)| ToolCall::new(id, name, arguments))
        .collect()
}
