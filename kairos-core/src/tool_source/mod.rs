//! Tool contract & MCP broker (spec §4.2).
//!
//! `Tool` is the in-process capability contract. `ToolSource` is the
//! uniform async interface the Broker dispatches through, implemented by
//! local tools, Skills, and MCP servers alike — grounded in the teacher's
//! `ToolSource` trait (`list_tools`/`call_tool`, as implemented by
//! `McpToolSource`).

pub mod mcp;
pub mod skill;

mod broker;

pub use broker::{Broker, BrokerBuilder};
pub use mcp::{McpToolSource, Pool, PoolConfig};
pub use skill::{Skill, SkillToolSource};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{AgentError, ErrorKind, Result};
use crate::message::ToolDefinition;

/// Per-call context threaded into `Tool::call` and `ToolSource::call_tool`.
/// Grounded in the teacher's `ToolCallContext` (recent messages, thread/user
/// id); narrowed to what the Agent Loop actually needs to pass through.
#[derive(Clone, Debug, Default)]
pub struct ToolContext {
    pub run_id: String,
    pub session_id: Option<String>,
}

/// An opaque in-process capability. Ownership: a `Tool` belongs to the
/// `Broker` for its lifetime once registered (spec §3).
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn definition(&self) -> ToolDefinition;
    async fn call(&self, ctx: &ToolContext, input: Value) -> Result<String>;
}

/// A source of tools: local registry, Skill loader, or MCP server. The
/// Broker unions `list_tools` across every registered source (spec §4.2
/// Discovery) and routes `call_tool` back to the owning source.
#[async_trait]
pub trait ToolSource: Send + Sync {
    /// A short name identifying this source, used for duplicate-resolution
    /// logging and MCP server namespacing.
    fn source_name(&self) -> &str;

    async fn list_tools(&self) -> Result<Vec<ToolDefinition>>;

    async fn call_tool(&self, ctx: &ToolContext, name: &str, arguments: Value) -> Result<String>;
}

/// Wraps a set of directly-registered `Tool` objects as a `ToolSource`.
pub struct LocalToolSource {
    tools: Vec<Box<dyn Tool>>,
}

impl LocalToolSource {
    pub fn new(tools: Vec<Box<dyn Tool>>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl ToolSource for LocalToolSource {
    fn source_name(&self) -> &str {
        "local"
    }

    async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        Ok(self.tools.iter().map(|t| t.definition()).collect())
    }

    async fn call_tool(&self, ctx: &ToolContext, name: &str, arguments: Value) -> Result<String> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| AgentError::not_found(format!("no local tool named {name}")))?;
        tool.call(ctx, arguments).await
    }
}

/// Normalizes raw call arguments against a tool's declared JSON-Schema
/// (spec §4.2 Invocation): a bare string is accepted either as a JSON object
/// or, when the schema declares exactly one required scalar property, as
/// that field's value.
pub fn normalize_arguments(definition: &ToolDefinition, raw: &str) -> Result<Value> {
    if let Ok(parsed) = serde_json::from_str::<Value>(raw) {
        if parsed.is_object() {
            return validate_required(definition, parsed);
        }
    }

    let required = required_fields(definition);
    if required.len() == 1 {
        let mut obj = serde_json::Map::new();
        obj.insert(required[0].clone(), Value::String(raw.to_string()));
        return validate_required(definition, Value::Object(obj));
    }

    Err(AgentError::invalid_input(format!(
        "argument string for tool '{}' is neither a JSON object nor a single positional scalar",
        definition.name
    )))
}

fn required_fields(definition: &ToolDefinition) -> Vec<String> {
    definition
        .parameters
        .get("required")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

fn validate_required(definition: &ToolDefinition, value: Value) -> Result<Value> {
    let obj = value
        .as_object()
        .ok_or_else(|| AgentError::invalid_input("tool arguments must be a JSON object"))?;
    for field in required_fields(definition) {
        if !obj.contains_key(&field) {
            return Err(AgentError::new(
                ErrorKind::InvalidInput,
                format!("missing required field '{field}' for tool '{}'", definition.name),
            ));
        }
    }
    Ok(value)
}
