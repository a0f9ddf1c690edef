//! Kairos agent runtime core: the `LLMProvider` contract, MCP tool broker,
//! governance/guardrails, conversation and vector memory, the reason-act-
//! observe agent loop, and the in-process runtime that drives it.
//!
//! `kairos-a2a` builds the Task/ApprovalRequest service on top of this
//! crate's `agent::ApprovalSink`/`agent::Suspension` seam; `kairos-config`
//! assembles the `KairosConfig` that wires an `Agent` together. Neither is a
//! dependency of this crate.

pub mod agent;
pub mod error;
pub mod event;
pub mod governance;
pub mod guardrails;
pub mod llm;
pub mod memory;
pub mod message;
pub mod retry;
pub mod runtime;
pub mod tool_source;

pub use error::{AgentError, ErrorKind, Result};
pub use event::{AgentEvent, EventEmitter};
pub use message::{Message, Role, ToolCall, ToolDefinition};
