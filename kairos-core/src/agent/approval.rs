//! Human-in-the-loop approval coupling for the Agent Loop (spec §4.5 step
//! 5c, §4.6 "Approvals").
//!
//! The Agent Loop itself never talks to the A2A Task/Approval service
//! directly — that would invert the dependency graph the crate split in
//! `SPEC_FULL.md` establishes (`kairos-a2a` depends on `kairos-core`, not
//! the reverse). Instead it depends on this narrow `ApprovalSink` trait;
//! `kairos-a2a` provides an implementation backed by its `ApprovalStore` and
//! `TaskStore`, and this module ships `LocalApprovalSink` for callers that
//! run an Agent standalone, without the A2A layer.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::message::{Message, ToolCall};

/// Everything needed to create an `ApprovalRequest` for one gated tool call.
#[derive(Clone, Debug)]
pub struct PendingApprovalRequest {
    pub run_id: String,
    pub session_id: Option<String>,
    pub tool_name: String,
    pub call_id: String,
    pub arguments: String,
    pub rule_id: Option<String>,
    pub reason: Option<String>,
}

/// Registers a pending approval and returns its id. Implemented by
/// `kairos-a2a` (backed by the Task/ApprovalStore) and, for standalone use,
/// by `LocalApprovalSink` below.
#[async_trait]
pub trait ApprovalSink: Send + Sync {
    async fn create_pending(&self, request: PendingApprovalRequest) -> Result<String>;
}

/// A minimal in-memory `ApprovalSink` for running an `Agent` without the A2A
/// layer: `create_pending` just records the request; a caller decides it by
/// calling `approve`/`reject` directly and then calls `Agent::resume`.
#[derive(Default)]
pub struct LocalApprovalSink {
    pending: Mutex<HashMap<String, PendingApprovalRequest>>,
}

impl LocalApprovalSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, approval_id: &str) -> Option<PendingApprovalRequest> {
        self.pending.lock().expect("local approval sink lock poisoned").get(approval_id).cloned()
    }

    pub fn take(&self, approval_id: &str) -> Option<PendingApprovalRequest> {
        self.pending.lock().expect("local approval sink lock poisoned").remove(approval_id)
    }
}

#[async_trait]
impl ApprovalSink for LocalApprovalSink {
    async fn create_pending(&self, request: PendingApprovalRequest) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.pending
            .lock()
            .expect("local approval sink lock poisoned")
            .insert(id.clone(), request);
        Ok(id)
    }
}

/// How a human resolved a pending approval (spec §4.6 "On approve ... On
/// reject ...").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApprovalResolution {
    Approved,
    Rejected,
}

/// Captures an in-flight agent turn paused at a `pending` tool call (spec
/// §4.5 step 5c: "suspend this iteration ... on resume continue at 5a with
/// the tool result injected"). Opaque to callers other than `Agent::resume`.
#[derive(Clone, Debug)]
pub struct Suspension {
    pub approval_id: String,
    pub run_id: String,
    pub session_id: Option<String>,
    pub(crate) messages: Vec<Message>,
    pub(crate) assistant_message: Message,
    pub(crate) executed_tool_messages: Vec<Message>,
    pub(crate) pending_call: ToolCall,
    pub(crate) remaining_calls: Vec<ToolCall>,
    pub(crate) iteration: u32,
}

impl Suspension {
    pub fn pending_tool_name(&self) -> &str {
        &self.pending_call.name
    }
}

pub(super) fn denial_message(call_id: &str, reason: &str) -> Message {
    Message::tool(
        call_id,
        serde_json::json!({ "error": "permission_denied", "reason": reason }).to_string(),
    )
}

pub(super) fn internal_error(message: impl Into<String>) -> AgentError {
    AgentError::internal(message)
}
