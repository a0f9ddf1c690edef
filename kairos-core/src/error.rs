//! Error taxonomy shared across the agent runtime (spec §7).
//!
//! One enum, `ErrorKind`, names the taxonomy; `AgentError` wraps a kind with
//! a message, optional cause, a `recoverable` flag, and a context map used
//! for both logging and HTTP/JSON-RPC status mapping in `kairos-a2a`.

use std::collections::HashMap;
use std::fmt;

/// Coarse error category, independent of which component raised it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Unauthorized,
    PermissionDenied,
    PendingApproval,
    Timeout,
    Cancelled,
    RateLimit,
    ToolFailure,
    LlmError,
    MemoryError,
    TransportError,
    ProtocolError,
    PoolClosed,
    TerminalTask,
    MaxIterations,
    GuardrailBlocked,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::PendingApproval => "pending_approval",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::ToolFailure => "tool_failure",
            ErrorKind::LlmError => "llm_error",
            ErrorKind::MemoryError => "memory_error",
            ErrorKind::TransportError => "transport_error",
            ErrorKind::ProtocolError => "protocol_error",
            ErrorKind::PoolClosed => "pool_closed",
            ErrorKind::TerminalTask => "terminal_task",
            ErrorKind::MaxIterations => "max_iterations",
            ErrorKind::GuardrailBlocked => "guardrail_blocked",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// The runtime's single error type. Every fallible operation in `kairos-core`
/// returns `Result<T, AgentError>` (aliased below as `Result<T>`).
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct AgentError {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    pub recoverable: bool,
    pub context: HashMap<String, String>,
}

impl AgentError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let recoverable = matches!(
            kind,
            ErrorKind::TransportError | ErrorKind::RateLimit | ErrorKind::Timeout
        );
        Self {
            kind,
            message: message.into(),
            cause: None,
            recoverable,
            context: HashMap::new(),
        }
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn recoverable(mut self, recoverable: bool) -> Self {
        self.recoverable = recoverable;
        self
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied, message)
    }

    pub fn guardrail_blocked(guardrail_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::GuardrailBlocked, reason).with_context("guardrail", guardrail_id)
    }

    pub fn max_iterations(last_content: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::MaxIterations,
            "reasoning loop exceeded max_iterations",
        )
        .with_context("last_assistant_content", last_content)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "operation cancelled").recoverable(false)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_sets_recoverable_by_kind() {
        let e = AgentError::new(ErrorKind::TransportError, "boom");
        assert!(e.recoverable);
        let e = AgentError::new(ErrorKind::InvalidInput, "bad");
        assert!(!e.recoverable);
    }

    #[test]
    fn display_includes_kind_and_message() {
        let e = AgentError::invalid_input("missing field");
        assert_eq!(e.to_string(), "invalid_input: missing field");
    }

    #[test]
    fn context_builder_accumulates_keys() {
        let e = AgentError::internal("x")
            .with_context("tool", "echo")
            .with_context("server", "fs");
        assert_eq!(e.context.get("tool").map(String::as_str), Some("echo"));
        assert_eq!(e.context.get("server").map(String::as_str), Some("fs"));
    }
}
