//! `ApiError`: wraps `kairos_core::AgentError` (plus a few errors that only
//! make sense at the wire layer, like "no such task") with the HTTP status
//! and JSON-RPC error code spec §6 assigns to each `ErrorKind`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use kairos_core::error::{AgentError, ErrorKind};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error("task not found: {0}")]
    TaskNotFound(String),
    #[error("approval not found: {0}")]
    ApprovalNotFound(String),
    #[error("task {0} is terminal")]
    TerminalTask(String),
    #[error("unimplemented method: {0}")]
    Unimplemented(String),
}

impl ApiError {
    /// HTTP status code for this error, per spec §6/§7's kind→status table.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::TaskNotFound(_) | ApiError::ApprovalNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::TerminalTask(_) => StatusCode::CONFLICT,
            ApiError::Unimplemented(_) => StatusCode::NOT_IMPLEMENTED,
            ApiError::Agent(err) => match err.kind {
                ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
                ErrorKind::PermissionDenied | ErrorKind::GuardrailBlocked => StatusCode::FORBIDDEN,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Timeout => StatusCode::REQUEST_TIMEOUT,
                ErrorKind::RateLimit => StatusCode::TOO_MANY_REQUESTS,
                ErrorKind::TerminalTask => StatusCode::CONFLICT,
                ErrorKind::Cancelled => StatusCode::BAD_REQUEST,
                ErrorKind::PendingApproval => StatusCode::ACCEPTED,
                ErrorKind::ToolFailure
                | ErrorKind::LlmError
                | ErrorKind::MemoryError
                | ErrorKind::TransportError
                | ErrorKind::ProtocolError
                | ErrorKind::PoolClosed
                | ErrorKind::MaxIterations
                | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// JSON-RPC error code, per spec §6: "invalid_argument→-32602,
    /// not_found→-32004, unauthenticated→-32001, permission_denied→-32003,
    /// unimplemented→-32601, other→-32000".
    pub fn json_rpc_code(&self) -> i64 {
        match self {
            ApiError::TaskNotFound(_) | ApiError::ApprovalNotFound(_) => -32004,
            ApiError::TerminalTask(_) => -32000,
            ApiError::Unimplemented(_) => -32601,
            ApiError::Agent(err) => match err.kind {
                ErrorKind::InvalidInput => -32602,
                ErrorKind::NotFound => -32004,
                ErrorKind::Unauthorized => -32001,
                ErrorKind::PermissionDenied | ErrorKind::GuardrailBlocked => -32003,
                _ => -32000,
            },
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({ "error": { "message": self.message() } }));
        (status, body).into_response()
    }
}
