//! `kairos-a2a`: the Agent-to-Agent Task/Approval service (spec §4.6) —
//! `TaskStore`, `ApprovalStore`, `AgentCard` discovery, and two wire
//! bindings (HTTP+JSON, JSON-RPC) sharing one `TaskServiceHandler`.
//!
//! Depends on `kairos-core` for the `Agent`/`Runtime` it drives, but
//! `kairos-core` never depends back: this crate supplies `kairos-core`'s
//! `ApprovalSink`/`ApprovalExpirer` seams (`approval::TaskApprovalSink`,
//! `approval::StoreApprovalExpirer`) rather than the reverse.

pub mod agent_card;
pub mod approval;
pub mod error;
pub mod handler;
pub mod http;
pub mod jsonrpc;
pub mod message;
pub mod stream;
pub mod task;

pub use agent_card::AgentCard;
pub use approval::{ApprovalRequest, ApprovalStatus, ApprovalStore, InMemoryApprovalStore, StoreApprovalExpirer, SuspensionRegistry, TaskApprovalSink};
pub use error::ApiError;
pub use handler::TaskServiceHandler;
pub use message::{A2aMessage, MessageRole, Part};
pub use stream::{StreamResponse, TaskStreamHub};
pub use task::{InMemoryTaskStore, Task, TaskState, TaskStore};
