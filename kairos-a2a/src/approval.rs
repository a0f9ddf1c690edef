//! `ApprovalRequest`, `ApprovalStore`, and the two `kairos-core` seams it
//! fills: `ApprovalSink` (creates a pending request when the PolicyEngine
//! returns `pending`) and `ApprovalExpirer` (rejects stale ones for the
//! Runtime's sweeper). Spec §4.6 "Approvals", §5 "ApprovalStore: per-record
//! mutex; filters scan a snapshot".

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kairos_core::agent::{ApprovalSink, PendingApprovalRequest};
use kairos_core::error::{AgentError, Result as CoreResult};
use kairos_core::runtime::ApprovalExpirer;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::error::ApiError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub task_id: String,
    pub context_id: String,
    pub tool_name: String,
    pub call_id: String,
    pub arguments: String,
    pub rule_id: Option<String>,
    pub reason: Option<String>,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub decision_reason: Option<String>,
}

#[async_trait]
pub trait ApprovalStore: Send + Sync {
    async fn create(&self, task_id: &str, context_id: &str, request: PendingApprovalRequest, ttl: Option<chrono::Duration>) -> ApprovalRequest;
    async fn get(&self, id: &str) -> Option<ApprovalRequest>;
    async fn list(&self, task_id: Option<&str>, status: Option<ApprovalStatus>) -> Vec<ApprovalRequest>;
    async fn decide(&self, id: &str, approved: bool, reason: Option<String>) -> Result<ApprovalRequest, ApiError>;
    async fn expire_stale(&self) -> Vec<ApprovalRequest>;
}

/// Bridges an `ApprovalStore` decision back to the suspended `Agent` turn:
/// `ApprovalSink::create_pending` only returns an id, so the handler that
/// drives `Agent::resume` keeps the actual `Suspension` here, keyed by that
/// same id.
#[derive(Default)]
pub struct SuspensionRegistry {
    pending: Mutex<HashMap<String, kairos_core::agent::Suspension>>,
}

impl SuspensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, approval_id: String, suspension: kairos_core::agent::Suspension) {
        self.pending.lock().await.insert(approval_id, suspension);
    }

    pub async fn take(&self, approval_id: &str) -> Option<kairos_core::agent::Suspension> {
        self.pending.lock().await.remove(approval_id)
    }
}

#[derive(Default)]
pub struct InMemoryApprovalStore {
    records: RwLock<HashMap<String, Arc<Mutex<ApprovalRequest>>>>,
}

impl InMemoryApprovalStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn record(&self, id: &str) -> Option<Arc<Mutex<ApprovalRequest>>> {
        self.records.read().await.get(id).cloned()
    }
}

#[async_trait]
impl ApprovalStore for InMemoryApprovalStore {
    async fn create(&self, task_id: &str, context_id: &str, request: PendingApprovalRequest, ttl: Option<chrono::Duration>) -> ApprovalRequest {
        let now = Utc::now();
        let approval = ApprovalRequest {
            id: uuid::Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            context_id: context_id.to_string(),
            tool_name: request.tool_name,
            call_id: request.call_id,
            arguments: request.arguments,
            rule_id: request.rule_id,
            reason: request.reason,
            status: ApprovalStatus::Pending,
            created_at: now,
            expires_at: ttl.map(|d| now + d),
            decision_reason: None,
        };
        self.records.write().await.insert(approval.id.clone(), Arc::new(Mutex::new(approval.clone())));
        approval
    }

    async fn get(&self, id: &str) -> Option<ApprovalRequest> {
        let record = self.record(id).await?;
        Some(record.lock().await.clone())
    }

    async fn list(&self, task_id: Option<&str>, status: Option<ApprovalStatus>) -> Vec<ApprovalRequest> {
        let snapshot: Vec<Arc<Mutex<ApprovalRequest>>> = self.records.read().await.values().cloned().collect();
        let mut out = Vec::new();
        for record in snapshot {
            let approval = record.lock().await.clone();
            if let Some(task_id) = task_id {
                if approval.task_id != task_id {
                    continue;
                }
            }
            if let Some(status) = status {
                if approval.status != status {
                    continue;
                }
            }
            out.push(approval);
        }
        out
    }

    async fn decide(&self, id: &str, approved: bool, reason: Option<String>) -> Result<ApprovalRequest, ApiError> {
        let record = self.record(id).await.ok_or_else(|| ApiError::ApprovalNotFound(id.to_string()))?;
        let mut approval = record.lock().await;
        if approval.status != ApprovalStatus::Pending {
            return Err(ApiError::TerminalTask(id.to_string()));
        }
        approval.status = if approved { ApprovalStatus::Approved } else { ApprovalStatus::Rejected };
        approval.decision_reason = reason;
        Ok(approval.clone())
    }

    async fn expire_stale(&self) -> Vec<ApprovalRequest> {
        let now = Utc::now();
        let snapshot: Vec<Arc<Mutex<ApprovalRequest>>> = self.records.read().await.values().cloned().collect();
        let mut expired = Vec::new();
        for record in snapshot {
            let mut approval = record.lock().await;
            if approval.status == ApprovalStatus::Pending {
                if let Some(expires_at) = approval.expires_at {
                    if expires_at <= now {
                        approval.status = ApprovalStatus::Expired;
                        expired.push(approval.clone());
                    }
                }
            }
        }
        expired
    }
}

/// Adapts an `ApprovalStore` (plus the `TaskStore` it links back into) into
/// the `ApprovalSink` seam `Agent::run`/`resume` dispatches pending tool
/// calls through. A single instance is shared by every task: the task a
/// pending call belongs to travels as `PendingApprovalRequest::session_id`
/// (the handler calls `Agent::run_with_id` with `session_id = task.id`), and
/// creating the approval atomically moves that task to `INPUT_REQUIRED`
/// (spec §4.6 "the task transitions to `INPUT_REQUIRED`").
pub struct TaskApprovalSink {
    approval_store: Arc<dyn ApprovalStore>,
    task_store: Arc<dyn crate::task::TaskStore>,
    ttl: Option<chrono::Duration>,
}

impl TaskApprovalSink {
    pub fn new(approval_store: Arc<dyn ApprovalStore>, task_store: Arc<dyn crate::task::TaskStore>, ttl: Option<chrono::Duration>) -> Self {
        Self { approval_store, task_store, ttl }
    }
}

#[async_trait]
impl ApprovalSink for TaskApprovalSink {
    async fn create_pending(&self, request: PendingApprovalRequest) -> CoreResult<String> {
        let task_id = request
            .session_id
            .clone()
            .ok_or_else(|| AgentError::invalid_input("pending approval requires a task-bound session_id"))?;
        let context_id = self.task_store.get(&task_id).await.map(|t| t.context_id).unwrap_or_default();
        let approval = self.approval_store.create(&task_id, &context_id, request, self.ttl).await;
        self.task_store
            .set_pending_approval(&task_id, &approval.id)
            .await
            .map_err(|_| AgentError::internal("failed to move task to input_required"))?;
        Ok(approval.id)
    }
}

/// Adapts an `ApprovalStore` into the Runtime's sweeper seam.
pub struct StoreApprovalExpirer {
    store: Arc<dyn ApprovalStore>,
}

impl StoreApprovalExpirer {
    pub fn new(store: Arc<dyn ApprovalStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ApprovalExpirer for StoreApprovalExpirer {
    async fn expire_approvals(&self) -> CoreResult<u64> {
        let expired = self.store.expire_stale().await;
        if expired.is_empty() {
            return Ok(0);
        }
        Ok(expired.len() as u64)
    }
}

/// Returned to a caller that tries to act on an approval that doesn't exist.
pub fn not_found(id: &str) -> AgentError {
    AgentError::not_found(format!("approval {id} not found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_request() -> PendingApprovalRequest {
        PendingApprovalRequest {
            run_id: "run-1".to_string(),
            session_id: Some("task-1".to_string()),
            tool_name: "shell_exec".to_string(),
            call_id: "call-1".to_string(),
            arguments: "{}".to_string(),
            rule_id: Some("gate-shell".to_string()),
            reason: Some("requires human approval".to_string()),
        }
    }

    #[tokio::test]
    async fn create_then_decide_approves_a_pending_request() {
        let store = InMemoryApprovalStore::new();
        let approval = store.create("task-1", "ctx-1", pending_request(), None).await;
        assert_eq!(approval.status, ApprovalStatus::Pending);

        let decided = store.decide(&approval.id, true, Some("looks fine".to_string())).await.unwrap();
        assert_eq!(decided.status, ApprovalStatus::Approved);
        assert_eq!(decided.decision_reason.as_deref(), Some("looks fine"));
    }

    #[tokio::test]
    async fn deciding_twice_is_rejected() {
        let store = InMemoryApprovalStore::new();
        let approval = store.create("task-1", "ctx-1", pending_request(), None).await;
        store.decide(&approval.id, true, None).await.unwrap();
        let err = store.decide(&approval.id, false, None).await.unwrap_err();
        assert!(matches!(err, ApiError::TerminalTask(_)));
    }

    #[tokio::test]
    async fn expire_stale_rejects_only_expired_pending_requests() {
        let store = InMemoryApprovalStore::new();
        let soon_expired = store.create("task-1", "ctx-1", pending_request(), Some(chrono::Duration::milliseconds(-1))).await;
        let never_expires = store.create("task-1", "ctx-1", pending_request(), None).await;

        let expired = store.expire_stale().await;
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, soon_expired.id);

        let still_pending = store.get(&never_expires.id).await.unwrap();
        assert_eq!(still_pending.status, ApprovalStatus::Pending);
    }

    #[tokio::test]
    async fn task_approval_sink_creates_a_record_keyed_by_task_and_marks_it_input_required() {
        use crate::task::{InMemoryTaskStore, TaskState, TaskStore as _};

        let approval_store: Arc<dyn ApprovalStore> = Arc::new(InMemoryApprovalStore::new());
        let task_store: Arc<dyn crate::task::TaskStore> = Arc::new(InMemoryTaskStore::new());
        let task = task_store.create("ctx-7").await;
        task_store.transition(&task.id, TaskState::Working).await.unwrap();

        let sink = TaskApprovalSink::new(approval_store.clone(), task_store.clone(), None);
        let mut request = pending_request();
        request.session_id = Some(task.id.clone());
        let id = sink.create_pending(request).await.unwrap();

        let approval = approval_store.get(&id).await.unwrap();
        assert_eq!(approval.task_id, task.id);

        let updated = task_store.get(&task.id).await.unwrap();
        assert_eq!(updated.state, TaskState::InputRequired);
        assert_eq!(updated.pending_approval_id.as_deref(), Some(id.as_str()));
    }

    #[tokio::test]
    async fn store_approval_expirer_reports_the_expired_count() {
        let store: Arc<dyn ApprovalStore> = Arc::new(InMemoryApprovalStore::new());
        store.create("task-1", "ctx-1", pending_request(), Some(chrono::Duration::milliseconds(-1))).await;
        let expirer = StoreApprovalExpirer::new(store.clone());
        let count = expirer.expire_approvals().await.unwrap();
        assert_eq!(count, 1);
    }
}
