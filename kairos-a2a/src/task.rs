//! `Task`, `TaskState` and the `TaskStore` contract (spec §4.6/§5):
//! `SUBMITTED → WORKING → (COMPLETED | FAILED | CANCELLED | INPUT_REQUIRED →
//! WORKING → …)`. Per-task mutex; `list` takes a read snapshot; `cancel` is
//! idempotent; `append_history` rejects on terminal.
//!
//! Grounded in the teacher's `serve::run` task-tracking shape (one mutable
//! record per in-flight run, guarded individually) generalized to the
//! A2A task state machine spec §4.6 names.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::error::ApiError;
use crate::message::{A2aMessage, Part};

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Submitted,
    Working,
    Completed,
    Failed,
    Cancelled,
    InputRequired,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed | TaskState::Cancelled)
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Task {
    pub id: String,
    pub context_id: String,
    pub state: TaskState,
    pub history: Vec<A2aMessage>,
    pub artifacts: Vec<Part>,
    /// Set while `state == InputRequired`; references the pending
    /// `ApprovalRequest` blocking progress (spec §4.6 "`INPUT_REQUIRED` must
    /// reference a pending ApprovalRequest by id").
    pub pending_approval_id: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, context_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            context_id: context_id.into(),
            state: TaskState::Submitted,
            history: Vec::new(),
            artifacts: Vec::new(),
            pending_approval_id: None,
        }
    }
}

/// Pluggable mapping from `task_id` to `Task`, plus indices by `context_id`
/// and status (spec §4.6 "TaskStore").
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create(&self, context_id: &str) -> Task;
    async fn get(&self, task_id: &str) -> Option<Task>;
    async fn list(&self, context_id: Option<&str>, state: Option<TaskState>) -> Vec<Task>;
    async fn transition(&self, task_id: &str, state: TaskState) -> Result<Task, ApiError>;
    async fn set_pending_approval(&self, task_id: &str, approval_id: &str) -> Result<Task, ApiError>;
    async fn append_history(&self, task_id: &str, message: A2aMessage) -> Result<(), ApiError>;
    async fn append_artifact(&self, task_id: &str, part: Part) -> Result<(), ApiError>;
    async fn cancel(&self, task_id: &str) -> Result<Task, ApiError>;
}

/// Per-task `Mutex<Task>` (spec §5 "TaskStore: per-task mutex; `list` takes
/// a read snapshot"); the outer `RwLock` only guards the id→task map itself,
/// never a task's fields.
#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<String, Arc<Mutex<Task>>>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn record(&self, task_id: &str) -> Option<Arc<Mutex<Task>>> {
        self.tasks.read().await.get(task_id).cloned()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, context_id: &str) -> Task {
        let task = Task::new(uuid::Uuid::new_v4().to_string(), context_id);
        self.tasks.write().await.insert(task.id.clone(), Arc::new(Mutex::new(task.clone())));
        task
    }

    async fn get(&self, task_id: &str) -> Option<Task> {
        let record = self.record(task_id).await?;
        Some(record.lock().await.clone())
    }

    async fn list(&self, context_id: Option<&str>, state: Option<TaskState>) -> Vec<Task> {
        let snapshot: Vec<Arc<Mutex<Task>>> = self.tasks.read().await.values().cloned().collect();
        let mut out = Vec::new();
        for record in snapshot {
            let task = record.lock().await.clone();
            if let Some(ctx) = context_id {
                if task.context_id != ctx {
                    continue;
                }
            }
            if let Some(state) = state {
                if task.state != state {
                    continue;
                }
            }
            out.push(task);
        }
        out
    }

    async fn transition(&self, task_id: &str, state: TaskState) -> Result<Task, ApiError> {
        let record = self.record(task_id).await.ok_or_else(|| ApiError::TaskNotFound(task_id.to_string()))?;
        let mut task = record.lock().await;
        if task.state.is_terminal() {
            return Err(ApiError::TerminalTask(task_id.to_string()));
        }
        task.state = state;
        if state != TaskState::InputRequired {
            task.pending_approval_id = None;
        }
        Ok(task.clone())
    }

    async fn set_pending_approval(&self, task_id: &str, approval_id: &str) -> Result<Task, ApiError> {
        let record = self.record(task_id).await.ok_or_else(|| ApiError::TaskNotFound(task_id.to_string()))?;
        let mut task = record.lock().await;
        if task.state.is_terminal() {
            return Err(ApiError::TerminalTask(task_id.to_string()));
        }
        task.state = TaskState::InputRequired;
        task.pending_approval_id = Some(approval_id.to_string());
        Ok(task.clone())
    }

    async fn append_history(&self, task_id: &str, message: A2aMessage) -> Result<(), ApiError> {
        let record = self.record(task_id).await.ok_or_else(|| ApiError::TaskNotFound(task_id.to_string()))?;
        let mut task = record.lock().await;
        if task.state.is_terminal() {
            return Err(ApiError::TerminalTask(task_id.to_string()));
        }
        task.history.push(message);
        Ok(())
    }

    async fn append_artifact(&self, task_id: &str, part: Part) -> Result<(), ApiError> {
        let record = self.record(task_id).await.ok_or_else(|| ApiError::TaskNotFound(task_id.to_string()))?;
        record.lock().await.artifacts.push(part);
        Ok(())
    }

    async fn cancel(&self, task_id: &str) -> Result<Task, ApiError> {
        let record = self.record(task_id).await.ok_or_else(|| ApiError::TaskNotFound(task_id.to_string()))?;
        let mut task = record.lock().await;
        if task.state.is_terminal() {
            return Ok(task.clone());
        }
        task.state = TaskState::Cancelled;
        Ok(task.clone())
    }
}
