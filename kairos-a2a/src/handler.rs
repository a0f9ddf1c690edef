//! `TaskServiceHandler`: the single in-process handler both the HTTP+JSON
//! and JSON-RPC bindings dispatch to (spec §4.6 "sharing a single in-process
//! handler"). Owns one `Arc<Agent>` plus the `TaskStore`/`ApprovalStore`/
//! `TaskStreamHub`/`SuspensionRegistry`/`AgentCard` it coordinates.

use std::sync::Arc;

use kairos_core::agent::{Agent, AgentOutcome, ApprovalResolution};
use kairos_core::event::AgentEvent;
use tokio_stream::Stream;
use tracing::{info, instrument, warn};

use crate::agent_card::AgentCard;
use crate::approval::{ApprovalRequest, ApprovalStatus, ApprovalStore, SuspensionRegistry};
use crate::error::ApiError;
use crate::message::A2aMessage;
use crate::stream::{StreamResponse, TaskStreamHub};
use crate::task::{Task, TaskState, TaskStore};

pub struct TaskServiceHandler {
    agent: Arc<Agent>,
    tasks: Arc<dyn TaskStore>,
    approvals: Arc<dyn ApprovalStore>,
    suspensions: Arc<SuspensionRegistry>,
    stream_hub: Arc<TaskStreamHub>,
    agent_card: AgentCard,
}

impl TaskServiceHandler {
    pub fn new(
        agent: Arc<Agent>,
        tasks: Arc<dyn TaskStore>,
        approvals: Arc<dyn ApprovalStore>,
        suspensions: Arc<SuspensionRegistry>,
        stream_hub: Arc<TaskStreamHub>,
        agent_card: AgentCard,
    ) -> Self {
        Self { agent, tasks, approvals, suspensions, stream_hub, agent_card }
    }

    pub fn agent_card(&self) -> &AgentCard {
        &self.agent_card
    }

    /// `SendMessage` (spec §4.6): creates a task, drives the Agent Loop to
    /// completion or suspension, returns the resulting `Task`. Blocking —
    /// callers that want incremental frames use `send_streaming_message`.
    #[instrument(skip(self, text))]
    pub async fn send_message(&self, context_id: &str, text: &str) -> Result<Task, ApiError> {
        let task = self.tasks.create(context_id).await;
        self.run_task(task, text, false).await
    }

    /// `SendStreamingMessage`: same as `send_message`, but returns the live
    /// `StreamResponse` stream for the freshly created task instead of
    /// waiting for it to finish.
    #[instrument(skip(self, text))]
    pub async fn send_streaming_message(&self, context_id: &str, text: &str) -> Result<(Task, impl Stream<Item = StreamResponse>), ApiError> {
        let task = self.tasks.create(context_id).await;
        let stream = self.stream_hub.subscribe(&task.id).await;

        let handler_task = task.clone();
        let text = text.to_string();
        let this = self.clone_refs();
        tokio::spawn(async move {
            if let Err(err) = this.run_task(handler_task, &text, true).await {
                warn!(error = %err, "background task run failed");
            }
        });

        Ok((task, stream))
    }

    /// `GetTask`.
    pub async fn get_task(&self, task_id: &str) -> Result<Task, ApiError> {
        self.tasks.get(task_id).await.ok_or_else(|| ApiError::TaskNotFound(task_id.to_string()))
    }

    /// `ListTasks`.
    pub async fn list_tasks(&self, context_id: Option<&str>, state: Option<TaskState>) -> Vec<Task> {
        self.tasks.list(context_id, state).await
    }

    /// `CancelTask`: idempotent (spec §5 "`cancel(id)` is idempotent").
    pub async fn cancel_task(&self, task_id: &str) -> Result<Task, ApiError> {
        let task = self.tasks.cancel(task_id).await?;
        self.stream_hub.publish(task_id, StreamResponse::StatusUpdate { task_id: task_id.to_string(), state: task.state }).await;
        Ok(task)
    }

    /// `SubscribeToTask`: resumes streaming for an existing task, replaying
    /// whatever history the hub retains first.
    pub async fn subscribe_to_task(&self, task_id: &str) -> Result<impl Stream<Item = StreamResponse>, ApiError> {
        self.tasks.get(task_id).await.ok_or_else(|| ApiError::TaskNotFound(task_id.to_string()))?;
        Ok(self.stream_hub.subscribe(task_id).await)
    }

    /// `GetExtendedAgentCard`.
    pub fn get_extended_agent_card(&self) -> AgentCard {
        self.agent_card.clone()
    }

    /// `GetApproval`.
    pub async fn get_approval(&self, id: &str) -> Result<ApprovalRequest, ApiError> {
        self.approvals.get(id).await.ok_or_else(|| ApiError::ApprovalNotFound(id.to_string()))
    }

    /// `ListApprovals(filter)`.
    pub async fn list_approvals(&self, task_id: Option<&str>, status: Option<ApprovalStatus>) -> Vec<ApprovalRequest> {
        self.approvals.list(task_id, status).await
    }

    /// `ApproveApproval(id, reason)`: resumes the suspended Agent turn,
    /// dispatches the gated tool call, moves the task back to `WORKING`
    /// (spec §4.6 "On approve: Agent resumes ... task → `WORKING`").
    #[instrument(skip(self, reason))]
    pub async fn approve_approval(&self, id: &str, reason: Option<String>) -> Result<ApprovalRequest, ApiError> {
        self.resolve_approval(id, true, reason).await
    }

    /// `RejectApproval(id, reason)`: resumes with a standardized denial tool
    /// result and continues the loop (spec §4.6 "On reject: Agent receives a
    /// standardized denial tool result and continues the loop").
    #[instrument(skip(self, reason))]
    pub async fn reject_approval(&self, id: &str, reason: Option<String>) -> Result<ApprovalRequest, ApiError> {
        self.resolve_approval(id, false, reason).await
    }

    async fn resolve_approval(&self, id: &str, approved: bool, reason: Option<String>) -> Result<ApprovalRequest, ApiError> {
        let approval = self.approvals.decide(id, approved, reason).await?;
        let Some(suspension) = self.suspensions.take(id).await else {
            return Ok(approval);
        };

        let task_id = approval.task_id.clone();
        self.tasks.transition(&task_id, TaskState::Working).await?;
        self.stream_hub
            .publish(&task_id, StreamResponse::StatusUpdate { task_id: task_id.clone(), state: TaskState::Working })
            .await;

        let resolution = if approved { ApprovalResolution::Approved } else { ApprovalResolution::Rejected };
        let agent = self.agent.clone();
        let this = self.clone_refs();
        tokio::spawn(async move {
            match agent.resume(suspension, resolution).await {
                Ok(outcome) => this.settle(&task_id, outcome).await,
                Err(err) => this.fail(&task_id, &err.to_string()).await,
            }
        });

        Ok(approval)
    }

    async fn run_task(&self, task: Task, text: &str, streaming: bool) -> Result<Task, ApiError> {
        self.tasks.transition(&task.id, TaskState::Working).await?;
        self.tasks.append_history(&task.id, A2aMessage::user_text(text)).await?;
        self.stream_hub
            .publish(&task.id, StreamResponse::StatusUpdate { task_id: task.id.clone(), state: TaskState::Working })
            .await;

        let mut events = self.agent.events().subscribe();
        let task_id = task.id.clone();
        let hub = self.stream_hub.clone();
        let forwarder = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let terminal = matches!(event, AgentEvent::TaskCompleted { .. } | AgentEvent::Error { .. });
                        if let Some(frame) = StreamResponse::from_agent_event(&task_id, &event, streaming) {
                            hub.publish(&task_id, frame).await;
                        }
                        if terminal {
                            return;
                        }
                    }
                    Err(_) => return,
                }
            }
        });

        let outcome = if streaming {
            self.agent.run_stream_with_id(None, text, Some(&task.id)).await
        } else {
            self.agent.run_with_id(None, text, Some(&task.id)).await
        };
        forwarder.abort();

        match outcome {
            Ok(outcome) => {
                self.settle(&task.id, outcome).await;
            }
            Err(err) => {
                self.fail(&task.id, &err.to_string()).await;
            }
        }
        self.get_task(&task.id).await
    }

    async fn settle(&self, task_id: &str, outcome: AgentOutcome) {
        match outcome {
            AgentOutcome::Completed(content) => {
                if let Ok(()) = self.tasks.append_history(task_id, A2aMessage::agent_text(&content)).await {
                    if let Ok(task) = self.tasks.transition(task_id, TaskState::Completed).await {
                        info!(task_id, "task completed");
                        self.stream_hub
                            .publish(task_id, StreamResponse::StatusUpdate { task_id: task_id.to_string(), state: task.state })
                            .await;
                    }
                }
            }
            AgentOutcome::Suspended(suspension) => {
                let approval_id = suspension.approval_id.clone();
                self.suspensions.put(approval_id, suspension).await;
                if let Some(task) = self.tasks.get(task_id).await {
                    self.stream_hub
                        .publish(task_id, StreamResponse::StatusUpdate { task_id: task_id.to_string(), state: task.state })
                        .await;
                }
            }
        }
    }

    async fn fail(&self, task_id: &str, message: &str) {
        warn!(task_id, error = message, "agent run failed");
        if let Ok(task) = self.tasks.transition(task_id, TaskState::Failed).await {
            self.stream_hub
                .publish(task_id, StreamResponse::StatusUpdate { task_id: task_id.to_string(), state: task.state })
                .await;
        }
        self.stream_hub.publish(task_id, StreamResponse::Error { task_id: task_id.to_string(), message: message.to_string() }).await;
    }

    fn clone_refs(&self) -> Self {
        Self {
            agent: self.agent.clone(),
            tasks: self.tasks.clone(),
            approvals: self.approvals.clone(),
            suspensions: self.suspensions.clone(),
            stream_hub: self.stream_hub.clone(),
            agent_card: self.agent_card.clone(),
        }
    }
}
