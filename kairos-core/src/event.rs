//! Agent Loop event fan-out (spec §4.5 "Events"), grounded in the teacher's
//! `stream-event` crate (`ProtocolEvent`, a tagged `type + payload` enum) and
//! `StreamWriter` delivery model, adapted from "write node-state deltas to a
//! CLI" to "best-effort, non-blocking broadcast of `AgentEvent` to any
//! subscriber" — both a direct caller of `Agent::run` and the A2A streaming
//! layer (§4.6) subscribe to the same channel.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

/// One event emitted during an agent run. Tagged the same way the teacher's
/// `ProtocolEvent` is (`#[serde(tag = "type")]`), so a subscriber that only
/// cares about wire shape can serialize this directly into an SSE frame.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Thinking { run_id: String },
    ContentDelta { run_id: String, delta: String },
    TaskStarted { run_id: String, task_id: Option<String> },
    ToolStarted { run_id: String, tool: String, call_id: String },
    ToolDone { run_id: String, tool: String, call_id: String, output: String },
    ToolDenied { run_id: String, tool: String, call_id: String, reason: String },
    Error { run_id: String, stage: String, message: String },
    TaskCompleted { run_id: String, content: String },
    Delegation { run_id: String, target_agent: String, payload: Value },
}

impl AgentEvent {
    pub fn run_id(&self) -> &str {
        match self {
            AgentEvent::Thinking { run_id }
            | AgentEvent::ContentDelta { run_id, .. }
            | AgentEvent::TaskStarted { run_id, .. }
            | AgentEvent::ToolStarted { run_id, .. }
            | AgentEvent::ToolDone { run_id, .. }
            | AgentEvent::ToolDenied { run_id, .. }
            | AgentEvent::Error { run_id, .. }
            | AgentEvent::TaskCompleted { run_id, .. }
            | AgentEvent::Delegation { run_id, .. } => run_id,
        }
    }
}

/// Fan-out publisher for `AgentEvent`s. Delivery is best-effort and
/// non-blocking (spec §4.5): `emit` never awaits a slow subscriber and never
/// fails the caller's turn if nobody is listening.
#[derive(Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<AgentEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.sender.subscribe()
    }

    /// Publishes `event`. A `SendError` (no receivers) is swallowed: event
    /// delivery is best-effort, not a precondition for the Agent Loop to
    /// proceed.
    pub fn emit(&self, event: AgentEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_with_no_subscribers_does_not_panic_or_block() {
        let emitter = EventEmitter::default();
        emitter.emit(AgentEvent::Thinking { run_id: "r1".into() });
    }

    #[tokio::test]
    async fn subscriber_receives_emitted_events_in_order() {
        let emitter = EventEmitter::default();
        let mut rx = emitter.subscribe();
        emitter.emit(AgentEvent::TaskStarted { run_id: "r1".into(), task_id: None });
        emitter.emit(AgentEvent::TaskCompleted { run_id: "r1".into(), content: "done".into() });

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, AgentEvent::TaskStarted { .. }));
        let second = rx.recv().await.unwrap();
        assert!(matches!(second, AgentEvent::TaskCompleted { .. }));
    }

    #[test]
    fn serializes_with_tagged_type_field() {
        let event = AgentEvent::ToolDenied {
            run_id: "r1".into(),
            tool: "delete_file".into(),
            call_id: "c1".into(),
            reason: "policy denied".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tool_denied");
        assert_eq!(json["tool"], "delete_file");
    }
}
