//! Per-task streaming fan-out (spec §4.6 "Streaming semantics"): every
//! `SubscribeToTask` stream for a given task receives the same ordered
//! sequence of `StreamResponse` frames; a slow subscriber is dropped with a
//! terminal error frame rather than blocking the producer.
//!
//! Grounded in the teacher's `stream-event::ProtocolEvent` tagged-frame
//! shape, but fanned out with `tokio::sync::broadcast` rather than the
//! teacher's per-connection `mpsc` — a `broadcast::Receiver` naturally turns
//! a full channel into `RecvError::Lagged` for exactly the subscriber that
//! fell behind, which is the at-most-once, drop-the-slow-one semantics spec
//! §4.6 asks for without hand-rolling a drop counter per subscriber.

use std::collections::HashMap;

use kairos_core::event::AgentEvent;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use crate::task::TaskState;

/// One frame of a `SendStreamingMessage`/`SubscribeToTask` stream.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamResponse {
    ContentDelta { task_id: String, delta: String },
    StatusUpdate { task_id: String, state: TaskState },
    Artifact { task_id: String, artifact: serde_json::Value },
    Error { task_id: String, message: String },
}

impl StreamResponse {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamResponse::StatusUpdate { state, .. }
                if state.is_terminal()
        ) || matches!(self, StreamResponse::Error { .. })
    }

    /// Maps one `AgentEvent` to a `StreamResponse` frame. When `streaming` is
    /// true the run already emitted `ContentDelta` events chunk by chunk
    /// (spec §4.5 "Streaming variant"), so the final `TaskCompleted`'s
    /// content is dropped rather than re-sent whole; when false (a plain
    /// `run`), `TaskCompleted` is the only source of content and is forwarded
    /// as one `ContentDelta` frame.
    pub fn from_agent_event(task_id: &str, event: &AgentEvent, streaming: bool) -> Option<Self> {
        match event {
            AgentEvent::ContentDelta { delta, .. } => {
                Some(StreamResponse::ContentDelta { task_id: task_id.to_string(), delta: delta.clone() })
            }
            AgentEvent::TaskCompleted { content, .. } if !streaming => {
                Some(StreamResponse::ContentDelta { task_id: task_id.to_string(), delta: content.clone() })
            }
            AgentEvent::Error { message, .. } => Some(StreamResponse::Error { task_id: task_id.to_string(), message: message.clone() }),
            AgentEvent::ToolDone { tool, output, .. } => Some(StreamResponse::Artifact {
                task_id: task_id.to_string(),
                artifact: serde_json::json!({ "tool": tool, "output": output }),
            }),
            _ => None,
        }
    }
}

struct TaskChannel {
    sender: broadcast::Sender<StreamResponse>,
    history: Vec<StreamResponse>,
}

/// Owns one `broadcast::Sender<StreamResponse>` per task. Subscribers
/// replay the retained history before receiving live frames (spec §4.6
/// "reconnection must use `SubscribeToTask` from the beginning of whatever
/// the store retains").
#[derive(Default)]
pub struct TaskStreamHub {
    channels: Mutex<HashMap<String, TaskChannel>>,
}

const CHANNEL_CAPACITY: usize = 256;

impl TaskStreamHub {
    pub fn new() -> Self {
        Self::default()
    }

    async fn channel_sender(&self, task_id: &str) -> broadcast::Sender<StreamResponse> {
        let mut channels = self.channels.lock().await;
        channels
            .entry(task_id.to_string())
            .or_insert_with(|| TaskChannel { sender: broadcast::channel(CHANNEL_CAPACITY).0, history: Vec::new() })
            .sender
            .clone()
    }

    /// Publishes `frame`, retaining it in the task's replay history and
    /// best-effort broadcasting it to any live subscribers.
    pub async fn publish(&self, task_id: &str, frame: StreamResponse) {
        let mut channels = self.channels.lock().await;
        let entry = channels
            .entry(task_id.to_string())
            .or_insert_with(|| TaskChannel { sender: broadcast::channel(CHANNEL_CAPACITY).0, history: Vec::new() });
        entry.history.push(frame.clone());
        let _ = entry.sender.send(frame);
    }

    /// Subscribes to `task_id`: yields every retained frame first, then live
    /// frames as they're published. A subscriber that falls behind the live
    /// feed receives one terminal `Error` frame and the stream ends.
    pub async fn subscribe(&self, task_id: &str) -> impl Stream<Item = StreamResponse> {
        let (history, receiver) = {
            let mut channels = self.channels.lock().await;
            let entry = channels
                .entry(task_id.to_string())
                .or_insert_with(|| TaskChannel { sender: broadcast::channel(CHANNEL_CAPACITY).0, history: Vec::new() });
            (entry.history.clone(), entry.sender.subscribe())
        };

        let task_id = task_id.to_string();
        let live = BroadcastStream::new(receiver).map(move |item| match item {
            Ok(frame) => frame,
            Err(BroadcastStreamRecvError::Lagged(_)) => {
                StreamResponse::Error { task_id: task_id.clone(), message: "subscriber lagged; frames dropped".to_string() }
            }
        });

        tokio_stream::iter(history).chain(live)
    }

    pub async fn clear(&self, task_id: &str) {
        self.channels.lock().await.remove(task_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_stream::StreamExt as _;

    #[tokio::test]
    async fn subscriber_replays_history_then_receives_live_frames() {
        let hub = Arc::new(TaskStreamHub::new());
        hub.publish("t1", StreamResponse::ContentDelta { task_id: "t1".to_string(), delta: "hel".to_string() }).await;

        let mut stream = Box::pin(hub.subscribe("t1").await);
        let first = stream.next().await.unwrap();
        assert!(matches!(first, StreamResponse::ContentDelta { delta, .. } if delta == "hel"));

        hub.publish("t1", StreamResponse::ContentDelta { task_id: "t1".to_string(), delta: "lo".to_string() }).await;
        let second = stream.next().await.unwrap();
        assert!(matches!(second, StreamResponse::ContentDelta { delta, .. } if delta == "lo"));
    }

    #[tokio::test]
    async fn terminal_status_update_is_detected() {
        let frame = StreamResponse::StatusUpdate { task_id: "t1".to_string(), state: TaskState::Completed };
        assert!(frame.is_terminal());
        let frame = StreamResponse::StatusUpdate { task_id: "t1".to_string(), state: TaskState::Working };
        assert!(!frame.is_terminal());
    }
}
