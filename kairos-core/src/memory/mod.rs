//! Conversation memory (spec §4.4): per-session message history with a
//! pluggable truncation strategy, plus the contract-only `VectorStore`/
//! `Embedder` surface for cross-thread semantic memory.
//!
//! Grounded in the teacher's `memory::Store`/`Checkpointer` (namespaced,
//! per-thread persistence) for the shape of a session-keyed store; the
//! `TruncationStrategy` itself is new (the teacher instead compresses
//! history via an LLM-driven summarization graph, `compress::
//! CompactionConfig`) — generalized here to the three pure strategies spec
//! §4.4 names, with `summarize` delegating to an injected closure so the
//! teacher's LLM-driven idea stays pluggable without being required.

pub mod ndjson;
pub mod vector;

pub use ndjson::NdjsonConversationStore;
pub use vector::{Embedder, InMemoryVectorStore, VectorStore};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::{AgentError, Result};
use crate::message::Message;

/// How a `ConversationMemory` trims a session's history before it is sent to
/// the LLM (spec §4.4).
pub enum TruncationStrategy {
    /// Keep at most the last `n` messages (plus any leading system message).
    Window { keep_last: usize },
    /// Keep the most recent messages whose rough token cost fits `max_tokens`
    /// (estimated as `content.len() / 4`, matching typical BPE ratios).
    TokenBudget { max_tokens: usize },
    /// Replace everything before the last `keep_last` messages with one
    /// system message produced by `summarize`.
    Summarize {
        keep_last: usize,
        summarize: Arc<dyn Fn(&[Message]) -> String + Send + Sync>,
    },
}

impl TruncationStrategy {
    pub fn window(keep_last: usize) -> Self {
        Self::Window { keep_last }
    }

    pub fn token_budget(max_tokens: usize) -> Self {
        Self::TokenBudget { max_tokens }
    }

    pub fn summarize(keep_last: usize, summarize: impl Fn(&[Message]) -> String + Send + Sync + 'static) -> Self {
        Self::Summarize {
            keep_last,
            summarize: Arc::new(summarize),
        }
    }

    fn apply(&self, messages: &[Message]) -> Vec<Message> {
        match self {
            TruncationStrategy::Window { keep_last } => keep_last_n(messages, *keep_last),
            TruncationStrategy::TokenBudget { max_tokens } => {
                let mut kept: Vec<Message> = Vec::new();
                let mut budget = *max_tokens;
                for message in messages.iter().rev() {
                    let cost = estimate_tokens(message);
                    if cost > budget && !kept.is_empty() {
                        break;
                    }
                    budget = budget.saturating_sub(cost);
                    kept.push(message.clone());
                }
                kept.reverse();
                kept
            }
            TruncationStrategy::Summarize { keep_last, summarize } => {
                if messages.len() <= *keep_last {
                    return messages.to_vec();
                }
                let (head, tail) = messages.split_at(messages.len() - keep_last);
                let mut out = vec![Message::system(summarize(head))];
                out.extend_from_slice(tail);
                out
            }
        }
    }
}

fn estimate_tokens(message: &Message) -> usize {
    (message.content.len() / 4).max(1)
}

fn keep_last_n(messages: &[Message], n: usize) -> Vec<Message> {
    if messages.len() <= n {
        return messages.to_vec();
    }
    messages[messages.len() - n..].to_vec()
}

/// One message plus the wall-clock time it was appended, so
/// `delete_old_by_age` has something to compare against — the wire
/// `Message` type itself carries no timestamp (spec §3 `Message` is
/// transport-shaped; `created_at` only exists at the NDJSON persistence
/// boundary, spec §6).
#[derive(Clone)]
struct TimestampedMessage {
    message: Message,
    created_at: DateTime<Utc>,
}

/// One session's message history plus its own truncation policy.
struct Session {
    messages: Vec<TimestampedMessage>,
}

/// In-process, namespaced conversation store (spec §3 `ConversationSession`,
/// §4.4). Keyed by session id; each session is isolated from every other.
/// Optionally write-through to an `NdjsonConversationStore` (spec §6
/// "Persisted state layout") so history survives a process restart.
pub struct ConversationMemory {
    sessions: RwLock<HashMap<String, Session>>,
    truncation: TruncationStrategy,
    persistence: Option<Arc<NdjsonConversationStore>>,
}

impl ConversationMemory {
    pub fn new(truncation: TruncationStrategy) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            truncation,
            persistence: None,
        }
    }

    /// Enables file-backed persistence: every `append` is also written to
    /// `store`, and `hydrate` can replay a session's file back into memory.
    pub fn with_persistence(mut self, store: Arc<NdjsonConversationStore>) -> Self {
        self.persistence = Some(store);
        self
    }

    /// Loads `session_id`'s previously-persisted history from the backing
    /// `NdjsonConversationStore`, if one is configured, replacing whatever is
    /// currently in memory for that session. No-op without persistence.
    pub async fn hydrate(&self, session_id: &str) -> Result<()> {
        let Some(store) = &self.persistence else {
            return Ok(());
        };
        let messages = store.load(session_id).await?;
        let now = Utc::now();
        let messages = messages
            .into_iter()
            .map(|message| TimestampedMessage { message, created_at: now })
            .collect();
        self.sessions
            .write()
            .await
            .insert(session_id.to_string(), Session { messages });
        Ok(())
    }

    /// Appends `message` to `session_id`'s history. A `Tool` message must
    /// carry a `tool_call_id` matching a prior assistant tool call in the
    /// same session (spec §3 invariant).
    pub async fn append(&self, session_id: &str, message: Message) -> Result<()> {
        {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .entry(session_id.to_string())
                .or_insert_with(|| Session { messages: Vec::new() });

            if let Some(tool_call_id) = &message.tool_call_id {
                let known = session.messages.iter().any(|m| {
                    m.message.tool_calls.iter().any(|tc| &tc.id == tool_call_id)
                });
                if !known {
                    return Err(AgentError::invalid_input(format!(
                        "tool message references unknown tool_call_id '{tool_call_id}'"
                    )));
                }
            }

            session.messages.push(TimestampedMessage {
                message: message.clone(),
                created_at: Utc::now(),
            });
        }

        if let Some(store) = &self.persistence {
            store.append(session_id, message).await?;
        }
        Ok(())
    }

    /// Returns the session's history with the configured truncation applied.
    pub async fn history(&self, session_id: &str) -> Vec<Message> {
        let sessions = self.sessions.read().await;
        match sessions.get(session_id) {
            Some(session) => {
                let plain: Vec<Message> = session.messages.iter().map(|m| m.message.clone()).collect();
                self.truncation.apply(&plain)
            }
            None => Vec::new(),
        }
    }

    /// Returns the full, untruncated history (for persistence / export).
    pub async fn full_history(&self, session_id: &str) -> Vec<Message> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .map(|s| s.messages.iter().map(|m| m.message.clone()).collect())
            .unwrap_or_default()
    }

    /// Returns the last `n` messages, ignoring the configured truncation
    /// strategy entirely (spec §4.4 "append, get, recent-N, ...").
    pub async fn recent(&self, session_id: &str, n: usize) -> Vec<Message> {
        let sessions = self.sessions.read().await;
        match sessions.get(session_id) {
            Some(session) => {
                let start = session.messages.len().saturating_sub(n);
                session.messages[start..].iter().map(|m| m.message.clone()).collect()
            }
            None => Vec::new(),
        }
    }

    /// Drops every message in `session_id` older than `max_age`, returning
    /// how many were removed (spec §4.4 "delete-old-by-age").
    pub async fn delete_old_by_age(&self, session_id: &str, max_age: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(session_id) else {
            return 0;
        };
        let max_age = chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::zero());
        let cutoff = Utc::now() - max_age;
        let before = session.messages.len();
        session.messages.retain(|m| m.created_at >= cutoff);
        before - session.messages.len()
    }

    pub async fn len(&self, session_id: &str) -> usize {
        self.sessions.read().await.get(session_id).map(|s| s.messages.len()).unwrap_or(0)
    }

    pub async fn is_empty(&self, session_id: &str) -> bool {
        self.len(session_id).await == 0
    }

    pub async fn clear(&self, session_id: &str) {
        self.sessions.write().await.remove(session_id);
    }
}
