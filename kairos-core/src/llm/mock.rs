//! `MockProvider`: a scriptable `LLMProvider` for tests, grounded in the
//! teacher's `MockLlm`/`StubLlm` — fixed or sequenced responses with no
//! network access.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ChatRequest, ChatResponse, LLMProvider, Usage};
use crate::error::{AgentError, ErrorKind, Result};
use crate::message::ToolCall;

/// One scripted round of a `MockProvider` conversation.
#[derive(Clone, Debug)]
pub struct ScriptedTurn {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
}

impl ScriptedTurn {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            usage: Usage {
                prompt: 1,
                completion: 1,
                total: 2,
            },
        }
    }

    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            tool_calls: vec![ToolCall::new(id, name, arguments)],
            usage: Usage {
                prompt: 1,
                completion: 1,
                total: 2,
            },
        }
    }
}

/// Replays a fixed script of `ScriptedTurn`s, one per `chat` call, and
/// records every request it received (for assertions like "captured
/// requests: 2" in spec §8 scenario S2).
pub struct MockProvider {
    script: Vec<ScriptedTurn>,
    cursor: AtomicUsize,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockProvider {
    pub fn new(script: Vec<ScriptedTurn>) -> Self {
        Self {
            script,
            cursor: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("mock provider lock poisoned").clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("mock provider lock poisoned").len()
    }
}

#[async_trait]
impl LLMProvider for MockProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        self.requests
            .lock()
            .expect("mock provider lock poisoned")
            .push(request);
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        let turn = self.script.get(index).ok_or_else(|| {
            AgentError::new(
                ErrorKind::Internal,
                format!("MockProvider script exhausted at turn {index}"),
            )
        })?;
        Ok(ChatResponse {
            content: turn.content.clone(),
            tool_calls: turn.tool_calls.clone(),
            usage: turn.usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[tokio::test]
    async fn replays_scripted_turns_in_order() {
        let provider = MockProvider::new(vec![
            ScriptedTurn::tool_call("1", "echo", "{\"x\":\"hi\"}"),
            ScriptedTurn::text("done"),
        ]);
        let r1 = provider
            .chat(ChatRequest::new("m", vec![Message::user("hi")]))
            .await
            .unwrap();
        assert!(r1.has_tool_calls());
        let r2 = provider
            .chat(ChatRequest::new("m", vec![Message::user("hi")]))
            .await
            .unwrap();
        assert_eq!(r2.content, "done");
        assert_eq!(provider.request_count(), 2);
    }

    #[tokio::test]
    async fn exhausted_script_returns_internal_error() {
        let provider = MockProvider::new(vec![ScriptedTurn::text("only one")]);
        provider.chat(ChatRequest::new("m", vec![])).await.unwrap();
        let err = provider.chat(ChatRequest::new("m", vec![])).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Internal);
    }
}
