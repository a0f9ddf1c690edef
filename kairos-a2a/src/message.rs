//! A2A wire message: `Part` (text/data/file) and a role-tagged `Message`
//! that converts to/from `kairos_core::message::Message`, since the Agent
//! Loop only understands its own plain-content message type (spec §3 "Task
//! ... history: [Message], artifacts?: [Part]").

use kairos_core::message::{Message as CoreMessage, Role as CoreRole};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Part {
    Text { text: String },
    Data { data: serde_json::Value },
    File { name: String, mime_type: String, uri: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Agent,
}

/// The wire shape `SendMessage`/`Task.history` entries use. Only text parts
/// round-trip through the Agent Loop; non-text parts are carried for
/// external consumers but ignored when building a `kairos_core::Message`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct A2aMessage {
    pub role: MessageRole,
    pub parts: Vec<Part>,
}

impl A2aMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self { role: MessageRole::User, parts: vec![Part::Text { text: text.into() }] }
    }

    pub fn agent_text(text: impl Into<String>) -> Self {
        Self { role: MessageRole::Agent, parts: vec![Part::Text { text: text.into() }] }
    }

    /// Concatenates every `Text` part, in order. Non-text parts contribute
    /// nothing — the Agent Loop's `ChatRequest` only carries plain content.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl From<&CoreMessage> for A2aMessage {
    fn from(message: &CoreMessage) -> Self {
        let role = match message.role {
            CoreRole::Assistant | CoreRole::Tool | CoreRole::System => MessageRole::Agent,
            CoreRole::User => MessageRole::User,
        };
        Self { role, parts: vec![Part::Text { text: message.content.clone() }] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_joins_only_text_parts() {
        let message = A2aMessage {
            role: MessageRole::User,
            parts: vec![
                Part::Text { text: "hello".to_string() },
                Part::Data { data: serde_json::json!({"a": 1}) },
                Part::Text { text: "world".to_string() },
            ],
        };
        assert_eq!(message.text(), "hello\nworld");
    }

    #[test]
    fn core_assistant_message_converts_to_agent_role() {
        let core = CoreMessage::assistant("hi");
        let converted = A2aMessage::from(&core);
        assert_eq!(converted.role, MessageRole::Agent);
        assert_eq!(converted.text(), "hi");
    }
}
