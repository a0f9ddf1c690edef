//! Optional `Action:`/`Action Input:` fallback parser (spec §4.5
//! "Tool-argument normalization & fallback"). Disabled by default: some
//! providers occasionally emit a free-form ReAct-style block instead of a
//! structured tool call, and this converts the first such block into a
//! synthetic `ToolCall` so the loop can still dispatch it.

use uuid::Uuid;

use crate::message::ToolCall;

/// Parses the first `Action: <name>` / `Action Input: <json-or-text>` pair
/// out of `content`, if present. Returns `None` when no such block is found
/// — the caller treats the content as a normal final answer in that case.
pub fn parse_action_fallback(content: &str) -> Option<ToolCall> {
    let mut name = None;
    let mut input = None;

    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("Action:") {
            name = Some(rest.trim().to_string());
        } else if let Some(rest) = trimmed.strip_prefix("Action Input:") {
            input = Some(rest.trim().to_string());
        }
    }

    let name = name?;
    if name.is_empty() {
        return None;
    }
    let arguments = input.unwrap_or_default();
    Some(ToolCall::new(Uuid::new_v4().to_string(), name, arguments))
}
