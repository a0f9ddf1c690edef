//! The Agent Loop's three private stages (spec §4.5), mirroring the
//! teacher's `ThinkNode`/`ActNode`/`ObserveNode` decomposition but scoped to
//! the fixed reason-act-observe shape spec §9 requires ("the planner is
//! explicit-graph only" — this is not a user-configurable graph engine, so
//! these are plain functions rather than a public `Node` trait).

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, warn};

use crate::error::Result;
use crate::event::{AgentEvent, EventEmitter};
use crate::governance::{Effect, PolicyEngine};
use crate::llm::{aggregate_tool_call_deltas, ChatRequest, ChatResponse, LLMProvider, Usage};
use crate::message::{Message, ToolCall, ToolDefinition};
use crate::tool_source::{Broker, ToolContext};

use super::approval::denial_message;

/// **Think**: call the provider with the running message list and the
/// filtered tool set, recording usage.
pub(super) async fn think(
    provider: &Arc<dyn LLMProvider>,
    model: &str,
    messages: Vec<Message>,
    tools: Vec<ToolDefinition>,
    temperature: Option<f32>,
) -> Result<ChatResponse> {
    let mut request = ChatRequest::new(model, messages).with_tools(tools);
    if let Some(t) = temperature {
        request = request.with_temperature(t);
    }
    provider.chat(request).await
}

/// **Think**, streaming variant (spec §4.5 "Streaming variant"): drains the
/// provider's `chat_stream`, emitting an `AgentEvent::ContentDelta` per
/// content chunk so a subscriber sees tokens as they arrive, while
/// assembling the same `ChatResponse` `think` would have returned in one
/// shot. The concatenation of every emitted delta equals `response.content`.
pub(super) async fn think_stream(
    provider: &Arc<dyn LLMProvider>,
    model: &str,
    messages: Vec<Message>,
    tools: Vec<ToolDefinition>,
    temperature: Option<f32>,
    events: &EventEmitter,
    run_id: &str,
) -> Result<ChatResponse> {
    let mut request = ChatRequest::new(model, messages).with_tools(tools);
    if let Some(t) = temperature {
        request = request.with_temperature(t);
    }

    let mut stream = provider.chat_stream(request).await?;
    let mut content = String::new();
    let mut deltas = Vec::new();
    let mut usage = Usage::default();

    while let Some(chunk) = stream.next().await {
        if let Some(err) = chunk.error {
            return Err(crate::error::AgentError::new(crate::error::ErrorKind::TransportError, err));
        }
        if let Some(delta) = chunk.content_delta {
            if !delta.is_empty() {
                events.emit(AgentEvent::ContentDelta { run_id: run_id.to_string(), delta: delta.clone() });
                content.push_str(&delta);
            }
        }
        deltas.extend(chunk.tool_calls_delta);
        if let Some(final_usage) = chunk.usage_final {
            usage = final_usage;
        }
        if chunk.done {
            break;
        }
    }

    Ok(ChatResponse {
        content,
        tool_calls: aggregate_tool_call_deltas(&deltas),
        usage,
    })
}

/// Outcome of evaluating and (maybe) dispatching one tool call during
/// **Act**.
pub(super) enum ActOutcome {
    /// Dispatched (successfully or not); the `tool` message is ready to
    /// append.
    Done(Message),
    /// Policy requires human approval before this call may run; the loop
    /// must suspend here.
    Pending { rule_id: Option<String>, reason: Option<String> },
}

/// **Act**: evaluate policy for one tool call and, if allowed, dispatch it
/// through the Broker.
pub(super) async fn act_one_call(
    broker: &Arc<Broker>,
    policy: &PolicyEngine,
    events: &EventEmitter,
    run_id: &str,
    ctx: &ToolContext,
    call: &ToolCall,
) -> ActOutcome {
    let decision = policy.evaluate_tool(&call.name);
    match decision.status {
        Effect::Deny => {
            let reason = decision
                .reason
                .unwrap_or_else(|| format!("tool '{}' denied by policy", call.name));
            events.emit(AgentEvent::ToolDenied {
                run_id: run_id.to_string(),
                tool: call.name.clone(),
                call_id: call.id.clone(),
                reason: reason.clone(),
            });
            ActOutcome::Done(denial_message(&call.id, &reason))
        }
        Effect::Pending => ActOutcome::Pending {
            rule_id: decision.rule_id,
            reason: decision.reason,
        },
        Effect::Allow => {
            events.emit(AgentEvent::ToolStarted {
                run_id: run_id.to_string(),
                tool: call.name.clone(),
                call_id: call.id.clone(),
            });
            let message = dispatch(broker, ctx, call).await;
            match &message {
                Ok(output) => {
                    events.emit(AgentEvent::ToolDone {
                        run_id: run_id.to_string(),
                        tool: call.name.clone(),
                        call_id: call.id.clone(),
                        output: output.clone(),
                    });
                    ActOutcome::Done(Message::tool(call.id.clone(), output.clone()))
                }
                Err(err) => {
                    warn!(tool = %call.name, error = %err, "tool invocation failed");
                    ActOutcome::Done(Message::tool(
                        call.id.clone(),
                        serde_json::json!({ "error": err.kind.to_string(), "message": err.message }).to_string(),
                    ))
                }
            }
        }
    }
}

async fn dispatch(broker: &Arc<Broker>, ctx: &ToolContext, call: &ToolCall) -> Result<String> {
    broker.invoke(ctx, &call.name, &call.arguments).await
}

/// **Observe**: fold the assistant message and its tool results into the
/// running message list.
pub(super) fn observe(messages: &mut Vec<Message>, assistant: Message, tool_messages: Vec<Message>) {
    debug!(tool_results = tool_messages.len(), "observed tool results for turn");
    messages.push(assistant);
    messages.extend(tool_messages);
}
