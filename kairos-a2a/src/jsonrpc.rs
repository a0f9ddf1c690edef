//! JSON-RPC A2A binding (spec §6): single `POST /` endpoint dispatching to
//! the same `TaskServiceHandler` the HTTP+JSON binding uses. Streaming
//! methods frame each full JSON-RPC response as one SSE `data:` event.

use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::handler::TaskServiceHandler;
use crate::task::TaskState;

pub fn router(handler: Arc<TaskServiceHandler>) -> Router {
    Router::new().route("/", post(dispatch)).with_state(handler)
}

#[derive(Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Serialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Serialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self { jsonrpc: "2.0", id, result: Some(result), error: None }
    }

    fn err(id: Value, error: &ApiError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError { code: error.json_rpc_code(), message: error.message() }),
        }
    }
}

/// Methods mirror the handler set (spec §6): `SendMessage`,
/// `SendStreamingMessage`, `GetTask`, `ListTasks`, `CancelTask`,
/// `SubscribeToTask`, `GetExtendedAgentCard`, `GetApproval`, `ListApprovals`,
/// `ApproveApproval`, `RejectApproval`.
async fn dispatch(State(handler): State<Arc<TaskServiceHandler>>, Json(request): Json<JsonRpcRequest>) -> Response {
    match request.method.as_str() {
        "SendMessage" | "GetTask" | "ListTasks" | "CancelTask" | "GetExtendedAgentCard" | "GetApproval" | "ListApprovals"
        | "ApproveApproval" | "RejectApproval" => unary(&handler, request).await,
        "SendStreamingMessage" => streaming_send(&handler, request).await,
        "SubscribeToTask" => streaming_subscribe(&handler, request).await,
        _ => Json(JsonRpcResponse::err(request.id, &ApiError::Unimplemented(request.method.clone()))).into_response(),
    }
}

async fn unary(handler: &TaskServiceHandler, request: JsonRpcRequest) -> Response {
    let id = request.id.clone();
    let result = run_unary(handler, &request.method, request.params).await;
    match result {
        Ok(value) => Json(JsonRpcResponse::ok(id, value)).into_response(),
        Err(err) => Json(JsonRpcResponse::err(id, &err)).into_response(),
    }
}

async fn run_unary(handler: &TaskServiceHandler, method: &str, params: Value) -> Result<Value, ApiError> {
    match method {
        "SendMessage" => {
            let context_id = params["context_id"].as_str().unwrap_or_default();
            let text = params["text"].as_str().unwrap_or_default();
            let task = handler.send_message(context_id, text).await?;
            Ok(serde_json::to_value(task).unwrap_or(Value::Null))
        }
        "GetTask" => {
            let task_id = params["task_id"].as_str().unwrap_or_default();
            let task = handler.get_task(task_id).await?;
            Ok(serde_json::to_value(task).unwrap_or(Value::Null))
        }
        "ListTasks" => {
            let context_id = params["context_id"].as_str();
            let state: Option<TaskState> = serde_json::from_value(params["state"].clone()).ok();
            let tasks = handler.list_tasks(context_id, state).await;
            Ok(serde_json::to_value(tasks).unwrap_or(Value::Null))
        }
        "CancelTask" => {
            let task_id = params["task_id"].as_str().unwrap_or_default();
            let task = handler.cancel_task(task_id).await?;
            Ok(serde_json::to_value(task).unwrap_or(Value::Null))
        }
        "GetExtendedAgentCard" => Ok(serde_json::to_value(handler.get_extended_agent_card()).unwrap_or(Value::Null)),
        "GetApproval" => {
            let id = params["id"].as_str().unwrap_or_default();
            let approval = handler.get_approval(id).await?;
            Ok(serde_json::to_value(approval).unwrap_or(Value::Null))
        }
        "ListApprovals" => {
            let task_id = params["task_id"].as_str();
            let status = serde_json::from_value(params["status"].clone()).ok();
            let approvals = handler.list_approvals(task_id, status).await;
            Ok(serde_json::to_value(approvals).unwrap_or(Value::Null))
        }
        "ApproveApproval" => {
            let id = params["id"].as_str().unwrap_or_default();
            let reason = params["reason"].as_str().map(str::to_string);
            let approval = handler.approve_approval(id, reason).await?;
            Ok(serde_json::to_value(approval).unwrap_or(Value::Null))
        }
        "RejectApproval" => {
            let id = params["id"].as_str().unwrap_or_default();
            let reason = params["reason"].as_str().map(str::to_string);
            let approval = handler.reject_approval(id, reason).await?;
            Ok(serde_json::to_value(approval).unwrap_or(Value::Null))
        }
        other => Err(ApiError::Unimplemented(other.to_string())),
    }
}

async fn streaming_send(handler: &TaskServiceHandler, request: JsonRpcRequest) -> Response {
    let id = request.id.clone();
    let context_id = request.params["context_id"].as_str().unwrap_or_default().to_string();
    let text = request.params["text"].as_str().unwrap_or_default().to_string();
    match handler.send_streaming_message(&context_id, &text).await {
        Ok((_task, stream)) => to_sse_responses(id, stream),
        Err(err) => Json(JsonRpcResponse::err(id, &err)).into_response(),
    }
}

async fn streaming_subscribe(handler: &TaskServiceHandler, request: JsonRpcRequest) -> Response {
    let id = request.id.clone();
    let task_id = request.params["task_id"].as_str().unwrap_or_default();
    match handler.subscribe_to_task(task_id).await {
        Ok(stream) => to_sse_responses(id, stream),
        Err(err) => Json(JsonRpcResponse::err(id, &err)).into_response(),
    }
}

/// Frames every `StreamResponse` as a full JSON-RPC response in its own SSE
/// `data:` event (spec §6 "Streaming methods use SSE with `data: <full
/// JSON-RPC response>`").
fn to_sse_responses(id: Value, stream: impl futures_util::Stream<Item = crate::stream::StreamResponse> + Send + 'static) -> Response {
    let events = stream.map(move |frame| {
        let value = serde_json::to_value(&frame).unwrap_or(Value::Null);
        let response = JsonRpcResponse::ok(id.clone(), value);
        let json = serde_json::to_string(&response).unwrap_or_else(|_| "{}".to_string());
        Ok::<Event, std::convert::Infallible>(Event::default().data(json))
    });
    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}
