//! HTTP+JSON A2A binding (spec §6): per-operation `POST` endpoints plus two
//! SSE endpoints, and the well-known AgentCard handler. Grounded in the
//! teacher's axum `app::router` (state extraction + `with_state`), widened
//! from one WebSocket route to the operation set spec §4.6/§6 names.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::StreamExt;
use serde::Deserialize;

use crate::agent_card::AGENT_CARD_MEDIA_TYPE;
use crate::approval::ApprovalStatus;
use crate::error::ApiError;
use crate::handler::TaskServiceHandler;
use crate::task::TaskState;

pub fn router(handler: Arc<TaskServiceHandler>) -> Router {
    Router::new()
        .route("/.well-known/agent-card.json", get(get_agent_card))
        .route("/message:send", post(send_message))
        .route("/message:stream", post(send_streaming_message))
        .route("/tasks:get", post(get_task))
        .route("/tasks:list", post(list_tasks))
        .route("/tasks:cancel", post(cancel_task))
        .route("/tasks:subscribe", post(subscribe_to_task))
        .route("/approvals:get", post(get_approval))
        .route("/approvals:list", post(list_approvals))
        .route("/approvals:approve", post(approve_approval))
        .route("/approvals:reject", post(reject_approval))
        .with_state(handler)
}

async fn get_agent_card(State(handler): State<Arc<TaskServiceHandler>>) -> impl IntoResponse {
    let card = handler.get_extended_agent_card();
    (
        [(axum::http::header::CONTENT_TYPE, AGENT_CARD_MEDIA_TYPE)],
        Json(card),
    )
}

#[derive(Deserialize)]
struct SendMessageBody {
    context_id: String,
    text: String,
}

async fn send_message(State(handler): State<Arc<TaskServiceHandler>>, Json(body): Json<SendMessageBody>) -> Result<impl IntoResponse, ApiError> {
    let task = handler.send_message(&body.context_id, &body.text).await?;
    Ok(Json(task))
}

async fn send_streaming_message(State(handler): State<Arc<TaskServiceHandler>>, Json(body): Json<SendMessageBody>) -> Result<impl IntoResponse, ApiError> {
    let (_task, stream) = handler.send_streaming_message(&body.context_id, &body.text).await?;
    Ok(to_sse(stream))
}

#[derive(Deserialize)]
struct TaskIdBody {
    task_id: String,
}

async fn get_task(State(handler): State<Arc<TaskServiceHandler>>, Json(body): Json<TaskIdBody>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(handler.get_task(&body.task_id).await?))
}

#[derive(Deserialize, Default)]
struct ListTasksBody {
    #[serde(default)]
    context_id: Option<String>,
    #[serde(default)]
    state: Option<TaskState>,
}

async fn list_tasks(State(handler): State<Arc<TaskServiceHandler>>, Json(body): Json<ListTasksBody>) -> impl IntoResponse {
    Json(handler.list_tasks(body.context_id.as_deref(), body.state).await)
}

async fn cancel_task(State(handler): State<Arc<TaskServiceHandler>>, Json(body): Json<TaskIdBody>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(handler.cancel_task(&body.task_id).await?))
}

async fn subscribe_to_task(State(handler): State<Arc<TaskServiceHandler>>, Json(body): Json<TaskIdBody>) -> Result<impl IntoResponse, ApiError> {
    let stream = handler.subscribe_to_task(&body.task_id).await?;
    Ok(to_sse(stream))
}

#[derive(Deserialize)]
struct ApprovalIdBody {
    id: String,
}

async fn get_approval(State(handler): State<Arc<TaskServiceHandler>>, Json(body): Json<ApprovalIdBody>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(handler.get_approval(&body.id).await?))
}

#[derive(Deserialize, Default)]
struct ListApprovalsBody {
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    status: Option<ApprovalStatus>,
}

async fn list_approvals(State(handler): State<Arc<TaskServiceHandler>>, Json(body): Json<ListApprovalsBody>) -> impl IntoResponse {
    Json(handler.list_approvals(body.task_id.as_deref(), body.status).await)
}

#[derive(Deserialize)]
struct DecideApprovalBody {
    id: String,
    reason: Option<String>,
}

async fn approve_approval(State(handler): State<Arc<TaskServiceHandler>>, Json(body): Json<DecideApprovalBody>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(handler.approve_approval(&body.id, body.reason).await?))
}

async fn reject_approval(State(handler): State<Arc<TaskServiceHandler>>, Json(body): Json<DecideApprovalBody>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(handler.reject_approval(&body.id, body.reason).await?))
}

/// Frames an async stream of `StreamResponse` as `data: <JSON>\n\n` SSE
/// events with a `[DONE]` sentinel after the terminal frame (spec §6 "SSE
/// frames: `data: <JSON>\n\n` with `[DONE]` sentinel if applicable").
fn to_sse(stream: impl futures_util::Stream<Item = crate::stream::StreamResponse> + Send + 'static) -> Sse<impl futures_util::Stream<Item = Result<Event, Infallible>>> {
    let events = stream.flat_map(|frame| {
        let terminal = frame.is_terminal();
        let json = serde_json::to_string(&frame).unwrap_or_else(|_| "{}".to_string());
        let mut frames = vec![Ok(Event::default().data(json))];
        if terminal {
            frames.push(Ok(Event::default().data("[DONE]")));
        }
        futures_util::stream::iter(frames)
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}
