//! Integration test: the HTTP+JSON A2A binding end to end, via
//! `tower::ServiceExt::oneshot` rather than a bound TCP listener.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use kairos_a2a::{AgentCard, InMemoryApprovalStore, InMemoryTaskStore, SuspensionRegistry, TaskApprovalSink, TaskServiceHandler, TaskStreamHub};
use kairos_core::agent::Agent;
use kairos_core::llm::{LLMProvider, MockProvider, ScriptedTurn};
use kairos_core::tool_source::Broker;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn build_app() -> axum::Router {
    let tasks: Arc<dyn kairos_a2a::TaskStore> = Arc::new(InMemoryTaskStore::new());
    let approvals: Arc<dyn kairos_a2a::ApprovalStore> = Arc::new(InMemoryApprovalStore::new());
    let sink = Arc::new(TaskApprovalSink::new(approvals.clone(), tasks.clone(), None));
    let provider: Arc<dyn LLMProvider> = Arc::new(MockProvider::new(vec![ScriptedTurn::text("hello from kairos")]));
    let agent = Arc::new(
        Agent::builder("a1", "you are helpful", "gpt-test")
            .provider(provider)
            .broker(Arc::new(Broker::builder().build()))
            .approval_sink(sink)
            .build()
            .unwrap(),
    );
    let handler = Arc::new(TaskServiceHandler::new(
        agent,
        tasks,
        approvals,
        Arc::new(SuspensionRegistry::new()),
        Arc::new(TaskStreamHub::new()),
        AgentCard::new("kairos-test", "integration test agent", "http://localhost:8088"),
    ));
    kairos_a2a::http::router(handler)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn get_agent_card_serves_the_well_known_path() {
    let app = build_app().await;
    let request = Request::builder().uri("/.well-known/agent-card.json").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["name"], "kairos-test");
}

#[tokio::test]
async fn send_message_returns_a_completed_task() {
    let app = build_app().await;
    let request = Request::builder()
        .method("POST")
        .uri("/message:send")
        .header("content-type", "application/json")
        .body(Body::from(json!({"context_id": "ctx-1", "text": "hi"}).to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["state"], "completed");
}

#[tokio::test]
async fn get_task_for_an_unknown_id_returns_404() {
    let app = build_app().await;
    let request = Request::builder()
        .method("POST")
        .uri("/tasks:get")
        .header("content-type", "application/json")
        .body(Body::from(json!({"task_id": "does-not-exist"}).to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
