//! Integration test: the JSON-RPC A2A binding (spec §6), a single
//! `POST /` endpoint dispatching by `method`.

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
    let provider: Arc<dyn LLMProvider> = Arc::new(MockProvider::new(vec![ScriptedTurn::text("hello via json-rpc")]));
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
    kairos_a2a::jsonrpc::router(handler)
}

#[tokio::test]
async fn send_message_method_returns_result_with_matching_id() {
    let app = build_app().await;
    let payload = json!({
        "jsonrpc": "2.0",
        "id": 7,
        "method": "SendMessage",
        "params": {"context_id": "ctx-1", "text": "hi"},
    });
    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["id"], 7);
    assert_eq!(body["result"]["state"], "completed");
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn unknown_method_returns_a_json_rpc_error() {
    let app = build_app().await;
    let payload = json!({"jsonrpc": "2.0", "id": 1, "method": "NoSuchMethod", "params": {}});
    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["result"].is_null());
    assert_eq!(body["error"]["code"], -32601);
}
