//! Integration test: the Runtime's Approval sweeper (spec §4.7) driving
//! `kairos-a2a`'s `StoreApprovalExpirer`, end to end.

use std::sync::Arc;
use std::time::Duration;

use kairos_a2a::approval::{ApprovalStatus, ApprovalStore, InMemoryApprovalStore, StoreApprovalExpirer};
use kairos_core::agent::PendingApprovalRequest;
use kairos_core::runtime::{Runtime, SweeperConfig};

fn pending_request(session_id: &str) -> PendingApprovalRequest {
    PendingApprovalRequest {
        run_id: "run-1".to_string(),
        session_id: Some(session_id.to_string()),
        tool_name: "shell_exec".to_string(),
        call_id: "call-1".to_string(),
        arguments: "{}".to_string(),
        rule_id: None,
        reason: None,
    }
}

#[tokio::test]
async fn sweeper_expires_stale_approvals_registered_through_the_a2a_store() {
    let store: Arc<dyn ApprovalStore> = Arc::new(InMemoryApprovalStore::new());
    let expired_one = store.create("task-1", "ctx-1", pending_request("task-1"), Some(chrono::Duration::milliseconds(-5))).await;
    let fresh_one = store.create("task-2", "ctx-1", pending_request("task-2"), None).await;

    let runtime = Runtime::new(SweeperConfig {
        interval: Duration::from_millis(20),
        sweep_timeout: Duration::from_millis(200),
    });
    runtime.register_expirer(Arc::new(StoreApprovalExpirer::new(store.clone()))).await;
    runtime.start().await;
    tokio::time::sleep(Duration::from_millis(80)).await;
    runtime.stop().await;

    let expired = store.get(&expired_one.id).await.unwrap();
    assert_eq!(expired.status, ApprovalStatus::Expired);

    let still_pending = store.get(&fresh_one.id).await.unwrap();
    assert_eq!(still_pending.status, ApprovalStatus::Pending);
}
