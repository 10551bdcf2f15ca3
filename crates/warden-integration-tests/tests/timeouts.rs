//! Budgets, cancellation and process cleanup.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{GatewayHarness, HANG_BUDGET, request};
use serde_json::json;
use warden_core::{CorrelationId, ErrorCode, ExecutionStatus};
use warden_gateway::Gateway;
use warden_sandbox::ExecutionState;

async fn wait_for_state(gateway: &Gateway, id: &CorrelationId, state: ExecutionState) {
    let started = Instant::now();
    while gateway.sandbox().state(id) != Some(state) {
        assert!(started.elapsed() < Duration::from_secs(3), "{id} never reached {state}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_hanging_get_times_out_and_is_reaped() {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let harness = GatewayHarness::new();
    let started = Instant::now();
    let result = harness
        .call_with_id(
            "hang-1",
            "kubernetes_get",
            "charlie",
            json!({"resource_type": "pods"}),
        )
        .await;

    assert_eq!(result.status, ExecutionStatus::TimedOut);
    assert_eq!(result.code, Some(ErrorCode::ExecutionTimeout));
    assert!(result.exit_code.is_none());
    assert!(Duration::from_millis(result.duration_ms) >= HANG_BUDGET);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(harness.executions("hang-1"), 1);

    let pgid: i32 = std::fs::read_to_string(&harness.pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert_eq!(
        killpg(Pid::from_raw(pgid), None::<Signal>),
        Err(Errno::ESRCH),
        "process group {pgid} outlived its budget"
    );

    let records = harness.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, ExecutionStatus::TimedOut);
    assert_eq!(records[0].error_code, Some(ErrorCode::ExecutionTimeout));
}

#[tokio::test]
async fn test_timeouts_do_not_block_other_calls() {
    let harness = GatewayHarness::new();
    let (hung, quick) = tokio::join!(
        harness.call("kubernetes_get", "charlie", json!({"resource_type": "services"})),
        harness.call("echo", "charlie", json!({"message": "still here"})),
    );
    assert_eq!(hung.status, ExecutionStatus::TimedOut);
    assert_eq!(quick.status, ExecutionStatus::Completed);
    assert_eq!(quick.sanitized_output, "still here\n");
}

#[tokio::test]
async fn test_cancel_running_call() {
    let harness = GatewayHarness::new();
    let id = CorrelationId::from_string("cancel-1");

    let gateway = Arc::clone(&harness.gateway);
    let call = tokio::spawn({
        let id = id.clone();
        async move {
            gateway
                .call_tool(request("slow", "alice", json!({"seconds": "5"})).with_correlation_id(id))
                .await
        }
    });

    wait_for_state(&harness.gateway, &id, ExecutionState::Running).await;
    assert!(harness.gateway.sandbox().cancel(&id));

    let result = call.await.unwrap();
    assert_eq!(result.status, ExecutionStatus::Cancelled);
    assert!(result.duration_ms < 5000);
    assert_eq!(
        harness.gateway.sandbox().state(&id),
        Some(ExecutionState::Cancelled)
    );
    assert!(!harness.gateway.sandbox().cancel(&id));

    let records = harness.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, ExecutionStatus::Cancelled);
}

#[tokio::test]
async fn test_cancel_unknown_call() {
    let harness = GatewayHarness::new();
    assert!(!harness
        .gateway
        .sandbox()
        .cancel(&CorrelationId::from_string("never-started")));
}
