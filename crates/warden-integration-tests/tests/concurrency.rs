//! Concurrent calls, the concurrency ceiling and audit ordering.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{GatewayHarness, request, sandbox_config};
use futures::future::join_all;
use serde_json::json;
use warden_core::{CorrelationId, ErrorCode, ExecutionStatus};
use warden_sandbox::Overflow;

async fn wait_until_full(harness: &GatewayHarness) {
    let started = Instant::now();
    while harness.gateway.sandbox().available_slots() > 0 {
        assert!(started.elapsed() < Duration::from_secs(3), "slot never taken");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_audit_sequence_is_contiguous_under_load() {
    const CALLS: usize = 40;
    let harness = GatewayHarness::new();

    let calls = (0..CALLS).map(|i| {
        let gateway = Arc::clone(&harness.gateway);
        let (tool, principal, args) = match i % 4 {
            0 => ("echo", "charlie", json!({"message": format!("m{i}")})),
            1 => ("kubernetes_delete", "charlie", json!({"resource_type": "pods", "name": "x"})),
            2 => ("echo", "alice", json!({"message": "a;b"})),
            _ => ("missing", "alice", json!({})),
        };
        let req = request(tool, principal, args)
            .with_correlation_id(CorrelationId::from_string(format!("load-{i}")));
        tokio::spawn(async move { gateway.call_tool(req).await })
    });
    let results = join_all(calls).await;
    assert!(results.iter().all(Result::is_ok));

    let records = harness.records();
    let sequences: Vec<u64> = records.iter().map(|r| r.sequence).collect();
    let expected: Vec<u64> = (1..=40).collect();
    assert_eq!(sequences, expected);

    let ids: HashSet<&str> = records.iter().map(|r| r.correlation_id.as_str()).collect();
    assert_eq!(ids.len(), CALLS);

    let report = harness.gateway.audit().verify().unwrap();
    assert!(report.valid, "{:?}", report.issues);
    assert_eq!(report.records_verified, CALLS);

    for i in (1..CALLS).step_by(4) {
        assert_eq!(harness.executions(&format!("load-{i}")), 0);
    }
}

#[tokio::test]
async fn test_backpressure_when_full() {
    let harness = GatewayHarness::with_sandbox(sandbox_config(1, Overflow::Reject));

    let gateway = Arc::clone(&harness.gateway);
    let first = tokio::spawn(async move {
        gateway
            .call_tool(request("slow", "alice", json!({"seconds": "1"})))
            .await
    });
    wait_until_full(&harness).await;

    let second = harness
        .call_with_id("bp-2", "echo", "alice", json!({"message": "hi"}))
        .await;
    assert_eq!(second.status, ExecutionStatus::Backpressure);
    assert_eq!(second.code, Some(ErrorCode::Backpressure));
    assert_eq!(harness.executions("bp-2"), 0);

    let first = first.await.unwrap();
    assert_eq!(first.status, ExecutionStatus::Completed);

    let statuses: Vec<ExecutionStatus> = harness.records().iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![ExecutionStatus::Backpressure, ExecutionStatus::Completed]
    );
}

#[tokio::test]
async fn test_queue_waits_for_a_slot() {
    let harness = GatewayHarness::with_sandbox(sandbox_config(
        1,
        Overflow::Queue {
            max_waiters: 4,
            max_wait: Duration::from_secs(5),
        },
    ));

    let gateway = Arc::clone(&harness.gateway);
    let first = tokio::spawn(async move {
        gateway
            .call_tool(request("slow", "alice", json!({"seconds": "1"})))
            .await
    });
    wait_until_full(&harness).await;

    let queued = harness
        .call("echo", "alice", json!({"message": "after"}))
        .await;
    assert_eq!(queued.status, ExecutionStatus::Completed);
    assert_eq!(first.await.unwrap().status, ExecutionStatus::Completed);
}
