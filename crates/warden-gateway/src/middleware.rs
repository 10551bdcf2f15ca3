//! Middleware wrapped around the fixed call pipeline.
//!
//! Every middleware sees the same [`CallContext`] before the pipeline runs
//! and again, with the final result, after it has been audited. Middleware
//! observes; it cannot alter or short-circuit a call.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::{info, warn};
use warden_core::{CorrelationId, ExecutionResult, ExecutionStatus, Principal};
use warden_telemetry::RequestContext;

/// What every stage knows about a call.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Call id.
    pub correlation_id: CorrelationId,
    /// Caller.
    pub principal: Principal,
    /// Requested tool.
    pub tool_name: String,
    /// Telemetry context, carrying the call span fields.
    pub request: RequestContext,
}

impl CallContext {
    /// Context for a call arriving at the dispatcher.
    #[must_use]
    pub fn new(correlation_id: CorrelationId, principal: Principal, tool_name: String) -> Self {
        let request = RequestContext::new("call_tool")
            .with_correlation_id(correlation_id.as_str())
            .with_principal(principal.id.as_str())
            .with_tool(&tool_name);
        Self {
            correlation_id,
            principal,
            tool_name,
            request,
        }
    }
}

/// A hook run before and after every call.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Called before validation.
    async fn before(&self, ctx: &CallContext);

    /// Called after the outcome has been audited.
    async fn after(&self, ctx: &CallContext, result: &ExecutionResult);
}

/// Logs call start and outcome.
#[derive(Debug, Default)]
pub struct TracingMiddleware;

#[async_trait]
impl Middleware for TracingMiddleware {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn before(&self, ctx: &CallContext) {
        info!(
            correlation_id = %ctx.correlation_id,
            principal = %ctx.principal.id,
            tool = %ctx.tool_name,
            "call received"
        );
    }

    async fn after(&self, ctx: &CallContext, result: &ExecutionResult) {
        if result.status.is_pre_execution() {
            warn!(
                correlation_id = %ctx.correlation_id,
                status = %result.status,
                code = ?result.code,
                "call refused"
            );
        } else {
            info!(
                correlation_id = %ctx.correlation_id,
                status = %result.status,
                duration_ms = result.duration_ms,
                redactions = result.redaction_count,
                truncated = result.truncated,
                "call finished"
            );
        }
    }
}

/// Point-in-time copy of the call counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Calls started.
    pub started: u64,
    /// Calls finished.
    pub finished: u64,
    /// Finished calls per status.
    pub by_status: HashMap<ExecutionStatus, u64>,
    /// Sum of call durations.
    pub total_duration_ms: u64,
    /// Sum of redactions.
    pub redactions: u64,
}

/// In-process call counters.
#[derive(Debug, Default)]
pub struct MetricsMiddleware {
    started: AtomicU64,
    finished: AtomicU64,
    total_duration_ms: AtomicU64,
    redactions: AtomicU64,
    by_status: Mutex<HashMap<ExecutionStatus, u64>>,
}

impl MetricsMiddleware {
    /// Create zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            started: self.started.load(Ordering::Relaxed),
            finished: self.finished.load(Ordering::Relaxed),
            by_status: self
                .by_status
                .lock()
                .map(|m| m.clone())
                .unwrap_or_default(),
            total_duration_ms: self.total_duration_ms.load(Ordering::Relaxed),
            redactions: self.redactions.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl Middleware for MetricsMiddleware {
    fn name(&self) -> &str {
        "metrics"
    }

    async fn before(&self, _ctx: &CallContext) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    async fn after(&self, _ctx: &CallContext, result: &ExecutionResult) {
        self.finished.fetch_add(1, Ordering::Relaxed);
        self.total_duration_ms
            .fetch_add(result.duration_ms, Ordering::Relaxed);
        self.redactions.fetch_add(
            u64::try_from(result.redaction_count).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
        if let Ok(mut by_status) = self.by_status.lock() {
            let count = by_status.entry(result.status).or_insert(0);
            *count = count.saturating_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::ErrorCode;

    fn ctx() -> CallContext {
        CallContext::new(
            CorrelationId::from_string("m-1"),
            Principal::new("alice"),
            "kubernetes_get".to_owned(),
        )
    }

    #[tokio::test]
    async fn test_metrics_count_statuses() {
        let metrics = MetricsMiddleware::new();
        let ctx = ctx();
        metrics.before(&ctx).await;
        metrics
            .after(
                &ctx,
                &ExecutionResult::refused(
                    ExecutionStatus::Denied,
                    ErrorCode::AuthorizationError,
                    "tool not permitted",
                )
                .with_duration_ms(3),
            )
            .await;

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.started, 1);
        assert_eq!(snapshot.finished, 1);
        assert_eq!(snapshot.by_status.get(&ExecutionStatus::Denied), Some(&1));
        assert_eq!(snapshot.total_duration_ms, 3);
    }

    #[test]
    fn test_context_carries_request_fields() {
        let ctx = ctx();
        assert_eq!(ctx.request.correlation_id, "m-1");
        assert_eq!(ctx.request.principal.as_deref(), Some("alice"));
        assert_eq!(ctx.request.tool.as_deref(), Some("kubernetes_get"));
    }
}
