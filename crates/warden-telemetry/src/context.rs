//! Per-call tracing context.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Identity of one gateway call as it appears in logs.
///
/// Every event emitted inside [`RequestContext::span`] carries the
/// correlation id, so a single call can be followed from dispatch to audit.
#[derive(Debug, Clone, Serialize)]
pub struct RequestContext {
    /// Correlation id. A fresh UUID until the caller's id is attached.
    pub correlation_id: String,
    /// Protocol method that started the call.
    pub method: &'static str,
    /// Principal id, once parsed.
    pub principal: Option<String>,
    /// Tool name, once parsed.
    pub tool: Option<String>,
    /// Arrival time.
    pub received_at: DateTime<Utc>,
}

impl RequestContext {
    /// Context for a call arriving through `method`.
    #[must_use]
    pub fn new(method: &'static str) -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            method,
            principal: None,
            tool: None,
            received_at: Utc::now(),
        }
    }

    /// Attach the caller's correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = id.into();
        self
    }

    /// Attach the principal id.
    #[must_use]
    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    /// Attach the tool name.
    #[must_use]
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    /// Milliseconds since arrival, clamped at zero if the clock steps back.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        let elapsed = Utc::now().signed_duration_since(self.received_at);
        u64::try_from(elapsed.num_milliseconds()).unwrap_or_default()
    }

    /// The `call` span for this request.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "call",
            correlation_id = %self.correlation_id,
            method = self.method,
            principal = self.principal.as_deref().unwrap_or("-"),
            tool = self.tool.as_deref().unwrap_or("-"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_has_generated_id() {
        let ctx = RequestContext::new("tools/call");
        assert_eq!(ctx.method, "tools/call");
        assert!(Uuid::parse_str(&ctx.correlation_id).is_ok());
        assert!(ctx.principal.is_none() && ctx.tool.is_none());
    }

    #[test]
    fn test_attached_fields() {
        let ctx = RequestContext::new("call_tool")
            .with_correlation_id("req-7")
            .with_principal("alice")
            .with_tool("kubernetes_get");
        assert_eq!(ctx.correlation_id, "req-7");
        assert_eq!(ctx.principal.as_deref(), Some("alice"));
        assert_eq!(ctx.tool.as_deref(), Some("kubernetes_get"));
    }

    #[test]
    fn test_elapsed_is_monotone_enough() {
        let ctx = RequestContext::new("call_tool");
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(ctx.elapsed_ms() >= 10);
    }

    #[test]
    fn test_serializes_for_json_logs() {
        let ctx = RequestContext::new("call_tool").with_correlation_id("c-1");
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["correlation_id"], "c-1");
        assert_eq!(json["method"], "call_tool");
        assert!(json["principal"].is_null());
    }
}
