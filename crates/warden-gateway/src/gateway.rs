//! The gateway: owns every component and runs the call pipeline.
//!
//! # Pipeline
//!
//! 1. Look up the tool -> `Rejected` / `UnknownTool`
//! 2. Validate arguments -> `Rejected` / `ValidationError`
//! 3. Authorize -> `Denied` / `AuthorizationError`
//! 4. Execute in the sandbox -> `Backpressure`, or an executed status
//! 5. Sanitize output and error text
//! 6. Audit, exactly once, whatever happened above
//!
//! Steps 1-5 run in their own task so a panic there becomes an
//! `InternalError` for this call only.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use arc_swap::ArcSwap;
use tracing::{Instrument, debug, error, info};
use warden_audit::{AuditDraft, AuditLog};
use warden_config::Config;
use warden_core::{ErrorCode, ExecutionRequest, ExecutionResult, ExecutionStatus};
use warden_policy::{Decision, PolicyEngine, RoleSet, decide};
use warden_sandbox::{Sandbox, SandboxError};
use warden_sanitize::Sanitizer;
use warden_tools::{Catalogue, ToolRegistry, validate};

use crate::config_bridge;
use crate::error::GatewayResult;
use crate::middleware::{CallContext, MetricsMiddleware, Middleware, TracingMiddleware};

/// Message returned for internal faults. Details stay in the logs.
const INTERNAL_ERROR_MESSAGE: &str = "internal error";

/// Tools and roles as one unit. A call resolves its tool and its
/// authorization against the same snapshot.
#[derive(Debug)]
pub struct Definitions {
    /// Tool catalogue.
    pub catalogue: Arc<Catalogue>,
    /// Role set and principal directory.
    pub roles: Arc<RoleSet>,
}

/// Owns the tool and role definitions, sandbox, sanitizer and audit log.
pub struct Gateway {
    name: String,
    definitions: ArcSwap<Definitions>,
    reloading: Mutex<()>,
    sandbox: Sandbox,
    sanitizer: Sanitizer,
    audit: Arc<AuditLog>,
    middleware: Vec<Arc<dyn Middleware>>,
    metrics: Arc<MetricsMiddleware>,
}

impl Gateway {
    /// Assemble a gateway from ready components, serving the current
    /// snapshots of `registry` and `policy`. The tracing and metrics
    /// middleware are installed first.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        registry: ToolRegistry,
        policy: PolicyEngine,
        sandbox: Sandbox,
        sanitizer: Sanitizer,
        audit: Arc<AuditLog>,
    ) -> Self {
        let metrics = Arc::new(MetricsMiddleware::new());
        let definitions = Definitions {
            catalogue: registry.list(),
            roles: policy.snapshot(),
        };
        Self {
            name: name.into(),
            definitions: ArcSwap::from_pointee(definitions),
            reloading: Mutex::new(()),
            sandbox,
            sanitizer,
            audit,
            middleware: vec![
                Arc::new(TracingMiddleware),
                Arc::clone(&metrics) as Arc<dyn Middleware>,
            ],
            metrics,
        }
    }

    /// Build every component from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a tool, role or rule is rejected, or the audit
    /// log cannot be opened.
    pub fn from_config(cfg: &Config) -> GatewayResult<Self> {
        let registry = ToolRegistry::with_tools(config_bridge::tools_from_config(cfg)?)?;
        let policy = PolicyEngine::new(config_bridge::roles_from_config(cfg, 1)?);
        let sandbox = Sandbox::new(config_bridge::sandbox_from_config(cfg));
        let sanitizer = config_bridge::sanitizer_from_config(cfg)?;
        let audit = Arc::new(config_bridge::audit_from_config(cfg)?);
        info!(
            tools = registry.len(),
            roles = cfg.roles.len(),
            audit_sequence = audit.last_sequence(),
            "gateway assembled"
        );
        Ok(Self::new(
            &cfg.server.name,
            registry,
            policy,
            sandbox,
            sanitizer,
            audit,
        ))
    }

    /// Append a middleware after the built-in ones.
    #[must_use]
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Swap in tools and roles from a new configuration.
    ///
    /// Both are built first and then published in a single store, so no
    /// call sees new tools with old roles or the reverse. A bad
    /// configuration leaves the gateway unchanged. Calls already past
    /// lookup finish on the old definitions.
    ///
    /// # Errors
    ///
    /// Returns an error if a tool or role is rejected.
    pub fn reload(&self, cfg: &Config) -> GatewayResult<()> {
        let _reloading = self
            .reloading
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let catalogue = ToolRegistry::with_tools(config_bridge::tools_from_config(cfg)?)?.list();
        let version = self.definitions.load().roles.version().saturating_add(1);
        let roles = Arc::new(config_bridge::roles_from_config(cfg, version)?);
        info!(
            version,
            tools = catalogue.len(),
            roles = roles.len(),
            "configuration reloaded"
        );
        self.definitions.store(Arc::new(Definitions { catalogue, roles }));
        Ok(())
    }

    /// The tools and roles new calls are resolved against.
    #[must_use]
    pub fn definitions(&self) -> Arc<Definitions> {
        self.definitions.load_full()
    }

    /// Server name reported by `initialize`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current tool catalogue snapshot.
    #[must_use]
    pub fn list_tools(&self) -> Arc<Catalogue> {
        Arc::clone(&self.definitions.load().catalogue)
    }

    /// The audit log.
    #[must_use]
    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    /// The sandbox, for cancellation and journal queries.
    #[must_use]
    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Call counters.
    #[must_use]
    pub fn metrics(&self) -> &MetricsMiddleware {
        &self.metrics
    }

    /// Run one call through the pipeline and audit its outcome.
    pub async fn call_tool(self: &Arc<Self>, request: ExecutionRequest) -> ExecutionResult {
        let ctx = CallContext::new(
            request.correlation_id.clone(),
            request.principal.clone(),
            request.tool_name.clone(),
        );
        let span = ctx.request.span();
        self.handle(ctx, request).instrument(span).await
    }

    async fn handle(self: &Arc<Self>, ctx: CallContext, request: ExecutionRequest) -> ExecutionResult {
        let started = Instant::now();
        for m in &self.middleware {
            m.before(&ctx).await;
        }

        let digest_args = request.arguments.clone();
        let gateway = Arc::clone(self);
        let task = tokio::spawn(
            async move { gateway.execute_pipeline(&request).await }.in_current_span(),
        );
        let result = match task.await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "pipeline task failed");
                internal_error()
            },
        };
        let result = result.with_duration_ms(elapsed_ms(started));

        let draft = AuditDraft::new(
            ctx.correlation_id.clone(),
            ctx.principal.id.clone(),
            ctx.tool_name.clone(),
            &digest_args,
            result.status,
        )
        .with_error_code(result.code)
        .with_redactions(result.redaction_count)
        .with_duration_ms(result.duration_ms);
        let result = self.record(draft, result).await;

        for m in &self.middleware {
            m.after(&ctx, &result).await;
        }
        result
    }

    /// Audit a refusal that never became an [`ExecutionRequest`], such as a
    /// call whose parameters could not be parsed.
    pub async fn record_refusal(&self, ctx: &CallContext, result: ExecutionResult) -> ExecutionResult {
        for m in &self.middleware {
            m.before(ctx).await;
        }
        let draft = AuditDraft::new(
            ctx.correlation_id.clone(),
            ctx.principal.id.clone(),
            ctx.tool_name.clone(),
            &warden_core::Arguments::new(),
            result.status,
        )
        .with_error_code(result.code);
        let result = self.record(draft, result).await;
        for m in &self.middleware {
            m.after(ctx, &result).await;
        }
        result
    }

    /// Append to the audit log on the blocking pool. A failed append turns
    /// the result into `InternalError`.
    async fn record(&self, draft: AuditDraft, result: ExecutionResult) -> ExecutionResult {
        let audit = Arc::clone(&self.audit);
        let appended = tokio::task::spawn_blocking(move || audit.append(draft)).await;
        match appended {
            Ok(Ok(sequence)) => {
                debug!(sequence, "outcome audited");
                result
            },
            Ok(Err(e)) => {
                error!(error = %e, "audit append failed, failing call closed");
                internal_error().with_duration_ms(result.duration_ms)
            },
            Err(e) => {
                error!(error = %e, "audit task failed, failing call closed");
                internal_error().with_duration_ms(result.duration_ms)
            },
        }
    }

    async fn execute_pipeline(&self, request: &ExecutionRequest) -> ExecutionResult {
        let definitions = self.definitions.load_full();
        let Some(tool) = definitions.catalogue.get(&request.tool_name).cloned() else {
            return ExecutionResult::refused(
                ExecutionStatus::Rejected,
                ErrorCode::UnknownTool,
                format!("unknown tool '{}'", request.tool_name),
            );
        };

        let args = match validate(&tool, &request.arguments) {
            Ok(args) => args,
            Err(e) => {
                debug!(error = %e, "arguments rejected");
                return ExecutionResult::refused(
                    ExecutionStatus::Rejected,
                    ErrorCode::ValidationError,
                    e.to_string(),
                );
            },
        };

        let decision = decide(&definitions.roles, &request.principal, &tool, &args);
        debug!(version = definitions.roles.version(), %decision, "authorization decision");
        if let Decision::Deny(reason) = decision {
            return ExecutionResult::refused(
                ExecutionStatus::Denied,
                ErrorCode::AuthorizationError,
                reason.as_str(),
            );
        }

        let budget = self.sandbox.budget_for(&tool, &args);
        let executed = match self
            .sandbox
            .execute(&tool, &args, budget, &request.correlation_id)
            .await
        {
            Ok(result) => result,
            Err(SandboxError::Backpressure(reason)) => {
                return ExecutionResult::refused(
                    ExecutionStatus::Backpressure,
                    ErrorCode::Backpressure,
                    reason,
                );
            },
            Err(e @ SandboxError::DuplicateExecution(_)) => {
                return ExecutionResult::refused(
                    ExecutionStatus::Rejected,
                    ErrorCode::ValidationError,
                    e.to_string(),
                );
            },
            Err(e @ SandboxError::Render(_)) => {
                error!(tool = %tool.name, error = %e, "validated arguments failed to render");
                return internal_error();
            },
        };

        self.sanitize(executed)
    }

    fn sanitize(&self, mut result: ExecutionResult) -> ExecutionResult {
        let output = self.sanitizer.sanitize(&result.raw_output);
        result.sanitized_output = output.output;
        result.redaction_count = output.redactions;
        if let Some(message) = result.error.take() {
            let cleaned = self.sanitizer.sanitize(&message);
            result.redaction_count = result.redaction_count.saturating_add(cleaned.redactions);
            result.error = Some(cleaned.output);
        }
        result
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("name", &self.name)
            .field("tools", &self.definitions.load().catalogue.len())
            .field("roles_version", &self.definitions.load().roles.version())
            .finish_non_exhaustive()
    }
}

fn internal_error() -> ExecutionResult {
    ExecutionResult::refused(
        ExecutionStatus::InternalError,
        ErrorCode::InternalError,
        INTERNAL_ERROR_MESSAGE,
    )
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
