//! Shared test harness for integration tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tempfile::TempDir;
use warden_audit::{AuditFilter, AuditLog, AuditRecord};
use warden_config::Config;
use warden_core::{CorrelationId, ExecutionRequest, ExecutionResult, Principal};
use warden_gateway::{Gateway, config_bridge};
use warden_policy::{PolicyEngine, Role, RoleSet};
use warden_sandbox::{Overflow, Sandbox, SandboxConfig};
use warden_tools::{FieldSpec, InputSchema, Invocation, Tool, ToolRegistry};

/// Budget of the hanging `kubernetes_get` stand-in.
pub const HANG_BUDGET: Duration = Duration::from_millis(300);

/// A gateway wired to real short-lived processes and a file audit log in a
/// tempdir.
#[allow(dead_code)]
pub struct GatewayHarness {
    /// The gateway under test.
    pub gateway: Arc<Gateway>,
    /// Where the hanging tool writes its process group id.
    pub pid_file: PathBuf,
    /// Audit log path.
    pub audit_path: PathBuf,
    _dir: TempDir,
}

#[allow(dead_code)]
impl GatewayHarness {
    /// Harness with a roomy sandbox.
    pub fn new() -> Self {
        Self::with_sandbox(sandbox_config(8, Overflow::Reject))
    }

    /// Harness with a specific sandbox configuration.
    pub fn with_sandbox(config: SandboxConfig) -> Self {
        let dir = TempDir::new().expect("failed to create tempdir");
        let pid_file = dir.path().join("hang.pid");
        let audit_path = dir.path().join("audit").join("audit.jsonl");
        let gateway = build_gateway(&pid_file, &audit_path, config);
        Self {
            gateway,
            pid_file,
            audit_path,
            _dir: dir,
        }
    }

    /// Rebuild the gateway over the same audit file, as after a restart.
    pub fn restart(&mut self) {
        self.gateway = build_gateway(
            &self.pid_file,
            &self.audit_path,
            sandbox_config(8, Overflow::Reject),
        );
    }

    /// Call a tool with a fresh correlation id.
    pub async fn call(&self, tool: &str, principal: &str, args: Value) -> ExecutionResult {
        self.gateway.call_tool(request(tool, principal, args)).await
    }

    /// Call a tool with a caller-chosen correlation id.
    pub async fn call_with_id(
        &self,
        id: &str,
        tool: &str,
        principal: &str,
        args: Value,
    ) -> ExecutionResult {
        let request = request(tool, principal, args).with_correlation_id(CorrelationId::from_string(id));
        self.gateway.call_tool(request).await
    }

    /// Every audit record, oldest first.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.gateway
            .audit()
            .query(AuditFilter::new())
            .to_vec()
            .expect("audit query failed")
    }

    /// Times `id` reached process execution.
    pub fn executions(&self, id: &str) -> usize {
        self.gateway
            .sandbox()
            .execution_count(&CorrelationId::from_string(id))
    }
}

/// Sandbox settings scaled down for tests.
pub fn sandbox_config(max_concurrent: usize, overflow: Overflow) -> SandboxConfig {
    SandboxConfig {
        max_concurrent,
        overflow,
        max_timeout: Duration::from_secs(10),
        kill_grace: Duration::from_millis(200),
        ..SandboxConfig::default()
    }
}

/// Build an execution request.
pub fn request(tool: &str, principal: &str, args: Value) -> ExecutionRequest {
    let arguments = args.as_object().cloned().expect("arguments must be an object");
    ExecutionRequest::new(tool, arguments, Principal::new(principal))
}

fn build_gateway(pid_file: &Path, audit_path: &Path, sandbox: SandboxConfig) -> Arc<Gateway> {
    let registry = ToolRegistry::with_tools(tools(pid_file)).expect("tool catalogue");
    let policy = PolicyEngine::new(roles());
    let defaults = Config::from_toml_str("").expect("embedded defaults");
    let sanitizer = config_bridge::sanitizer_from_config(&defaults).expect("default sanitizer");
    let audit = Arc::new(AuditLog::open(audit_path, false).expect("audit log"));
    Arc::new(Gateway::new(
        "warden-test",
        registry,
        policy,
        Sandbox::new(sandbox),
        sanitizer,
        audit,
    ))
}

fn namespace() -> FieldSpec {
    FieldSpec::string("namespace")
        .with_default("default")
        .max_length(63)
}

/// The test catalogue, in registration order.
pub fn tools(pid_file: &Path) -> Vec<Tool> {
    let hang = format!("echo $$ > {}; exec sleep 30", pid_file.display());
    vec![
        Tool::new(
            "kubernetes_get",
            "Hangs until its budget expires",
            InputSchema::new(vec![
                FieldSpec::string("resource_type")
                    .required()
                    .one_of(["pods", "services"]),
                namespace(),
            ]),
            HANG_BUDGET,
            Invocation::new("sh", &["-c", hang.as_str()], None).expect("hang invocation"),
        )
        .expect("kubernetes_get")
        .with_scope_field("namespace")
        .expect("scope field"),
        Tool::new(
            "kubernetes_delete",
            "Pretend to delete a resource",
            InputSchema::new(vec![
                FieldSpec::string("resource_type").required(),
                FieldSpec::string("name").required(),
                namespace(),
            ]),
            Duration::from_secs(5),
            Invocation::new("echo", &["deleted", "{resource_type}/{name}"], None)
                .expect("delete invocation"),
        )
        .expect("kubernetes_delete")
        .with_scope_field("namespace")
        .expect("scope field"),
        Tool::new(
            "echo",
            "Echo a message",
            InputSchema::new(vec![
                FieldSpec::string("message").required().max_length(4096),
                namespace(),
            ]),
            Duration::from_secs(5),
            Invocation::new("echo", &["{message}"], None).expect("echo invocation"),
        )
        .expect("echo")
        .with_scope_field("namespace")
        .expect("scope field"),
        Tool::new(
            "slow",
            "Sleep for a while",
            InputSchema::new(vec![FieldSpec::string("seconds").with_default("1")]),
            Duration::from_secs(5),
            Invocation::new("sleep", &["{seconds}"], None).expect("slow invocation"),
        )
        .expect("slow"),
    ]
}

/// viewer: read-only in default and dev-*; admin: everything.
pub fn roles() -> RoleSet {
    let mut principals = BTreeMap::new();
    principals.insert("charlie".to_owned(), "viewer".to_owned());
    principals.insert("alice".to_owned(), "admin".to_owned());
    RoleSet::new(
        1,
        vec![
            Role::new("viewer", ["kubernetes_get", "echo", "slow"], ["default", "dev-*"])
                .expect("viewer"),
            Role::new(
                "admin",
                ["kubernetes_get", "kubernetes_delete", "echo", "slow"],
                Vec::<String>::new(),
            )
            .expect("admin"),
        ],
        principals,
    )
    .expect("role set")
}
