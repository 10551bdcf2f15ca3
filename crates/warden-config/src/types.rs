//! Configuration types for the Warden gateway.
//!
//! All types in this module are self-contained with no dependencies on other
//! internal warden crates. Domain types are mirrored here and converted at
//! the gateway boundary. Every section implements [`Default`] so that a bare
//! `[section]` header in TOML produces a working configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration for the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Protocol server identity and envelope limits.
    pub server: ServerSection,
    /// Logging level, format, and per-crate directives.
    pub logging: LoggingSection,
    /// Process execution limits.
    pub sandbox: SandboxSection,
    /// Audit log storage.
    pub audit: AuditSection,
    /// Output redaction rules.
    pub sanitizer: SanitizerSection,
    /// Named roles and what they may do.
    pub roles: BTreeMap<String, RoleSection>,
    /// Static principal id to role name directory.
    pub principals: BTreeMap<String, String>,
    /// Tool catalogue, in registration order.
    pub tools: Vec<ToolSection>,
}

// ---------------------------------------------------------------------------
// ServerSection
// ---------------------------------------------------------------------------

/// Protocol server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Name reported in `initialize` responses.
    pub name: String,
    /// Largest accepted request line, in bytes.
    pub max_request_bytes: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            name: "warden".to_owned(),
            max_request_bytes: 1_048_576,
        }
    }
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging and tracing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global log level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"`, `"json"`, or `"full"`.
    pub format: String,
    /// Output target: `"stderr"`, `"stdout"`, or `"file"`.
    pub target: String,
    /// Directory for rolling log files when `target = "file"`.
    pub directory: Option<PathBuf>,
    /// Per-crate tracing directives (e.g. `["warden_sandbox=debug"]`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            target: "stderr".to_owned(),
            directory: None,
            directives: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// SandboxSection
// ---------------------------------------------------------------------------

/// What to do when every execution slot is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowMode {
    /// Fail fast with `Backpressure`.
    #[default]
    Reject,
    /// Wait in a bounded queue, then fail with `Backpressure`.
    Queue,
}

/// Execution sandbox limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSection {
    /// Maximum number of concurrently running tool processes.
    pub max_concurrent: usize,
    /// Behaviour when all slots are busy.
    pub overflow: OverflowMode,
    /// Maximum number of queued callers in `queue` mode.
    pub max_queue: usize,
    /// Longest a queued caller waits for a slot, in milliseconds.
    pub queue_max_wait_ms: u64,
    /// Global ceiling on any execution budget, in seconds.
    pub max_timeout_secs: u64,
    /// Global ceiling on captured output per stream, in bytes.
    pub max_output_bytes: usize,
    /// Time between SIGTERM and SIGKILL, in milliseconds.
    pub kill_grace_ms: u64,
    /// Environment variables passed through to tool processes.
    pub env_allowlist: Vec<String>,
    /// Number of finished executions remembered by the journal.
    pub journal_capacity: usize,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            max_concurrent: 8,
            overflow: OverflowMode::Reject,
            max_queue: 32,
            queue_max_wait_ms: 5_000,
            max_timeout_secs: 120,
            max_output_bytes: 1_048_576,
            kill_grace_ms: 2_000,
            env_allowlist: vec![
                "PATH".to_owned(),
                "HOME".to_owned(),
                "LANG".to_owned(),
                "KUBECONFIG".to_owned(),
            ],
            journal_capacity: 1_024,
        }
    }
}

// ---------------------------------------------------------------------------
// AuditSection
// ---------------------------------------------------------------------------

/// Audit storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditBackend {
    /// Volatile, for tests and dry runs.
    Memory,
    /// JSON-lines file.
    #[default]
    File,
}

/// Audit log storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSection {
    /// Storage backend.
    pub backend: AuditBackend,
    /// Log file path. `None` uses the platform data directory.
    pub path: Option<PathBuf>,
    /// Whether each append is flushed to disk before it is acknowledged.
    pub fsync: bool,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            backend: AuditBackend::File,
            path: None,
            fsync: true,
        }
    }
}

impl AuditSection {
    /// The configured path, or `<data dir>/warden/audit.jsonl`.
    #[must_use]
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }
        directories::ProjectDirs::from("", "", "warden").map_or_else(
            || PathBuf::from("warden-audit.jsonl"),
            |dirs| dirs.data_dir().join("audit.jsonl"),
        )
    }
}

// ---------------------------------------------------------------------------
// SanitizerSection
// ---------------------------------------------------------------------------

/// Output redaction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizerSection {
    /// Replacement text for redacted content.
    pub placeholder: String,
    /// Lowercase key fragments whose JSON values are always redacted.
    pub sensitive_keys: Vec<String>,
    /// Kubernetes kinds whose `data`, `stringData` and `binaryData` entries
    /// are always redacted.
    pub data_kinds: Vec<String>,
    /// Passes allowed before the whole output is withheld.
    pub max_passes: usize,
    /// Ordered pattern rules.
    pub rules: Vec<RedactionRuleSection>,
}

impl Default for SanitizerSection {
    fn default() -> Self {
        Self {
            placeholder: "[REDACTED]".to_owned(),
            sensitive_keys: ["token", "password", "secret", "key", "cert", "tls"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            data_kinds: vec!["Secret".to_owned(), "ConfigMap".to_owned()],
            max_passes: 4,
            rules: Vec::new(),
        }
    }
}

/// A single regex redaction rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactionRuleSection {
    /// Rule name, used in logs.
    pub name: String,
    /// Regular expression. A named `secret` group narrows the replacement.
    pub pattern: String,
}

// ---------------------------------------------------------------------------
// RoleSection
// ---------------------------------------------------------------------------

/// A role's permissions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleSection {
    /// Tool names this role may invoke.
    pub tools: Vec<String>,
    /// Namespace globs this role may act within. Empty means unrestricted.
    pub namespaces: Vec<String>,
}

// ---------------------------------------------------------------------------
// ToolSection
// ---------------------------------------------------------------------------

/// Declared type of a tool input field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// UTF-8 string.
    String,
    /// Signed 64-bit integer.
    Integer,
    /// `true` / `false`.
    Boolean,
}

/// One input field of a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSection {
    /// Argument name.
    pub name: String,
    /// Declared type.
    #[serde(rename = "type")]
    pub kind: FieldKind,
    /// Whether callers must supply it.
    #[serde(default)]
    pub required: bool,
    /// Value applied when the caller omits the field.
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    /// Allowed string values.
    #[serde(default, rename = "enum")]
    pub allowed: Option<Vec<String>>,
    /// Maximum string length in characters.
    #[serde(default)]
    pub max_length: Option<usize>,
    /// Inclusive integer lower bound.
    #[serde(default)]
    pub minimum: Option<i64>,
    /// Inclusive integer upper bound.
    #[serde(default)]
    pub maximum: Option<i64>,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
}

/// How a tool maps onto a process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationSection {
    /// Executable name or path.
    pub program: String,
    /// Argument templates. `{field}` substitutes a value, `{field?}` drops
    /// the element when the field is absent.
    #[serde(default)]
    pub args: Vec<String>,
    /// String field written to the process's standard input.
    #[serde(default)]
    pub stdin_field: Option<String>,
}

/// A tool definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSection {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Execution budget, in seconds.
    pub timeout_secs: u64,
    /// Per-tool output ceiling. Capped by the global ceiling.
    #[serde(default)]
    pub max_output_bytes: Option<usize>,
    /// Whether arguments may start with `-`.
    #[serde(default)]
    pub raw_passthrough: bool,
    /// Argument that scopes the call to a namespace.
    #[serde(default)]
    pub scope_field: Option<String>,
    /// Process mapping.
    pub invocation: InvocationSection,
    /// Input fields, in declaration order.
    #[serde(default)]
    pub input: Vec<FieldSection>,
}

impl ToolSection {
    /// Find a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSection> {
        self.input.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_sections_use_defaults() {
        let config: Config = toml::from_str("[sandbox]\n[audit]\n").unwrap();
        assert_eq!(config.sandbox.max_concurrent, 8);
        assert_eq!(config.sandbox.overflow, OverflowMode::Reject);
        assert_eq!(config.audit.backend, AuditBackend::File);
        assert!(config.audit.fsync);
    }

    #[test]
    fn test_overflow_mode_lowercase() {
        let config: Config = toml::from_str("[sandbox]\noverflow = \"queue\"\n").unwrap();
        assert_eq!(config.sandbox.overflow, OverflowMode::Queue);
    }

    #[test]
    fn test_tool_section_parses() {
        let config: Config = toml::from_str(
            r#"
            [[tools]]
            name = "echo"
            timeout_secs = 5
            scope_field = "namespace"

            [tools.invocation]
            program = "echo"
            args = ["{message}", "{suffix?}"]

            [[tools.input]]
            name = "message"
            type = "string"
            required = true
            max_length = 64

            [[tools.input]]
            name = "namespace"
            type = "string"
            default = "default"
            enum = ["default", "dev"]
        "#,
        )
        .unwrap();

        let tool = &config.tools[0];
        assert_eq!(tool.invocation.args.len(), 2);
        assert_eq!(tool.input[0].kind, FieldKind::String);
        assert_eq!(tool.input[0].max_length, Some(64));
        let ns = tool.field("namespace").unwrap();
        assert_eq!(ns.default, Some(serde_json::json!("default")));
        assert_eq!(ns.allowed.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn test_explicit_audit_path_wins() {
        let section = AuditSection {
            path: Some(PathBuf::from("/tmp/x.jsonl")),
            ..AuditSection::default()
        };
        assert_eq!(section.resolved_path(), PathBuf::from("/tmp/x.jsonl"));
    }
}
