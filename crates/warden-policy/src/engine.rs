//! Authorization decisions.
//!
//! # Check Order
//!
//! 1. Resolve the principal's role from the directory -> `no role`. A role
//!    asserted by the caller is a claim only; one that differs from the
//!    directory entry is also `no role`.
//! 2. Is the tool in the role's allowed set? -> `tool not permitted`
//! 3. Does the tool declare a scope field and the role restrict namespaces?
//!    The scoping value must match a pattern -> `namespace not permitted`
//! 4. Otherwise -> `Allow`
//!
//! Nothing bypasses these checks.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde_json::Value;
use tracing::{debug, info};
use warden_core::{Arguments, Principal};
use warden_tools::Tool;

use crate::role::RoleSet;

/// Why a call was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The principal resolves to no known role.
    NoRole,
    /// The role does not include the tool.
    ToolNotPermitted,
    /// The scoping argument is missing or matches no pattern.
    NamespaceNotPermitted,
}

impl DenyReason {
    /// Stable caller-visible text.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoRole => "no role",
            Self::ToolNotPermitted => "tool not permitted",
            Self::NamespaceNotPermitted => "namespace not permitted",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The call may proceed.
    Allow,
    /// The call is forbidden.
    Deny(DenyReason),
}

impl Decision {
    /// Whether the call may proceed.
    #[must_use]
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Deny(reason) => write!(f, "deny: {reason}"),
        }
    }
}

/// Decide a call against one role set snapshot.
///
/// A pure function of its inputs.
#[must_use]
pub fn decide(roles: &RoleSet, principal: &Principal, tool: &Tool, args: &Arguments) -> Decision {
    let Some(role_name) = roles.directory_role(principal.id.as_str()) else {
        return Decision::Deny(DenyReason::NoRole);
    };
    if principal
        .role
        .as_deref()
        .is_some_and(|claimed| claimed != role_name)
    {
        return Decision::Deny(DenyReason::NoRole);
    }
    let Some(role) = roles.role(role_name) else {
        return Decision::Deny(DenyReason::NoRole);
    };

    if !role.allows_tool(&tool.name) {
        return Decision::Deny(DenyReason::ToolNotPermitted);
    }

    if let Some(scope_field) = &tool.scope_field
        && role.restricts_namespaces()
    {
        let permitted = args
            .get(scope_field)
            .and_then(Value::as_str)
            .is_some_and(|ns| role.allows_namespace(ns));
        if !permitted {
            return Decision::Deny(DenyReason::NamespaceNotPermitted);
        }
    }

    Decision::Allow
}

/// Authorizes calls against an atomically swappable role set.
pub struct PolicyEngine {
    roles: ArcSwap<RoleSet>,
}

impl PolicyEngine {
    /// Create an engine serving `roles`.
    #[must_use]
    pub fn new(roles: RoleSet) -> Self {
        Self {
            roles: ArcSwap::from_pointee(roles),
        }
    }

    /// Authorize a call. Arguments must already be validated and defaulted.
    #[must_use]
    pub fn authorize(&self, principal: &Principal, tool: &Tool, args: &Arguments) -> Decision {
        let roles = self.roles.load();
        let decision = decide(&roles, principal, tool, args);
        debug!(
            principal = %principal.id,
            tool = %tool.name,
            version = roles.version(),
            %decision,
            "authorization decision"
        );
        decision
    }

    /// Swap in a new role set. In-flight decisions finish on the old one.
    pub fn reload(&self, roles: RoleSet) {
        info!(version = roles.version(), roles = roles.len(), "reloading role set");
        self.roles.store(Arc::new(roles));
    }

    /// The current role set snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<RoleSet> {
        self.roles.load_full()
    }
}

impl fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyEngine")
            .field("version", &self.roles.load().version())
            .finish_non_exhaustive()
    }
}
