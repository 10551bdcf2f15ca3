//! Roles and versioned role sets.

use std::collections::{BTreeMap, HashMap, HashSet};

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::{PolicyError, PolicyResult};

/// A named permission set with namespace patterns compiled once at load.
#[derive(Debug, Clone)]
pub struct Role {
    name: String,
    allowed_tools: HashSet<String>,
    patterns: Vec<String>,
    namespaces: GlobSet,
}

impl Role {
    /// Build a role, compiling its namespace globs.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidPattern`] for a malformed glob.
    pub fn new<T, P>(name: impl Into<String>, tools: T, namespace_patterns: P) -> PolicyResult<Self>
    where
        T: IntoIterator,
        T::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        let name = name.into();
        let patterns: Vec<String> = namespace_patterns.into_iter().map(Into::into).collect();
        let mut builder = GlobSetBuilder::new();
        for pattern in &patterns {
            let glob = Glob::new(pattern).map_err(|source| PolicyError::InvalidPattern {
                role: name.clone(),
                pattern: pattern.clone(),
                source,
            })?;
            builder.add(glob);
        }
        let namespaces = builder.build().map_err(|source| PolicyError::InvalidPattern {
            role: name.clone(),
            pattern: patterns.join(","),
            source,
        })?;
        Ok(Self {
            name,
            allowed_tools: tools.into_iter().map(Into::into).collect(),
            patterns,
            namespaces,
        })
    }

    /// Role name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the role may invoke `tool`.
    #[must_use]
    pub fn allows_tool(&self, tool: &str) -> bool {
        self.allowed_tools.contains(tool)
    }

    /// Whether the role restricts namespaces at all.
    #[must_use]
    pub fn restricts_namespaces(&self) -> bool {
        !self.patterns.is_empty()
    }

    /// Whether `namespace` matches at least one pattern.
    #[must_use]
    pub fn allows_namespace(&self, namespace: &str) -> bool {
        self.namespaces.is_match(namespace)
    }

    /// Namespace patterns as written.
    #[must_use]
    pub fn namespace_patterns(&self) -> &[String] {
        &self.patterns
    }
}

/// An immutable, versioned snapshot of roles and the principal directory.
#[derive(Debug, Clone, Default)]
pub struct RoleSet {
    version: u64,
    roles: HashMap<String, Role>,
    principals: BTreeMap<String, String>,
}

impl RoleSet {
    /// Build a role set.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::UnknownRole`] if the directory maps a principal
    /// to a role that is not defined.
    pub fn new(
        version: u64,
        roles: Vec<Role>,
        principals: BTreeMap<String, String>,
    ) -> PolicyResult<Self> {
        let roles: HashMap<String, Role> =
            roles.into_iter().map(|r| (r.name.clone(), r)).collect();
        if let Some((principal, role)) = principals.iter().find(|(_, r)| !roles.contains_key(*r)) {
            return Err(PolicyError::UnknownRole {
                principal: principal.clone(),
                role: role.clone(),
            });
        }
        Ok(Self {
            version,
            roles,
            principals,
        })
    }

    /// Monotonic version assigned by whoever built the set.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Look up a role by name.
    #[must_use]
    pub fn role(&self, name: &str) -> Option<&Role> {
        self.roles.get(name)
    }

    /// Directory fallback role for a principal id.
    #[must_use]
    pub fn directory_role(&self, principal: &str) -> Option<&str> {
        self.principals.get(principal).map(String::as_str)
    }

    /// Number of roles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Whether the set defines no roles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}
