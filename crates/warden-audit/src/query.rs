//! Lazy, restartable audit queries.

use std::collections::VecDeque;
use std::sync::Arc;

use warden_core::{CorrelationId, ExecutionStatus, PrincipalId, Timestamp};

use crate::error::AuditResult;
use crate::record::AuditRecord;
use crate::storage::AuditStorage;

const PAGE_SIZE: usize = 256;

/// Criteria a record must meet. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditFilter {
    /// Caller.
    pub principal: Option<PrincipalId>,
    /// Tool name.
    pub tool: Option<String>,
    /// Final status.
    pub status: Option<ExecutionStatus>,
    /// Earliest timestamp, inclusive.
    pub since: Option<Timestamp>,
    /// Latest timestamp, exclusive.
    pub until: Option<Timestamp>,
    /// Call id.
    pub correlation_id: Option<CorrelationId>,
    /// Maximum records yielded.
    pub limit: Option<usize>,
}

impl AuditFilter {
    /// Match everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only records for `principal`.
    #[must_use]
    pub fn principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(PrincipalId::new(principal));
        self
    }

    /// Only records for `tool`.
    #[must_use]
    pub fn tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    /// Only records with `status`.
    #[must_use]
    pub fn status(mut self, status: ExecutionStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Only records at or after `since`.
    #[must_use]
    pub fn since(mut self, since: Timestamp) -> Self {
        self.since = Some(since);
        self
    }

    /// Only records before `until`.
    #[must_use]
    pub fn until(mut self, until: Timestamp) -> Self {
        self.until = Some(until);
        self
    }

    /// Only records for `id`.
    #[must_use]
    pub fn correlation_id(mut self, id: CorrelationId) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// Yield at most `limit` records.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `record` meets every criterion.
    #[must_use]
    pub fn matches(&self, record: &AuditRecord) -> bool {
        self.principal
            .as_ref()
            .is_none_or(|p| *p == record.principal_id)
            && self.tool.as_ref().is_none_or(|t| *t == record.tool_name)
            && self.status.is_none_or(|s| s == record.status)
            && self.since.is_none_or(|s| record.timestamp >= s)
            && self.until.is_none_or(|u| record.timestamp < u)
            && self
                .correlation_id
                .as_ref()
                .is_none_or(|c| *c == record.correlation_id)
    }
}

/// A query over the log. Each call to [`AuditQuery::iter`] starts a fresh
/// pass from the first record; nothing is read until iteration.
pub struct AuditQuery {
    storage: Arc<dyn AuditStorage>,
    filter: AuditFilter,
}

impl AuditQuery {
    pub(crate) fn new(storage: Arc<dyn AuditStorage>, filter: AuditFilter) -> Self {
        Self { storage, filter }
    }

    /// The filter in use.
    #[must_use]
    pub fn filter(&self) -> &AuditFilter {
        &self.filter
    }

    /// Iterate matching records in sequence order.
    #[must_use]
    pub fn iter(&self) -> AuditQueryIter<'_> {
        AuditQueryIter {
            storage: self.storage.as_ref(),
            filter: &self.filter,
            after: 0,
            page: VecDeque::new(),
            yielded: 0,
            exhausted: false,
        }
    }

    /// Collect every matching record.
    ///
    /// # Errors
    ///
    /// Returns the first storage error.
    pub fn to_vec(&self) -> AuditResult<Vec<AuditRecord>> {
        self.iter().collect()
    }
}

impl std::fmt::Debug for AuditQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditQuery")
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

/// Iterator over one pass of an [`AuditQuery`].
pub struct AuditQueryIter<'a> {
    storage: &'a dyn AuditStorage,
    filter: &'a AuditFilter,
    /// Records consumed from storage so far.
    after: u64,
    page: VecDeque<AuditRecord>,
    yielded: usize,
    exhausted: bool,
}

impl Iterator for AuditQueryIter<'_> {
    type Item = AuditResult<AuditRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.filter.limit.is_some_and(|l| self.yielded >= l) {
                return None;
            }
            if let Some(record) = self.page.pop_front() {
                if self.filter.matches(&record) {
                    self.yielded = self.yielded.saturating_add(1);
                    return Some(Ok(record));
                }
                continue;
            }
            if self.exhausted {
                return None;
            }
            match self.storage.read_after(self.after, PAGE_SIZE) {
                Ok(page) => {
                    if page.len() < PAGE_SIZE {
                        self.exhausted = true;
                    }
                    self.after = self
                        .after
                        .saturating_add(u64::try_from(page.len()).unwrap_or(u64::MAX));
                    self.page.extend(page);
                },
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                },
            }
        }
    }
}
