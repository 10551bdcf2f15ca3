//! In-flight table and bounded history of executions.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio_util::sync::CancellationToken;
use warden_core::{CorrelationId, ExecutionStatus};

use crate::error::{SandboxError, SandboxResult};

/// Lifecycle state of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    /// Admitted, waiting for a concurrency slot.
    Pending,
    /// Process spawned.
    Running,
    /// Exited with status zero.
    Completed,
    /// Budget exceeded, process group reaped.
    TimedOut,
    /// Spawn failure or non-zero exit.
    Failed,
    /// Stopped by [`crate::Sandbox::cancel`].
    Cancelled,
}

impl ExecutionState {
    /// Whether the state is final.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    /// Matching pipeline status for a terminal state.
    #[must_use]
    pub fn status(self) -> Option<ExecutionStatus> {
        match self {
            Self::Pending | Self::Running => None,
            Self::Completed => Some(ExecutionStatus::Completed),
            Self::TimedOut => Some(ExecutionStatus::TimedOut),
            Self::Failed => Some(ExecutionStatus::Failed),
            Self::Cancelled => Some(ExecutionStatus::Cancelled),
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::TimedOut => "timed_out",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
struct InFlight {
    token: CancellationToken,
    state: ExecutionState,
}

/// Record of a finished execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// Call id.
    pub correlation_id: CorrelationId,
    /// Terminal state.
    pub state: ExecutionState,
}

/// Tracks live executions and remembers the last `capacity` finished ones.
#[derive(Debug)]
pub(crate) struct Journal {
    in_flight: DashMap<CorrelationId, InFlight>,
    finished: Mutex<VecDeque<JournalEntry>>,
    capacity: usize,
}

impl Journal {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            in_flight: DashMap::new(),
            finished: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    /// Admit an execution in the `Pending` state.
    pub(crate) fn admit(&self, id: &CorrelationId) -> SandboxResult<CancellationToken> {
        match self.in_flight.entry(id.clone()) {
            Entry::Occupied(_) => Err(SandboxError::DuplicateExecution(id.clone())),
            Entry::Vacant(slot) => {
                let token = CancellationToken::new();
                slot.insert(InFlight {
                    token: token.clone(),
                    state: ExecutionState::Pending,
                });
                Ok(token)
            },
        }
    }

    pub(crate) fn mark_running(&self, id: &CorrelationId) {
        if let Some(mut entry) = self.in_flight.get_mut(id) {
            entry.state = ExecutionState::Running;
        }
    }

    /// Remove an admitted execution that never ran.
    pub(crate) fn withdraw(&self, id: &CorrelationId) {
        self.in_flight.remove(id);
    }

    /// Move an execution from the in-flight table into history.
    pub(crate) fn finish(&self, id: &CorrelationId, state: ExecutionState) {
        self.in_flight.remove(id);
        if self.capacity == 0 {
            return;
        }
        let mut finished = self
            .finished
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        while finished.len() >= self.capacity {
            finished.pop_front();
        }
        finished.push_back(JournalEntry {
            correlation_id: id.clone(),
            state,
        });
    }

    pub(crate) fn cancel(&self, id: &CorrelationId) -> bool {
        match self.in_flight.get(id) {
            Some(entry) => {
                entry.token.cancel();
                true
            },
            None => false,
        }
    }

    pub(crate) fn state(&self, id: &CorrelationId) -> Option<ExecutionState> {
        if let Some(entry) = self.in_flight.get(id) {
            return Some(entry.state);
        }
        self.finished
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .rev()
            .find(|e| &e.correlation_id == id)
            .map(|e| e.state)
    }

    pub(crate) fn execution_count(&self, id: &CorrelationId) -> usize {
        let finished = self
            .finished
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .filter(|e| &e.correlation_id == id)
            .count();
        let live = usize::from(
            self.in_flight
                .get(id)
                .is_some_and(|e| e.state == ExecutionState::Running),
        );
        finished.saturating_add(live)
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub(crate) fn recent(&self) -> Vec<JournalEntry> {
        self.finished
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}
