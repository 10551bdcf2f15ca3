//! The audit log: sequencing, chaining and verification.

use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::{debug, error, warn};
use warden_core::Timestamp;

use crate::error::{AuditError, AuditResult};
use crate::query::{AuditFilter, AuditQuery};
use crate::record::{AuditDraft, AuditRecord, zero_hash};
use crate::storage::{AuditStorage, FileStorage, MemoryStorage};

#[derive(Debug)]
struct ChainHead {
    sequence: u64,
    hash: String,
}

/// Append-only, hash-chained audit log.
///
/// A single writer mutex serializes appends. The sequence number and chain
/// head advance only after the storage write succeeds, so a failed append
/// leaves no gap. Queries and verification read storage directly and never
/// take the writer lock.
pub struct AuditLog {
    storage: Arc<dyn AuditStorage>,
    head: Mutex<ChainHead>,
}

impl AuditLog {
    /// Create a log over `storage`, continuing from its last record.
    ///
    /// # Errors
    ///
    /// Returns an error if the last record cannot be read.
    pub fn with_storage(storage: Arc<dyn AuditStorage>) -> AuditResult<Self> {
        let head = match storage.last()? {
            Some(last) => ChainHead {
                sequence: last.sequence,
                hash: last.hash,
            },
            None => ChainHead {
                sequence: 0,
                hash: zero_hash(),
            },
        };
        debug!(sequence = head.sequence, "audit chain head recovered");
        Ok(Self {
            storage,
            head: Mutex::new(head),
        })
    }

    /// Create an in-memory log.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            storage: Arc::new(MemoryStorage::new()),
            head: Mutex::new(ChainHead {
                sequence: 0,
                hash: zero_hash(),
            }),
        }
    }

    /// Open or create a JSON-lines log file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or indexed.
    pub fn open(path: impl AsRef<Path>, fsync: bool) -> AuditResult<Self> {
        Self::with_storage(Arc::new(FileStorage::open(path, fsync)?))
    }

    /// Append an outcome, returning its sequence number.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be hashed or stored. The log
    /// is unchanged in that case.
    pub fn append(&self, draft: AuditDraft) -> AuditResult<u64> {
        let mut head = self
            .head
            .lock()
            .map_err(|e| AuditError::Storage(e.to_string()))?;
        let sequence = head
            .sequence
            .checked_add(1)
            .ok_or_else(|| AuditError::Storage("sequence space exhausted".to_owned()))?;
        let record = AuditRecord::seal(draft, sequence, head.hash.clone(), Timestamp::now())?;

        if let Err(e) = self.storage.append(&record) {
            error!(sequence, error = %e, "audit append failed");
            return Err(e);
        }

        debug!(
            sequence,
            correlation_id = %record.correlation_id,
            status = %record.status,
            "audit record appended"
        );
        head.sequence = sequence;
        head.hash = record.hash;
        Ok(sequence)
    }

    /// Build a query. Nothing is read until it is iterated.
    #[must_use]
    pub fn query(&self, filter: AuditFilter) -> AuditQuery {
        AuditQuery::new(Arc::clone(&self.storage), filter)
    }

    /// Replay the log, checking sequence contiguity and the hash chain.
    ///
    /// # Errors
    ///
    /// Returns an error if records cannot be read.
    pub fn verify(&self) -> AuditResult<ChainVerification> {
        let mut issues = Vec::new();
        let mut expected_sequence = 1u64;
        let mut previous_hash = zero_hash();
        let mut verified = 0usize;

        for record in self.query(AuditFilter::new()).iter() {
            let record = record?;
            if record.sequence != expected_sequence {
                issues.push(ChainIssue::SequenceGap {
                    expected: expected_sequence,
                    found: record.sequence,
                });
            }
            if record.previous_hash != previous_hash {
                warn!(sequence = record.sequence, "audit chain link broken");
                issues.push(ChainIssue::BrokenLink {
                    sequence: record.sequence,
                    expected_previous: previous_hash.clone(),
                    actual_previous: record.previous_hash.clone(),
                });
            }
            if !record.is_intact() {
                warn!(sequence = record.sequence, "audit record hash mismatch");
                issues.push(ChainIssue::HashMismatch {
                    sequence: record.sequence,
                });
            }
            expected_sequence = record.sequence.saturating_add(1);
            previous_hash = record.hash;
            verified = verified.saturating_add(1);
        }

        Ok(ChainVerification {
            valid: issues.is_empty(),
            records_verified: verified,
            issues,
        })
    }

    /// Sequence number of the last record, `0` when empty.
    #[must_use]
    pub fn last_sequence(&self) -> u64 {
        self.head.lock().map_or(0, |h| h.sequence)
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("last_sequence", &self.last_sequence())
            .finish_non_exhaustive()
    }
}

/// Result of [`AuditLog::verify`].
#[derive(Debug, Clone)]
pub struct ChainVerification {
    /// Whether no issue was found.
    pub valid: bool,
    /// Records replayed.
    pub records_verified: usize,
    /// Issues found, in log order.
    pub issues: Vec<ChainIssue>,
}

/// A problem found while replaying the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainIssue {
    /// A sequence number was skipped or repeated.
    SequenceGap {
        /// Sequence that should have come next.
        expected: u64,
        /// Sequence found instead.
        found: u64,
    },
    /// A record does not link to its predecessor.
    BrokenLink {
        /// Offending record.
        sequence: u64,
        /// Hash of the predecessor.
        expected_previous: String,
        /// Link stored in the record.
        actual_previous: String,
    },
    /// A record's contents do not match its hash.
    HashMismatch {
        /// Offending record.
        sequence: u64,
    },
}

impl std::fmt::Display for ChainIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SequenceGap { expected, found } => {
                write!(f, "sequence gap: expected {expected}, found {found}")
            },
            Self::BrokenLink { sequence, .. } => write!(f, "broken chain link at {sequence}"),
            Self::HashMismatch { sequence } => write!(f, "hash mismatch at {sequence}"),
        }
    }
}
