//! Merge engine error types.
//!
//! Detected conflicts are NOT errors — they come back inside
//! [`MergeOutcome`](super::MergeOutcome) as structured data. Only
//! genuinely exceptional conditions raise.

use thiserror::Error;

use crate::ledger::LedgerError;
use crate::storage::StorageError;

/// Result type for merge operations.
pub type MergeResult<T> = Result<T, MergeError>;

/// Errors that can occur during merge operations.
#[derive(Debug, Error)]
pub enum MergeError {
    /// Storage layer error (includes ref CAS loss).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Operation ledger error.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Bad input: unknown strategy text, malformed hash, empty or
    /// unparseable custom resolution.
    #[error("validation error: {0}")]
    Validation(String),

    /// The referenced merge operation does not exist.
    #[error("merge operation not found: {0}")]
    MergeNotFound(String),

    /// The referenced conflict does not exist.
    #[error("conflict not found: {0}")]
    ConflictNotFound(String),

    /// The conflict was already resolved; a resolution applies once.
    #[error("conflict already resolved: {0}")]
    AlreadyResolved(String),

    /// Finalize was requested while conflicts are still open.
    #[error("merge {merge_id} has {open} unresolved conflict(s)")]
    UnresolvedConflicts { merge_id: String, open: i64 },
}

impl MergeError {
    /// check if the caller should re-read heads and retry
    pub fn is_retriable(&self) -> bool {
        matches!(self, MergeError::Storage(e) if e.is_retriable())
    }
}
