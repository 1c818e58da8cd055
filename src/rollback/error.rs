//! Rollback engine error types.
//!
//! Validation findings are data, returned inside the outcome. Errors
//! here mean the request itself was unusable (bad range, bad
//! timestamp) or an execution was refused.

use thiserror::Error;

use crate::ledger::LedgerError;
use crate::storage::StorageError;

use super::validation::Finding;

/// Result type for rollback operations.
pub type RollbackResult<T> = Result<T, RollbackError>;

/// Errors that can occur during rollback operations.
#[derive(Debug, Error)]
pub enum RollbackError {
    /// Storage layer error (includes ref CAS loss).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Operation ledger error.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Bad request: non-chronological range, timestamp out of bounds,
    /// inverting a root commit, range exceeding the page bound.
    #[error("validation error: {0}")]
    Validation(String),

    /// Execution refused: it would orphan hard dependents and the
    /// caller did not override. The findings carry the details.
    #[error("rollback would break {} dependent object(s); pass override to force", .findings.len())]
    DependencyViolation { findings: Vec<Finding> },
}

impl RollbackError {
    /// check if the caller should re-read the head and retry
    pub fn is_retriable(&self) -> bool {
        matches!(self, RollbackError::Storage(e) if e.is_retriable())
    }
}
