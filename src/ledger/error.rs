//! Ledger error types.

use thiserror::Error;

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors from the SQLite-backed operation ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// underlying SQLite error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// a schema migration failed to apply
    #[error("migration {version} failed: {detail}")]
    MigrationFailed { version: u32, detail: String },

    /// the requested record does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// a conflict was already resolved and cannot be re-resolved
    #[error("conflict already resolved: {0}")]
    AlreadyResolved(String),
}
