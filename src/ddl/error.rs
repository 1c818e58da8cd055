//! DDL classification error types.

use thiserror::Error;

/// Result type for strict DDL parsing.
pub type DdlResult<T> = Result<T, DdlError>;

/// Errors from strict DDL parsing (used when a definition MUST be
/// classifiable, e.g. validating a custom conflict resolution).
#[derive(Debug, Error)]
pub enum DdlError {
    /// the input was empty or whitespace
    #[error("empty definition")]
    Empty,

    /// the grammar could not classify the statement
    #[error("unclassifiable definition: {0}")]
    Unclassifiable(String),
}
