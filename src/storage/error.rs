//! Storage layer error types
//!
//! All errors that can occur during storage operations are defined here.
//! We use `thiserror` for ergonomic error definition and better messages.
//!
//! Conflicts found during a merge and findings raised during rollback
//! validation are NOT errors — they come back as structured result data.
//! Everything in this enum is a genuine invariant violation.

use thiserror::Error;

use crate::storage::types::{InvalidNameError, ObjectPath};

/// the main error type for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// error from the underlying Git library
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// the requested object was not found in the snapshot
    #[error("object not found: {0}")]
    ObjectNotFound(ObjectPath),

    /// the requested schema directory was not found
    #[error("schema not found: {0}")]
    SchemaNotFound(String),

    /// the specified branch/ref was not found
    #[error("ref not found: {0}")]
    RefNotFound(String),

    /// the commit was not found
    #[error("commit not found: {0}")]
    CommitNotFound(String),

    /// the blob was not found
    #[error("blob not found: {0}")]
    BlobNotFound(String),

    /// branch or tag already exists
    #[error("ref already exists: {0}")]
    RefAlreadyExists(String),

    /// the ref is protected and cannot be deleted without force
    #[error("ref '{0}' is protected; pass force to delete it")]
    ProtectedRef(String),

    /// ref update failed because another writer advanced it first
    #[error("concurrent modification: ref {name} moved from expected {expected}")]
    ConcurrentModification { name: String, expected: String },

    /// a commit referenced a tree or parent that does not exist
    #[error("validation error: {0}")]
    Validation(String),

    /// invalid schema/object/branch name
    #[error("invalid name: {0}")]
    InvalidName(#[from] InvalidNameError),

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// data integrity check failed
    #[error("corrupted data at {path}: {reason}")]
    CorruptedData { path: String, reason: String },

    /// I/O error (filesystem level)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// repo is not initialized
    #[error("repository not initialized at: {0}")]
    NotInitialized(String),

    /// repo is empty (no commits)
    #[error("repository is empty: no commits found")]
    EmptyRepository,

    /// invalid UTF-8 in blob content
    #[error("invalid utf-8 in blob: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// internal error that shouldn't happen
    #[error("internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::ObjectNotFound(_)
                | StorageError::SchemaNotFound(_)
                | StorageError::RefNotFound(_)
                | StorageError::CommitNotFound(_)
                | StorageError::BlobNotFound(_)
        )
    }

    /// check if this error is recoverable by re-reading the ref and retrying
    pub fn is_retriable(&self) -> bool {
        matches!(self, StorageError::ConcurrentModification { .. })
    }
}

/// result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
