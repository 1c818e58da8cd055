//! storage layer for schemagit
//!
//! this module provides a complete abstraction over git for schema
//! snapshot storage. The upper layers (merge executor, rollback engine)
//! use this API and never touch git2 directly.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SchemaRepository                         │
//! │  (High-level API: snapshots, changesets, branches, tags)    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │    tree     │       │    blob     │       │    refs     │
//!  │ (snapshots) │       │(definitions)│       │ (branches)  │
//!  └─────────────┘       └─────────────┘       └─────────────┘
//!         │                     │                     │
//!         └─────────────────────┼─────────────────────┘
//!                               │
//!                               ▼
//!                        ┌─────────────┐
//!                        │   commit    │
//!                        │  (history)  │
//!                        └─────────────┘
//! ```

mod blob;
mod commit;
mod error;
mod refs;
mod repository;
mod tree;
mod types;

// Re-export public API
pub use blob::normalize_definition;
pub use commit::{CommitInfo, CommitMessage};
pub use error::{StorageError, StorageResult};
pub use repository::{ChangeSet, RepositoryStats, SchemaRepository};
pub use types::{
    BlobId, BranchName, Change, ChangeStatus, CommitId, InvalidNameError, ObjectKind, ObjectPath,
    QualifiedName, RefInfo, RefKind, Signature, TreeId,
};
