//! The rollback/undo engine.
//!
//! Dependency-validated, append-only reversal of historical state:
//! - `inverse`: computes the changeset that reproduces an earlier state
//! - `validation`: the shared read-only finding pipeline
//! - `engine`: the four operations (commit, range, timestamp, undo)
//!
//! History is never deleted or rewritten; every execution appends one
//! commit and one ledger row.

mod engine;
mod error;
mod inverse;
mod validation;

pub use engine::{
    RollbackEngine, RollbackKind, RollbackMode, RollbackOutcome, RollbackStatus, UndoScope,
};
pub use error::{RollbackError, RollbackResult};
pub use inverse::{invert_commit, invert_range, invert_to_state, InverseChangeset};
pub use validation::{validate_inverse, Finding, FindingCode, FindingSeverity};
