//! The merge engine.
//!
//! Four cooperating pieces:
//! - `ancestry`: bounded dual-BFS merge-base discovery
//! - `diff3`: pure three-way classification of snapshot triples
//! - `executor`: strategy-driven merge execution and commit creation
//! - `resolution`: manual conflict resolution and finalization
//!
//! Conflicts and their resolutions are persisted in the operation
//! ledger; the commit graph itself stays append-only throughout.

mod ancestry;
mod diff3;
mod error;
mod executor;
mod resolution;

pub use ancestry::{MergeBase, MergeBaseFinder};
pub use diff3::{classify, diff_snapshots, Classification, PathDiff, Severity};
pub use error::{MergeError, MergeResult};
pub use executor::{MergeExecutor, MergeOutcome, MergeRequest, MergeStatus, MergeStrategy};
pub use resolution::{ConflictResolver, ResolutionChoice};
