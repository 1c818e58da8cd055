//! schemagit - Git-backed schema version control
//!
//! This crate versions database schema objects the way a distributed
//! VCS versions files: immutable content-addressed snapshots form a
//! commit DAG, named branches point into it, divergent branches
//! reconcile via three-way merge, and any branch can be rolled back or
//! selectively undone without rewriting history.
//!
//! # Example
//!
//! ```no_run
//! use schemagit::api::{SchemaVcs, WorkContext};
//! use schemagit::config::VcsConfig;
//! use schemagit::storage::ObjectKind;
//!
//! let vcs = SchemaVcs::open("./schema_history", VcsConfig::default()).unwrap();
//! let ctx = WorkContext::main();
//! vcs.record_change(&ctx, "public", "orders", ObjectKind::Table,
//!     Some("CREATE TABLE orders (id INT PRIMARY KEY);")).unwrap();
//! vcs.commit(&ctx, "capture orders table").unwrap();
//! ```

pub mod api;
pub mod config;
pub mod ddl;
pub mod deps;
pub mod ledger;
pub mod merge;
pub mod rollback;
pub mod storage;
