//! SQLite persistence for operation records.
//!
//! The object store holds immutable history; this ledger holds the
//! mutable audit records around it — merge operations, their
//! conflicts, and rollback operations. Provides a [`Ledger`] handle
//! with WAL-mode journaling, automatic schema migrations, and typed
//! query helpers for every table.

mod error;
pub mod queries;
mod schema;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::{debug, info};

pub use error::{LedgerError, LedgerResult};
pub use queries::{ConflictRow, MergeOperationRow, RollbackOperationRow};

/// Ledger handle wrapping a SQLite connection.
///
/// The connection is opened in WAL mode and uses
/// `PRAGMA foreign_keys = ON`. The inner connection is wrapped in a
/// `Mutex` so that `Ledger` is `Send + Sync`, enabling use inside `Arc`.
pub struct Ledger {
    conn: Mutex<Connection>,
}

impl Ledger {
    /// Open (or create) the ledger database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> LedgerResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening ledger");

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;

        let ledger = Self {
            conn: Mutex::new(conn),
        };
        ledger.initialize()?;
        Ok(ledger)
    }

    /// Open an in-memory ledger (useful for testing).
    pub fn in_memory() -> LedgerResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let ledger = Self {
            conn: Mutex::new(conn),
        };
        ledger.initialize()?;
        Ok(ledger)
    }

    /// Run all schema migrations to bring the ledger up to date.
    fn initialize(&self) -> LedgerResult<()> {
        let conn = self.conn();
        schema::run_migrations(&conn)?;
        debug!("ledger schema is up to date");
        Ok(())
    }

    /// Obtain a lock on the underlying connection.
    ///
    /// If the Mutex is poisoned (a previous holder panicked), the lock
    /// is recovered rather than propagating a panic.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("ledger mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_ledger() {
        Ledger::in_memory().expect("failed to create in-memory ledger");
    }

    #[test]
    fn test_file_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let _ledger = Ledger::open(&path).expect("failed to create file ledger");
        assert!(path.exists());
    }
}
