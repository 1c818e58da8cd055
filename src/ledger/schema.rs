//! Ledger schema definitions and migration runner.
//!
//! Migrations are simple SQL strings applied in order. The SQLite
//! `user_version` pragma tracks which migrations have already been
//! applied.

use rusqlite::Connection;
use tracing::{debug, info};

use super::error::LedgerError;

/// All migrations, in order. Each entry is `(version, description, sql)`.
static MIGRATIONS: &[(u32, &str, &str)] = &[(
    1,
    "initial schema",
    r#"
    CREATE TABLE IF NOT EXISTS merge_operations (
        id                  TEXT PRIMARY KEY,
        source_branch       TEXT NOT NULL,
        target_branch       TEXT NOT NULL,
        source_commit       TEXT NOT NULL,
        target_commit       TEXT NOT NULL,
        merge_base          TEXT,
        no_common_ancestor  INTEGER NOT NULL DEFAULT 0,
        strategy            TEXT NOT NULL,
        status              TEXT NOT NULL DEFAULT 'pending',
        conflicts_detected  INTEGER NOT NULL DEFAULT 0,
        conflicts_resolved  INTEGER NOT NULL DEFAULT 0,
        result_commit       TEXT,
        message             TEXT NOT NULL DEFAULT '',
        started_at          TEXT NOT NULL,
        completed_at        TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_merge_operations_status ON merge_operations (status);
    CREATE INDEX IF NOT EXISTS idx_merge_operations_heads
        ON merge_operations (source_commit, target_commit);

    CREATE TABLE IF NOT EXISTS conflicts (
        id                  TEXT PRIMARY KEY,
        merge_id            TEXT NOT NULL REFERENCES merge_operations (id),
        path                TEXT NOT NULL,
        object_type         TEXT NOT NULL,
        base_hash           TEXT,
        source_hash         TEXT,
        target_hash         TEXT,
        classification      TEXT NOT NULL,
        severity            TEXT NOT NULL,
        auto_resolvable     INTEGER NOT NULL,
        status              TEXT NOT NULL DEFAULT 'open',
        resolution          TEXT,
        custom_definition   TEXT,
        resolved_by         TEXT,
        created_at          TEXT NOT NULL,
        resolved_at         TEXT,
        UNIQUE (merge_id, path)
    );

    CREATE INDEX IF NOT EXISTS idx_conflicts_merge_id ON conflicts (merge_id);
    CREATE INDEX IF NOT EXISTS idx_conflicts_status ON conflicts (status);

    CREATE TABLE IF NOT EXISTS rollback_operations (
        id                      TEXT PRIMARY KEY,
        branch                  TEXT NOT NULL,
        kind                    TEXT NOT NULL,
        mode                    TEXT NOT NULL,
        status                  TEXT NOT NULL,
        source_commit           TEXT,
        target_commit           TEXT,
        rollback_commit         TEXT,
        objects_affected        INTEGER NOT NULL DEFAULT 0,
        breaking_changes_count  INTEGER NOT NULL DEFAULT 0,
        message                 TEXT NOT NULL DEFAULT '',
        started_at              TEXT NOT NULL,
        completed_at            TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_rollback_operations_branch ON rollback_operations (branch);
    "#,
)];

/// Run all pending migrations against `conn`.
pub fn run_migrations(conn: &Connection) -> Result<(), LedgerError> {
    let current_version = get_schema_version(conn)?;
    info!(
        current_version,
        target_version = MIGRATIONS.last().map(|m| m.0).unwrap_or(0),
        "checking ledger migrations"
    );

    for &(version, description, sql) in MIGRATIONS {
        if version > current_version {
            info!(version, description, "applying migration");
            conn.execute_batch(sql)
                .map_err(|e| LedgerError::MigrationFailed {
                    version,
                    detail: e.to_string(),
                })?;
            set_schema_version(conn, version)?;
            debug!(version, "migration applied successfully");
        }
    }

    Ok(())
}

/// Read the current schema version from the SQLite `user_version` pragma.
fn get_schema_version(conn: &Connection) -> Result<u32, LedgerError> {
    let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

/// Set the schema version via the SQLite `user_version` pragma.
fn set_schema_version(conn: &Connection, version: u32) -> Result<(), LedgerError> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_run_idempotently() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), 1);
    }

    #[test]
    fn test_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let tables: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .unwrap();
            stmt.query_map([], |row| row.get(0))
                .unwrap()
                .filter_map(|r| r.ok())
                .collect()
        };

        assert!(tables.contains(&"merge_operations".to_string()));
        assert!(tables.contains(&"conflicts".to_string()));
        assert!(tables.contains(&"rollback_operations".to_string()));
    }
}
