//! Typed query helpers for every table in the operation ledger.
//!
//! Engine enums are stored as their lowercase text forms; conversion
//! back to typed values happens in the merge/rollback modules so the
//! ledger stays a dumb, auditable record store.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use tracing::debug;

use super::error::{LedgerError, LedgerResult};
use super::Ledger;

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A row from the `merge_operations` table.
#[derive(Debug, Clone)]
pub struct MergeOperationRow {
    pub id: String,
    pub source_branch: String,
    pub target_branch: String,
    pub source_commit: String,
    pub target_commit: String,
    pub merge_base: Option<String>,
    pub no_common_ancestor: bool,
    pub strategy: String,
    pub status: String,
    pub conflicts_detected: i64,
    pub conflicts_resolved: i64,
    pub result_commit: Option<String>,
    pub message: String,
    pub started_at: String,
    pub completed_at: Option<String>,
}

/// A row from the `conflicts` table.
#[derive(Debug, Clone)]
pub struct ConflictRow {
    pub id: String,
    pub merge_id: String,
    pub path: String,
    pub object_type: String,
    pub base_hash: Option<String>,
    pub source_hash: Option<String>,
    pub target_hash: Option<String>,
    pub classification: String,
    pub severity: String,
    pub auto_resolvable: bool,
    pub status: String,
    pub resolution: Option<String>,
    pub custom_definition: Option<String>,
    pub resolved_by: Option<String>,
    pub created_at: String,
    pub resolved_at: Option<String>,
}

/// A row from the `rollback_operations` table.
#[derive(Debug, Clone)]
pub struct RollbackOperationRow {
    pub id: String,
    pub branch: String,
    pub kind: String,
    pub mode: String,
    pub status: String,
    pub source_commit: Option<String>,
    pub target_commit: Option<String>,
    pub rollback_commit: Option<String>,
    pub objects_affected: i64,
    pub breaking_changes_count: i64,
    pub message: String,
    pub started_at: String,
    pub completed_at: Option<String>,
}

fn merge_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MergeOperationRow> {
    Ok(MergeOperationRow {
        id: row.get(0)?,
        source_branch: row.get(1)?,
        target_branch: row.get(2)?,
        source_commit: row.get(3)?,
        target_commit: row.get(4)?,
        merge_base: row.get(5)?,
        no_common_ancestor: row.get::<_, i64>(6)? != 0,
        strategy: row.get(7)?,
        status: row.get(8)?,
        conflicts_detected: row.get(9)?,
        conflicts_resolved: row.get(10)?,
        result_commit: row.get(11)?,
        message: row.get(12)?,
        started_at: row.get(13)?,
        completed_at: row.get(14)?,
    })
}

const MERGE_COLUMNS: &str = "id, source_branch, target_branch, source_commit, target_commit, \
     merge_base, no_common_ancestor, strategy, status, conflicts_detected, conflicts_resolved, \
     result_commit, message, started_at, completed_at";

fn conflict_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConflictRow> {
    Ok(ConflictRow {
        id: row.get(0)?,
        merge_id: row.get(1)?,
        path: row.get(2)?,
        object_type: row.get(3)?,
        base_hash: row.get(4)?,
        source_hash: row.get(5)?,
        target_hash: row.get(6)?,
        classification: row.get(7)?,
        severity: row.get(8)?,
        auto_resolvable: row.get::<_, i64>(9)? != 0,
        status: row.get(10)?,
        resolution: row.get(11)?,
        custom_definition: row.get(12)?,
        resolved_by: row.get(13)?,
        created_at: row.get(14)?,
        resolved_at: row.get(15)?,
    })
}

const CONFLICT_COLUMNS: &str = "id, merge_id, path, object_type, base_hash, source_hash, \
     target_hash, classification, severity, auto_resolvable, status, resolution, \
     custom_definition, resolved_by, created_at, resolved_at";

fn rollback_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RollbackOperationRow> {
    Ok(RollbackOperationRow {
        id: row.get(0)?,
        branch: row.get(1)?,
        kind: row.get(2)?,
        mode: row.get(3)?,
        status: row.get(4)?,
        source_commit: row.get(5)?,
        target_commit: row.get(6)?,
        rollback_commit: row.get(7)?,
        objects_affected: row.get(8)?,
        breaking_changes_count: row.get(9)?,
        message: row.get(10)?,
        started_at: row.get(11)?,
        completed_at: row.get(12)?,
    })
}

const ROLLBACK_COLUMNS: &str = "id, branch, kind, mode, status, source_commit, target_commit, \
     rollback_commit, objects_affected, breaking_changes_count, message, started_at, completed_at";

// ---------------------------------------------------------------------------
// Query implementations
// ---------------------------------------------------------------------------

impl Ledger {
    // -- merge_operations ---------------------------------------------------

    /// Insert a new merge operation record.
    pub fn insert_merge_operation(&self, row: &MergeOperationRow) -> LedgerResult<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO merge_operations (id, source_branch, target_branch, source_commit, \
             target_commit, merge_base, no_common_ancestor, strategy, status, conflicts_detected, \
             conflicts_resolved, result_commit, message, started_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                row.id,
                row.source_branch,
                row.target_branch,
                row.source_commit,
                row.target_commit,
                row.merge_base,
                row.no_common_ancestor as i64,
                row.strategy,
                row.status,
                row.conflicts_detected,
                row.conflicts_resolved,
                row.result_commit,
                row.message,
                row.started_at,
                row.completed_at,
            ],
        )?;
        debug!(id = %row.id, strategy = %row.strategy, "inserted merge operation");
        Ok(())
    }

    /// Fetch one merge operation by id.
    pub fn get_merge_operation(&self, id: &str) -> LedgerResult<Option<MergeOperationRow>> {
        let conn = self.conn();
        let sql = format!("SELECT {} FROM merge_operations WHERE id = ?1", MERGE_COLUMNS);
        let row = conn.query_row(&sql, params![id], merge_row).optional()?;
        Ok(row)
    }

    /// Find the open CONFLICT operation for the same pair of heads, if any.
    ///
    /// Re-merging after partial resolution resumes this record instead of
    /// creating a duplicate.
    pub fn find_conflicted_merge(
        &self,
        source_commit: &str,
        target_commit: &str,
    ) -> LedgerResult<Option<MergeOperationRow>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {} FROM merge_operations \
             WHERE source_commit = ?1 AND target_commit = ?2 AND status = 'conflict' \
             ORDER BY started_at DESC LIMIT 1",
            MERGE_COLUMNS
        );
        let row = conn
            .query_row(&sql, params![source_commit, target_commit], merge_row)
            .optional()?;
        Ok(row)
    }

    /// Record the outcome of a merge operation.
    pub fn update_merge_outcome(
        &self,
        id: &str,
        status: &str,
        conflicts_detected: i64,
        conflicts_resolved: i64,
        result_commit: Option<&str>,
    ) -> LedgerResult<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE merge_operations SET status = ?2, conflicts_detected = ?3, \
             conflicts_resolved = ?4, result_commit = ?5, completed_at = ?6 WHERE id = ?1",
            params![id, status, conflicts_detected, conflicts_resolved, result_commit, now],
        )?;
        if updated == 0 {
            return Err(LedgerError::NotFound {
                entity: "merge operation",
                id: id.to_string(),
            });
        }
        debug!(id, status, conflicts_detected, conflicts_resolved, "merge outcome recorded");
        Ok(())
    }

    // -- conflicts ----------------------------------------------------------

    /// Insert a conflict record.
    pub fn insert_conflict(&self, row: &ConflictRow) -> LedgerResult<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO conflicts (id, merge_id, path, object_type, base_hash, source_hash, \
             target_hash, classification, severity, auto_resolvable, status, resolution, \
             custom_definition, resolved_by, created_at, resolved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                row.id,
                row.merge_id,
                row.path,
                row.object_type,
                row.base_hash,
                row.source_hash,
                row.target_hash,
                row.classification,
                row.severity,
                row.auto_resolvable as i64,
                row.status,
                row.resolution,
                row.custom_definition,
                row.resolved_by,
                row.created_at,
                row.resolved_at,
            ],
        )?;
        Ok(())
    }

    /// Fetch one conflict by id.
    pub fn get_conflict(&self, id: &str) -> LedgerResult<Option<ConflictRow>> {
        let conn = self.conn();
        let sql = format!("SELECT {} FROM conflicts WHERE id = ?1", CONFLICT_COLUMNS);
        let row = conn.query_row(&sql, params![id], conflict_row).optional()?;
        Ok(row)
    }

    /// Fetch the conflict for a (merge, path) pair, if recorded.
    pub fn conflict_for_path(&self, merge_id: &str, path: &str) -> LedgerResult<Option<ConflictRow>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {} FROM conflicts WHERE merge_id = ?1 AND path = ?2",
            CONFLICT_COLUMNS
        );
        let row = conn
            .query_row(&sql, params![merge_id, path], conflict_row)
            .optional()?;
        Ok(row)
    }

    /// All conflicts belonging to one merge operation, path order.
    pub fn list_conflicts(&self, merge_id: &str) -> LedgerResult<Vec<ConflictRow>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {} FROM conflicts WHERE merge_id = ?1 ORDER BY path",
            CONFLICT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![merge_id], conflict_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Number of still-open conflicts for a merge.
    pub fn open_conflict_count(&self, merge_id: &str) -> LedgerResult<i64> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM conflicts WHERE merge_id = ?1 AND status = 'open'",
            params![merge_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Mark a conflict resolved.
    ///
    /// Fails with AlreadyResolved when the record left `open` earlier —
    /// a resolution is applied at most once.
    pub fn mark_conflict_resolved(
        &self,
        id: &str,
        status: &str,
        resolution: &str,
        custom_definition: Option<&str>,
        resolved_by: Option<&str>,
    ) -> LedgerResult<()> {
        let existing = self.get_conflict(id)?.ok_or(LedgerError::NotFound {
            entity: "conflict",
            id: id.to_string(),
        })?;
        if existing.status != "open" {
            return Err(LedgerError::AlreadyResolved(id.to_string()));
        }

        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        conn.execute(
            "UPDATE conflicts SET status = ?2, resolution = ?3, custom_definition = ?4, \
             resolved_by = ?5, resolved_at = ?6 WHERE id = ?1",
            params![id, status, resolution, custom_definition, resolved_by, now],
        )?;
        debug!(id, resolution, "conflict resolved");
        Ok(())
    }

    // -- rollback_operations ------------------------------------------------

    /// Insert a rollback operation record.
    pub fn insert_rollback_operation(&self, row: &RollbackOperationRow) -> LedgerResult<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO rollback_operations (id, branch, kind, mode, status, source_commit, \
             target_commit, rollback_commit, objects_affected, breaking_changes_count, message, \
             started_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                row.id,
                row.branch,
                row.kind,
                row.mode,
                row.status,
                row.source_commit,
                row.target_commit,
                row.rollback_commit,
                row.objects_affected,
                row.breaking_changes_count,
                row.message,
                row.started_at,
                row.completed_at,
            ],
        )?;
        debug!(id = %row.id, kind = %row.kind, mode = %row.mode, "inserted rollback operation");
        Ok(())
    }

    /// Fetch one rollback operation by id.
    pub fn get_rollback_operation(&self, id: &str) -> LedgerResult<Option<RollbackOperationRow>> {
        let conn = self.conn();
        let sql = format!("SELECT {} FROM rollback_operations WHERE id = ?1", ROLLBACK_COLUMNS);
        let row = conn.query_row(&sql, params![id], rollback_row).optional()?;
        Ok(row)
    }

    /// Most recent rollback operations for a branch.
    pub fn list_rollbacks(&self, branch: &str, limit: u32) -> LedgerResult<Vec<RollbackOperationRow>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {} FROM rollback_operations WHERE branch = ?1 \
             ORDER BY started_at DESC LIMIT ?2",
            ROLLBACK_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![branch, limit], rollback_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_merge(id: &str) -> MergeOperationRow {
        MergeOperationRow {
            id: id.to_string(),
            source_branch: "feature".into(),
            target_branch: "main".into(),
            source_commit: "aaaa".into(),
            target_commit: "bbbb".into(),
            merge_base: Some("cccc".into()),
            no_common_ancestor: false,
            strategy: "union".into(),
            status: "pending".into(),
            conflicts_detected: 0,
            conflicts_resolved: 0,
            result_commit: None,
            message: "merge feature".into(),
            started_at: Utc::now().to_rfc3339(),
            completed_at: None,
        }
    }

    fn sample_conflict(id: &str, merge_id: &str, path: &str) -> ConflictRow {
        ConflictRow {
            id: id.to_string(),
            merge_id: merge_id.to_string(),
            path: path.to_string(),
            object_type: "table".into(),
            base_hash: Some("h0".into()),
            source_hash: Some("h1".into()),
            target_hash: Some("h2".into()),
            classification: "both_modified".into(),
            severity: "minor".into(),
            auto_resolvable: false,
            status: "open".into(),
            resolution: None,
            custom_definition: None,
            resolved_by: None,
            created_at: Utc::now().to_rfc3339(),
            resolved_at: None,
        }
    }

    #[test]
    fn test_merge_operation_round_trip() {
        let ledger = Ledger::in_memory().unwrap();
        ledger.insert_merge_operation(&sample_merge("m1")).unwrap();

        let row = ledger.get_merge_operation("m1").unwrap().unwrap();
        assert_eq!(row.strategy, "union");
        assert_eq!(row.status, "pending");

        ledger
            .update_merge_outcome("m1", "success", 2, 2, Some("dddd"))
            .unwrap();
        let row = ledger.get_merge_operation("m1").unwrap().unwrap();
        assert_eq!(row.status, "success");
        assert_eq!(row.conflicts_detected, 2);
        assert_eq!(row.result_commit.as_deref(), Some("dddd"));
        assert!(row.completed_at.is_some());
    }

    #[test]
    fn test_update_missing_merge_fails() {
        let ledger = Ledger::in_memory().unwrap();
        let result = ledger.update_merge_outcome("ghost", "success", 0, 0, None);
        assert!(matches!(result, Err(LedgerError::NotFound { .. })));
    }

    #[test]
    fn test_find_conflicted_merge() {
        let ledger = Ledger::in_memory().unwrap();
        let mut row = sample_merge("m1");
        row.status = "conflict".into();
        ledger.insert_merge_operation(&row).unwrap();

        let found = ledger.find_conflicted_merge("aaaa", "bbbb").unwrap();
        assert_eq!(found.map(|r| r.id), Some("m1".to_string()));

        assert!(ledger.find_conflicted_merge("aaaa", "zzzz").unwrap().is_none());
    }

    #[test]
    fn test_conflict_resolution_flow() {
        let ledger = Ledger::in_memory().unwrap();
        ledger.insert_merge_operation(&sample_merge("m1")).unwrap();
        ledger
            .insert_conflict(&sample_conflict("c1", "m1", "public/orders.table.sql"))
            .unwrap();
        ledger
            .insert_conflict(&sample_conflict("c2", "m1", "public/users.table.sql"))
            .unwrap();

        assert_eq!(ledger.open_conflict_count("m1").unwrap(), 2);

        ledger
            .mark_conflict_resolved("c1", "resolved", "source", None, Some("alice"))
            .unwrap();
        assert_eq!(ledger.open_conflict_count("m1").unwrap(), 1);

        // resolving again fails, never double-applies
        let again = ledger.mark_conflict_resolved("c1", "resolved", "target", None, None);
        assert!(matches!(again, Err(LedgerError::AlreadyResolved(_))));

        let row = ledger.get_conflict("c1").unwrap().unwrap();
        assert_eq!(row.resolution.as_deref(), Some("source"));
        assert_eq!(row.resolved_by.as_deref(), Some("alice"));
    }

    #[test]
    fn test_conflict_unique_per_merge_and_path() {
        let ledger = Ledger::in_memory().unwrap();
        ledger.insert_merge_operation(&sample_merge("m1")).unwrap();
        ledger
            .insert_conflict(&sample_conflict("c1", "m1", "public/orders.table.sql"))
            .unwrap();
        let dup = ledger.insert_conflict(&sample_conflict("c2", "m1", "public/orders.table.sql"));
        assert!(dup.is_err());
    }

    #[test]
    fn test_rollback_operation_round_trip() {
        let ledger = Ledger::in_memory().unwrap();
        let row = RollbackOperationRow {
            id: "r1".into(),
            branch: "main".into(),
            kind: "range".into(),
            mode: "executed".into(),
            status: "success".into(),
            source_commit: Some("aaaa".into()),
            target_commit: Some("bbbb".into()),
            rollback_commit: Some("cccc".into()),
            objects_affected: 3,
            breaking_changes_count: 0,
            message: "rolled back 2 commits".into(),
            started_at: Utc::now().to_rfc3339(),
            completed_at: Some(Utc::now().to_rfc3339()),
        };
        ledger.insert_rollback_operation(&row).unwrap();

        let back = ledger.get_rollback_operation("r1").unwrap().unwrap();
        assert_eq!(back.objects_affected, 3);

        let listed = ledger.list_rollbacks("main", 10).unwrap();
        assert_eq!(listed.len(), 1);
        assert!(ledger.list_rollbacks("other", 10).unwrap().is_empty());
    }
}
