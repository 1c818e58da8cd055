//! The rollback/undo engine.
//!
//! Four operations share one validation pipeline and one execution
//! path. Every mode runs validation first; only Executed mutates, and
//! execution is exactly one commit plus one ref CAS — history is never
//! rewritten, only appended to.

use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use ulid::Ulid;

use crate::config::VcsConfig;
use crate::deps::DependencyGraph;
use crate::ledger::{Ledger, RollbackOperationRow};
use crate::storage::{
    BranchName, CommitId, CommitMessage, QualifiedName, SchemaRepository, Signature, StorageError,
};

use super::error::{RollbackError, RollbackResult};
use super::inverse::{self, InverseChangeset};
use super::validation::{self, Finding, FindingCode, FindingSeverity};

/// Which rollback operation ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackKind {
    SingleCommit,
    Range,
    ToTimestamp,
    Undo,
}

impl RollbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RollbackKind::SingleCommit => "single_commit",
            RollbackKind::Range => "range",
            RollbackKind::ToTimestamp => "to_timestamp",
            RollbackKind::Undo => "undo",
        }
    }
}

/// How far the operation goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackMode {
    /// validate and count; write nothing
    DryRun,
    /// validate and record the validation run; write nothing
    Validated,
    /// validate, then append the inverse commit
    Executed,
}

impl RollbackMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RollbackMode::DryRun => "dry_run",
            RollbackMode::Validated => "validated",
            RollbackMode::Executed => "executed",
        }
    }

    fn mutates(&self) -> bool {
        matches!(self, RollbackMode::Executed)
    }
}

/// Outcome status of a rollback operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackStatus {
    Success,
    Blocked,
}

impl RollbackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RollbackStatus::Success => "success",
            RollbackStatus::Blocked => "blocked",
        }
    }
}

/// Scope selector for `undo_changes`.
#[derive(Debug, Clone, Copy)]
pub enum UndoScope {
    /// revert the named objects' changes from one commit
    Commit(CommitId),
    /// revert the named objects to their state at the range start
    TimeRange(DateTime<Utc>, DateTime<Utc>),
}

/// Result row returned by every rollback operation.
#[derive(Debug, Clone)]
pub struct RollbackOutcome {
    pub id: String,
    pub kind: RollbackKind,
    pub mode: RollbackMode,
    pub status: RollbackStatus,
    pub rollback_commit: Option<CommitId>,
    pub objects_affected: usize,
    pub breaking_changes: usize,
    /// paths multiple range commits touched (informational)
    pub overlaps_resolved: usize,
    pub findings: Vec<Finding>,
    pub elapsed_ms: u64,
    pub message: String,
}

/// Executes rollbacks against one repository + ledger pair.
pub struct RollbackEngine<'a> {
    repo: &'a SchemaRepository,
    ledger: &'a Ledger,
    deps: &'a DependencyGraph,
    config: &'a VcsConfig,
}

impl<'a> RollbackEngine<'a> {
    pub fn new(
        repo: &'a SchemaRepository,
        ledger: &'a Ledger,
        deps: &'a DependencyGraph,
        config: &'a VcsConfig,
    ) -> Self {
        Self {
            repo,
            ledger,
            deps,
            config,
        }
    }

    /// Invert exactly one commit and append the inverse.
    pub fn rollback_commit(
        &self,
        branch: &BranchName,
        commit: CommitId,
        mode: RollbackMode,
        author: &Signature,
        override_dependencies: bool,
    ) -> RollbackResult<RollbackOutcome> {
        let inverse = inverse::invert_commit(self.repo, commit).map_err(map_validation)?;
        let message = CommitMessage::rollback("commit", &format!("{} on {}", commit.short(), branch));

        self.run(
            branch,
            RollbackKind::SingleCommit,
            mode,
            author,
            override_dependencies,
            Some(commit),
            None,
            inverse,
            Vec::new(),
            message,
        )
    }

    /// Invert every commit in `(from, to]`, newest first.
    pub fn rollback_range(
        &self,
        branch: &BranchName,
        from: CommitId,
        to: CommitId,
        mode: RollbackMode,
        author: &Signature,
        override_dependencies: bool,
    ) -> RollbackResult<RollbackOutcome> {
        let inverse = inverse::invert_range(self.repo, from, to, self.config.range_page_size)
            .map_err(map_validation)?;
        let message = CommitMessage::rollback(
            "range",
            &format!("{}..{} on {}", from.short(), to.short(), branch),
        );

        self.run(
            branch,
            RollbackKind::Range,
            mode,
            author,
            override_dependencies,
            Some(from),
            Some(to),
            inverse,
            Vec::new(),
            message,
        )
    }

    /// Revert the branch to its state at a point in time.
    pub fn rollback_to_timestamp(
        &self,
        branch: &BranchName,
        at: DateTime<Utc>,
        mode: RollbackMode,
        author: &Signature,
        override_dependencies: bool,
    ) -> RollbackResult<RollbackOutcome> {
        if at > Utc::now() {
            return Err(RollbackError::Validation(format!(
                "timestamp {} is in the future",
                at.to_rfc3339()
            )));
        }

        let head = self.repo.resolve_branch(branch)?;
        let (historical, unwound) = self.commit_at_or_before(head, at)?;

        let current_snapshot = self.repo.snapshot_at(head)?;
        let historical_snapshot = self.repo.snapshot_at(historical)?;
        let changes = inverse::invert_to_state(&current_snapshot, &historical_snapshot);

        let merge_commits = unwound.iter().filter(|c| c.1).map(|c| c.0).collect();
        let inverse = InverseChangeset {
            changes,
            commits: unwound.iter().map(|c| c.0).collect(),
            overlaps: Vec::new(),
            merge_commits,
        };
        let message = CommitMessage::rollback(
            "to-timestamp",
            &format!("{} on {}", at.to_rfc3339(), branch),
        );

        self.run(
            branch,
            RollbackKind::ToTimestamp,
            mode,
            author,
            override_dependencies,
            Some(historical),
            Some(head),
            inverse,
            Vec::new(),
            message,
        )
    }

    /// Scoped revert: only the named objects change, everything else
    /// keeps its current state. Unknown names are skipped, not fatal.
    pub fn undo_changes(
        &self,
        branch: &BranchName,
        objects: &[QualifiedName],
        scope: UndoScope,
        mode: RollbackMode,
        author: &Signature,
        override_dependencies: bool,
    ) -> RollbackResult<RollbackOutcome> {
        let (full, source_commit, target_commit) = match scope {
            UndoScope::Commit(commit) => {
                let inv = inverse::invert_commit(self.repo, commit).map_err(map_validation)?;
                (inv, Some(commit), None)
            }
            UndoScope::TimeRange(from_t, to_t) => {
                if from_t >= to_t {
                    return Err(RollbackError::Validation(
                        "time range start must precede its end".to_string(),
                    ));
                }
                let head = self.repo.resolve_branch(branch)?;
                let (start_commit, _) = self.commit_at_or_before(head, from_t)?;
                let (end_commit, _) = self.commit_at_or_before(head, to_t)?;

                let end_snapshot = self.repo.snapshot_at(end_commit)?;
                let start_snapshot = self.repo.snapshot_at(start_commit)?;
                let changes = inverse::invert_to_state(&end_snapshot, &start_snapshot);

                (
                    InverseChangeset {
                        changes,
                        commits: Vec::new(),
                        overlaps: Vec::new(),
                        merge_commits: Vec::new(),
                    },
                    Some(start_commit),
                    Some(end_commit),
                )
            }
        };

        // restrict to the named objects; report names that matched nothing
        let mut scoped = full.clone();
        scoped
            .changes
            .retain(|path, _| objects.contains(&path.qualified));

        let mut extra_findings = Vec::new();
        for name in objects {
            let touched = full.changes.keys().any(|p| &p.qualified == name);
            if !touched {
                extra_findings.push(Finding {
                    severity: FindingSeverity::Info,
                    code: FindingCode::UnknownObjectSkipped,
                    object: None,
                    message: format!("{} matched no change in the undo scope; skipped", name),
                });
            }
        }

        let names: Vec<String> = objects.iter().map(|q| q.to_string()).collect();
        let message = CommitMessage::rollback("undo", &format!("[{}] on {}", names.join(", "), branch));

        self.run(
            branch,
            RollbackKind::Undo,
            mode,
            author,
            override_dependencies,
            source_commit,
            target_commit,
            scoped,
            extra_findings,
            message,
        )
    }

    /// Validate without running any operation (pre-flight).
    pub fn validate_rollback(
        &self,
        branch: &BranchName,
        commit: CommitId,
    ) -> RollbackResult<Vec<Finding>> {
        let head = self.repo.resolve_branch(branch)?;
        let snapshot = self.repo.snapshot_at(head)?;
        let inverse = inverse::invert_commit(self.repo, commit).map_err(map_validation)?;
        Ok(validation::validate_inverse(&snapshot, &inverse, self.deps))
    }

    // ==================== shared pipeline ====================

    #[allow(clippy::too_many_arguments)]
    fn run(
        &self,
        branch: &BranchName,
        kind: RollbackKind,
        mode: RollbackMode,
        author: &Signature,
        override_dependencies: bool,
        source_commit: Option<CommitId>,
        target_commit: Option<CommitId>,
        inverse: InverseChangeset,
        extra_findings: Vec<Finding>,
        message: String,
    ) -> RollbackResult<RollbackOutcome> {
        let started = Instant::now();
        let started_at = Utc::now().to_rfc3339();
        let id = Ulid::new().to_string().to_lowercase();

        let head = self.repo.resolve_branch(branch)?;
        let snapshot = self.repo.snapshot_at(head)?;

        // drop entries that already match the live state; what's left
        // is what the rollback actually changes
        let mut effective = inverse;
        effective
            .changes
            .retain(|path, restored| snapshot.get(path).copied() != *restored);

        let mut findings = validation::validate_inverse(&snapshot, &effective, self.deps);
        findings.extend(extra_findings);
        findings.sort_by(|a, b| b.severity.cmp(&a.severity));

        let breaking = findings.iter().filter(|f| f.severity.is_blocking()).count();
        let blocked = validation::has_blocking(&findings) && !override_dependencies;
        let objects_affected = effective.changes.len();
        let overlaps_resolved = effective.overlaps.len();

        debug!(
            kind = kind.as_str(),
            mode = mode.as_str(),
            objects_affected,
            breaking,
            "rollback validated"
        );

        if !mode.mutates() {
            let status = if blocked {
                RollbackStatus::Blocked
            } else {
                RollbackStatus::Success
            };
            self.record(
                &id, branch, kind, mode, status, source_commit, target_commit, None,
                objects_affected, breaking, &message, &started_at,
            )?;
            return Ok(outcome(
                id, kind, mode, status, None, objects_affected, breaking, overlaps_resolved,
                findings, started, message,
            ));
        }

        if blocked {
            self.record(
                &id, branch, kind, mode, RollbackStatus::Blocked, source_commit, target_commit,
                None, objects_affected, breaking, &message, &started_at,
            )?;
            return Err(RollbackError::DependencyViolation { findings });
        }

        let rollback_commit = if objects_affected == 0 {
            // nothing differs from the live state; appending an empty
            // commit would only add noise
            None
        } else {
            let commit =
                self.repo
                    .commit_changes(branch, head, &effective.changes, &message, author)?;
            Some(commit)
        };

        self.record(
            &id, branch, kind, mode, RollbackStatus::Success, source_commit, target_commit,
            rollback_commit, objects_affected, breaking, &message, &started_at,
        )?;

        info!(
            id = %id,
            kind = kind.as_str(),
            commit = rollback_commit.map(|c| c.short()).unwrap_or_default(),
            objects_affected,
            "rollback executed"
        );

        Ok(outcome(
            id, kind, mode, RollbackStatus::Success, rollback_commit, objects_affected, breaking,
            overlaps_resolved, findings, started, message,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        id: &str,
        branch: &BranchName,
        kind: RollbackKind,
        mode: RollbackMode,
        status: RollbackStatus,
        source_commit: Option<CommitId>,
        target_commit: Option<CommitId>,
        rollback_commit: Option<CommitId>,
        objects_affected: usize,
        breaking: usize,
        message: &str,
        started_at: &str,
    ) -> RollbackResult<()> {
        self.ledger.insert_rollback_operation(&RollbackOperationRow {
            id: id.to_string(),
            branch: branch.to_string(),
            kind: kind.as_str().to_string(),
            mode: mode.as_str().to_string(),
            status: status.as_str().to_string(),
            source_commit: source_commit.map(|c| c.to_string()),
            target_commit: target_commit.map(|c| c.to_string()),
            rollback_commit: rollback_commit.map(|c| c.to_string()),
            objects_affected: objects_affected as i64,
            breaking_changes_count: breaking as i64,
            message: message.to_string(),
            started_at: started_at.to_string(),
            completed_at: Some(Utc::now().to_rfc3339()),
        })?;
        Ok(())
    }

    /// Walk first parents from `head` to the newest commit at or
    /// before `at`. Returns that commit plus the (id, is_merge) list
    /// of commits newer than `at` that a rollback would unwind.
    fn commit_at_or_before(
        &self,
        head: CommitId,
        at: DateTime<Utc>,
    ) -> RollbackResult<(CommitId, Vec<(CommitId, bool)>)> {
        let mut unwound = Vec::new();
        let mut cursor = head;

        for _ in 0..self.config.max_traversal_depth {
            let info = self.repo.get_commit(cursor)?;
            if info.timestamp <= at {
                return Ok((cursor, unwound));
            }
            unwound.push((info.id, info.is_merge()));
            match info.first_parent() {
                Some(parent) => cursor = parent,
                None => {
                    return Err(RollbackError::Validation(format!(
                        "timestamp {} precedes the branch's first commit",
                        at.to_rfc3339()
                    )))
                }
            }
        }

        Err(RollbackError::Validation(format!(
            "no commit at or before {} within {} commits",
            at.to_rfc3339(),
            self.config.max_traversal_depth
        )))
    }
}

#[allow(clippy::too_many_arguments)]
fn outcome(
    id: String,
    kind: RollbackKind,
    mode: RollbackMode,
    status: RollbackStatus,
    rollback_commit: Option<CommitId>,
    objects_affected: usize,
    breaking: usize,
    overlaps_resolved: usize,
    findings: Vec<Finding>,
    started: Instant,
    message: String,
) -> RollbackOutcome {
    RollbackOutcome {
        id,
        kind,
        mode,
        status,
        rollback_commit,
        objects_affected,
        breaking_changes: breaking,
        overlaps_resolved,
        findings,
        elapsed_ms: started.elapsed().as_millis() as u64,
        message,
    }
}

fn map_validation(e: StorageError) -> RollbackError {
    match e {
        StorageError::Validation(msg) => RollbackError::Validation(msg),
        other => RollbackError::Storage(other),
    }
}
