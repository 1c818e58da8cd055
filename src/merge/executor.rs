//! Strategy-driven merge execution.
//!
//! The executor ties the pieces together: resolve heads, find the
//! merge base, classify the three-way diff, apply the strategy, and
//! either commit a two-parent merge or persist conflicts for manual
//! resolution. Operation state is Pending -> Success | Conflict |
//! Aborted, all terminal.

use chrono::Utc;
use tracing::{debug, info};
use ulid::Ulid;

use crate::config::VcsConfig;
use crate::ledger::{ConflictRow, Ledger, MergeOperationRow};
use crate::storage::{
    BranchName, ChangeSet, CommitId, CommitMessage, SchemaRepository, Signature,
};

use super::ancestry::{MergeBase, MergeBaseFinder};
use super::diff3::{self, Classification, PathDiff};
use super::error::{MergeError, MergeResult};

/// How conflicts are handled during a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// any conflict, even auto-resolvable, blocks the merge
    AbortOnConflict,
    /// the source side wins every conflict; always succeeds
    SourceWins,
    /// the target side wins every conflict; always succeeds
    TargetWins,
    /// auto-resolve what the classifier allows, leave BothModified open
    Union,
    /// never auto-commit; a human signs off even with zero conflicts
    ManualReview,
}

impl MergeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeStrategy::AbortOnConflict => "abort_on_conflict",
            MergeStrategy::SourceWins => "source_wins",
            MergeStrategy::TargetWins => "target_wins",
            MergeStrategy::Union => "union",
            MergeStrategy::ManualReview => "manual_review",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "abort_on_conflict" => MergeStrategy::AbortOnConflict,
            "source_wins" => MergeStrategy::SourceWins,
            "target_wins" => MergeStrategy::TargetWins,
            "union" => MergeStrategy::Union,
            "manual_review" => MergeStrategy::ManualReview,
            _ => return None,
        })
    }
}

impl std::fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal state of a merge operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStatus {
    Pending,
    Success,
    Conflict,
    Aborted,
}

impl MergeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeStatus::Pending => "pending",
            MergeStatus::Success => "success",
            MergeStatus::Conflict => "conflict",
            MergeStatus::Aborted => "aborted",
        }
    }
}

/// A merge request.
#[derive(Debug, Clone)]
pub struct MergeRequest {
    pub source: BranchName,
    pub target: BranchName,
    pub strategy: MergeStrategy,
    pub message: String,
    pub author: Signature,
    /// proceed even when histories share no ancestor (the configured
    /// root becomes the base); off by default so the fallback is an
    /// explicit caller choice
    pub allow_unrelated: bool,
}

/// The outcome of a merge attempt. Conflicts are data, not errors.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub id: String,
    pub status: MergeStatus,
    pub merge_base: Option<CommitId>,
    pub no_common_ancestor: bool,
    pub conflicts_detected: usize,
    pub conflicts_resolved: usize,
    pub result_commit: Option<CommitId>,
    pub message: String,
}

/// Executes merges against one repository + ledger pair.
pub struct MergeExecutor<'a> {
    repo: &'a SchemaRepository,
    ledger: &'a Ledger,
    config: &'a VcsConfig,
}

impl<'a> MergeExecutor<'a> {
    pub fn new(repo: &'a SchemaRepository, ledger: &'a Ledger, config: &'a VcsConfig) -> Self {
        Self {
            repo,
            ledger,
            config,
        }
    }

    /// Find the merge base of two commits, falling back to the
    /// configured root for disjoint histories.
    pub fn find_merge_base(&self, a: CommitId, b: CommitId) -> MergeResult<MergeBase> {
        let root_branch = BranchName::new(self.config.default_root_ref.clone())
            .map_err(|e| MergeError::Validation(format!("bad default_root_ref: {}", e)))?;
        let root = self.repo.resolve_branch(&root_branch)?;
        let finder = MergeBaseFinder::new(self.config.max_traversal_depth, root);
        let base = self.repo.with_repo(|r| finder.find(r, a, b))?;
        Ok(base)
    }

    /// Classify conflicts between two commits without touching refs or
    /// the ledger. `base` defaults to the discovered merge base.
    pub fn detect_conflicts(
        &self,
        source: CommitId,
        target: CommitId,
        base: Option<CommitId>,
    ) -> MergeResult<Vec<PathDiff>> {
        let base_commit = match base {
            Some(b) => b,
            None => self.find_merge_base(source, target)?.base,
        };

        let base_snap = self.repo.snapshot_at(base_commit)?;
        let source_snap = self.repo.snapshot_at(source)?;
        let target_snap = self.repo.snapshot_at(target)?;

        let diffs = diff3::diff_snapshots(&base_snap, &source_snap, &target_snap);
        Ok(diffs
            .into_iter()
            .filter(|d| d.classification.is_conflict())
            .collect())
    }

    /// Perform a merge.
    pub fn merge(&self, request: &MergeRequest) -> MergeResult<MergeOutcome> {
        let source_head = self.repo.resolve_branch(&request.source)?;
        let target_head = self.repo.resolve_branch(&request.target)?;

        info!(
            source = %request.source,
            target = %request.target,
            strategy = %request.strategy,
            "starting merge"
        );

        if source_head == target_head {
            // nothing to reconcile and no commit to create
            let id = new_operation_id();
            let base = MergeBase {
                base: target_head,
                source_depth: 0,
                target_depth: 0,
                no_common_ancestor: false,
            };
            self.insert_operation(&id, request, source_head, target_head, &base, MergeStatus::Aborted)?;
            self.ledger.update_merge_outcome(&id, "aborted", 0, 0, None)?;
            return Ok(MergeOutcome {
                id,
                status: MergeStatus::Aborted,
                merge_base: Some(target_head),
                no_common_ancestor: false,
                conflicts_detected: 0,
                conflicts_resolved: 0,
                result_commit: None,
                message: "source and target heads are identical; nothing to merge".to_string(),
            });
        }

        let base = self.find_merge_base(source_head, target_head)?;

        if base.no_common_ancestor && !request.allow_unrelated {
            let id = new_operation_id();
            self.insert_operation(&id, request, source_head, target_head, &base, MergeStatus::Aborted)?;
            self.ledger.update_merge_outcome(&id, "aborted", 0, 0, None)?;
            return Ok(MergeOutcome {
                id,
                status: MergeStatus::Aborted,
                merge_base: Some(base.base),
                no_common_ancestor: true,
                conflicts_detected: 0,
                conflicts_resolved: 0,
                result_commit: None,
                message: "histories share no common ancestor; pass allow_unrelated to merge \
                          against the configured root"
                    .to_string(),
            });
        }

        let base_snap = self.repo.snapshot_at(base.base)?;
        let source_snap = self.repo.snapshot_at(source_head)?;
        let target_snap = self.repo.snapshot_at(target_head)?;
        let diffs = diff3::diff_snapshots(&base_snap, &source_snap, &target_snap);
        let conflicts: Vec<&PathDiff> =
            diffs.iter().filter(|d| d.classification.is_conflict()).collect();

        // resume the open CONFLICT operation for these exact heads if
        // one exists, so partially resolved conflicts are not recreated
        let merge_id = match self
            .ledger
            .find_conflicted_merge(&source_head.to_string(), &target_head.to_string())?
        {
            Some(row) => {
                debug!(id = %row.id, "resuming conflicted merge");
                row.id
            }
            None => {
                let id = new_operation_id();
                self.insert_operation(&id, request, source_head, target_head, &base, MergeStatus::Pending)?;
                id
            }
        };

        // record any conflict paths not yet in the ledger
        for diff in &conflicts {
            let path = diff.path.to_string();
            if self.ledger.conflict_for_path(&merge_id, &path)?.is_none() {
                self.ledger.insert_conflict(&conflict_row(&merge_id, diff))?;
            }
        }

        match request.strategy {
            MergeStrategy::ManualReview => {
                // explicit sign-off required, even with zero conflicts
                self.finish_conflicted(&merge_id, base, conflicts.len())
            }
            MergeStrategy::AbortOnConflict => {
                if conflicts.is_empty() {
                    self.commit_merge(&merge_id, request, source_head, target_head, base, &diffs, ChangeSet::new())
                } else {
                    self.finish_conflicted(&merge_id, base, conflicts.len())
                }
            }
            MergeStrategy::SourceWins | MergeStrategy::TargetWins => {
                let take_source = request.strategy == MergeStrategy::SourceWins;
                let mut changes = ChangeSet::new();

                for diff in &conflicts {
                    let winner = if take_source { diff.source } else { diff.target };
                    self.auto_resolve_row(
                        &merge_id,
                        diff,
                        if take_source { "source" } else { "target" },
                    )?;
                    if winner != diff.target {
                        changes.insert(diff.path.clone(), winner);
                    }
                }

                self.commit_merge(&merge_id, request, source_head, target_head, base, &diffs, changes)
            }
            MergeStrategy::Union => {
                let mut changes = ChangeSet::new();
                let mut unresolved = 0usize;

                for diff in &conflicts {
                    match diff.auto_resolution() {
                        Some(winner) => {
                            let side = match diff.classification {
                                Classification::SourceModified | Classification::DeletedSource => "source",
                                _ => "target",
                            };
                            self.auto_resolve_row(&merge_id, diff, side)?;
                            if winner != diff.target {
                                changes.insert(diff.path.clone(), winner);
                            }
                        }
                        None => unresolved += 1,
                    }
                }

                if unresolved > 0 {
                    self.finish_conflicted(&merge_id, base, conflicts.len())
                } else {
                    self.commit_merge(&merge_id, request, source_head, target_head, base, &diffs, changes)
                }
            }
        }
    }

    // ==================== internals ====================

    fn insert_operation(
        &self,
        id: &str,
        request: &MergeRequest,
        source_head: CommitId,
        target_head: CommitId,
        base: &MergeBase,
        status: MergeStatus,
    ) -> MergeResult<()> {
        self.ledger.insert_merge_operation(&MergeOperationRow {
            id: id.to_string(),
            source_branch: request.source.to_string(),
            target_branch: request.target.to_string(),
            source_commit: source_head.to_string(),
            target_commit: target_head.to_string(),
            merge_base: Some(base.base.to_string()),
            no_common_ancestor: base.no_common_ancestor,
            strategy: request.strategy.as_str().to_string(),
            status: status.as_str().to_string(),
            conflicts_detected: 0,
            conflicts_resolved: 0,
            result_commit: None,
            message: request.message.clone(),
            started_at: Utc::now().to_rfc3339(),
            completed_at: None,
        })?;
        Ok(())
    }

    /// mark one conflict row auto-resolved, tolerating rows that were
    /// already resolved in an earlier attempt
    fn auto_resolve_row(&self, merge_id: &str, diff: &PathDiff, side: &str) -> MergeResult<()> {
        let path = diff.path.to_string();
        if let Some(row) = self.ledger.conflict_for_path(merge_id, &path)? {
            if row.status == "open" {
                self.ledger
                    .mark_conflict_resolved(&row.id, "auto_resolved", side, None, None)?;
            }
        }
        Ok(())
    }

    fn resolved_count(&self, merge_id: &str) -> MergeResult<usize> {
        let rows = self.ledger.list_conflicts(merge_id)?;
        Ok(rows.iter().filter(|r| r.status != "open").count())
    }

    fn finish_conflicted(
        &self,
        merge_id: &str,
        base: MergeBase,
        detected: usize,
    ) -> MergeResult<MergeOutcome> {
        let resolved = self.resolved_count(merge_id)?;
        self.ledger
            .update_merge_outcome(merge_id, "conflict", detected as i64, resolved as i64, None)?;

        info!(id = %merge_id, detected, resolved, "merge has conflicts awaiting resolution");
        Ok(MergeOutcome {
            id: merge_id.to_string(),
            status: MergeStatus::Conflict,
            merge_base: Some(base.base),
            no_common_ancestor: base.no_common_ancestor,
            conflicts_detected: detected,
            conflicts_resolved: resolved,
            result_commit: None,
            message: format!("{} conflict(s) detected, {} resolved", detected, resolved),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn commit_merge(
        &self,
        merge_id: &str,
        request: &MergeRequest,
        source_head: CommitId,
        target_head: CommitId,
        base: MergeBase,
        diffs: &[PathDiff],
        changes: ChangeSet,
    ) -> MergeResult<MergeOutcome> {
        let detected = diffs.iter().filter(|d| d.classification.is_conflict()).count();
        let resolved = self.resolved_count(merge_id)?;

        let tree = self.repo.build_tree(target_head, &changes)?;
        let message = if request.message.is_empty() {
            CommitMessage::merge(
                request.source.as_str(),
                request.target.as_str(),
                request.strategy.as_str(),
            )
        } else {
            request.message.clone()
        };

        // merge commit parents: [target_head, source_head]
        let merge_commit =
            self.repo
                .commit_tree(tree, vec![target_head, source_head], &message, &request.author)?;

        // CAS-advance the target; a lost race aborts this operation and
        // the caller re-merges against the new head
        if let Err(e) = self
            .repo
            .advance_ref(&request.target, target_head, merge_commit)
        {
            self.ledger
                .update_merge_outcome(merge_id, "aborted", detected as i64, resolved as i64, None)?;
            return Err(e.into());
        }

        self.ledger.update_merge_outcome(
            merge_id,
            "success",
            detected as i64,
            resolved as i64,
            Some(&merge_commit.to_string()),
        )?;

        info!(id = %merge_id, commit = %merge_commit.short(), "merge committed");
        Ok(MergeOutcome {
            id: merge_id.to_string(),
            status: MergeStatus::Success,
            merge_base: Some(base.base),
            no_common_ancestor: base.no_common_ancestor,
            conflicts_detected: detected,
            conflicts_resolved: resolved,
            result_commit: Some(merge_commit),
            message,
        })
    }
}

fn new_operation_id() -> String {
    Ulid::new().to_string().to_lowercase()
}

fn conflict_row(merge_id: &str, diff: &PathDiff) -> ConflictRow {
    ConflictRow {
        id: new_operation_id(),
        merge_id: merge_id.to_string(),
        path: diff.path.to_string(),
        object_type: diff.path.kind.token().to_string(),
        base_hash: diff.base.map(|b| b.to_string()),
        source_hash: diff.source.map(|b| b.to_string()),
        target_hash: diff.target.map(|b| b.to_string()),
        classification: diff.classification.as_str().to_string(),
        severity: diff.severity.as_str().to_string(),
        auto_resolvable: diff.auto_resolvable(),
        status: "open".to_string(),
        resolution: None,
        custom_definition: None,
        resolved_by: None,
        created_at: Utc::now().to_rfc3339(),
        resolved_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ObjectKind, ObjectPath, QualifiedName};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        repo: SchemaRepository,
        ledger: Ledger,
        config: VcsConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            Self {
                repo: SchemaRepository::init(dir.path()).unwrap(),
                ledger: Ledger::in_memory().unwrap(),
                config: VcsConfig::default(),
                _dir: dir,
            }
        }

        fn executor(&self) -> MergeExecutor<'_> {
            MergeExecutor::new(&self.repo, &self.ledger, &self.config)
        }

        fn set_object(&self, branch: &BranchName, dotted: &str, ddl: &str) -> CommitId {
            let head = self.repo.resolve_branch(branch).unwrap();
            let blob = self.repo.put_blob(ddl).unwrap();
            let mut changes = ChangeSet::new();
            changes.insert(
                ObjectPath::new(QualifiedName::parse(dotted).unwrap(), ObjectKind::Table),
                Some(blob),
            );
            self.repo
                .commit_changes(branch, head, &changes, &format!("set {}", dotted), &Signature::engine())
                .unwrap()
        }

        fn definition(&self, branch: &BranchName, dotted: &str) -> Option<String> {
            let head = self.repo.resolve_branch(branch).unwrap();
            self.repo
                .definition_at(
                    &ObjectPath::new(QualifiedName::parse(dotted).unwrap(), ObjectKind::Table),
                    head,
                )
                .unwrap()
        }
    }

    fn request(strategy: MergeStrategy) -> MergeRequest {
        MergeRequest {
            source: BranchName::new("feature").unwrap(),
            target: BranchName::main(),
            strategy,
            message: String::new(),
            author: Signature::engine(),
            allow_unrelated: false,
        }
    }

    /// main has A="v1"; feature forks then sets A="v2"; main sets A="v3"
    fn diverged_fixture() -> Fixture {
        let fx = Fixture::new();
        let main = BranchName::main();
        let fork = fx.set_object(&main, "public.a", "CREATE TABLE a (v1 INT);");

        let feature = BranchName::new("feature").unwrap();
        fx.repo.create_branch(&feature, fork).unwrap();

        fx.set_object(&feature, "public.a", "CREATE TABLE a (v2 INT);");
        fx.set_object(&main, "public.a", "CREATE TABLE a (v3 INT);");
        fx
    }

    #[test]
    fn test_detect_conflicts_both_modified() {
        // Scenario A: one conflict on A, BOTH_MODIFIED, not auto-resolvable
        let fx = diverged_fixture();
        let executor = fx.executor();

        let source = fx.repo.resolve_branch(&BranchName::new("feature").unwrap()).unwrap();
        let target = fx.repo.resolve_branch(&BranchName::main()).unwrap();

        let conflicts = executor.detect_conflicts(source, target, None).unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].path.to_string(), "public/a.table.sql");
        assert_eq!(conflicts[0].classification, Classification::BothModified);
        assert!(!conflicts[0].auto_resolvable());
    }

    #[test]
    fn test_source_wins_merge() {
        // Scenario B: SOURCE_WINS succeeds, tree has v2, commit has two parents
        let fx = diverged_fixture();
        let outcome = fx.executor().merge(&request(MergeStrategy::SourceWins)).unwrap();

        assert_eq!(outcome.status, MergeStatus::Success);
        assert_eq!(outcome.conflicts_detected, 1);
        assert_eq!(outcome.conflicts_resolved, 1);

        let result = outcome.result_commit.unwrap();
        let info = fx.repo.get_commit(result).unwrap();
        assert_eq!(info.parent_ids.len(), 2);

        assert_eq!(
            fx.definition(&BranchName::main(), "public.a").unwrap(),
            "CREATE TABLE a (v2 INT);\n"
        );
    }

    #[test]
    fn test_target_wins_merge() {
        let fx = diverged_fixture();
        let outcome = fx.executor().merge(&request(MergeStrategy::TargetWins)).unwrap();

        assert_eq!(outcome.status, MergeStatus::Success);
        assert_eq!(
            fx.definition(&BranchName::main(), "public.a").unwrap(),
            "CREATE TABLE a (v3 INT);\n"
        );
    }

    #[test]
    fn test_abort_on_conflict() {
        // Scenario C: status CONFLICT, one conflict, no new commit
        let fx = diverged_fixture();
        let main_head_before = fx.repo.resolve_branch(&BranchName::main()).unwrap();

        let outcome = fx.executor().merge(&request(MergeStrategy::AbortOnConflict)).unwrap();
        assert_eq!(outcome.status, MergeStatus::Conflict);
        assert_eq!(outcome.conflicts_detected, 1);
        assert!(outcome.result_commit.is_none());

        // branch did not move
        assert_eq!(
            fx.repo.resolve_branch(&BranchName::main()).unwrap(),
            main_head_before
        );
    }

    #[test]
    fn test_abort_on_conflict_blocks_auto_resolvable_rows() {
        // a one-sided addition is auto-resolvable, but ABORT_ON_CONFLICT
        // blocks on any conflict at all
        let fx = Fixture::new();
        let main = BranchName::main();
        let fork = fx.set_object(&main, "public.a", "CREATE TABLE a (id INT);");

        let feature = BranchName::new("feature").unwrap();
        fx.repo.create_branch(&feature, fork).unwrap();
        fx.set_object(&feature, "public.b", "CREATE TABLE b (id INT);");

        let outcome = fx.executor().merge(&request(MergeStrategy::AbortOnConflict)).unwrap();
        assert_eq!(outcome.status, MergeStatus::Conflict);
        assert!(fx.definition(&main, "public.b").is_none());
    }

    #[test]
    fn test_abort_on_conflict_identical_changes_succeed() {
        // identical adds on both sides classify NO_CONFLICT, so even the
        // strictest strategy commits
        let fx = Fixture::new();
        let main = BranchName::main();
        let fork = fx.set_object(&main, "public.a", "CREATE TABLE a (id INT);");

        let feature = BranchName::new("feature").unwrap();
        fx.repo.create_branch(&feature, fork).unwrap();
        fx.set_object(&feature, "public.b", "CREATE TABLE b (id INT);");
        fx.set_object(&main, "public.b", "CREATE TABLE b (id INT);");

        let outcome = fx.executor().merge(&request(MergeStrategy::AbortOnConflict)).unwrap();
        assert_eq!(outcome.status, MergeStatus::Success);

        let info = fx.repo.get_commit(outcome.result_commit.unwrap()).unwrap();
        assert_eq!(info.parent_ids.len(), 2);
    }

    #[test]
    fn test_union_auto_resolves_one_sided_changes() {
        let fx = Fixture::new();
        let main = BranchName::main();
        let fork = fx.set_object(&main, "public.a", "CREATE TABLE a (id INT);");

        let feature = BranchName::new("feature").unwrap();
        fx.repo.create_branch(&feature, fork).unwrap();

        // source adds b and modifies a; target adds c
        fx.set_object(&feature, "public.b", "CREATE TABLE b (id INT);");
        fx.set_object(&feature, "public.a", "CREATE TABLE a (id BIGINT);");
        fx.set_object(&main, "public.c", "CREATE TABLE c (id INT);");

        let outcome = fx.executor().merge(&request(MergeStrategy::Union)).unwrap();
        assert_eq!(outcome.status, MergeStatus::Success);
        assert_eq!(outcome.conflicts_resolved, outcome.conflicts_detected);

        assert_eq!(
            fx.definition(&main, "public.a").unwrap(),
            "CREATE TABLE a (id BIGINT);\n"
        );
        assert!(fx.definition(&main, "public.b").is_some());
        assert!(fx.definition(&main, "public.c").is_some());
    }

    #[test]
    fn test_union_leaves_both_modified_open() {
        let fx = diverged_fixture();
        let outcome = fx.executor().merge(&request(MergeStrategy::Union)).unwrap();

        assert_eq!(outcome.status, MergeStatus::Conflict);
        assert_eq!(outcome.conflicts_detected, 1);
        assert_eq!(outcome.conflicts_resolved, 0);

        let rows = fx.ledger.list_conflicts(&outcome.id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, "open");
    }

    #[test]
    fn test_manual_review_blocks_even_clean_merges() {
        let fx = Fixture::new();
        let main = BranchName::main();
        let fork = fx.set_object(&main, "public.a", "CREATE TABLE a (id INT);");

        let feature = BranchName::new("feature").unwrap();
        fx.repo.create_branch(&feature, fork).unwrap();
        fx.set_object(&feature, "public.b", "CREATE TABLE b (id INT);");

        let outcome = fx.executor().merge(&request(MergeStrategy::ManualReview)).unwrap();
        assert_eq!(outcome.status, MergeStatus::Conflict);
        assert!(outcome.result_commit.is_none());
    }

    #[test]
    fn test_remerge_does_not_duplicate_conflicts() {
        let fx = diverged_fixture();
        let executor = fx.executor();

        let first = executor.merge(&request(MergeStrategy::Union)).unwrap();
        let second = executor.merge(&request(MergeStrategy::Union)).unwrap();

        // same operation resumed, same single conflict row
        assert_eq!(first.id, second.id);
        assert_eq!(fx.ledger.list_conflicts(&first.id).unwrap().len(), 1);
    }

    #[test]
    fn test_merge_records_operation() {
        let fx = diverged_fixture();
        let outcome = fx.executor().merge(&request(MergeStrategy::SourceWins)).unwrap();

        let row = fx.ledger.get_merge_operation(&outcome.id).unwrap().unwrap();
        assert_eq!(row.status, "success");
        assert_eq!(row.strategy, "source_wins");
        assert_eq!(row.conflicts_detected, 1);
        assert!(row.result_commit.is_some());
        assert!(row.merge_base.is_some());

        // strategy auto-resolutions are individually recorded
        let conflicts = fx.ledger.list_conflicts(&outcome.id).unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].status, "auto_resolved");
        assert_eq!(conflicts[0].resolution.as_deref(), Some("source"));
    }
}
