//! The top-level engine handle.
//!
//! `SchemaVcs` wires the repository, the operation ledger, the
//! dependency graph, and the configuration into one facade exposing
//! the external interface: ingest, commit, branch, merge, rollback,
//! and dependency queries.
//!
//! There is no ambient "current branch": every mutating call takes an
//! explicit [`WorkContext`], so concurrent sessions on different
//! branches cannot trample each other's state.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{ConfigError, VcsConfig};
use crate::ddl;
use crate::deps::{Dependency, DependencyGraph};
use crate::ledger::{Ledger, LedgerError};
use crate::merge::{
    ConflictResolver, MergeBase, MergeError, MergeExecutor, MergeOutcome, MergeRequest,
    MergeStrategy, PathDiff, ResolutionChoice,
};
use crate::rollback::{
    Finding, RollbackEngine, RollbackError, RollbackMode, RollbackOutcome, UndoScope,
};
use crate::storage::{
    BlobId, BranchName, ChangeSet, CommitId, CommitInfo, CommitMessage, InvalidNameError,
    ObjectKind, ObjectPath, QualifiedName, RefInfo, SchemaRepository, Signature, StorageError,
};

/// Unified error type for facade calls.
#[derive(Debug, Error)]
pub enum VcsError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Rollback(#[from] RollbackError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid name: {0}")]
    InvalidName(#[from] InvalidNameError),

    #[error("validation error: {0}")]
    Validation(String),
}

pub type VcsResult<T> = Result<T, VcsError>;

/// Explicit per-call context: which branch, which author.
#[derive(Debug, Clone)]
pub struct WorkContext {
    pub branch: BranchName,
    pub author: Signature,
}

impl WorkContext {
    pub fn new(branch: BranchName, author: Signature) -> Self {
        Self { branch, author }
    }

    /// context on main with the engine signature
    pub fn main() -> Self {
        Self::new(BranchName::main(), Signature::engine())
    }
}

/// The engine facade.
pub struct SchemaVcs {
    repo: SchemaRepository,
    ledger: Ledger,
    config: VcsConfig,
    /// dependency graph of the default root branch, maintained at
    /// commit time
    deps: RwLock<DependencyGraph>,
    /// staged changes per branch, consumed by commit()
    pending: Mutex<HashMap<String, ChangeSet>>,
}

impl SchemaVcs {
    /// Open (or initialize) an engine rooted at `path`.
    ///
    /// The object store lives in `path/.git`, the operation ledger in
    /// `path/schemagit.db`.
    pub fn open(path: impl AsRef<Path>, config: VcsConfig) -> VcsResult<Self> {
        let path = path.as_ref();
        let repo = SchemaRepository::open_or_init(path)?;
        let ledger = Ledger::open(path.join("schemagit.db"))?;

        let vcs = Self {
            repo,
            ledger,
            config,
            deps: RwLock::new(DependencyGraph::new()),
            pending: Mutex::new(HashMap::new()),
        };
        vcs.rebuild_dependency_graph()?;
        Ok(vcs)
    }

    pub fn config(&self) -> &VcsConfig {
        &self.config
    }

    pub fn repository(&self) -> &SchemaRepository {
        &self.repo
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    // ==================== Ingest & Commit ====================

    /// Record one observed schema change into the staging area for
    /// `ctx.branch`. A `None` definition records a deletion.
    ///
    /// Returns the content hash for upserts, None for deletions.
    pub fn record_change(
        &self,
        ctx: &WorkContext,
        schema: &str,
        name: &str,
        kind: ObjectKind,
        definition: Option<&str>,
    ) -> VcsResult<Option<BlobId>> {
        let qualified = QualifiedName::new(schema, name)?;
        let path = ObjectPath::new(qualified, kind);

        let blob = match definition {
            Some(text) => {
                if text.trim().is_empty() {
                    return Err(VcsError::Validation(format!(
                        "empty definition for {}",
                        path.qualified
                    )));
                }
                Some(self.repo.put_blob(text)?)
            }
            None => None,
        };

        let mut pending = lock_pending(&self.pending);
        pending
            .entry(ctx.branch.to_string())
            .or_default()
            .insert(path.clone(), blob);
        debug!(branch = %ctx.branch, path = %path, deletion = blob.is_none(), "change staged");

        Ok(blob)
    }

    /// Commit everything staged for `ctx.branch`.
    ///
    /// On a CAS loss the staged set is kept so the caller can retry
    /// against the new head.
    pub fn commit(&self, ctx: &WorkContext, message: &str) -> VcsResult<CommitId> {
        let changes = {
            let pending = lock_pending(&self.pending);
            match pending.get(ctx.branch.as_str()) {
                Some(c) if !c.is_empty() => c.clone(),
                _ => {
                    return Err(VcsError::Validation(format!(
                        "no staged changes on branch {}",
                        ctx.branch
                    )))
                }
            }
        };

        let head = self.repo.resolve_branch(&ctx.branch)?;
        let message = if message.is_empty() {
            CommitMessage::change(&format!("{} object(s)", changes.len()))
        } else {
            message.to_string()
        };
        let commit = self
            .repo
            .commit_changes(&ctx.branch, head, &changes, &message, &ctx.author)?;

        // success: clear the staged set and fold the changes into the
        // dependency graph when they land on the tracked branch
        lock_pending(&self.pending).remove(ctx.branch.as_str());
        if ctx.branch.as_str() == self.config.default_root_ref {
            let mut deps = self.deps.write();
            for (path, blob) in &changes {
                match blob {
                    Some(id) => {
                        let definition = self.repo.get_blob(*id)?;
                        deps.apply_statement(&ddl::classify(&definition, &self.config.default_schema));
                    }
                    None => deps.remove_object(&path.qualified),
                }
            }
        }

        info!(branch = %ctx.branch, commit = %commit.short(), "changeset committed");
        Ok(commit)
    }

    /// Discard everything staged for a branch.
    pub fn discard_staged(&self, branch: &BranchName) {
        lock_pending(&self.pending).remove(branch.as_str());
    }

    // ==================== Branches ====================

    pub fn create_branch(&self, name: &BranchName, at: CommitId) -> VcsResult<()> {
        self.repo.create_branch(name, at)?;
        Ok(())
    }

    pub fn list_branches(&self) -> VcsResult<Vec<RefInfo>> {
        Ok(self.repo.list_branches()?)
    }

    pub fn delete_branch(&self, name: &BranchName, force: bool) -> VcsResult<()> {
        self.repo
            .delete_branch(name, &self.config.protected_branches, force)?;
        Ok(())
    }

    pub fn resolve_head(&self, branch: &BranchName) -> VcsResult<CommitId> {
        Ok(self.repo.resolve_branch(branch)?)
    }

    /// Pin a name to a commit. Tags never move.
    pub fn create_tag(&self, name: &str, at: CommitId) -> VcsResult<()> {
        self.repo.create_tag(name, at)?;
        Ok(())
    }

    pub fn history(&self, branch: &BranchName, limit: Option<usize>) -> VcsResult<Vec<CommitInfo>> {
        let head = self.repo.resolve_branch(branch)?;
        Ok(self.repo.history(head, limit)?)
    }

    // ==================== Merge ====================

    /// Find the merge base of two commits.
    pub fn find_merge_base(&self, a: CommitId, b: CommitId) -> VcsResult<MergeBase> {
        let executor = MergeExecutor::new(&self.repo, &self.ledger, &self.config);
        Ok(executor.find_merge_base(a, b)?)
    }

    /// Classify conflicts between two branch heads without mutating
    /// anything. `base` overrides merge-base discovery.
    pub fn detect_conflicts(
        &self,
        source: &BranchName,
        target: &BranchName,
        base: Option<CommitId>,
    ) -> VcsResult<Vec<PathDiff>> {
        let source_head = self.repo.resolve_branch(source)?;
        let target_head = self.repo.resolve_branch(target)?;
        let executor = MergeExecutor::new(&self.repo, &self.ledger, &self.config);
        Ok(executor.detect_conflicts(source_head, target_head, base)?)
    }

    /// Merge `source` into `target` under a strategy.
    pub fn merge(
        &self,
        source: &BranchName,
        target: &BranchName,
        strategy: MergeStrategy,
        message: &str,
        author: &Signature,
    ) -> VcsResult<MergeOutcome> {
        self.merge_with_options(source, target, strategy, message, author, false)
    }

    /// Merge with the unrelated-histories escape hatch.
    pub fn merge_with_options(
        &self,
        source: &BranchName,
        target: &BranchName,
        strategy: MergeStrategy,
        message: &str,
        author: &Signature,
        allow_unrelated: bool,
    ) -> VcsResult<MergeOutcome> {
        let executor = MergeExecutor::new(&self.repo, &self.ledger, &self.config);
        let outcome = executor.merge(&MergeRequest {
            source: source.clone(),
            target: target.clone(),
            strategy,
            message: message.to_string(),
            author: author.clone(),
            allow_unrelated,
        })?;

        if outcome.result_commit.is_some() && target.as_str() == self.config.default_root_ref {
            self.rebuild_dependency_graph()?;
        }
        Ok(outcome)
    }

    /// Record a manual resolution for one conflict.
    pub fn resolve_conflict(
        &self,
        conflict_id: &str,
        choice: ResolutionChoice,
        custom: Option<&str>,
        resolved_by: Option<&str>,
    ) -> VcsResult<()> {
        let resolver = ConflictResolver::new(&self.repo, &self.ledger, &self.config);
        resolver.resolve(conflict_id, choice, custom, resolved_by)?;
        Ok(())
    }

    /// Finalize a fully resolved merge.
    pub fn finalize_merge(&self, merge_id: &str, author: &Signature) -> VcsResult<MergeOutcome> {
        let resolver = ConflictResolver::new(&self.repo, &self.ledger, &self.config);
        let outcome = resolver.finalize(merge_id, author)?;
        self.rebuild_dependency_graph()?;
        Ok(outcome)
    }

    // ==================== Rollback ====================

    /// Pre-flight validation of a single-commit rollback.
    pub fn validate_rollback(
        &self,
        branch: &BranchName,
        commit: CommitId,
    ) -> VcsResult<Vec<Finding>> {
        let deps = self.graph_for_branch(branch)?;
        let engine = RollbackEngine::new(&self.repo, &self.ledger, &deps, &self.config);
        Ok(engine.validate_rollback(branch, commit)?)
    }

    pub fn rollback_commit(
        &self,
        ctx: &WorkContext,
        commit: CommitId,
        mode: RollbackMode,
        override_dependencies: bool,
    ) -> VcsResult<RollbackOutcome> {
        let deps = self.graph_for_branch(&ctx.branch)?;
        let engine = RollbackEngine::new(&self.repo, &self.ledger, &deps, &self.config);
        let outcome =
            engine.rollback_commit(&ctx.branch, commit, mode, &ctx.author, override_dependencies)?;
        self.refresh_after_rollback(&ctx.branch, &outcome)?;
        Ok(outcome)
    }

    pub fn rollback_range(
        &self,
        ctx: &WorkContext,
        from: CommitId,
        to: CommitId,
        mode: RollbackMode,
        override_dependencies: bool,
    ) -> VcsResult<RollbackOutcome> {
        let deps = self.graph_for_branch(&ctx.branch)?;
        let engine = RollbackEngine::new(&self.repo, &self.ledger, &deps, &self.config);
        let outcome =
            engine.rollback_range(&ctx.branch, from, to, mode, &ctx.author, override_dependencies)?;
        self.refresh_after_rollback(&ctx.branch, &outcome)?;
        Ok(outcome)
    }

    pub fn rollback_to_timestamp(
        &self,
        ctx: &WorkContext,
        at: DateTime<Utc>,
        mode: RollbackMode,
        override_dependencies: bool,
    ) -> VcsResult<RollbackOutcome> {
        let deps = self.graph_for_branch(&ctx.branch)?;
        let engine = RollbackEngine::new(&self.repo, &self.ledger, &deps, &self.config);
        let outcome =
            engine.rollback_to_timestamp(&ctx.branch, at, mode, &ctx.author, override_dependencies)?;
        self.refresh_after_rollback(&ctx.branch, &outcome)?;
        Ok(outcome)
    }

    pub fn undo_changes(
        &self,
        ctx: &WorkContext,
        objects: &[QualifiedName],
        scope: UndoScope,
        mode: RollbackMode,
        override_dependencies: bool,
    ) -> VcsResult<RollbackOutcome> {
        let deps = self.graph_for_branch(&ctx.branch)?;
        let engine = RollbackEngine::new(&self.repo, &self.ledger, &deps, &self.config);
        let outcome = engine.undo_changes(
            &ctx.branch,
            objects,
            scope,
            mode,
            &ctx.author,
            override_dependencies,
        )?;
        self.refresh_after_rollback(&ctx.branch, &outcome)?;
        Ok(outcome)
    }

    // ==================== Dependencies ====================

    /// Everything the named object depends on.
    pub fn dependencies_of(&self, name: &QualifiedName) -> Vec<Dependency> {
        self.deps.read().dependencies_of(name)
    }

    /// Everything depending on the named object.
    pub fn dependents_of(&self, name: &QualifiedName) -> Vec<Dependency> {
        self.deps.read().dependents_of(name)
    }

    /// Record an edge the DDL grammar cannot see (CALLS, USES,
    /// COMPOSED_OF relationships).
    pub fn record_dependency(&self, dep: Dependency) {
        self.deps.write().record(dep);
    }

    // ==================== internals ====================

    /// Rebuild the tracked-branch dependency graph from its snapshot.
    fn rebuild_dependency_graph(&self) -> VcsResult<()> {
        let branch = BranchName::new(self.config.default_root_ref.clone())?;
        let graph = self.build_graph_from_branch(&branch)?;
        *self.deps.write() = graph;
        Ok(())
    }

    /// Graph over the branch's own head snapshot, so rollback
    /// validation is correct even off the tracked branch.
    fn graph_for_branch(&self, branch: &BranchName) -> VcsResult<DependencyGraph> {
        self.build_graph_from_branch(branch)
    }

    fn build_graph_from_branch(&self, branch: &BranchName) -> VcsResult<DependencyGraph> {
        let head = self.repo.resolve_branch(branch)?;
        let snapshot = self.repo.snapshot_at(head)?;

        let mut graph = DependencyGraph::new();
        for blob in snapshot.values() {
            let definition = self.repo.get_blob(*blob)?;
            graph.apply_statement(&ddl::classify(&definition, &self.config.default_schema));
        }
        Ok(graph)
    }

    fn refresh_after_rollback(
        &self,
        branch: &BranchName,
        outcome: &RollbackOutcome,
    ) -> VcsResult<()> {
        if outcome.rollback_commit.is_some() && branch.as_str() == self.config.default_root_ref {
            self.rebuild_dependency_graph()?;
        }
        Ok(())
    }
}

fn lock_pending(
    pending: &Mutex<HashMap<String, ChangeSet>>,
) -> std::sync::MutexGuard<'_, HashMap<String, ChangeSet>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::DependencyKind;
    use crate::merge::MergeStatus;
    use crate::rollback::RollbackStatus;
    use tempfile::TempDir;

    fn setup() -> (TempDir, SchemaVcs) {
        let dir = TempDir::new().unwrap();
        let vcs = SchemaVcs::open(dir.path(), VcsConfig::default()).unwrap();
        (dir, vcs)
    }

    fn record_and_commit(vcs: &SchemaVcs, ctx: &WorkContext, name: &str, ddl: &str) -> CommitId {
        vcs.record_change(ctx, "public", name, ObjectKind::Table, Some(ddl))
            .unwrap();
        vcs.commit(ctx, "").unwrap()
    }

    #[test]
    fn test_record_commit_read_back() {
        let (_dir, vcs) = setup();
        let ctx = WorkContext::main();

        let blob = vcs
            .record_change(
                &ctx,
                "public",
                "orders",
                ObjectKind::Table,
                Some("CREATE TABLE orders (id INT);"),
            )
            .unwrap();
        assert!(blob.is_some());

        let commit = vcs.commit(&ctx, "add orders").unwrap();
        assert_eq!(vcs.resolve_head(&ctx.branch).unwrap(), commit);

        // committing again with nothing staged fails
        assert!(matches!(vcs.commit(&ctx, "again"), Err(VcsError::Validation(_))));
    }

    #[test]
    fn test_record_deletion() {
        let (_dir, vcs) = setup();
        let ctx = WorkContext::main();
        record_and_commit(&vcs, &ctx, "orders", "CREATE TABLE orders (id INT);");

        let blob = vcs
            .record_change(&ctx, "public", "orders", ObjectKind::Table, None)
            .unwrap();
        assert!(blob.is_none());
        let head = vcs.commit(&ctx, "drop orders").unwrap();

        let snapshot = vcs.repository().snapshot_at(head).unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_empty_definition_rejected() {
        let (_dir, vcs) = setup();
        let ctx = WorkContext::main();
        let result = vcs.record_change(&ctx, "public", "orders", ObjectKind::Table, Some("  "));
        assert!(matches!(result, Err(VcsError::Validation(_))));
    }

    #[test]
    fn test_branch_lifecycle_and_protection() {
        let (_dir, vcs) = setup();
        let head = vcs.resolve_head(&BranchName::main()).unwrap();

        let feature = BranchName::new("feature").unwrap();
        vcs.create_branch(&feature, head).unwrap();
        assert_eq!(vcs.list_branches().unwrap().len(), 2);

        // protected main refuses deletion without force
        let refused = vcs.delete_branch(&BranchName::main(), false);
        assert!(matches!(
            refused,
            Err(VcsError::Storage(StorageError::ProtectedRef(_)))
        ));

        vcs.delete_branch(&feature, false).unwrap();
        assert_eq!(vcs.list_branches().unwrap().len(), 1);
    }

    #[test]
    fn test_merge_scenario_end_to_end() {
        let (_dir, vcs) = setup();
        let main_ctx = WorkContext::main();
        let fork = record_and_commit(&vcs, &main_ctx, "a", "CREATE TABLE a (v1 INT);");

        let feature = BranchName::new("feature").unwrap();
        vcs.create_branch(&feature, fork).unwrap();
        let feature_ctx = WorkContext::new(feature.clone(), Signature::new("dev", "dev@x"));

        record_and_commit(&vcs, &feature_ctx, "a", "CREATE TABLE a (v2 INT);");
        record_and_commit(&vcs, &main_ctx, "a", "CREATE TABLE a (v3 INT);");

        // conflict detection sees one BOTH_MODIFIED row
        let conflicts = vcs.detect_conflicts(&feature, &BranchName::main(), None).unwrap();
        assert_eq!(conflicts.len(), 1);
        assert!(!conflicts[0].auto_resolvable());

        // source-wins merge lands v2 with a two-parent commit
        let outcome = vcs
            .merge(
                &feature,
                &BranchName::main(),
                MergeStrategy::SourceWins,
                "merge feature",
                &Signature::engine(),
            )
            .unwrap();
        assert_eq!(outcome.status, MergeStatus::Success);

        let info = vcs
            .repository()
            .get_commit(outcome.result_commit.unwrap())
            .unwrap();
        assert_eq!(info.parent_ids.len(), 2);
    }

    #[test]
    fn test_merge_base_linear_history() {
        let (_dir, vcs) = setup();
        let ctx = WorkContext::main();
        record_and_commit(&vcs, &ctx, "a", "CREATE TABLE a (id INT);");
        let c = record_and_commit(&vcs, &ctx, "b", "CREATE TABLE b (id INT);");
        let d = record_and_commit(&vcs, &ctx, "c", "CREATE TABLE c (id INT);");

        let base = vcs.find_merge_base(c, d).unwrap();
        assert_eq!(base.base, c);
        assert!(!base.no_common_ancestor);
    }

    #[test]
    fn test_resolve_and_finalize_conflict() {
        let (_dir, vcs) = setup();
        let main_ctx = WorkContext::main();
        let fork = record_and_commit(&vcs, &main_ctx, "a", "CREATE TABLE a (v1 INT);");

        let feature = BranchName::new("feature").unwrap();
        vcs.create_branch(&feature, fork).unwrap();
        let feature_ctx = WorkContext::new(feature.clone(), Signature::engine());

        record_and_commit(&vcs, &feature_ctx, "a", "CREATE TABLE a (v2 INT);");
        record_and_commit(&vcs, &main_ctx, "a", "CREATE TABLE a (v3 INT);");

        let outcome = vcs
            .merge(
                &feature,
                &BranchName::main(),
                MergeStrategy::ManualReview,
                "",
                &Signature::engine(),
            )
            .unwrap();
        assert_eq!(outcome.status, MergeStatus::Conflict);

        let conflicts = vcs.ledger().list_conflicts(&outcome.id).unwrap();
        assert_eq!(conflicts.len(), 1);

        vcs.resolve_conflict(&conflicts[0].id, ResolutionChoice::Source, None, Some("alice"))
            .unwrap();
        let finalized = vcs.finalize_merge(&outcome.id, &Signature::engine()).unwrap();
        assert_eq!(finalized.status, MergeStatus::Success);
    }

    #[test]
    fn test_rollback_through_facade() {
        let (_dir, vcs) = setup();
        let ctx = WorkContext::main();
        record_and_commit(&vcs, &ctx, "t", "CREATE TABLE t (a INT);");
        let x = record_and_commit(&vcs, &ctx, "t", "CREATE TABLE t (a INT, b INT);");

        let outcome = vcs
            .rollback_commit(&ctx, x, RollbackMode::Executed, false)
            .unwrap();
        assert_eq!(outcome.status, RollbackStatus::Success);

        let head = vcs.resolve_head(&ctx.branch).unwrap();
        let def = vcs
            .repository()
            .definition_at(
                &ObjectPath::new(QualifiedName::parse("public.t").unwrap(), ObjectKind::Table),
                head,
            )
            .unwrap();
        assert_eq!(def.unwrap(), "CREATE TABLE t (a INT);\n");
    }

    #[test]
    fn test_dependency_graph_maintained_at_commit_time() {
        let (_dir, vcs) = setup();
        let ctx = WorkContext::main();

        record_and_commit(&vcs, &ctx, "customers", "CREATE TABLE customers (id INT PRIMARY KEY);");
        record_and_commit(
            &vcs,
            &ctx,
            "orders",
            "CREATE TABLE orders (id INT, customer_id INT REFERENCES customers(id));",
        );

        let customers = QualifiedName::parse("public.customers").unwrap();
        let dependents = vcs.dependents_of(&customers);
        assert_eq!(dependents.len(), 1);
        assert_eq!(dependents[0].kind, DependencyKind::ForeignKey);

        let orders = QualifiedName::parse("public.orders").unwrap();
        assert_eq!(vcs.dependencies_of(&orders).len(), 1);
    }

    #[test]
    fn test_rollback_blocked_by_dependency() {
        let (_dir, vcs) = setup();
        let ctx = WorkContext::main();

        let drop_target =
            record_and_commit(&vcs, &ctx, "customers", "CREATE TABLE customers (id INT PRIMARY KEY);");
        record_and_commit(
            &vcs,
            &ctx,
            "orders",
            "CREATE TABLE orders (id INT, customer_id INT REFERENCES customers(id));",
        );

        // undoing the customers creation would orphan orders' FK
        let findings = vcs.validate_rollback(&ctx.branch, drop_target).unwrap();
        assert!(findings.iter().any(|f| f.severity.is_blocking()));

        let refused = vcs.rollback_commit(&ctx, drop_target, RollbackMode::Executed, false);
        assert!(matches!(
            refused,
            Err(VcsError::Rollback(RollbackError::DependencyViolation { .. }))
        ));
    }
}
