//! Manual conflict resolution and merge finalization.
//!
//! Recording a resolution does not finalize anything: resolutions
//! accumulate per conflict, and a separate finalize step checks that
//! every conflict of the merge is settled before performing the §4.5
//! commit creation.

use tracing::{debug, info};

use crate::config::VcsConfig;
use crate::ddl;
use crate::ledger::{Ledger, LedgerError};
use crate::storage::{
    BlobId, BranchName, ChangeSet, CommitId, CommitMessage, ObjectPath, SchemaRepository, Signature,
};

use super::error::{MergeError, MergeResult};
use super::executor::{MergeOutcome, MergeStatus};

/// Which side (or custom content) settles a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionChoice {
    Source,
    Target,
    Custom,
}

impl ResolutionChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionChoice::Source => "source",
            ResolutionChoice::Target => "target",
            ResolutionChoice::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "source" => Some(ResolutionChoice::Source),
            "target" => Some(ResolutionChoice::Target),
            "custom" => Some(ResolutionChoice::Custom),
            _ => None,
        }
    }
}

/// Resolution recording and merge finalization.
pub struct ConflictResolver<'a> {
    repo: &'a SchemaRepository,
    ledger: &'a Ledger,
    config: &'a VcsConfig,
}

impl<'a> ConflictResolver<'a> {
    pub fn new(repo: &'a SchemaRepository, ledger: &'a Ledger, config: &'a VcsConfig) -> Self {
        Self {
            repo,
            ledger,
            config,
        }
    }

    /// Record a resolution decision for one conflict.
    ///
    /// Custom resolutions must carry a classifiable definition.
    /// Re-resolving a settled conflict fails with AlreadyResolved.
    pub fn resolve(
        &self,
        conflict_id: &str,
        choice: ResolutionChoice,
        custom: Option<&str>,
        resolved_by: Option<&str>,
    ) -> MergeResult<()> {
        let row = self
            .ledger
            .get_conflict(conflict_id)?
            .ok_or_else(|| MergeError::ConflictNotFound(conflict_id.to_string()))?;

        let custom_definition = match choice {
            ResolutionChoice::Custom => {
                let text = custom.ok_or_else(|| {
                    MergeError::Validation("custom resolution requires a definition".to_string())
                })?;
                ddl::parse_strict(text, &self.config.default_schema)
                    .map_err(|e| MergeError::Validation(format!("custom resolution: {}", e)))?;
                Some(text)
            }
            _ => {
                if custom.is_some() {
                    return Err(MergeError::Validation(
                        "custom definition only applies to the custom choice".to_string(),
                    ));
                }
                None
            }
        };

        self.ledger
            .mark_conflict_resolved(
                conflict_id,
                "resolved",
                choice.as_str(),
                custom_definition,
                resolved_by,
            )
            .map_err(|e| match e {
                LedgerError::AlreadyResolved(id) => MergeError::AlreadyResolved(id),
                other => MergeError::Ledger(other),
            })?;

        info!(conflict_id, merge_id = %row.merge_id, choice = choice.as_str(), "conflict resolution recorded");
        Ok(())
    }

    /// Finalize a conflicted merge once every conflict is settled.
    ///
    /// Builds the resolved tree, creates the two-parent merge commit,
    /// and CAS-advances the target branch. A target that moved since
    /// the merge attempt surfaces as ConcurrentModification — re-merge
    /// against the new head in that case.
    pub fn finalize(&self, merge_id: &str, author: &Signature) -> MergeResult<MergeOutcome> {
        let op = self
            .ledger
            .get_merge_operation(merge_id)?
            .ok_or_else(|| MergeError::MergeNotFound(merge_id.to_string()))?;

        if op.status != "conflict" {
            return Err(MergeError::Validation(format!(
                "merge {} is not awaiting resolution (status: {})",
                merge_id, op.status
            )));
        }

        let open = self.ledger.open_conflict_count(merge_id)?;
        if open > 0 {
            return Err(MergeError::UnresolvedConflicts {
                merge_id: merge_id.to_string(),
                open,
            });
        }

        let source_head = parse_commit(&op.source_commit)?;
        let target_head = parse_commit(&op.target_commit)?;
        let target_branch = BranchName::new(op.target_branch.clone())
            .map_err(|e| MergeError::Validation(format!("bad target branch in record: {}", e)))?;

        // assemble the resolved changeset relative to the target tree
        let rows = self.ledger.list_conflicts(merge_id)?;
        let mut changes = ChangeSet::new();
        for row in &rows {
            let path = ObjectPath::parse(&row.path).ok_or_else(|| {
                MergeError::Validation(format!("bad path in conflict record: {}", row.path))
            })?;

            let winner: Option<BlobId> = match row.resolution.as_deref() {
                Some("source") => parse_blob(row.source_hash.as_deref())?,
                Some("target") => parse_blob(row.target_hash.as_deref())?,
                Some("custom") => {
                    let text = row.custom_definition.as_deref().ok_or_else(|| {
                        MergeError::Validation(format!(
                            "conflict {} resolved custom without a definition",
                            row.id
                        ))
                    })?;
                    Some(self.repo.put_blob(text)?)
                }
                other => {
                    return Err(MergeError::Validation(format!(
                        "conflict {} has unusable resolution {:?}",
                        row.id, other
                    )))
                }
            };

            let target_current = parse_blob(row.target_hash.as_deref())?;
            if winner != target_current {
                changes.insert(path, winner);
            }
        }

        let tree = self.repo.build_tree(target_head, &changes)?;
        let message = if op.message.is_empty() {
            CommitMessage::merge(&op.source_branch, &op.target_branch, "resolved")
        } else {
            op.message.clone()
        };
        let merge_commit =
            self.repo
                .commit_tree(tree, vec![target_head, source_head], &message, author)?;

        self.repo
            .advance_ref(&target_branch, target_head, merge_commit)?;

        let detected = rows.len();
        self.ledger.update_merge_outcome(
            merge_id,
            "success",
            detected as i64,
            detected as i64,
            Some(&merge_commit.to_string()),
        )?;

        debug!(merge_id, commit = %merge_commit.short(), "merge finalized");
        Ok(MergeOutcome {
            id: merge_id.to_string(),
            status: MergeStatus::Success,
            merge_base: op.merge_base.as_deref().map(parse_commit).transpose()?,
            no_common_ancestor: op.no_common_ancestor,
            conflicts_detected: detected,
            conflicts_resolved: detected,
            result_commit: Some(merge_commit),
            message,
        })
    }
}

fn parse_commit(hex: &str) -> MergeResult<CommitId> {
    CommitId::from_hex(hex)
        .map_err(|_| MergeError::Validation(format!("bad commit hash in record: {}", hex)))
}

fn parse_blob(hex: Option<&str>) -> MergeResult<Option<BlobId>> {
    match hex {
        None => Ok(None),
        Some(h) => BlobId::from_hex(h)
            .map(Some)
            .map_err(|_| MergeError::Validation(format!("bad blob hash in record: {}", h))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::executor::{MergeExecutor, MergeRequest, MergeStrategy};
    use crate::storage::{ObjectKind, QualifiedName};
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

        fn set_object(&self, branch: &BranchName, dotted: &str, ddl: &str) -> CommitId {
            let head = self.repo.resolve_branch(branch).unwrap();
            let blob = self.repo.put_blob(ddl).unwrap();
            let mut changes = ChangeSet::new();
            changes.insert(
                ObjectPath::new(QualifiedName::parse(dotted).unwrap(), ObjectKind::Table),
                Some(blob),
            );
            self.repo
                .commit_changes(branch, head, &changes, dotted, &Signature::engine())
                .unwrap()
        }

        /// diverge public.a on feature vs main, run a UNION merge, and
        /// return the conflicted merge id plus its single conflict id
        fn conflicted_merge(&self) -> (String, String) {
            let main = BranchName::main();
            let fork = self.set_object(&main, "public.a", "CREATE TABLE a (v1 INT);");

            let feature = BranchName::new("feature").unwrap();
            self.repo.create_branch(&feature, fork).unwrap();
            self.set_object(&feature, "public.a", "CREATE TABLE a (v2 INT);");
            self.set_object(&main, "public.a", "CREATE TABLE a (v3 INT);");

            let executor = MergeExecutor::new(&self.repo, &self.ledger, &self.config);
            let outcome = executor
                .merge(&MergeRequest {
                    source: feature,
                    target: main,
                    strategy: MergeStrategy::Union,
                    message: String::new(),
                    author: Signature::engine(),
                    allow_unrelated: false,
                })
                .unwrap();
            assert_eq!(outcome.status, MergeStatus::Conflict);

            let conflicts = self.ledger.list_conflicts(&outcome.id).unwrap();
            assert_eq!(conflicts.len(), 1);
            (outcome.id, conflicts[0].id.clone())
        }

        fn resolver(&self) -> ConflictResolver<'_> {
            ConflictResolver::new(&self.repo, &self.ledger, &self.config)
        }

        fn main_definition(&self, dotted: &str) -> Option<String> {
            let head = self.repo.resolve_branch(&BranchName::main()).unwrap();
            self.repo
                .definition_at(
                    &ObjectPath::new(QualifiedName::parse(dotted).unwrap(), ObjectKind::Table),
                    head,
                )
                .unwrap()
        }
    }

    #[test]
    fn test_resolve_then_finalize_source() {
        let fx = Fixture::new();
        let (merge_id, conflict_id) = fx.conflicted_merge();
        let resolver = fx.resolver();

        resolver
            .resolve(&conflict_id, ResolutionChoice::Source, None, Some("alice"))
            .unwrap();
        let outcome = resolver.finalize(&merge_id, &Signature::engine()).unwrap();

        assert_eq!(outcome.status, MergeStatus::Success);
        assert_eq!(
            fx.main_definition("public.a").unwrap(),
            "CREATE TABLE a (v2 INT);\n"
        );

        let info = fx.repo.get_commit(outcome.result_commit.unwrap()).unwrap();
        assert_eq!(info.parent_ids.len(), 2);
    }

    #[test]
    fn test_finalize_custom_resolution() {
        let fx = Fixture::new();
        let (merge_id, conflict_id) = fx.conflicted_merge();
        let resolver = fx.resolver();

        resolver
            .resolve(
                &conflict_id,
                ResolutionChoice::Custom,
                Some("CREATE TABLE a (v2 INT, v3 INT);"),
                Some("bob"),
            )
            .unwrap();
        resolver.finalize(&merge_id, &Signature::engine()).unwrap();

        assert_eq!(
            fx.main_definition("public.a").unwrap(),
            "CREATE TABLE a (v2 INT, v3 INT);\n"
        );
    }

    #[test]
    fn test_custom_requires_valid_definition() {
        let fx = Fixture::new();
        let (_merge_id, conflict_id) = fx.conflicted_merge();
        let resolver = fx.resolver();

        let empty = resolver.resolve(&conflict_id, ResolutionChoice::Custom, Some("   "), None);
        assert!(matches!(empty, Err(MergeError::Validation(_))));

        let garbage = resolver.resolve(&conflict_id, ResolutionChoice::Custom, Some("not ddl"), None);
        assert!(matches!(garbage, Err(MergeError::Validation(_))));

        // conflict is still open after rejected attempts
        resolver
            .resolve(&conflict_id, ResolutionChoice::Target, None, None)
            .unwrap();
    }

    #[test]
    fn test_double_resolution_fails() {
        let fx = Fixture::new();
        let (_merge_id, conflict_id) = fx.conflicted_merge();
        let resolver = fx.resolver();

        resolver
            .resolve(&conflict_id, ResolutionChoice::Source, None, None)
            .unwrap();
        let again = resolver.resolve(&conflict_id, ResolutionChoice::Source, None, None);
        assert!(matches!(again, Err(MergeError::AlreadyResolved(_))));
    }

    #[test]
    fn test_finalize_with_open_conflicts_fails() {
        let fx = Fixture::new();
        let (merge_id, _conflict_id) = fx.conflicted_merge();
        let resolver = fx.resolver();

        let result = resolver.finalize(&merge_id, &Signature::engine());
        assert!(matches!(result, Err(MergeError::UnresolvedConflicts { open: 1, .. })));
    }

    #[test]
    fn test_finalize_unknown_merge_fails() {
        let fx = Fixture::new();
        let result = fx.resolver().finalize("ghost", &Signature::engine());
        assert!(matches!(result, Err(MergeError::MergeNotFound(_))));
    }

    #[test]
    fn test_finalize_after_target_moved_loses_cas() {
        let fx = Fixture::new();
        let (merge_id, conflict_id) = fx.conflicted_merge();
        let resolver = fx.resolver();

        resolver
            .resolve(&conflict_id, ResolutionChoice::Source, None, None)
            .unwrap();

        // target moves on independently before finalize
        fx.set_object(&BranchName::main(), "public.z", "CREATE TABLE z (id INT);");

        let result = resolver.finalize(&merge_id, &Signature::engine());
        assert!(matches!(result, Err(MergeError::Storage(e)) if e.is_retriable()));
    }
}
