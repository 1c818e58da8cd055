//! Merge-base (lowest common ancestor) discovery.
//!
//! A simultaneous breadth-first walk up both parent chains, recording
//! the depth at which each commit is first seen from each side. The
//! merge base is the commit seen from both sides with minimal combined
//! depth; ties break toward the side walked first (the source).
//!
//! The walk is depth-bounded. Disjoint histories never fail here:
//! they fall back to the configured default root with
//! `no_common_ancestor = true`, and the caller decides what that means.

use std::collections::HashMap;

use git2::{Oid, Repository};
use tracing::{debug, warn};

use crate::storage::{CommitId, StorageError, StorageResult};

/// Result of a merge-base search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeBase {
    pub base: CommitId,
    /// parent-chain distance from the source commit to the base
    pub source_depth: u32,
    /// parent-chain distance from the target commit to the base
    pub target_depth: u32,
    /// true when the two histories share no ancestor and `base` is the
    /// configured fallback root
    pub no_common_ancestor: bool,
}

/// Bounded dual-walk merge-base finder.
pub struct MergeBaseFinder {
    max_depth: u32,
    /// fallback base for disjoint histories
    default_root: CommitId,
}

struct Candidate {
    oid: Oid,
    source_depth: u32,
    target_depth: u32,
    visit_order: usize,
}

impl MergeBaseFinder {
    pub fn new(max_depth: u32, default_root: CommitId) -> Self {
        Self {
            max_depth,
            default_root,
        }
    }

    /// Find the merge base of `source` and `target`.
    pub fn find(
        &self,
        repo: &Repository,
        source: CommitId,
        target: CommitId,
    ) -> StorageResult<MergeBase> {
        // identical commits are their own base at depth 0
        if source == target {
            return Ok(MergeBase {
                base: source,
                source_depth: 0,
                target_depth: 0,
                no_common_ancestor: false,
            });
        }

        // both walks start at depth 0
        let mut seen_source: HashMap<Oid, u32> = HashMap::from([(source.raw(), 0)]);
        let mut seen_target: HashMap<Oid, u32> = HashMap::from([(target.raw(), 0)]);
        let mut frontier_source = vec![source.raw()];
        let mut frontier_target = vec![target.raw()];

        let mut candidates: Vec<Candidate> = Vec::new();
        let mut visit_order = 0usize;
        let mut depth = 0u32;
        // once a candidate appears, one extra level catches ties
        let mut levels_after_hit = 0u8;

        while depth < self.max_depth
            && (!frontier_source.is_empty() || !frontier_target.is_empty())
        {
            depth += 1;

            frontier_source = expand_level(
                repo,
                &frontier_source,
                depth,
                &mut seen_source,
                &seen_target,
                &mut candidates,
                &mut visit_order,
                Side::Source,
            )?;
            frontier_target = expand_level(
                repo,
                &frontier_target,
                depth,
                &mut seen_target,
                &seen_source,
                &mut candidates,
                &mut visit_order,
                Side::Target,
            )?;

            if !candidates.is_empty() {
                if levels_after_hit >= 1 {
                    break;
                }
                levels_after_hit += 1;
            }
        }

        if let Some(best) = pick_best(&candidates) {
            debug!(
                base = %CommitId::new(best.oid).short(),
                source_depth = best.source_depth,
                target_depth = best.target_depth,
                "merge base found"
            );
            return Ok(MergeBase {
                base: CommitId::new(best.oid),
                source_depth: best.source_depth,
                target_depth: best.target_depth,
                no_common_ancestor: false,
            });
        }

        if depth >= self.max_depth {
            warn!(
                max_depth = self.max_depth,
                "merge-base search hit the traversal bound; treating histories as unrelated"
            );
        } else {
            debug!("histories are disjoint; falling back to default root");
        }

        Ok(MergeBase {
            base: self.default_root,
            source_depth: 0,
            target_depth: 0,
            no_common_ancestor: true,
        })
    }
}

#[derive(Clone, Copy)]
enum Side {
    Source,
    Target,
}

/// Expand one BFS level for one side, recording any commit already
/// seen by the other side as a candidate.
#[allow(clippy::too_many_arguments)]
fn expand_level(
    repo: &Repository,
    frontier: &[Oid],
    depth: u32,
    seen_ours: &mut HashMap<Oid, u32>,
    seen_theirs: &HashMap<Oid, u32>,
    candidates: &mut Vec<Candidate>,
    visit_order: &mut usize,
    side: Side,
) -> StorageResult<Vec<Oid>> {
    let mut next = Vec::new();

    for oid in frontier {
        let commit = repo
            .find_commit(*oid)
            .map_err(|_| StorageError::CommitNotFound(oid.to_string()))?;

        for parent in commit.parent_ids() {
            if seen_ours.contains_key(&parent) {
                continue;
            }
            seen_ours.insert(parent, depth);
            *visit_order += 1;

            if let Some(their_depth) = seen_theirs.get(&parent) {
                let (source_depth, target_depth) = match side {
                    Side::Source => (depth, *their_depth),
                    Side::Target => (*their_depth, depth),
                };
                candidates.push(Candidate {
                    oid: parent,
                    source_depth,
                    target_depth,
                    visit_order: *visit_order,
                });
            }

            next.push(parent);
        }
    }

    Ok(next)
}

/// minimal combined depth; ties break toward the source side, then
/// toward the earlier-visited commit
fn pick_best(candidates: &[Candidate]) -> Option<&Candidate> {
    candidates.iter().min_by_key(|c| {
        (
            c.source_depth + c.target_depth,
            c.source_depth,
            c.visit_order,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{BranchName, ChangeSet, ObjectKind, ObjectPath, QualifiedName, SchemaRepository, Signature};
    use tempfile::TempDir;

    fn setup() -> (TempDir, SchemaRepository) {
        let dir = TempDir::new().unwrap();
        let repo = SchemaRepository::init(dir.path()).unwrap();
        (dir, repo)
    }

    fn add_commit(repo: &SchemaRepository, branch: &BranchName, name: &str) -> CommitId {
        let head = repo.resolve_branch(branch).unwrap();
        let blob = repo.put_blob(&format!("CREATE TABLE {} (id INT);", name)).unwrap();
        let mut changes = ChangeSet::new();
        changes.insert(
            ObjectPath::new(QualifiedName::new("public", name).unwrap(), ObjectKind::Table),
            Some(blob),
        );
        repo.commit_changes(branch, head, &changes, name, &Signature::engine())
            .unwrap()
    }

    fn finder(repo: &SchemaRepository) -> (MergeBaseFinder, CommitId) {
        let root = repo.resolve_branch(&BranchName::main()).unwrap();
        (MergeBaseFinder::new(1000, root), root)
    }

    #[test]
    fn test_same_commit_is_own_base() {
        let (_dir, repo) = setup();
        let head = repo.head().unwrap();
        let (finder, _) = finder(&repo);

        let base = repo
            .with_repo(|r| finder.find(r, head, head))
            .unwrap();
        assert_eq!(base.base, head);
        assert_eq!(base.source_depth, 0);
        assert_eq!(base.target_depth, 0);
        assert!(!base.no_common_ancestor);
    }

    #[test]
    fn test_linear_history_ancestor_is_base() {
        // A -> B -> C -> D; branches at C and D => base is C
        let (_dir, repo) = setup();
        let main = BranchName::main();
        add_commit(&repo, &main, "a");
        add_commit(&repo, &main, "b");
        let c = add_commit(&repo, &main, "c");
        let d = add_commit(&repo, &main, "d");

        let (finder, _) = finder(&repo);
        let base = repo.with_repo(|r| finder.find(r, c, d)).unwrap();
        assert_eq!(base.base, c);
        assert_eq!(base.source_depth, 0);
        assert_eq!(base.target_depth, 1);
        assert!(!base.no_common_ancestor);
    }

    #[test]
    fn test_forked_branches_share_fork_point() {
        let (_dir, repo) = setup();
        let main = BranchName::main();
        let fork = add_commit(&repo, &main, "shared");

        let feature = BranchName::new("feature").unwrap();
        repo.create_branch(&feature, fork).unwrap();

        let f1 = add_commit(&repo, &feature, "feature_work");
        let m1 = add_commit(&repo, &main, "main_work");

        let (finder, _) = finder(&repo);
        let base = repo.with_repo(|r| finder.find(r, f1, m1)).unwrap();
        assert_eq!(base.base, fork);
        assert_eq!(base.source_depth, 1);
        assert_eq!(base.target_depth, 1);
        assert!(!base.no_common_ancestor);
    }

    #[test]
    fn test_shared_root_only() {
        // two branches whose only shared history is the root commit
        let (_dir, repo) = setup();
        let main = BranchName::main();
        let root = repo.resolve_branch(&main).unwrap();

        let left = BranchName::new("left").unwrap();
        let right = BranchName::new("right").unwrap();
        repo.create_branch(&left, root).unwrap();
        repo.create_branch(&right, root).unwrap();

        let l = add_commit(&repo, &left, "l");
        let r_head = add_commit(&repo, &right, "r");

        let (finder, _) = finder(&repo);
        let base = repo.with_repo(|r| finder.find(r, l, r_head)).unwrap();
        assert_eq!(base.base, root);
        assert!(!base.no_common_ancestor);
    }

    #[test]
    fn test_depth_bound_falls_back() {
        let (_dir, repo) = setup();
        let main = BranchName::main();
        let root = repo.resolve_branch(&main).unwrap();

        let feature = BranchName::new("feature").unwrap();
        repo.create_branch(&feature, root).unwrap();

        // push both branches further apart than the bound allows
        for i in 0..4 {
            add_commit(&repo, &main, &format!("m{}", i));
            add_commit(&repo, &feature, &format!("f{}", i));
        }
        let m = repo.resolve_branch(&main).unwrap();
        let f = repo.resolve_branch(&feature).unwrap();

        let bounded = MergeBaseFinder::new(2, root);
        let base = repo.with_repo(|r| bounded.find(r, f, m)).unwrap();
        assert!(base.no_common_ancestor);
        assert_eq!(base.base, root);

        // a generous bound finds the real fork point
        let unbounded = MergeBaseFinder::new(100, root);
        let base = repo.with_repo(|r| unbounded.find(r, f, m)).unwrap();
        assert!(!base.no_common_ancestor);
        assert_eq!(base.base, root);
    }
}
