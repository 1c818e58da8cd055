//! Core Git repository wrapper.
//!
//! This is the central component of the storage layer. It wraps
//! `git2::Repository` with thread-safe access and provides the
//! high-level operations the merge and rollback engines use.
//!
//! All other storage modules go through this for Git access; nothing
//! above the storage layer touches git2 directly.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use git2::Repository;
use parking_lot::RwLock;
use tracing::debug;

use crate::storage::blob;
use crate::storage::commit::{self, CommitBuilder, CommitInfo};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::refs::RefManager;
use crate::storage::tree::TreeMutator;
use crate::storage::types::{
    BlobId, BranchName, Change, CommitId, ObjectPath, RefInfo, Signature, TreeId,
};

/// A staged set of object changes: `Some(blob)` upserts, `None` deletes.
pub type ChangeSet = BTreeMap<ObjectPath, Option<BlobId>>;

/// The main repository wrapper.
///
/// Provides thread-safe access to all Git operations.
/// Clone this to share across threads - it uses Arc internally.
#[derive(Clone)]
pub struct SchemaRepository {
    inner: Arc<SchemaRepositoryInner>,
}

struct SchemaRepositoryInner {
    repo: RwLock<Repository>,
    path: PathBuf,
}

impl SchemaRepository {
    /// Open an existing repository.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let repo = Repository::open(path)
            .map_err(|_| StorageError::NotInitialized(path.display().to_string()))?;

        Ok(Self {
            inner: Arc::new(SchemaRepositoryInner {
                repo: RwLock::new(repo),
                path: path.to_path_buf(),
            }),
        })
    }

    /// Initialize a new repository with an empty root commit on main.
    pub fn init(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let repo = Repository::init(path)?;

        let storage = Self {
            inner: Arc::new(SchemaRepositoryInner {
                repo: RwLock::new(repo),
                path: path.to_path_buf(),
            }),
        };

        storage.with_repo_mut(|repo| {
            let commit_id = commit::create_initial_commit(repo, &Signature::engine())?;
            RefManager::init_main_branch(repo, commit_id)?;
            Ok(())
        })?;

        Ok(storage)
    }

    /// Open or initialize a repository.
    pub fn open_or_init(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if path.join(".git").exists() {
            Self::open(path)
        } else {
            Self::init(path)
        }
    }

    /// Get the repository path.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Execute a function with read access to the repository.
    pub fn with_repo<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Repository) -> StorageResult<T>,
    {
        let repo = self.inner.repo.read();
        f(&repo)
    }

    /// Execute a function with write access to the repository.
    pub fn with_repo_mut<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Repository) -> StorageResult<T>,
    {
        let repo = self.inner.repo.write();
        f(&repo)
    }

    // ==================== Object Store ====================

    /// Store a normalized definition blob. Deterministic and idempotent.
    pub fn put_blob(&self, definition: &str) -> StorageResult<BlobId> {
        self.with_repo_mut(|repo| blob::write_definition(repo, definition))
    }

    /// Read a definition blob back.
    pub fn get_blob(&self, id: BlobId) -> StorageResult<String> {
        self.with_repo(|repo| blob::read_definition(repo, id))
    }

    /// Get information about a commit.
    pub fn get_commit(&self, id: CommitId) -> StorageResult<CommitInfo> {
        self.with_repo(|repo| commit::get_commit(repo, id))
    }

    /// Get the full (path -> blob) snapshot at a commit.
    pub fn snapshot_at(&self, at: CommitId) -> StorageResult<BTreeMap<ObjectPath, BlobId>> {
        self.with_repo(|repo| {
            let tree = commit::get_tree_at_commit(repo, at)?;
            tree.entries(repo)
        })
    }

    /// Read one object's definition at a commit, if present.
    pub fn definition_at(
        &self,
        path: &ObjectPath,
        at: CommitId,
    ) -> StorageResult<Option<String>> {
        self.with_repo(|repo| {
            let tree = commit::get_tree_at_commit(repo, at)?;
            match tree.get_object(repo, path)? {
                Some(id) => Ok(Some(blob::read_definition(repo, id)?)),
                None => Ok(None),
            }
        })
    }

    // ==================== Commit Operations ====================

    /// Apply a changeset on top of a base commit's tree, producing a new tree.
    pub fn build_tree(&self, base: CommitId, changes: &ChangeSet) -> StorageResult<TreeId> {
        self.with_repo_mut(|repo| {
            let tree = commit::get_tree_at_commit(repo, base)?;
            let mut mutator = TreeMutator::from_tree(repo, &tree)?;
            mutator.apply(changes)?;
            mutator.write()
        })
    }

    /// Create a commit from an already-built tree.
    pub fn commit_tree(
        &self,
        tree_id: TreeId,
        parents: Vec<CommitId>,
        message: &str,
        author: &Signature,
    ) -> StorageResult<CommitId> {
        self.with_repo_mut(|repo| {
            CommitBuilder::new(repo)
                .tree(tree_id)
                .parents(parents)
                .message(message)
                .signature(author.clone())
                .commit()
        })
    }

    /// Commit a changeset onto a branch head and CAS-advance the branch.
    ///
    /// `expected_head` is the head the caller read before staging; if the
    /// branch moved since, the CAS fails and nothing is committed to the ref.
    pub fn commit_changes(
        &self,
        branch: &BranchName,
        expected_head: CommitId,
        changes: &ChangeSet,
        message: &str,
        author: &Signature,
    ) -> StorageResult<CommitId> {
        self.with_repo_mut(|repo| {
            let tree = commit::get_tree_at_commit(repo, expected_head)?;
            let mut mutator = TreeMutator::from_tree(repo, &tree)?;
            mutator.apply(changes)?;
            let tree_id = mutator.write()?;

            let new_commit = CommitBuilder::new(repo)
                .tree(tree_id)
                .parent(expected_head)
                .message(message)
                .signature(author.clone())
                .commit()?;

            RefManager::update_if_unchanged(repo, branch, expected_head, new_commit)?;
            debug!(branch = %branch, commit = %new_commit.short(), "committed changeset");
            Ok(new_commit)
        })
    }

    /// Advance a branch ref via compare-and-swap.
    pub fn advance_ref(
        &self,
        branch: &BranchName,
        expected: CommitId,
        new_target: CommitId,
    ) -> StorageResult<()> {
        self.with_repo_mut(|repo| RefManager::update_if_unchanged(repo, branch, expected, new_target))
    }

    // ==================== Branch Operations ====================

    /// Get the current HEAD commit (tip of main branch).
    pub fn head(&self) -> StorageResult<CommitId> {
        self.with_repo(|repo| RefManager::head_commit(repo))
    }

    /// Get the commit ID for a branch.
    pub fn resolve_branch(&self, branch: &BranchName) -> StorageResult<CommitId> {
        self.with_repo(|repo| RefManager::resolve_branch(repo, branch))
    }

    /// Create a new branch at the given commit.
    pub fn create_branch(&self, branch: &BranchName, at: CommitId) -> StorageResult<()> {
        self.with_repo_mut(|repo| RefManager::create_branch(repo, branch, at))
    }

    /// Delete a branch, honoring the protected list unless forced.
    pub fn delete_branch(
        &self,
        branch: &BranchName,
        protected: &[String],
        force: bool,
    ) -> StorageResult<()> {
        self.with_repo_mut(|repo| RefManager::delete_branch(repo, branch, protected, force))
    }

    /// Check if a branch exists.
    pub fn branch_exists(&self, branch: &BranchName) -> StorageResult<bool> {
        self.with_repo(|repo| Ok(RefManager::branch_exists(repo, branch)))
    }

    /// List all branches with their targets.
    pub fn list_branches(&self) -> StorageResult<Vec<RefInfo>> {
        self.with_repo(|repo| RefManager::list_branches(repo))
    }

    /// Create a lightweight tag.
    pub fn create_tag(&self, name: &str, at: CommitId) -> StorageResult<()> {
        self.with_repo_mut(|repo| RefManager::create_tag(repo, name, at))
    }

    // ==================== History ====================

    /// Get commit history starting at a commit, newest first.
    pub fn history(&self, from: CommitId, limit: Option<usize>) -> StorageResult<Vec<CommitInfo>> {
        self.with_repo(|repo| {
            let iter = commit::history(repo, from)?;
            let commits: Result<Vec<_>, _> = match limit {
                Some(n) => iter.take(n).collect(),
                None => iter.collect(),
            };
            commits
        })
    }

    /// Get the object-level diff between two commits.
    pub fn diff(&self, old: CommitId, new: CommitId) -> StorageResult<Vec<Change>> {
        self.with_repo(|repo| commit::diff_commits(repo, old, new))
    }

    /// Get statistics about the repository.
    pub fn stats(&self, at: CommitId) -> StorageResult<RepositoryStats> {
        self.with_repo(|repo| {
            let tree = commit::get_tree_at_commit(repo, at)?;
            let schemas = tree.list_schemas();
            let objects = tree.count_objects(repo)?;
            let branches = RefManager::list_branches(repo)?;

            Ok(RepositoryStats {
                schema_count: schemas.len(),
                object_count: objects,
                branch_count: branches.len(),
            })
        })
    }
}

/// Statistics about the repository.
#[derive(Debug, Clone)]
pub struct RepositoryStats {
    pub schema_count: usize,
    pub object_count: usize,
    pub branch_count: usize,
}

impl std::fmt::Display for RepositoryStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Repository Statistics:")?;
        writeln!(f, "  Schemas: {}", self.schema_count)?;
        writeln!(f, "  Objects: {}", self.object_count)?;
        writeln!(f, "  Branches: {}", self.branch_count)
    }
}
