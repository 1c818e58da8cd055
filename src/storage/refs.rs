//! Branch and reference management.
//!
//! Git refs are pointers to commits. This module handles:
//! - branch lifecycle (create, CAS update, delete)
//! - tag creation and resolution
//! - protected-ref enforcement
//!
//! The only mutation primitive upper layers are allowed to use is
//! `update_if_unchanged` — a compare-and-swap. A plain force update
//! exists but is reserved for branch creation bootstrap.

use git2::{BranchType, Repository};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{BranchName, CommitId, RefInfo, RefKind};

/// Manages Git references (branches and tags).
pub struct RefManager;

impl RefManager {
    /// Resolve a branch name to its current commit ID.
    pub fn resolve_branch(repo: &Repository, branch: &BranchName) -> StorageResult<CommitId> {
        let reference = repo
            .find_reference(&branch.as_ref_path())
            .map_err(|_| StorageError::RefNotFound(branch.to_string()))?;

        let commit = reference
            .peel_to_commit()
            .map_err(|_| StorageError::RefNotFound(branch.to_string()))?;

        Ok(CommitId::new(commit.id()))
    }

    /// Get the current HEAD commit (usually main branch).
    pub fn head_commit(repo: &Repository) -> StorageResult<CommitId> {
        let head = repo.head().map_err(|e| {
            if e.code() == git2::ErrorCode::UnbornBranch {
                StorageError::EmptyRepository
            } else {
                StorageError::Git(e)
            }
        })?;

        let commit = head.peel_to_commit()?;
        Ok(CommitId::new(commit.id()))
    }

    /// Check if a branch exists.
    pub fn branch_exists(repo: &Repository, branch: &BranchName) -> bool {
        repo.find_reference(&branch.as_ref_path()).is_ok()
    }

    /// Create a new branch pointing to the given commit.
    pub fn create_branch(repo: &Repository, branch: &BranchName, target: CommitId) -> StorageResult<()> {
        if Self::branch_exists(repo, branch) {
            return Err(StorageError::RefAlreadyExists(branch.to_string()));
        }

        let commit = repo
            .find_commit(target.raw())
            .map_err(|_| StorageError::CommitNotFound(target.to_string()))?;
        repo.branch(branch.as_str(), &commit, false)?;

        Ok(())
    }

    /// Update a branch only if it still points to the expected commit.
    ///
    /// This is the compare-and-swap every mutating operation goes
    /// through. A losing writer gets ConcurrentModification and must
    /// re-read the new head and retry; no lock is held across requests.
    pub fn update_if_unchanged(
        repo: &Repository,
        branch: &BranchName,
        expected: CommitId,
        new_target: CommitId,
    ) -> StorageResult<()> {
        let current = Self::resolve_branch(repo, branch)?;

        if current != expected {
            return Err(StorageError::ConcurrentModification {
                name: branch.to_string(),
                expected: expected.short(),
            });
        }

        let mut reference = repo
            .find_reference(&branch.as_ref_path())
            .map_err(|_| StorageError::RefNotFound(branch.to_string()))?;
        reference.set_target(new_target.raw(), &format!("advance to {}", new_target.short()))?;

        Ok(())
    }

    /// Delete a branch.
    ///
    /// Refuses to delete names in `protected` unless `force` is set.
    pub fn delete_branch(
        repo: &Repository,
        branch: &BranchName,
        protected: &[String],
        force: bool,
    ) -> StorageResult<()> {
        if !force && protected.iter().any(|p| p == branch.as_str()) {
            return Err(StorageError::ProtectedRef(branch.to_string()));
        }

        let mut git_branch = repo
            .find_branch(branch.as_str(), BranchType::Local)
            .map_err(|_| StorageError::RefNotFound(branch.to_string()))?;

        git_branch.delete()?;

        Ok(())
    }

    /// List all branches.
    pub fn list_branches(repo: &Repository) -> StorageResult<Vec<RefInfo>> {
        let branches = repo.branches(Some(BranchType::Local))?;

        let mut result = Vec::new();
        for branch_result in branches {
            let (branch, _) = branch_result?;
            let name = match branch.name()? {
                Some(n) => n.to_string(),
                None => continue,
            };
            let target = match branch.get().peel_to_commit() {
                Ok(c) => CommitId::new(c.id()),
                Err(_) => continue,
            };
            result.push(RefInfo {
                name,
                kind: RefKind::Branch,
                target,
            });
        }

        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    /// Create a lightweight tag at the given commit.
    pub fn create_tag(repo: &Repository, name: &str, target: CommitId) -> StorageResult<()> {
        let refname = format!("refs/tags/{}", name);
        if repo.find_reference(&refname).is_ok() {
            return Err(StorageError::RefAlreadyExists(name.to_string()));
        }

        let object = repo
            .find_object(target.raw(), None)
            .map_err(|_| StorageError::CommitNotFound(target.to_string()))?;
        repo.tag_lightweight(name, &object, false)?;
        Ok(())
    }

    /// Resolve a tag name to its commit.
    pub fn resolve_tag(repo: &Repository, name: &str) -> StorageResult<CommitId> {
        let refname = format!("refs/tags/{}", name);
        let reference = repo
            .find_reference(&refname)
            .map_err(|_| StorageError::RefNotFound(name.to_string()))?;
        let commit = reference
            .peel_to_commit()
            .map_err(|_| StorageError::RefNotFound(name.to_string()))?;
        Ok(CommitId::new(commit.id()))
    }

    /// Initialize the main branch if it doesn't exist.
    ///
    /// This should be called after creating the initial commit.
    /// Also ensures HEAD points to main.
    pub fn init_main_branch(repo: &Repository, initial_commit: CommitId) -> StorageResult<()> {
        let main = BranchName::main();

        if !Self::branch_exists(repo, &main) {
            Self::create_branch(repo, &main, initial_commit)?;
        }

        repo.set_head(&main.as_ref_path())?;

        Ok(())
    }
}
