//! Inverse changeset computation.
//!
//! A rollback never edits history; it computes the changeset that,
//! applied to the current head, reproduces an earlier state for the
//! affected paths. Everything here is read-only.

use std::collections::BTreeMap;

use crate::storage::{
    BlobId, ChangeSet, CommitId, ObjectPath, SchemaRepository, StorageError, StorageResult,
};

/// The computed inverse of one or more commits.
#[derive(Debug, Clone)]
pub struct InverseChangeset {
    /// target state per touched path: Some restores a blob, None drops
    pub changes: ChangeSet,
    /// commits whose diffs were inverted, newest first
    pub commits: Vec<CommitId>,
    /// paths touched by more than one commit in a range (informational;
    /// the earliest state wins)
    pub overlaps: Vec<ObjectPath>,
    /// merge commits encountered in the inverted set
    pub merge_commits: Vec<CommitId>,
}

impl InverseChangeset {
    fn empty() -> Self {
        Self {
            changes: ChangeSet::new(),
            commits: Vec::new(),
            overlaps: Vec::new(),
            merge_commits: Vec::new(),
        }
    }
}

/// Invert exactly one commit's diff against its first parent.
pub fn invert_commit(repo: &SchemaRepository, commit: CommitId) -> StorageResult<InverseChangeset> {
    let info = repo.get_commit(commit)?;
    let parent = info.first_parent().ok_or_else(|| {
        StorageError::Validation("cannot invert the root commit: it has no parent".to_string())
    })?;

    let mut inverse = InverseChangeset::empty();
    inverse.commits.push(commit);
    if info.is_merge() {
        inverse.merge_commits.push(commit);
    }

    for change in repo.diff(parent, commit)? {
        // restoring the pre-commit side undoes the change
        inverse.changes.insert(change.path, change.old);
    }

    Ok(inverse)
}

/// Invert every commit strictly after `from` up to and including `to`,
/// newest first.
///
/// The walk follows first parents from `to` and must reach `from`
/// within `page_limit` commits; longer ranges are an error so callers
/// paginate explicitly instead of silently processing a partial range.
/// When several commits touch one path, the earliest pre-state wins
/// and the path is reported as an overlap.
pub fn invert_range(
    repo: &SchemaRepository,
    from: CommitId,
    to: CommitId,
    page_limit: usize,
) -> StorageResult<InverseChangeset> {
    if from == to {
        return Ok(InverseChangeset::empty());
    }

    // collect the interval (from, to], newest first
    let mut interval = Vec::new();
    let mut cursor = to;
    while cursor != from {
        if interval.len() >= page_limit {
            return Err(StorageError::Validation(format!(
                "range exceeds {} commits; roll back in pages",
                page_limit
            )));
        }
        let info = repo.get_commit(cursor)?;
        let parent = match info.first_parent() {
            Some(p) => p,
            None => {
                return Err(StorageError::Validation(format!(
                    "commit {} is not an ancestor of {}: ranges must be chronological",
                    from.short(),
                    to.short()
                )))
            }
        };
        interval.push(info);
        cursor = parent;
    }

    let mut inverse = InverseChangeset::empty();

    // newest first: a later commit's inversion is overwritten by an
    // earlier commit's pre-state on the same path
    for info in &interval {
        inverse.commits.push(info.id);
        if info.is_merge() {
            inverse.merge_commits.push(info.id);
        }

        let parent = info
            .first_parent()
            .ok_or_else(|| StorageError::Validation("range reached the root commit".to_string()))?;

        for change in repo.diff(parent, info.id)? {
            if inverse.changes.contains_key(&change.path)
                && !inverse.overlaps.contains(&change.path)
            {
                inverse.overlaps.push(change.path.clone());
            }
            inverse.changes.insert(change.path, change.old);
        }
    }

    inverse.overlaps.sort();
    Ok(inverse)
}

/// Changeset that turns `current` into `historical` for every
/// differing path.
pub fn invert_to_state(
    current: &BTreeMap<ObjectPath, BlobId>,
    historical: &BTreeMap<ObjectPath, BlobId>,
) -> ChangeSet {
    let mut changes = ChangeSet::new();

    for (path, blob) in current {
        match historical.get(path) {
            Some(h) if h == blob => {}
            other => {
                changes.insert(path.clone(), other.copied());
            }
        }
    }
    for (path, blob) in historical {
        if !current.contains_key(path) {
            changes.insert(path.clone(), Some(*blob));
        }
    }

    changes
}
