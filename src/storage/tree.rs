//! tree operations for snapshot management.
//!
//! in Git, a tree is a directory. In schemagit:
//! - the root tree contains one directory per schema
//! - each schema directory contains object definition blobs, named
//!   `{object}.{kind}.sql`
//!
//! git sorts tree entries canonically before hashing, which is what
//! gives us the "logically identical snapshots hash identically"
//! guarantee for free.

use std::collections::{BTreeMap, HashMap};

use git2::{FileMode, ObjectType, Repository, Tree, TreeBuilder as Git2TreeBuilder};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{BlobId, ObjectPath, TreeId};

/// A read-only handle to a git tree at a specific commit.
///
/// this provides safe, immutable access to the snapshot structure.
/// think of it as a snapshot - it won't change even if new commits are made.
#[derive(Debug)]
pub struct TreeHandle<'repo> {
    tree: Tree<'repo>,
}

impl<'repo> TreeHandle<'repo> {
    /// create a TreeHandle from a git2::Tree
    pub(crate) fn new(tree: Tree<'repo>) -> Self {
        Self { tree }
    }

    /// get the tree ID
    pub fn id(&self) -> TreeId {
        TreeId::new(self.tree.id())
    }

    /// get the underlying git2::Tree (for internal use)
    pub(crate) fn inner(&self) -> &Tree<'repo> {
        &self.tree
    }

    /// list all schemas (top-level directories)
    pub fn list_schemas(&self) -> Vec<String> {
        self.tree
            .iter()
            .filter_map(|entry| {
                if entry.kind() != Some(ObjectType::Tree) {
                    return None;
                }
                entry.name().map(|n| n.to_string())
            })
            .collect()
    }

    /// check if a schema directory exists
    pub fn schema_exists(&self, schema: &str) -> bool {
        self.tree
            .get_name(schema)
            .map(|entry| entry.kind() == Some(ObjectType::Tree))
            .unwrap_or(false)
    }

    /// get the blob ID for an object, or None if absent
    pub fn get_object(&self, repo: &Repository, path: &ObjectPath) -> StorageResult<Option<BlobId>> {
        let schema_entry = match self.tree.get_name(path.qualified.schema()) {
            Some(e) if e.kind() == Some(ObjectType::Tree) => e,
            _ => return Ok(None),
        };
        let schema_tree = repo.find_tree(schema_entry.id())?;

        let result = match schema_tree.get_name(&path.file_name()) {
            Some(entry) if entry.kind() == Some(ObjectType::Blob) => {
                Ok(Some(BlobId::new(entry.id())))
            }
            _ => Ok(None),
        };
        result
    }

    /// check if an object exists in this snapshot
    pub fn object_exists(&self, repo: &Repository, path: &ObjectPath) -> StorageResult<bool> {
        Ok(self.get_object(repo, path)?.is_some())
    }

    /// Collect every (path, blob) entry in the snapshot.
    ///
    /// The BTreeMap keeps paths in canonical order, which the three-way
    /// differ and the rollback inverter both rely on. Entries that do
    /// not follow the `{name}.{kind}.sql` convention are skipped.
    pub fn entries(&self, repo: &Repository) -> StorageResult<BTreeMap<ObjectPath, BlobId>> {
        let mut out = BTreeMap::new();

        for schema_entry in self.tree.iter() {
            if schema_entry.kind() != Some(ObjectType::Tree) {
                continue;
            }
            let schema = match schema_entry.name() {
                Some(s) => s.to_string(),
                None => continue,
            };

            let schema_tree = repo.find_tree(schema_entry.id())?;
            for entry in schema_tree.iter() {
                if entry.kind() != Some(ObjectType::Blob) {
                    continue;
                }
                let file_name = match entry.name() {
                    Some(n) => n,
                    None => continue,
                };
                if let Some(path) = ObjectPath::from_file_name(&schema, file_name) {
                    out.insert(path, BlobId::new(entry.id()));
                }
            }
        }

        Ok(out)
    }

    /// count objects across all schemas (for stats)
    pub fn count_objects(&self, repo: &Repository) -> StorageResult<usize> {
        Ok(self.entries(repo)?.len())
    }
}

/// a mutable tree builder for producing the next snapshot
///
/// this accumulates changes and writes a new tree when finalized;
/// the original tree is never modified.
///
/// # Usage Pattern
///
/// ```ignore
/// let mut mutator = TreeMutator::from_tree(repo, &tree)?;
/// mutator.put_object(&path, blob_id)?;
/// mutator.remove_object(&other_path)?;
/// let new_tree_id = mutator.write()?;
/// ```
pub struct TreeMutator<'repo> {
    repo: &'repo Repository,
    root_builder: Git2TreeBuilder<'repo>,
    /// builders for schema subtrees that have been touched
    modified_schemas: HashMap<String, Git2TreeBuilder<'repo>>,
    /// original schema tree IDs for untouched lookups
    original_schemas: HashMap<String, git2::Oid>,
}

impl<'repo> TreeMutator<'repo> {
    /// create a new TreeMutator from an existing tree
    pub fn from_tree(repo: &'repo Repository, tree: &TreeHandle<'_>) -> StorageResult<Self> {
        let root_builder = repo.treebuilder(Some(tree.inner()))?;

        let mut original_schemas = HashMap::new();
        for entry in tree.inner().iter() {
            if entry.kind() == Some(ObjectType::Tree) {
                if let Some(name) = entry.name() {
                    original_schemas.insert(name.to_string(), entry.id());
                }
            }
        }

        Ok(Self {
            repo,
            root_builder,
            modified_schemas: HashMap::new(),
            original_schemas,
        })
    }

    /// create a new TreeMutator for an empty tree
    pub fn empty(repo: &'repo Repository) -> StorageResult<Self> {
        let root_builder = repo.treebuilder(None)?;
        Ok(Self {
            repo,
            root_builder,
            modified_schemas: HashMap::new(),
            original_schemas: HashMap::new(),
        })
    }

    /// get or create a builder for a schema's subtree
    fn get_schema_builder(&mut self, schema: &str) -> StorageResult<&mut Git2TreeBuilder<'repo>> {
        if !self.modified_schemas.contains_key(schema) {
            let builder = if let Some(original_id) = self.original_schemas.get(schema) {
                let original_tree = self.repo.find_tree(*original_id)?;
                self.repo.treebuilder(Some(&original_tree))?
            } else {
                self.repo.treebuilder(None)?
            };
            self.modified_schemas.insert(schema.to_string(), builder);
        }
        Ok(self
            .modified_schemas
            .get_mut(schema)
            .expect("schema builder inserted above"))
    }

    /// insert or replace an object definition
    pub fn put_object(&mut self, path: &ObjectPath, blob_id: BlobId) -> StorageResult<()> {
        let file_name = path.file_name();
        let builder = self.get_schema_builder(path.qualified.schema())?;
        builder.insert(&file_name, blob_id.raw(), FileMode::Blob.into())?;
        Ok(())
    }

    /// remove an object definition
    ///
    /// fails with ObjectNotFound if the entry is absent
    pub fn remove_object(&mut self, path: &ObjectPath) -> StorageResult<()> {
        let schema = path.qualified.schema().to_string();
        if !self.modified_schemas.contains_key(&schema) && !self.original_schemas.contains_key(&schema)
        {
            return Err(StorageError::ObjectNotFound(path.clone()));
        }

        let file_name = path.file_name();
        let builder = self.get_schema_builder(&schema)?;
        builder
            .remove(&file_name)
            .map_err(|_| StorageError::ObjectNotFound(path.clone()))?;
        Ok(())
    }

    /// apply a whole changeset: Some(blob) upserts, None deletes
    ///
    /// deletions of already-absent paths are ignored so that a computed
    /// inverse can be applied to a head that drifted on other paths
    pub fn apply(
        &mut self,
        changes: &BTreeMap<ObjectPath, Option<BlobId>>,
    ) -> StorageResult<()> {
        for (path, blob) in changes {
            match blob {
                Some(id) => self.put_object(path, *id)?,
                None => match self.remove_object(path) {
                    Ok(()) | Err(StorageError::ObjectNotFound(_)) => {}
                    Err(e) => return Err(e),
                },
            }
        }
        Ok(())
    }

    /// write all changes and return the new root tree ID
    ///
    /// schema subtrees that ended up empty are dropped from the root,
    /// so deleting a schema's last object deletes the schema directory
    pub fn write(mut self) -> StorageResult<TreeId> {
        for (schema, builder) in self.modified_schemas {
            if builder.len() == 0 {
                // remove() on a name the root builder doesn't have is an error
                if self.original_schemas.contains_key(&schema) {
                    self.root_builder.remove(&schema)?;
                }
                continue;
            }
            let schema_tree_id = builder.write()?;
            self.root_builder
                .insert(&schema, schema_tree_id, FileMode::Tree.into())?;
        }

        let root_id = self.root_builder.write()?;
        Ok(TreeId::new(root_id))
    }
}

/// helper to create the initial empty snapshot tree
pub fn create_initial_tree(repo: &Repository) -> StorageResult<TreeId> {
    let builder = TreeMutator::empty(repo)?;
    builder.write()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::blob::write_definition;
    use crate::storage::types::{ObjectKind, QualifiedName};
    use tempfile::TempDir;

    fn setup_repo() -> (TempDir, Repository) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        (dir, repo)
    }

    fn path(dotted: &str, kind: ObjectKind) -> ObjectPath {
        ObjectPath::new(QualifiedName::parse(dotted).unwrap(), kind)
    }

    fn handle<'r>(repo: &'r Repository, id: TreeId) -> TreeHandle<'r> {
        TreeHandle::new(repo.find_tree(id.raw()).unwrap())
    }

    #[test]
    fn test_empty_tree() {
        let (_dir, repo) = setup_repo();
        let tree_id = create_initial_tree(&repo).unwrap();
        let tree = handle(&repo, tree_id);

        assert!(tree.list_schemas().is_empty());
        assert_eq!(tree.count_objects(&repo).unwrap(), 0);
    }

    #[test]
    fn test_put_and_get_object() {
        let (_dir, repo) = setup_repo();
        let blob = write_definition(&repo, "CREATE TABLE orders (id INT);").unwrap();
        let orders = path("public.orders", ObjectKind::Table);

        let mut mutator = TreeMutator::empty(&repo).unwrap();
        mutator.put_object(&orders, blob).unwrap();
        let tree_id = mutator.write().unwrap();

        let tree = handle(&repo, tree_id);
        assert!(tree.schema_exists("public"));
        assert_eq!(tree.get_object(&repo, &orders).unwrap(), Some(blob));
        assert!(tree.object_exists(&repo, &orders).unwrap());
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let (_dir, repo) = setup_repo();
        let blob_a = write_definition(&repo, "CREATE TABLE a (id INT);").unwrap();
        let blob_b = write_definition(&repo, "CREATE VIEW b AS SELECT 1;").unwrap();

        let a = path("public.a", ObjectKind::Table);
        let b = path("public.b", ObjectKind::View);

        let mut first = TreeMutator::empty(&repo).unwrap();
        first.put_object(&a, blob_a).unwrap();
        first.put_object(&b, blob_b).unwrap();
        let id_ab = first.write().unwrap();

        let mut second = TreeMutator::empty(&repo).unwrap();
        second.put_object(&b, blob_b).unwrap();
        second.put_object(&a, blob_a).unwrap();
        let id_ba = second.write().unwrap();

        // same (path, blob) set, same hash, regardless of construction order
        assert_eq!(id_ab, id_ba);
    }

    #[test]
    fn test_remove_object() {
        let (_dir, repo) = setup_repo();
        let blob = write_definition(&repo, "CREATE TABLE orders (id INT);").unwrap();
        let orders = path("public.orders", ObjectKind::Table);

        let mut mutator = TreeMutator::empty(&repo).unwrap();
        mutator.put_object(&orders, blob).unwrap();
        let tree_id = mutator.write().unwrap();

        let tree = handle(&repo, tree_id);
        let mut mutator = TreeMutator::from_tree(&repo, &tree).unwrap();
        mutator.remove_object(&orders).unwrap();
        let tree_id = mutator.write().unwrap();

        let tree = handle(&repo, tree_id);
        assert!(!tree.object_exists(&repo, &orders).unwrap());
        // last object gone, schema directory gone too
        assert!(!tree.schema_exists("public"));
    }

    #[test]
    fn test_remove_missing_object_fails() {
        let (_dir, repo) = setup_repo();
        let tree_id = create_initial_tree(&repo).unwrap();
        let tree = handle(&repo, tree_id);

        let mut mutator = TreeMutator::from_tree(&repo, &tree).unwrap();
        let result = mutator.remove_object(&path("public.ghost", ObjectKind::Table));
        assert!(matches!(result, Err(StorageError::ObjectNotFound(_))));
    }

    #[test]
    fn test_entries_are_sorted() {
        let (_dir, repo) = setup_repo();
        let blob = write_definition(&repo, "SELECT 1;").unwrap();

        let mut mutator = TreeMutator::empty(&repo).unwrap();
        for dotted in ["zoo.b", "app.z", "app.a"] {
            mutator.put_object(&path(dotted, ObjectKind::Table), blob).unwrap();
        }
        let tree_id = mutator.write().unwrap();

        let tree = handle(&repo, tree_id);
        let paths: Vec<String> = tree
            .entries(&repo)
            .unwrap()
            .keys()
            .map(|p| p.to_string())
            .collect();
        assert_eq!(
            paths,
            vec!["app/a.table.sql", "app/z.table.sql", "zoo/b.table.sql"]
        );
    }

    #[test]
    fn test_apply_changeset() {
        let (_dir, repo) = setup_repo();
        let v1 = write_definition(&repo, "CREATE TABLE t (id INT);").unwrap();
        let v2 = write_definition(&repo, "CREATE TABLE t (id BIGINT);").unwrap();
        let t = path("public.t", ObjectKind::Table);
        let gone = path("public.gone", ObjectKind::View);

        let mut mutator = TreeMutator::empty(&repo).unwrap();
        mutator.put_object(&t, v1).unwrap();
        let tree_id = mutator.write().unwrap();

        let mut changes = BTreeMap::new();
        changes.insert(t.clone(), Some(v2));
        changes.insert(gone, None); // deleting an absent path is a no-op

        let tree = handle(&repo, tree_id);
        let mut mutator = TreeMutator::from_tree(&repo, &tree).unwrap();
        mutator.apply(&changes).unwrap();
        let tree_id = mutator.write().unwrap();

        let tree = handle(&repo, tree_id);
        assert_eq!(tree.get_object(&repo, &t).unwrap(), Some(v2));
    }
}
