//! core type-safe wrappers around git primitives for the storage layer.

use std::fmt;
use std::path::PathBuf;

use git2::Oid;
use serde::{Deserialize, Serialize};

/// This makes sure we don't accidentally pass a blob ID where a commit ID
/// is expected. The inner Oid is only accessible within the storage module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommitId(pub(crate) Oid);

impl CommitId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    /// raw Oid (for internal use only)
    pub(crate) fn raw(&self) -> Oid {
        self.0
    }

    /// parse CommitId from a hex string
    pub fn from_hex(hex: &str) -> Result<Self, git2::Error> {
        Oid::from_str(hex).map(CommitId)
    }

    /// short form of the commit ID
    pub fn short(&self) -> String {
        self.0.to_string()[..7].to_string()
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Git blob identifier (one object definition)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobId(pub(crate) Oid);

impl BlobId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    pub(crate) fn raw(&self) -> Oid {
        self.0
    }

    /// parse BlobId from a hex string
    pub fn from_hex(hex: &str) -> Result<Self, git2::Error> {
        Oid::from_str(hex).map(BlobId)
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Git tree identifier (one full schema snapshot)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeId(pub(crate) Oid);

impl TreeId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    pub(crate) fn raw(&self) -> Oid {
        self.0
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of schema object a blob describes.
///
/// The kind is encoded in the tree path (`{schema}/{name}.{kind}.sql`),
/// so a change of kind is a delete + add, never an in-place edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Table,
    View,
    Function,
    Trigger,
    Index,
    Sequence,
    Type,
}

impl ObjectKind {
    /// all kinds, in path-sort order
    pub const ALL: &'static [ObjectKind] = &[
        ObjectKind::Table,
        ObjectKind::View,
        ObjectKind::Function,
        ObjectKind::Trigger,
        ObjectKind::Index,
        ObjectKind::Sequence,
        ObjectKind::Type,
    ];

    /// the file-extension token for this kind
    pub fn token(&self) -> &'static str {
        match self {
            ObjectKind::Table => "table",
            ObjectKind::View => "view",
            ObjectKind::Function => "function",
            ObjectKind::Trigger => "trigger",
            ObjectKind::Index => "index",
            ObjectKind::Sequence => "sequence",
            ObjectKind::Type => "type",
        }
    }

    /// parse a kind from its file-extension token
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.token() == token)
    }

    /// kinds whose one-sided removal or addition is a major change
    pub fn is_load_bearing(&self) -> bool {
        matches!(self, ObjectKind::Table | ObjectKind::Function | ObjectKind::View)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

/// validate one name component (schema or object name)
///
/// Names are restricted to prevent path traversal and to stay valid as
/// git tree entry names:
/// - 1-64 characters
/// - alphanumeric, underscores, hyphens only
/// - must start with a letter or underscore
fn validate_component(name: &str) -> Result<(), InvalidNameError> {
    if name.is_empty() {
        return Err(InvalidNameError::Empty);
    }

    if name.len() > 64 {
        return Err(InvalidNameError::TooLong(name.len()));
    }

    let first_char = name.chars().next().unwrap();
    if !first_char.is_ascii_alphabetic() && first_char != '_' {
        return Err(InvalidNameError::InvalidStart(first_char));
    }

    for (i, c) in name.chars().enumerate() {
        if !c.is_ascii_alphanumeric() && c != '_' && c != '-' {
            return Err(InvalidNameError::InvalidCharacter { char: c, position: i });
        }
    }

    Ok(())
}

/// A schema-qualified object name, e.g. `public.orders`.
///
/// This is the identity used by the dependency graph and by scoped
/// undo — it deliberately omits the object kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualifiedName {
    schema: String,
    name: String,
}

impl QualifiedName {
    /// create a new QualifiedName, validating both components
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let schema = schema.into();
        let name = name.into();
        validate_component(&schema)?;
        validate_component(&name)?;
        Ok(Self { schema, name })
    }

    /// parse a dotted name like `public.orders`
    pub fn parse(dotted: &str) -> Result<Self, InvalidNameError> {
        match dotted.split_once('.') {
            Some((schema, name)) => Self::new(schema, name),
            None => Err(InvalidNameError::MissingSchema(dotted.to_string())),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Full path of an object within a snapshot tree.
///
/// Format: `{schema}/{name}.{kind}.sql`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectPath {
    pub qualified: QualifiedName,
    pub kind: ObjectKind,
}

impl ObjectPath {
    pub fn new(qualified: QualifiedName, kind: ObjectKind) -> Self {
        Self { qualified, kind }
    }

    /// the tree entry filename, without the schema directory
    pub fn file_name(&self) -> String {
        format!("{}.{}.sql", self.qualified.name(), self.kind.token())
    }

    /// parse a filename like `orders.table.sql` within the given schema
    pub fn from_file_name(schema: &str, file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(".sql")?;
        let (name, token) = stem.rsplit_once('.')?;
        let kind = ObjectKind::from_token(token)?;
        let qualified = QualifiedName::new(schema, name).ok()?;
        Some(Self { qualified, kind })
    }

    /// parse a full path like `public/orders.table.sql`
    pub fn parse(full: &str) -> Option<Self> {
        let (schema, file_name) = full.split_once('/')?;
        Self::from_file_name(schema, file_name)
    }

    /// convert to a PathBuf for diff reporting
    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf::from(format!("{}/{}", self.qualified.schema(), self.file_name()))
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.qualified.schema(), self.file_name())
    }
}

/// a branch or tag name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BranchName(String);

impl BranchName {
    /// the default branch name
    pub const MAIN: &'static str = "main";

    /// create a new BranchName
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        // git is more permissive but we stay restrictive
        if name.is_empty() {
            return Err(InvalidNameError::Empty);
        }
        if name.contains("..") || name.ends_with('/') || name.starts_with('/') || name.contains(' ') {
            return Err(InvalidNameError::InvalidPath(name));
        }
        Ok(Self(name))
    }

    /// create the main branch reference
    pub fn main() -> Self {
        Self(Self::MAIN.to_string())
    }

    /// get the full ref path (e.g., "refs/heads/main")
    pub fn as_ref_path(&self) -> String {
        format!("refs/heads/{}", self.0)
    }

    /// get the short name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// whether a ref is a branch or a tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Branch,
    Tag,
}

/// a named ref together with its current target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefInfo {
    pub name: String,
    pub kind: RefKind,
    pub target: CommitId,
}

/// git signature (author/committer info)
#[derive(Debug, Clone)]
pub struct Signature {
    pub name: String,
    pub email: String,
}

impl Signature {
    /// create a new signature
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// default signature for engine-generated commits
    pub fn engine() -> Self {
        Self::new("schemagit", "schemagit@localhost")
    }

    /// convert to git2::Signature
    pub(crate) fn to_git2_signature(&self) -> Result<git2::Signature<'static>, git2::Error> {
        git2::Signature::now(&self.name, &self.email)
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self::engine()
    }
}

/// error type for invalid names (schemas, objects, branches)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidNameError {
    Empty,
    TooLong(usize),
    InvalidStart(char),
    InvalidCharacter { char: char, position: usize },
    MissingSchema(String),
    InvalidPath(String),
}

impl fmt::Display for InvalidNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "name cannot be empty"),
            Self::TooLong(len) => write!(f, "name too long: {} characters", len),
            Self::InvalidStart(c) => write!(f, "name cannot start with '{}'", c),
            Self::InvalidCharacter { char, position } => {
                write!(f, "invalid character '{}' at position {}", char, position)
            }
            Self::MissingSchema(name) => write!(f, "'{}' is missing a schema qualifier", name),
            Self::InvalidPath(path) => write!(f, "invalid path: '{}'", path),
        }
    }
}

impl std::error::Error for InvalidNameError {}

/// represents a change in a diff between two snapshots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub path: ObjectPath,
    pub status: ChangeStatus,
    /// blob before the change (None for additions)
    pub old: Option<BlobId>,
    /// blob after the change (None for deletions)
    pub new: Option<BlobId>,
}

/// the type of change in a diff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    Added,
    Deleted,
    Modified,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_name_valid() {
        assert!(QualifiedName::new("public", "orders").is_ok());
        assert!(QualifiedName::new("app_core", "user_accounts").is_ok());
        assert!(QualifiedName::new("_private", "My-Table").is_ok());
    }

    #[test]
    fn test_qualified_name_invalid() {
        assert!(QualifiedName::new("", "orders").is_err());
        assert!(QualifiedName::new("public", "123orders").is_err()); // starts with number
        assert!(QualifiedName::new("public", "orders/x").is_err()); // contains slash
        assert!(QualifiedName::new("public", "a".repeat(65)).is_err()); // too long
    }

    #[test]
    fn test_qualified_name_parse() {
        let qn = QualifiedName::parse("public.orders").unwrap();
        assert_eq!(qn.schema(), "public");
        assert_eq!(qn.name(), "orders");
        assert_eq!(qn.to_string(), "public.orders");

        assert!(QualifiedName::parse("orders").is_err());
    }

    #[test]
    fn test_object_path_round_trip() {
        let qn = QualifiedName::parse("public.orders").unwrap();
        let path = ObjectPath::new(qn, ObjectKind::Table);
        assert_eq!(path.file_name(), "orders.table.sql");
        assert_eq!(path.to_string(), "public/orders.table.sql");

        let parsed = ObjectPath::from_file_name("public", "orders.table.sql").unwrap();
        assert_eq!(parsed, path);
    }

    #[test]
    fn test_object_path_rejects_unknown_kind() {
        assert!(ObjectPath::from_file_name("public", "orders.widget.sql").is_none());
        assert!(ObjectPath::from_file_name("public", "orders.table.txt").is_none());
    }

    #[test]
    fn test_object_kind_tokens() {
        for kind in ObjectKind::ALL {
            assert_eq!(ObjectKind::from_token(kind.token()), Some(*kind));
        }
        assert_eq!(ObjectKind::from_token("widget"), None);
    }

    #[test]
    fn test_branch_name() {
        let branch = BranchName::main();
        assert_eq!(branch.as_ref_path(), "refs/heads/main");
        assert!(BranchName::new("feature/add-orders").is_ok());
        assert!(BranchName::new("bad..name").is_err());
        assert!(BranchName::new("/leading").is_err());
    }
}
