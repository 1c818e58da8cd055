//! Internal AST types for classified DDL.
//!
//! These are deliberately small: the engines only need to know what
//! operation happened, to which object, and what that object points at.

use crate::storage::{ObjectKind, QualifiedName};

/// the operation a DDL statement performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdlOperation {
    Create,
    Alter,
    Drop,
}

impl std::fmt::Display for DdlOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DdlOperation::Create => write!(f, "CREATE"),
            DdlOperation::Alter => write!(f, "ALTER"),
            DdlOperation::Drop => write!(f, "DROP"),
        }
    }
}

/// the object a classified statement describes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DdlObject {
    pub kind: ObjectKind,
    pub name: QualifiedName,
    /// owning object for dependent kinds (the table an index or
    /// trigger is attached to)
    pub parent: Option<QualifiedName>,
    /// other objects this definition points at (FK targets for
    /// tables, FROM tables for views)
    pub references: Vec<QualifiedName>,
}

/// A classified DDL statement.
///
/// One variant per classification so that consumers get compile-time
/// exhaustiveness. `Unclassified` is a first-class outcome, not an
/// error: the ingest path stores such definitions verbatim and simply
/// gets no dependency edges out of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DdlStatement {
    Create(DdlObject),
    Alter(DdlObject),
    Drop(DdlObject),
    Unclassified { raw: String },
}

impl DdlStatement {
    /// the operation, if classified
    pub fn operation(&self) -> Option<DdlOperation> {
        match self {
            DdlStatement::Create(_) => Some(DdlOperation::Create),
            DdlStatement::Alter(_) => Some(DdlOperation::Alter),
            DdlStatement::Drop(_) => Some(DdlOperation::Drop),
            DdlStatement::Unclassified { .. } => None,
        }
    }

    /// the object, if classified
    pub fn object(&self) -> Option<&DdlObject> {
        match self {
            DdlStatement::Create(obj) | DdlStatement::Alter(obj) | DdlStatement::Drop(obj) => {
                Some(obj)
            }
            DdlStatement::Unclassified { .. } => None,
        }
    }

    pub fn is_classified(&self) -> bool {
        !matches!(self, DdlStatement::Unclassified { .. })
    }
}
