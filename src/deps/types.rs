//! Dependency edge types.

use serde::{Deserialize, Serialize};

use crate::storage::QualifiedName;

/// How one object depends on another.
///
/// Hard kinds mean the dependent breaks outright if the target goes
/// away; soft kinds degrade or can be rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    ForeignKey,
    TriggersOn,
    References,
    Indexes,
    Calls,
    Uses,
    ComposedOf,
}

impl DependencyKind {
    /// hard dependencies make removal of the target a breaking change
    pub fn is_hard(&self) -> bool {
        matches!(
            self,
            DependencyKind::ForeignKey | DependencyKind::TriggersOn | DependencyKind::ComposedOf
        )
    }
}

impl std::fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DependencyKind::ForeignKey => "foreign_key",
            DependencyKind::TriggersOn => "triggers_on",
            DependencyKind::References => "references",
            DependencyKind::Indexes => "indexes",
            DependencyKind::Calls => "calls",
            DependencyKind::Uses => "uses",
            DependencyKind::ComposedOf => "composed_of",
        };
        write!(f, "{}", s)
    }
}

/// A directed dependency edge: `dependent` needs `depends_on`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub dependent: QualifiedName,
    pub depends_on: QualifiedName,
    pub kind: DependencyKind,
}
