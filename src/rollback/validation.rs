//! Shared validation pipeline for all rollback operations.
//!
//! Read-only: runs before any mutation, in every mode. Findings are
//! data, ordered most severe first; Error and Critical block
//! execution unless the caller overrides.

use std::collections::BTreeMap;

use crate::deps::DependencyGraph;
use crate::storage::{BlobId, ObjectKind, ObjectPath};

use super::inverse::InverseChangeset;

/// Severity of one validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FindingSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl FindingSeverity {
    /// Error and Critical findings block execution.
    pub fn is_blocking(&self) -> bool {
        matches!(self, FindingSeverity::Error | FindingSeverity::Critical)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FindingSeverity::Info => "info",
            FindingSeverity::Warning => "warning",
            FindingSeverity::Error => "error",
            FindingSeverity::Critical => "critical",
        }
    }
}

/// What a finding is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindingCode {
    /// a hard dependent (FK, trigger, composed-of) would break
    HardDependentBroken,
    /// a soft dependent (index, usage, call) is affected
    SoftDependentAffected,
    /// dropping a table discards its rows
    TableDropDataLoss,
    /// a merge commit is being reverted; both lineages are affected
    MergeCommitInScope,
    /// multiple commits in the range touched this path; earliest wins
    PathOverlapResolved,
    /// an undo target matched nothing and was skipped
    UnknownObjectSkipped,
}

/// One validation finding.
#[derive(Debug, Clone)]
pub struct Finding {
    pub severity: FindingSeverity,
    pub code: FindingCode,
    pub object: Option<ObjectPath>,
    pub message: String,
}

impl Finding {
    fn new(
        severity: FindingSeverity,
        code: FindingCode,
        object: Option<ObjectPath>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            code,
            object,
            message: message.into(),
        }
    }
}

/// Validate an inverse changeset against the live snapshot and the
/// dependency graph.
pub fn validate_inverse(
    snapshot: &BTreeMap<ObjectPath, BlobId>,
    inverse: &InverseChangeset,
    deps: &DependencyGraph,
) -> Vec<Finding> {
    let mut findings = Vec::new();

    for (path, restored) in &inverse.changes {
        let current = snapshot.get(path).copied();

        match (current, restored) {
            // the inverse drops an object that exists now
            (Some(_), None) => {
                check_dependents(path, inverse, deps, true, &mut findings);

                if path.kind == ObjectKind::Table {
                    findings.push(Finding::new(
                        FindingSeverity::Warning,
                        FindingCode::TableDropDataLoss,
                        Some(path.clone()),
                        format!("dropping table {} discards its row data", path.qualified),
                    ));
                }
            }
            // the inverse alters an object that exists now
            (Some(current_blob), Some(restored_blob)) if current_blob != *restored_blob => {
                check_dependents(path, inverse, deps, false, &mut findings);
            }
            _ => {}
        }
    }

    for merge in &inverse.merge_commits {
        findings.push(Finding::new(
            FindingSeverity::Warning,
            FindingCode::MergeCommitInScope,
            None,
            format!(
                "commit {} is a merge; reverting it affects both merged lineages",
                merge.short()
            ),
        ));
    }

    for path in &inverse.overlaps {
        findings.push(Finding::new(
            FindingSeverity::Info,
            FindingCode::PathOverlapResolved,
            Some(path.clone()),
            format!(
                "{} was touched by several commits in the range; the earliest state wins",
                path.qualified
            ),
        ));
    }

    findings.sort_by(|a, b| b.severity.cmp(&a.severity));
    findings
}

/// Dependent checks for one dropped or altered object.
///
/// Dependents that the same inverse also removes are fine — the whole
/// subtree is going away together.
fn check_dependents(
    path: &ObjectPath,
    inverse: &InverseChangeset,
    deps: &DependencyGraph,
    dropped: bool,
    findings: &mut Vec<Finding>,
) {
    for dep in deps.dependents_of(&path.qualified) {
        let dependent_also_removed = inverse
            .changes
            .iter()
            .any(|(p, v)| p.qualified == dep.dependent && v.is_none());
        if dependent_also_removed {
            continue;
        }

        if dep.kind.is_hard() {
            let severity = if dropped {
                FindingSeverity::Critical
            } else {
                FindingSeverity::Error
            };
            findings.push(Finding::new(
                severity,
                FindingCode::HardDependentBroken,
                Some(path.clone()),
                format!(
                    "{} {} {}, which this rollback would {}",
                    dep.dependent,
                    dep.kind,
                    path.qualified,
                    if dropped { "drop" } else { "alter" }
                ),
            ));
        } else {
            findings.push(Finding::new(
                FindingSeverity::Warning,
                FindingCode::SoftDependentAffected,
                Some(path.clone()),
                format!("{} {} {}", dep.dependent, dep.kind, path.qualified),
            ));
        }
    }
}

/// true when any finding blocks execution
pub fn has_blocking(findings: &[Finding]) -> bool {
    findings.iter().any(|f| f.severity.is_blocking())
}
