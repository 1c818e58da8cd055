//! Three-way diff and conflict classification.
//!
//! A pure function over (base, source, target) snapshots. Every path
//! in their union is classified from its hash triple alone — no I/O,
//! no strategy knowledge. One exhaustive match covers the whole table,
//! so adding a classification without handling it everywhere is a
//! compile error.

use std::collections::BTreeMap;

use crate::storage::{BlobId, ObjectPath};

/// Classification of one path across the three snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// unchanged, changed identically on both sides, added identically
    /// on both sides, or deleted on both sides
    NoConflict,
    /// only the source side changed (modified, or added only there)
    SourceModified,
    /// only the target side changed (modified, or added only there)
    TargetModified,
    /// source deleted an object the target still carries unchanged
    DeletedSource,
    /// target deleted an object the source still carries unchanged
    DeletedTarget,
    /// both sides changed the object, to different content
    BothModified,
}

impl Classification {
    /// whether this row represents a conflict at all
    pub fn is_conflict(&self) -> bool {
        !matches!(self, Classification::NoConflict)
    }

    /// whether a strategy may resolve this row without a human
    pub fn auto_resolvable(&self) -> bool {
        !matches!(self, Classification::BothModified)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::NoConflict => "no_conflict",
            Classification::SourceModified => "source_modified",
            Classification::TargetModified => "target_modified",
            Classification::DeletedSource => "deleted_source",
            Classification::DeletedTarget => "deleted_target",
            Classification::BothModified => "both_modified",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "no_conflict" => Classification::NoConflict,
            "source_modified" => Classification::SourceModified,
            "target_modified" => Classification::TargetModified,
            "deleted_source" => Classification::DeletedSource,
            "deleted_target" => Classification::DeletedTarget,
            "both_modified" => Classification::BothModified,
            _ => return None,
        })
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Advisory severity of a changed path. Never gates mergeability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Major,
    Minor,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Major => "major",
            Severity::Minor => "minor",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "major" => Some(Severity::Major),
            "minor" => Some(Severity::Minor),
            _ => None,
        }
    }
}

/// One path's three-way comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathDiff {
    pub path: ObjectPath,
    pub base: Option<BlobId>,
    pub source: Option<BlobId>,
    pub target: Option<BlobId>,
    pub classification: Classification,
    pub severity: Severity,
}

impl PathDiff {
    pub fn auto_resolvable(&self) -> bool {
        self.classification.auto_resolvable()
    }

    /// The blob an auto-resolution keeps: whichever side diverged from
    /// base. None for BothModified (needs a decision) and for rows
    /// where the answer is "delete".
    pub fn auto_resolution(&self) -> Option<Option<BlobId>> {
        match self.classification {
            Classification::NoConflict => Some(self.target),
            Classification::SourceModified => Some(self.source),
            Classification::TargetModified => Some(self.target),
            Classification::DeletedSource => Some(None),
            Classification::DeletedTarget => Some(None),
            Classification::BothModified => None,
        }
    }
}

/// Classify one hash triple.
///
/// This is the §4.4 table as an exhaustive match: every combination of
/// presence and equality lands in exactly one arm.
pub fn classify(
    base: Option<BlobId>,
    source: Option<BlobId>,
    target: Option<BlobId>,
) -> Classification {
    match (base, source, target) {
        // absent everywhere
        (None, None, None) => Classification::NoConflict,

        // untouched on both sides, or changed identically
        (Some(b), Some(s), Some(t)) if s == t && b == s => Classification::NoConflict,
        (Some(_), Some(s), Some(t)) if s == t => Classification::NoConflict,

        // one side modified, the other untouched
        (Some(b), Some(s), Some(t)) if s == b && t != b => Classification::TargetModified,
        (Some(b), Some(s), Some(t)) if t == b && s != b => Classification::SourceModified,

        // both modified, differently
        (Some(_), Some(_), Some(_)) => Classification::BothModified,

        // identical add on both sides
        (None, Some(s), Some(t)) if s == t => Classification::NoConflict,
        // divergent double add
        (None, Some(_), Some(_)) => Classification::BothModified,

        // one-sided add
        (None, Some(_), None) => Classification::SourceModified,
        (None, None, Some(_)) => Classification::TargetModified,

        // one side deleted while the other kept base unchanged
        (Some(b), None, Some(t)) if t == b => Classification::DeletedSource,
        (Some(b), Some(s), None) if s == b => Classification::DeletedTarget,

        // deleted one side, modified the other: a real divergence
        (Some(_), None, Some(_)) => Classification::BothModified,
        (Some(_), Some(_), None) => Classification::BothModified,

        // deleted on both sides: agreement
        (Some(_), None, None) => Classification::NoConflict,
    }
}

/// Severity of one classified row.
///
/// Load-bearing kinds (tables, functions, views) that one side lacks
/// are major; everything else is minor.
pub fn severity(path: &ObjectPath, source: Option<BlobId>, target: Option<BlobId>) -> Severity {
    if path.kind.is_load_bearing() && source.is_none() != target.is_none() {
        Severity::Major
    } else {
        Severity::Minor
    }
}

/// Three-way diff over full snapshots.
///
/// Emits one row per union path where at least one snapshot differs
/// from the others; paths identical in all three are omitted.
pub fn diff_snapshots(
    base: &BTreeMap<ObjectPath, BlobId>,
    source: &BTreeMap<ObjectPath, BlobId>,
    target: &BTreeMap<ObjectPath, BlobId>,
) -> Vec<PathDiff> {
    let mut paths: Vec<&ObjectPath> = base.keys().chain(source.keys()).chain(target.keys()).collect();
    paths.sort();
    paths.dedup();

    let mut out = Vec::new();
    for path in paths {
        let b = base.get(path).copied();
        let s = source.get(path).copied();
        let t = target.get(path).copied();

        // untouched everywhere: not part of the diff
        if b == s && s == t {
            continue;
        }

        out.push(PathDiff {
            path: path.clone(),
            base: b,
            source: s,
            target: t,
            classification: classify(b, s, t),
            severity: severity(path, s, t),
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ObjectKind, QualifiedName};

    fn blob(n: u8) -> BlobId {
        let hex = format!("{:040x}", n);
        BlobId::from_hex(&hex).unwrap()
    }

    fn path(dotted: &str, kind: ObjectKind) -> ObjectPath {
        ObjectPath::new(QualifiedName::parse(dotted).unwrap(), kind)
    }

    #[test]
    fn test_classification_table() {
        let h = Some(blob(1));
        let x = Some(blob(2));
        let y = Some(blob(3));

        // the nine tabulated patterns, in table order
        assert_eq!(classify(None, None, None), Classification::NoConflict);
        assert_eq!(classify(h, h, h), Classification::NoConflict);
        assert_eq!(classify(None, h, h), Classification::NoConflict); // identical add
        assert_eq!(classify(h, h, x), Classification::TargetModified);
        assert_eq!(classify(h, x, h), Classification::SourceModified);
        assert_eq!(classify(h, None, h), Classification::DeletedSource);
        assert_eq!(classify(h, h, None), Classification::DeletedTarget);
        assert_eq!(classify(h, x, y), Classification::BothModified);
        assert_eq!(classify(None, x, y), Classification::BothModified);
    }

    #[test]
    fn test_classification_auto_resolvable_flags() {
        let h = Some(blob(1));
        let x = Some(blob(2));
        let y = Some(blob(3));

        for (triple, auto) in [
            ((None, None, None), true),
            ((h, h, h), true),
            ((None, h, h), true),
            ((h, h, x), true),
            ((h, x, h), true),
            ((h, None, h), true),
            ((h, h, None), true),
            ((h, x, y), false),
            ((None, x, y), false),
        ] {
            let (b, s, t) = triple;
            assert_eq!(classify(b, s, t).auto_resolvable(), auto, "{:?}", triple);
        }
    }

    #[test]
    fn test_untabulated_patterns() {
        let h = Some(blob(1));
        let x = Some(blob(2));

        // one-sided adds follow the one-sided-change rows
        assert_eq!(classify(None, x, None), Classification::SourceModified);
        assert_eq!(classify(None, None, x), Classification::TargetModified);
        // both sides deleted: agreement
        assert_eq!(classify(h, None, None), Classification::NoConflict);
        // delete vs modify is a real divergence
        assert_eq!(classify(h, None, x), Classification::BothModified);
        assert_eq!(classify(h, x, None), Classification::BothModified);
        // identical modification on both sides
        assert_eq!(classify(h, x, x), Classification::NoConflict);
    }

    #[test]
    fn test_severity_rules() {
        let table = path("public.orders", ObjectKind::Table);
        let index = path("public.idx", ObjectKind::Index);
        let h = Some(blob(1));

        // table present on one side only: major
        assert_eq!(severity(&table, h, None), Severity::Major);
        assert_eq!(severity(&table, None, h), Severity::Major);
        // table present on both sides: minor even if modified
        assert_eq!(severity(&table, h, Some(blob(2))), Severity::Minor);
        // index asymmetry is minor, not load-bearing
        assert_eq!(severity(&index, h, None), Severity::Minor);
    }

    #[test]
    fn test_diff_snapshots() {
        let a = path("public.a", ObjectKind::Table);
        let b = path("public.b", ObjectKind::Table);
        let c = path("public.c", ObjectKind::View);

        let base: BTreeMap<_, _> = [(a.clone(), blob(1)), (b.clone(), blob(2))].into();
        // source modifies a, target deletes b and adds c
        let source: BTreeMap<_, _> = [(a.clone(), blob(9)), (b.clone(), blob(2))].into();
        let target: BTreeMap<_, _> = [(a.clone(), blob(1)), (c.clone(), blob(3))].into();

        let diffs = diff_snapshots(&base, &source, &target);
        assert_eq!(diffs.len(), 3);

        assert_eq!(diffs[0].path, a);
        assert_eq!(diffs[0].classification, Classification::SourceModified);
        assert_eq!(diffs[1].path, b);
        assert_eq!(diffs[1].classification, Classification::DeletedTarget);
        assert_eq!(diffs[2].path, c);
        assert_eq!(diffs[2].classification, Classification::TargetModified);
    }

    #[test]
    fn test_diff_snapshots_skips_unchanged() {
        let a = path("public.a", ObjectKind::Table);
        let all: BTreeMap<_, _> = [(a, blob(1))].into();
        assert!(diff_snapshots(&all, &all, &all).is_empty());
    }
}
