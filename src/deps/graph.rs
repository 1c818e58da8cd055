//! The dependency graph itself.
//!
//! Backed by a petgraph stable graph so node indices survive object
//! removal. Nodes are qualified names, edges are dependency kinds,
//! direction is dependent -> depends_on.

use std::collections::HashMap;

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use tracing::debug;

use crate::ddl::{DdlObject, DdlStatement};
use crate::storage::{ObjectKind, QualifiedName};

use super::types::{Dependency, DependencyKind};

/// In-memory dependency index over the current snapshot.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: StableDiGraph<QualifiedName, DependencyKind>,
    nodes: HashMap<QualifiedName, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&mut self, name: &QualifiedName) -> NodeIndex {
        if let Some(idx) = self.nodes.get(name) {
            return *idx;
        }
        let idx = self.graph.add_node(name.clone());
        self.nodes.insert(name.clone(), idx);
        idx
    }

    /// Record one dependency edge. Duplicate edges are ignored.
    pub fn record(&mut self, dep: Dependency) {
        let from = self.node(&dep.dependent);
        let to = self.node(&dep.depends_on);

        let exists = self
            .graph
            .edges_directed(from, Direction::Outgoing)
            .any(|e| e.target() == to && *e.weight() == dep.kind);
        if !exists {
            self.graph.add_edge(from, to, dep.kind);
        }
    }

    /// Drop every outgoing edge of an object.
    ///
    /// Called before re-deriving edges when a definition changes.
    pub fn clear_outgoing(&mut self, dependent: &QualifiedName) {
        if let Some(&idx) = self.nodes.get(dependent) {
            let edges: Vec<_> = self
                .graph
                .edges_directed(idx, Direction::Outgoing)
                .map(|e| e.id())
                .collect();
            for edge in edges {
                self.graph.remove_edge(edge);
            }
        }
    }

    /// Remove an object and all its edges (object was dropped).
    pub fn remove_object(&mut self, name: &QualifiedName) {
        if let Some(idx) = self.nodes.remove(name) {
            self.graph.remove_node(idx);
        }
    }

    /// Derive and record edges from a classified definition.
    ///
    /// Replaces any previously derived outgoing edges for the object.
    /// Unclassified definitions contribute nothing.
    pub fn apply_statement(&mut self, stmt: &DdlStatement) {
        let obj = match stmt {
            DdlStatement::Create(obj) | DdlStatement::Alter(obj) => obj,
            DdlStatement::Drop(obj) => {
                self.remove_object(&obj.name);
                return;
            }
            DdlStatement::Unclassified { .. } => return,
        };

        self.clear_outgoing(&obj.name);
        for dep in derive_edges(obj) {
            self.record(dep);
        }
        debug!(object = %obj.name, "dependency edges refreshed");
    }

    /// Everything `name` depends on (outgoing edges).
    pub fn dependencies_of(&self, name: &QualifiedName) -> Vec<Dependency> {
        self.edges_of(name, Direction::Outgoing)
    }

    /// Everything that depends on `name` (incoming edges).
    pub fn dependents_of(&self, name: &QualifiedName) -> Vec<Dependency> {
        self.edges_of(name, Direction::Incoming)
    }

    /// Incoming edges whose kind is hard.
    pub fn hard_dependents_of(&self, name: &QualifiedName) -> Vec<Dependency> {
        self.dependents_of(name)
            .into_iter()
            .filter(|d| d.kind.is_hard())
            .collect()
    }

    fn edges_of(&self, name: &QualifiedName, direction: Direction) -> Vec<Dependency> {
        let idx = match self.nodes.get(name) {
            Some(idx) => *idx,
            None => return Vec::new(),
        };

        let mut out: Vec<Dependency> = self
            .graph
            .edges_directed(idx, direction)
            .filter_map(|edge| {
                let (source, target) = (edge.source(), edge.target());
                Some(Dependency {
                    dependent: self.graph.node_weight(source)?.clone(),
                    depends_on: self.graph.node_weight(target)?.clone(),
                    kind: *edge.weight(),
                })
            })
            .collect();

        out.sort_by(|a, b| {
            (a.dependent.clone(), a.depends_on.clone())
                .cmp(&(b.dependent.clone(), b.depends_on.clone()))
        });
        out
    }

    /// number of tracked objects
    pub fn object_count(&self) -> usize {
        self.nodes.len()
    }

    /// number of edges
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

/// Edges implied by a classified object definition.
fn derive_edges(obj: &DdlObject) -> Vec<Dependency> {
    let kind = match obj.kind {
        ObjectKind::Table => DependencyKind::ForeignKey,
        ObjectKind::View => DependencyKind::References,
        ObjectKind::Index => DependencyKind::Indexes,
        ObjectKind::Trigger => DependencyKind::TriggersOn,
        ObjectKind::Function => DependencyKind::Calls,
        ObjectKind::Sequence | ObjectKind::Type => DependencyKind::Uses,
    };

    obj.references
        .iter()
        .map(|target| Dependency {
            dependent: obj.name.clone(),
            depends_on: target.clone(),
            kind,
        })
        .collect()
}
