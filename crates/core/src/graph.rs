use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::error::PlanError;

/// Logical identifier of a plan node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(&self.0) }
}

/// What the platform does with a node when the plan is torn down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalPolicy {
    #[default]
    Retain,
    Destroy,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanNode<R> {
    pub id: NodeId,
    pub resource: R,
    pub removal: RemovalPolicy,
}

/// Insertion-ordered resource graph with explicit dependency edges.
///
/// An edge `(from, to)` means `to` depends on `from`: the platform must admit
/// `from` before it starts on `to`.
#[derive(Debug, Clone, Serialize)]
pub struct PlanGraph<R> {
    nodes: Vec<PlanNode<R>>,
    edges: Vec<(NodeId, NodeId)>,
    #[serde(skip)]
    index: HashMap<NodeId, usize>,
}

impl<R> Default for PlanGraph<R> {
    fn default() -> Self { Self { nodes: Vec::new(), edges: Vec::new(), index: HashMap::new() } }
}

impl<R> PlanGraph<R> {
    pub fn new() -> Self { Self::default() }

    pub fn add_node(&mut self, id: NodeId, resource: R, removal: RemovalPolicy) -> Result<NodeId, PlanError> {
        if self.index.contains_key(&id) {
            return Err(PlanError::DuplicateNode(id));
        }
        tracing::debug!(node = %id, "add node");
        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push(PlanNode { id: id.clone(), resource, removal });
        Ok(id)
    }

    /// Records that `to` depends on `from`. Repeated edges are kept once.
    pub fn add_edge(&mut self, from: &NodeId, to: &NodeId) -> Result<(), PlanError> {
        for id in [from, to] {
            if !self.contains(id) { return Err(PlanError::UnknownNode(id.clone())); }
        }
        if !self.has_edge(from, to) {
            tracing::debug!(from = %from, to = %to, "add edge");
            self.edges.push((from.clone(), to.clone()));
        }
        Ok(())
    }

    pub fn contains(&self, id: &NodeId) -> bool { self.index.contains_key(id) }

    pub fn node(&self, id: &NodeId) -> Option<&PlanNode<R>> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &PlanNode<R>> { self.nodes.iter() }

    pub fn edges(&self) -> &[(NodeId, NodeId)] { &self.edges }

    pub fn len(&self) -> usize { self.nodes.len() }

    pub fn is_empty(&self) -> bool { self.nodes.is_empty() }

    pub fn has_edge(&self, from: &NodeId, to: &NodeId) -> bool {
        self.edges.iter().any(|(f, t)| f == from && t == to)
    }

    /// Direct predecessors of `id`, in the order the edges were declared.
    pub fn dependencies_of(&self, id: &NodeId) -> Vec<&NodeId> {
        self.edges.iter().filter(|(_, t)| t == id).map(|(f, _)| f).collect()
    }

    /// Fails with [`PlanError::DependencyOrdering`] unless `node` depends on `on`.
    pub fn require_edge(&self, on: &NodeId, node: &NodeId) -> Result<(), PlanError> {
        if self.has_edge(on, node) {
            Ok(())
        } else {
            Err(PlanError::DependencyOrdering { node: node.clone(), missing: on.clone() })
        }
    }

    /// Creation order. Nodes without a pending dependency come out in insertion order.
    pub fn topological_order(&self) -> Result<Vec<&NodeId>, PlanError> {
        let mut g: DiGraph<usize, ()> = DiGraph::with_capacity(self.nodes.len(), self.edges.len());
        for i in 0..self.nodes.len() {
            g.add_node(i);
        }
        for (from, to) in &self.edges {
            g.add_edge(NodeIndex::new(self.index[from]), NodeIndex::new(self.index[to]), ());
        }
        toposort(&g, None).map_err(|c| PlanError::Cycle(self.nodes[g[c.node_id()]].id.clone()))?;

        let mut indegree: Vec<usize> = (0..self.nodes.len())
            .map(|i| g.neighbors_directed(NodeIndex::new(i), Direction::Incoming).count())
            .collect();
        let mut ready: BinaryHeap<Reverse<usize>> =
            indegree.iter().enumerate().filter(|(_, d)| **d == 0).map(|(i, _)| Reverse(i)).collect();
        let mut out = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse(i)) = ready.pop() {
            out.push(&self.nodes[i].id);
            for next in g.neighbors_directed(NodeIndex::new(i), Direction::Outgoing) {
                let n = g[next];
                indegree[n] -= 1;
                if indegree[n] == 0 { ready.push(Reverse(n)); }
            }
        }
        Ok(out)
    }
}
