//! Graph algorithms over the active dependency edges.
//!
//! This module provides:
//! - Cycle Guard (will this edge close a cycle?) and a whole-graph cycle audit
//! - Cascade Executor (delete and update propagation)
//! - Impact Analyzer (read-only blast radius and severity)
//! - Graph Cache (memoized neighborhoods, generation-checked)
//!
//! ## Design
//!
//! - [`GraphRead`] is the only thing traversals need: the active edges in and
//!   out of a node. `SQLite` connections and transactions implement it, so
//!   checks run inside the writer's transaction.
//! - Traversals are explicit iterative loops with visited sets; the store
//!   never runs recursive SQL.
//! - Petgraph is used where a whole subgraph is in memory (cycle audit,
//!   `has_circular` on cached neighborhoods).

mod cache;
mod cascade;
mod cycle;
mod impact;
mod sql;
mod types;

pub use cache::{GraphCache, neighborhood};
pub(crate) use cache::invalidate_edge;
pub(crate) use cascade::{CascadePolicy, cascade_delete, cascade_update};
pub use cycle::{find_cycles, would_create_cycle};
pub use impact::analyze;
pub use types::{
    AffectedNode, CacheLookup, CascadeReport, Cycle, DependencyGraph, GraphNode, ImpactAnalysis,
    ImpactLevel, UpdateReport,
};

use std::collections::{HashMap, HashSet, VecDeque};

use nodegraph_key::CompositeKey;

use crate::domain::{DependencyEdge, NodeId};
use crate::error::Result;

/// Read access to the active edges around a node.
pub trait GraphRead {
    /// Active edges where `node` is the dependent (what `node` depends on).
    fn dependencies_of(&self, node: NodeId) -> Result<Vec<DependencyEdge>>;

    /// Active edges where `node` is the dependency (what depends on `node`).
    fn dependents_of(&self, node: NodeId) -> Result<Vec<DependencyEdge>>;
}

/// Which way a traversal follows edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    /// From a node to what it depends on.
    Dependencies,
    /// From a node to what depends on it.
    Dependents,
}

impl Direction {
    fn edges<G: GraphRead + ?Sized>(self, graph: &G, node: NodeId) -> Result<Vec<DependencyEdge>> {
        match self {
            Self::Dependencies => graph.dependencies_of(node),
            Self::Dependents => graph.dependents_of(node),
        }
    }

    /// The node an edge leads to when walked in this direction.
    pub(crate) fn far(self, edge: &DependencyEdge) -> (NodeId, &CompositeKey) {
        match self {
            Self::Dependencies => (edge.dependency_node_id, &edge.dependency_key),
            Self::Dependents => (edge.dependent_node_id, &edge.dependent_key),
        }
    }
}

/// What a traversal does with an edge it meets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Follow {
    /// Ignore the edge.
    Skip,
    /// Report the far node but do not walk past it.
    Report,
    /// Report the far node and walk its edges too.
    Expand,
}

/// A node reached by [`walk`].
#[derive(Debug, Clone)]
pub(crate) struct Step {
    /// The edge the node was reached through.
    pub edge: DependencyEdge,
    /// 1 for the start node's direct neighbors.
    pub depth: usize,
    /// The node the edge was walked from.
    pub parent: NodeId,
    /// Whether the node's own edges were walked.
    pub expanded: bool,
}

/// The result of a breadth-first walk: each reached node once, at its
/// shallowest depth, in BFS order.
#[derive(Debug, Default)]
pub(crate) struct Walk {
    pub steps: Vec<Step>,
    index: HashMap<NodeId, usize>,
}

impl Walk {
    /// The reached node's step, if it was reached.
    pub(crate) fn get(&self, node: NodeId) -> Option<&Step> {
        self.index.get(&node).map(|&i| &self.steps[i])
    }

    /// Node ids from the start (exclusive) down to `node` (inclusive).
    pub(crate) fn path_to(&self, node: NodeId) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut current = node;
        while let Some(step) = self.get(current) {
            path.push(current);
            current = step.parent;
            if path.len() > self.steps.len() {
                break;
            }
        }
        path.reverse();
        path
    }

    /// Deepest depth reached, 0 if nothing was reached.
    pub(crate) fn max_depth(&self) -> usize {
        self.steps.iter().map(|s| s.depth).max().unwrap_or(0)
    }
}

/// Breadth-first walk from `start` in `direction`.
///
/// `classify` decides per edge whether the far node is skipped, reported, or
/// reported and expanded. A node first reported through a `Report` edge is
/// upgraded (and expanded) if a later edge at any depth says `Expand`, so the
/// walk follows every edge an executor applying the same rule would. Nodes
/// deeper than `max_depth` are neither reported nor expanded.
pub(crate) fn walk<G, F>(
    graph: &G,
    start: NodeId,
    direction: Direction,
    max_depth: Option<usize>,
    mut classify: F,
) -> Result<Walk>
where
    G: GraphRead + ?Sized,
    F: FnMut(&DependencyEdge) -> Follow,
{
    let mut result = Walk::default();
    let mut expanded: HashSet<NodeId> = HashSet::from([start]);
    let mut queue: VecDeque<(NodeId, usize)> = VecDeque::from([(start, 0)]);

    while let Some((node, depth)) = queue.pop_front() {
        let next_depth = depth + 1;
        if max_depth.is_some_and(|max| next_depth > max) {
            continue;
        }

        for edge in direction.edges(graph, node)? {
            let follow = classify(&edge);
            if follow == Follow::Skip {
                continue;
            }
            let (far, _) = direction.far(&edge);
            if far == start {
                continue;
            }

            let expand = follow == Follow::Expand && expanded.insert(far);
            match result.index.get(&far) {
                Some(&i) => {
                    if expand {
                        let step = &mut result.steps[i];
                        step.edge = edge;
                        step.expanded = true;
                    }
                }
                None => {
                    result.index.insert(far, result.steps.len());
                    result.steps.push(Step {
                        edge,
                        depth: next_depth,
                        parent: node,
                        expanded: expand,
                    });
                }
            }
            if expand {
                queue.push_back((far, next_depth));
            }
        }
    }

    tracing::debug!(
        start = %start,
        ?direction,
        reached = result.steps.len(),
        "Walked graph"
    );
    Ok(result)
}

#[cfg(test)]
pub(crate) mod testing {
    //! An in-memory [`GraphRead`] for unit tests.

    use chrono::Utc;
    use nodegraph_key::CompositeKey;

    use super::GraphRead;
    use crate::domain::{DependencyEdge, EdgeId, NodeId};
    use crate::error::Result;

    /// Active edges held in a plain vector.
    #[derive(Debug, Default)]
    pub(crate) struct EdgeList(pub Vec<DependencyEdge>);

    impl EdgeList {
        /// Add `dependent -> dependency` with the given type flags.
        pub(crate) fn add(
            &mut self,
            dependent: i64,
            dependency: i64,
            kind: &str,
            strength: u8,
            cascade_delete: bool,
            cascade_update: bool,
        ) -> &mut Self {
            let id = EdgeId(i64::try_from(self.0.len()).unwrap() + 1);
            self.0.push(edge(id, dependent, dependency, kind, strength, cascade_delete, cascade_update));
            self
        }
    }

    pub(crate) fn key(id: i64) -> CompositeKey {
        CompositeKey::node("url-db", "docs", id).unwrap()
    }

    pub(crate) fn edge(
        id: EdgeId,
        dependent: i64,
        dependency: i64,
        kind: &str,
        strength: u8,
        cascade_delete: bool,
        cascade_update: bool,
    ) -> DependencyEdge {
        let now = Utc::now();
        DependencyEdge {
            id,
            dependent_node_id: NodeId(dependent),
            dependent_key: key(dependent),
            dependency_node_id: NodeId(dependency),
            dependency_key: key(dependency),
            dependency_type: kind.to_string(),
            strength,
            priority: strength,
            cascade_delete,
            cascade_update,
            metadata: None,
            valid_from: now,
            valid_until: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    impl GraphRead for EdgeList {
        fn dependencies_of(&self, node: NodeId) -> Result<Vec<DependencyEdge>> {
            Ok(self
                .0
                .iter()
                .filter(|e| e.dependent_node_id == node)
                .cloned()
                .collect())
        }

        fn dependents_of(&self, node: NodeId) -> Result<Vec<DependencyEdge>> {
            Ok(self
                .0
                .iter()
                .filter(|e| e.dependency_node_id == node)
                .cloned()
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::EdgeList;
    use super::*;

    #[test]
    fn walk_reports_each_node_once_at_shallowest_depth() {
        // 2 -> 1, 3 -> 1, 3 -> 2, 4 -> 3
        let mut graph = EdgeList::default();
        graph
            .add(2, 1, "soft", 50, false, true)
            .add(3, 1, "soft", 50, false, true)
            .add(3, 2, "soft", 50, false, true)
            .add(4, 3, "soft", 50, false, true);

        let walk = walk(&graph, NodeId(1), Direction::Dependents, None, |_| Follow::Expand).unwrap();

        let depths: Vec<_> = walk
            .steps
            .iter()
            .map(|s| (s.edge.dependent_node_id.as_i64(), s.depth))
            .collect();
        assert_eq!(depths, vec![(2, 1), (3, 1), (4, 2)]);
        assert_eq!(walk.path_to(NodeId(4)), vec![NodeId(3), NodeId(4)]);
        assert_eq!(walk.max_depth(), 2);
    }

    #[test]
    fn walk_respects_max_depth() {
        let mut graph = EdgeList::default();
        graph
            .add(2, 1, "hard", 90, true, true)
            .add(3, 2, "hard", 90, true, true)
            .add(4, 3, "hard", 90, true, true);

        let walk = walk(&graph, NodeId(1), Direction::Dependents, Some(2), |_| Follow::Expand).unwrap();
        assert_eq!(walk.steps.len(), 2);
        assert!(walk.get(NodeId(4)).is_none());
    }

    #[test]
    fn report_only_edges_are_not_walked_past() {
        let mut graph = EdgeList::default();
        graph
            .add(2, 1, "reference", 30, false, false)
            .add(3, 2, "hard", 90, true, true);

        let walk = walk(&graph, NodeId(1), Direction::Dependents, None, |e| {
            if e.cascade_delete { Follow::Expand } else { Follow::Report }
        })
        .unwrap();

        assert_eq!(walk.steps.len(), 1);
        assert!(!walk.steps[0].expanded);
    }

    #[test]
    fn later_expand_upgrades_reported_node() {
        // 2 -> 1 (report only), 3 -> 1 (cascade), 2 -> 3 (cascade), 5 -> 2 (cascade)
        let mut graph = EdgeList::default();
        graph
            .add(2, 1, "reference", 30, false, false)
            .add(3, 1, "hard", 90, true, true)
            .add(2, 3, "hard", 90, true, true)
            .add(5, 2, "hard", 90, true, true);

        let walk = walk(&graph, NodeId(1), Direction::Dependents, None, |e| {
            if e.cascade_delete { Follow::Expand } else { Follow::Report }
        })
        .unwrap();

        let two = walk.get(NodeId(2)).unwrap();
        assert!(two.expanded);
        assert_eq!(two.depth, 1);
        assert!(walk.get(NodeId(5)).is_some());
    }
}
