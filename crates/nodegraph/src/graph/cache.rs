//! Graph Cache: memoized neighborhoods with generation-based invalidation.
//!
//! An entry is trusted only while its stored generation equals the node's
//! current generation and it has not expired. Every edge mutation bumps the
//! generation of each node whose neighborhood the edge is part of (see
//! [`edge_closure`]); stale entries are recomputed on the next read.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use petgraph::algo;
use petgraph::graphmap::DiGraphMap;
use rusqlite::Connection;

use super::types::{CacheLookup, DependencyGraph, GraphNode};
use super::{Direction, Follow, GraphRead, walk};
use crate::config::CacheConfig;
use crate::domain::{DependencyEdge, Node, NodeId};
use crate::error::Result;
use crate::store::{cache, nodes};

/// Nodes whose cached neighborhood includes `edge`.
///
/// For `a -> b` that is `a` and everything that transitively depends on it
/// (their dependency lists reach the edge), plus `b` and everything it
/// transitively depends on (their dependent lists reach the edge).
pub(crate) fn edge_closure<G: GraphRead + ?Sized>(
    graph: &G,
    edge: &DependencyEdge,
) -> Result<BTreeSet<NodeId>> {
    let mut ids = BTreeSet::from([edge.dependent_node_id, edge.dependency_node_id]);

    let up = walk(graph, edge.dependent_node_id, Direction::Dependents, None, |_| Follow::Expand)?;
    ids.extend(up.steps.iter().map(|s| s.edge.dependent_node_id));

    let down = walk(graph, edge.dependency_node_id, Direction::Dependencies, None, |_| Follow::Expand)?;
    ids.extend(down.steps.iter().map(|s| s.edge.dependency_node_id));

    Ok(ids)
}

/// Bump the generation of every node in `edge`'s closure.
pub(crate) fn invalidate_edge(conn: &Connection, edge: &DependencyEdge) -> Result<()> {
    let ids = edge_closure(conn, edge)?;
    nodes::bump_generations(conn, &ids)
}

/// Compute `node`'s neighborhood up to `max_depth` levels in each direction.
///
/// # Errors
///
/// Propagates read failures from `graph`.
pub fn neighborhood<G: GraphRead + ?Sized>(
    graph: &G,
    node: &Node,
    max_depth: usize,
    now: DateTime<Utc>,
) -> Result<DependencyGraph> {
    let mut seen: Vec<DependencyEdge> = Vec::new();

    let down = walk(graph, node.id, Direction::Dependencies, Some(max_depth), |e| {
        seen.push(e.clone());
        Follow::Expand
    })?;
    let up = walk(graph, node.id, Direction::Dependents, Some(max_depth), |e| {
        seen.push(e.clone());
        Follow::Expand
    })?;

    let listing = |direction: Direction, steps: &[super::Step]| -> Vec<GraphNode> {
        steps
            .iter()
            .map(|s| {
                let (id, key) = direction.far(&s.edge);
                GraphNode {
                    node_id: id,
                    node_key: key.clone(),
                    edge_id: s.edge.id,
                    dependency_type: s.edge.dependency_type.clone(),
                    strength: s.edge.strength,
                    depth: s.depth,
                    parent: s.parent,
                }
            })
            .collect()
    };

    let mut edges: DiGraphMap<NodeId, ()> = DiGraphMap::new();
    for e in &seen {
        edges.add_edge(e.dependent_node_id, e.dependency_node_id, ());
    }

    Ok(DependencyGraph {
        node_id: node.id,
        node_key: node.key.clone(),
        dependencies: listing(Direction::Dependencies, &down.steps),
        dependents: listing(Direction::Dependents, &up.steps),
        has_circular: algo::is_cyclic_directed(&edges),
        max_depth,
        generation: node.generation,
        computed_at: now,
    })
}

/// Read-through cache of node neighborhoods.
#[derive(Debug, Clone, Copy)]
pub struct GraphCache {
    ttl: chrono::Duration,
    max_depth: usize,
}

impl GraphCache {
    /// A cache with the configured TTL and traversal depth.
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            ttl: config.ttl(),
            max_depth: config.max_depth,
        }
    }

    /// Read `node`'s entry without writing anything.
    ///
    /// Returns the graph only on a [`CacheLookup::Hit`]; otherwise `None` and
    /// why the entry was unusable.
    pub(crate) fn lookup(
        &self,
        conn: &Connection,
        node: &Node,
        now: DateTime<Utc>,
    ) -> Result<(Option<DependencyGraph>, CacheLookup)> {
        let lookup = match cache::get(conn, node.id)? {
            None => CacheLookup::Miss,
            Some(row) if row.generation != node.generation => CacheLookup::Stale,
            Some(row) if row.expires_at <= now => CacheLookup::Expired,
            Some(row) => match serde_json::from_str::<DependencyGraph>(&row.graph_data) {
                Ok(graph) => {
                    tracing::debug!(node = %node.key, "Graph cache hit");
                    return Ok((Some(graph), CacheLookup::Hit));
                }
                Err(e) => {
                    tracing::warn!(node = %node.key, error = %e, "Unreadable cache entry, recomputing");
                    CacheLookup::Stale
                }
            },
        };
        Ok((None, lookup))
    }

    /// Serve `node`'s neighborhood, recomputing and storing it unless a
    /// valid entry exists. `conn` must be a write transaction.
    pub(crate) fn get(
        &self,
        conn: &Connection,
        node: &Node,
        now: DateTime<Utc>,
    ) -> Result<(DependencyGraph, CacheLookup)> {
        let lookup = match self.lookup(conn, node, now)? {
            (Some(graph), lookup) => return Ok((graph, lookup)),
            (None, lookup) => lookup,
        };

        let graph = neighborhood(conn, node, self.max_depth, now)?;
        cache::upsert(
            conn,
            node.id,
            &serde_json::to_string(&graph)?,
            node.generation,
            graph.has_circular,
            now,
            now + self.ttl,
        )?;
        tracing::debug!(node = %node.key, ?lookup, "Graph cache refreshed");
        Ok((graph, lookup))
    }

    /// Remove every expired entry.
    pub(crate) fn purge_expired(&self, conn: &Connection, now: DateTime<Utc>) -> Result<usize> {
        let purged = cache::purge_expired(conn, now)?;
        if purged > 0 {
            tracing::info!(purged, "Purged expired graph cache entries");
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::EdgeList;
    use super::*;
    use nodegraph_key::CompositeKey;

    fn node(id: i64) -> Node {
        let now = Utc::now();
        Node {
            id: NodeId(id),
            key: CompositeKey::node("url-db", "docs", id).unwrap(),
            domain: "docs".to_string(),
            title: String::new(),
            generation: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn neighborhood_lists_both_directions_with_parents() {
        // 1 -> 2 -> 3, 9 -> 1
        let mut graph = EdgeList::default();
        graph
            .add(1, 2, "soft", 50, false, true)
            .add(2, 3, "soft", 50, false, true)
            .add(9, 1, "runtime", 80, false, true);

        let hood = neighborhood(&graph, &node(1), 10, Utc::now()).unwrap();

        let deps: Vec<_> = hood
            .dependencies
            .iter()
            .map(|n| (n.node_id.as_i64(), n.depth, n.parent.as_i64()))
            .collect();
        assert_eq!(deps, vec![(2, 1, 1), (3, 2, 2)]);
        assert_eq!(hood.dependents.len(), 1);
        assert_eq!(hood.dependents[0].dependency_type, "runtime");
        assert!(!hood.has_circular);
    }

    #[test]
    fn neighborhood_stops_at_max_depth() {
        let mut graph = EdgeList::default();
        graph
            .add(1, 2, "soft", 50, false, true)
            .add(2, 3, "soft", 50, false, true);

        let hood = neighborhood(&graph, &node(1), 1, Utc::now()).unwrap();
        assert_eq!(hood.dependencies.len(), 1);
    }

    #[test]
    fn neighborhood_flags_cycles() {
        let mut graph = EdgeList::default();
        graph
            .add(1, 2, "soft", 50, false, true)
            .add(2, 1, "soft", 50, false, true);

        let hood = neighborhood(&graph, &node(1), 10, Utc::now()).unwrap();
        assert!(hood.has_circular);
    }

    #[test]
    fn closure_covers_upstream_dependents_and_downstream_dependencies() {
        // 5 -> 1 -> 2 -> 3, 4 -> 3 ; closure of edge 1 -> 2
        let mut graph = EdgeList::default();
        graph
            .add(5, 1, "soft", 50, false, true)
            .add(1, 2, "soft", 50, false, true)
            .add(2, 3, "soft", 50, false, true)
            .add(4, 3, "soft", 50, false, true);

        let closure = edge_closure(&graph, &graph.0[1]).unwrap();
        let ids: Vec<_> = closure.into_iter().map(NodeId::as_i64).collect();
        assert_eq!(ids, vec![1, 2, 3, 5]);
    }
}
