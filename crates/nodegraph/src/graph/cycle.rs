//! Cycle detection.
//!
//! Two entry points:
//! - [`would_create_cycle`] guards every edge insert, over whatever
//!   [`GraphRead`] the writer holds (normally its own transaction).
//! - [`find_cycles`] audits a whole edge set with Tarjan's SCC algorithm. In
//!   a store where every edge passed the guard it finds nothing.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use super::GraphRead;
use super::types::Cycle;
use crate::domain::{DependencyEdge, NodeId};
use crate::error::Result;

/// Returns `true` if adding `dependent -> dependency` would close a cycle.
///
/// Iterative DFS from `dependency` along active edges of every type; the
/// edge closes a cycle exactly when `dependent` is reachable, or when it is
/// a self-loop. Each node is expanded at most once, so this is O(V + E).
///
/// # Errors
///
/// Propagates read failures from `graph`.
pub fn would_create_cycle<G: GraphRead + ?Sized>(
    graph: &G,
    dependent: NodeId,
    dependency: NodeId,
) -> Result<bool> {
    if dependent == dependency {
        return Ok(true);
    }

    let mut visited: HashSet<NodeId> = HashSet::from([dependency]);
    let mut stack = vec![dependency];

    while let Some(node) = stack.pop() {
        for edge in graph.dependencies_of(node)? {
            let next = edge.dependency_node_id;
            if next == dependent {
                tracing::debug!(%dependent, %dependency, via = %node, "Edge would close a cycle");
                return Ok(true);
            }
            if visited.insert(next) {
                stack.push(next);
            }
        }
    }

    Ok(false)
}

/// Find every cycle in `edges`, one per strongly connected component.
///
/// Each reported cycle is a concrete path through its component, along with
/// the weakest edge on that path.
#[must_use]
pub fn find_cycles(edges: &[DependencyEdge]) -> Vec<Cycle> {
    let mut graph: DiGraph<NodeId, usize> = DiGraph::new();
    let mut index: HashMap<NodeId, NodeIndex> = HashMap::new();

    for (i, edge) in edges.iter().enumerate() {
        let from = *index
            .entry(edge.dependent_node_id)
            .or_insert_with(|| graph.add_node(edge.dependent_node_id));
        let to = *index
            .entry(edge.dependency_node_id)
            .or_insert_with(|| graph.add_node(edge.dependency_node_id));
        graph.add_edge(from, to, i);
    }

    let mut cycles = Vec::new();
    for component in algo::tarjan_scc(&graph) {
        let is_cycle = component.len() > 1
            || component
                .first()
                .is_some_and(|&n| graph.edges_connecting(n, n).next().is_some());
        if !is_cycle {
            continue;
        }

        let members: HashSet<NodeIndex> = component.iter().copied().collect();
        if let Some(path) = cycle_path(&graph, component[0], &members) {
            let cycle_edges: Vec<&DependencyEdge> = path.iter().map(|&i| &edges[i]).collect();
            let Some(weakest) = cycle_edges.iter().min_by_key(|e| e.strength) else {
                continue;
            };
            cycles.push(Cycle {
                nodes: cycle_edges.iter().map(|e| e.dependent_key.clone()).collect(),
                edges: cycle_edges.iter().map(|e| e.id).collect(),
                weakest_edge: weakest.id,
                weakest_strength: weakest.strength,
            });
        }
    }

    if !cycles.is_empty() {
        tracing::warn!(count = cycles.len(), "Found dependency cycles");
    }
    cycles
}

/// Shortest path of edge payloads from `start` back to itself, staying inside
/// `members`.
fn cycle_path(
    graph: &DiGraph<NodeId, usize>,
    start: NodeIndex,
    members: &HashSet<NodeIndex>,
) -> Option<Vec<usize>> {
    // parent[n] = (previous node, edge payload used to reach n)
    let mut parent: HashMap<NodeIndex, (NodeIndex, usize)> = HashMap::new();
    let mut queue = VecDeque::from([start]);

    while let Some(node) = queue.pop_front() {
        for edge in graph.edges(node) {
            let next = edge.target();
            if !members.contains(&next) {
                continue;
            }
            if next == start {
                let mut path = vec![*edge.weight()];
                let mut current = node;
                while current != start {
                    let &(prev, payload) = parent.get(&current)?;
                    path.push(payload);
                    current = prev;
                }
                path.reverse();
                return Some(path);
            }
            if !parent.contains_key(&next) {
                parent.insert(next, (node, *edge.weight()));
                queue.push_back(next);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::super::testing::{EdgeList, edge};
    use super::*;
    use crate::domain::EdgeId;

    #[test]
    fn self_loop_is_a_cycle() {
        let graph = EdgeList::default();
        assert!(would_create_cycle(&graph, NodeId(1), NodeId(1)).unwrap());
    }

    #[test]
    fn reverse_edge_is_a_cycle() {
        let mut graph = EdgeList::default();
        graph.add(1, 2, "soft", 50, false, true);
        assert!(would_create_cycle(&graph, NodeId(2), NodeId(1)).unwrap());
    }

    #[test]
    fn transitive_back_edge_is_a_cycle_whatever_the_type() {
        // 1 -> 2 -> 3 via different types; 3 -> 1 closes it.
        let mut graph = EdgeList::default();
        graph
            .add(1, 2, "reference", 30, false, false)
            .add(2, 3, "async", 40, false, false);
        assert!(would_create_cycle(&graph, NodeId(3), NodeId(1)).unwrap());
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let mut graph = EdgeList::default();
        graph
            .add(1, 2, "soft", 50, false, true)
            .add(1, 3, "soft", 50, false, true)
            .add(2, 4, "soft", 50, false, true);
        assert!(!would_create_cycle(&graph, NodeId(3), NodeId(4)).unwrap());
    }

    #[test]
    fn audit_of_acyclic_edges_is_empty() {
        let mut graph = EdgeList::default();
        graph
            .add(1, 2, "soft", 50, false, true)
            .add(2, 3, "soft", 50, false, true);
        assert!(find_cycles(&graph.0).is_empty());
    }

    #[test]
    fn audit_reports_path_and_weakest_link() {
        let edges = vec![
            edge(EdgeId(1), 1, 2, "hard", 90, true, true),
            edge(EdgeId(2), 2, 3, "optional", 20, false, false),
            edge(EdgeId(3), 3, 1, "soft", 50, false, true),
            edge(EdgeId(4), 4, 1, "soft", 50, false, true),
        ];

        let cycles = find_cycles(&edges);
        assert_eq!(cycles.len(), 1);

        let cycle = &cycles[0];
        assert_eq!(cycle.edges.len(), 3);
        assert_eq!(cycle.weakest_edge, EdgeId(2));
        assert_eq!(cycle.weakest_strength, 20);
    }
}
