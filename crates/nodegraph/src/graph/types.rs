//! Result types for graph operations.

use chrono::{DateTime, Utc};
use nodegraph_key::CompositeKey;
use serde::{Deserialize, Serialize};

use crate::domain::{EdgeId, EventId, ImpactType, NodeId};

/// A node's dependency neighborhood, as served by the graph cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyGraph {
    /// Registry id of the node.
    pub node_id: NodeId,
    /// Composite key of the node.
    pub node_key: CompositeKey,
    /// Transitive dependencies, breadth-first.
    pub dependencies: Vec<GraphNode>,
    /// Transitive dependents, breadth-first.
    pub dependents: Vec<GraphNode>,
    /// Whether the edges in this neighborhood contain a cycle.
    pub has_circular: bool,
    /// Deepest level reached in either direction.
    pub max_depth: usize,
    /// The node's generation when this neighborhood was computed.
    pub generation: i64,
    /// When the neighborhood was computed.
    pub computed_at: DateTime<Utc>,
}

/// One node of a [`DependencyGraph`] listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Registry id of the node.
    pub node_id: NodeId,
    /// Composite key of the node.
    pub node_key: CompositeKey,
    /// Edge the node was reached through.
    pub edge_id: EdgeId,
    /// Catalog type name of the edge.
    pub dependency_type: String,
    /// Edge strength, 0-100.
    pub strength: u8,
    /// 1 for direct neighbors.
    pub depth: usize,
    /// The node this one was reached from.
    pub parent: NodeId,
}

/// How the graph cache answered a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheLookup {
    /// Served from a valid entry.
    Hit,
    /// No entry existed.
    Miss,
    /// An entry existed but its generation was behind the node's.
    Stale,
    /// An entry existed but had expired.
    Expired,
}

/// Severity of a change for one affected node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    /// Little or no action needed.
    Low,
    /// Review recommended.
    Medium,
    /// Likely to break without action.
    High,
    /// Removed or changed automatically.
    Critical,
}

impl std::fmt::Display for ImpactLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A node a prospective change would affect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedNode {
    /// Registry id of the node.
    pub node_id: NodeId,
    /// Composite key of the node.
    pub node_key: CompositeKey,
    /// The edge through which the change reaches this node.
    pub edge_id: EdgeId,
    /// Catalog type name of the edge.
    pub dependency_type: String,
    /// Edge strength, 0-100.
    pub strength: u8,
    /// 1 for direct dependents.
    pub depth: usize,
    /// Severity for this node.
    pub impact_level: ImpactLevel,
    /// Why the node is affected.
    pub reason: String,
    /// What its owner should do.
    pub action_needed: String,
    /// Keys from the analyzed source down to this node, both inclusive.
    pub path: Vec<CompositeKey>,
    /// Whether the change would propagate past this node.
    pub cascades: bool,
}

/// The predicted blast radius of a change. Never authoritative state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactAnalysis {
    /// Registry id of the analyzed node.
    pub source_node_id: NodeId,
    /// Composite key of the analyzed node.
    pub source_key: CompositeKey,
    /// The simulated change.
    pub impact_type: ImpactType,
    /// Affected nodes in breadth-first order.
    pub affected_nodes: Vec<AffectedNode>,
    /// 0-100; see [`analyze`](super::analyze).
    pub score: u8,
    /// Deepest depth the change would reach.
    pub cascade_depth: usize,
    /// Conditions the caller should know about.
    pub warnings: Vec<String>,
    /// Suggested precautions.
    pub recommendations: Vec<String>,
    /// When the analysis ran.
    pub analyzed_at: DateTime<Utc>,
}

impl ImpactAnalysis {
    /// Returns `true` if the score is strictly above `threshold`.
    ///
    /// Callers use this to abort a destructive operation before running it.
    #[must_use]
    pub fn exceeds(&self, threshold: u8) -> bool {
        self.score > threshold
    }

    /// Number of affected nodes at `level`.
    #[must_use]
    pub fn count_at(&self, level: ImpactLevel) -> usize {
        self.affected_nodes
            .iter()
            .filter(|n| n.impact_level == level)
            .count()
    }

    /// The most severe level among affected nodes.
    #[must_use]
    pub fn max_level(&self) -> Option<ImpactLevel> {
        self.affected_nodes.iter().map(|n| n.impact_level).max()
    }
}

/// A cycle found by the whole-graph audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cycle {
    /// Keys along the cycle; each depends on the next, the last on the first.
    pub nodes: Vec<CompositeKey>,
    /// The edges along the cycle, in the same order.
    pub edges: Vec<EdgeId>,
    /// The lowest-strength edge, the natural one to remove.
    pub weakest_edge: EdgeId,
    /// Strength of the weakest edge.
    pub weakest_strength: u8,
}

/// What a delete cascade did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeReport {
    /// The node the cascade started from.
    pub root: CompositeKey,
    /// Every deleted node, root first, in cascade order.
    pub deleted: Vec<CompositeKey>,
    /// Every edge the cascade deactivated.
    pub deactivated_edges: Vec<EdgeId>,
    /// One `deleted` event per deleted node.
    pub events: Vec<EventId>,
    /// Deepest cascade level reached (0 when only the root was deleted).
    pub depth: usize,
}

/// What an update notification cascade did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReport {
    /// The updated node.
    pub node: CompositeKey,
    /// The `updated` event of the node itself.
    pub event: EventId,
    /// Dependents notified through cascade-update edges, breadth-first.
    pub notified: Vec<CompositeKey>,
    /// One `dependency_updated` event per notified dependent.
    pub events: Vec<EventId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impact_levels_order_by_severity() {
        assert!(ImpactLevel::Critical > ImpactLevel::High);
        assert!(ImpactLevel::High > ImpactLevel::Medium);
        assert!(ImpactLevel::Medium > ImpactLevel::Low);
    }

    #[test]
    fn exceeds_is_strict() {
        let analysis = ImpactAnalysis {
            source_node_id: NodeId(1),
            source_key: CompositeKey::node("url-db", "docs", 1).unwrap(),
            impact_type: ImpactType::Delete,
            affected_nodes: Vec::new(),
            score: 40,
            cascade_depth: 0,
            warnings: Vec::new(),
            recommendations: Vec::new(),
            analyzed_at: Utc::now(),
        };
        assert!(analysis.exceeds(39));
        assert!(!analysis.exceeds(40));
        assert_eq!(analysis.max_level(), None);
    }
}
