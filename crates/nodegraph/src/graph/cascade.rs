//! Cascade Executor: delete and update propagation.
//!
//! Both cascades run on the caller's connection, which is always an open
//! `IMMEDIATE` transaction. Any error leaves the transaction to roll back,
//! so a failed cascade applies nothing.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use nodegraph_key::CompositeKey;
use rusqlite::Connection;
use serde_json::{Value, json};

use super::cache::edge_closure;
use super::types::CascadeReport;
use super::{Direction, Follow, walk};
use crate::domain::{EventId, EventType, Node, NodeId};
use crate::error::{Error, Result};
use crate::store::{cache, edges, events, nodes};

/// Limits applied to a cascade.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CascadePolicy {
    /// Deepest level a cascade may reach; `None` is unlimited.
    pub max_depth: Option<usize>,
}

impl CascadePolicy {
    fn check(self, root: &Node, depth: usize) -> Result<()> {
        match self.max_depth {
            Some(max) if depth > max => {
                tracing::warn!(root = %root.key, depth, max, "Cascade exceeds depth limit");
                Err(Error::Validation(format!(
                    "cascade depth {depth} exceeds the configured limit of {max}"
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Delete `root` and every node that transitively depends on it through
/// cascade-delete edges.
///
/// For each deleted node: every active edge touching it is deactivated (with
/// history), one `deleted` event is recorded, and its registry and cache rows
/// are removed. Dependents reached through non-cascading edges only lose the
/// edge. Generations of every node whose neighborhood changed are bumped.
pub(crate) fn cascade_delete(
    conn: &Connection,
    root: &Node,
    policy: CascadePolicy,
    now: DateTime<Utc>,
) -> Result<CascadeReport> {
    let plan = walk(conn, root.id, Direction::Dependents, None, |edge| {
        if edge.cascade_delete {
            Follow::Expand
        } else {
            Follow::Skip
        }
    })?;
    let depth = plan.max_depth();
    policy.check(root, depth)?;

    let order: Vec<(NodeId, usize)> = std::iter::once((root.id, 0))
        .chain(plan.steps.iter().map(|s| (s.edge.dependent_node_id, s.depth)))
        .collect();

    let mut report = CascadeReport {
        root: root.key.clone(),
        deleted: Vec::with_capacity(order.len()),
        deactivated_edges: Vec::new(),
        events: Vec::with_capacity(order.len()),
        depth,
    };
    let mut touched: BTreeSet<NodeId> = BTreeSet::new();

    for (id, level) in order {
        let node = nodes::require(conn, id)?;

        for edge in edges::active_touching(conn, id)? {
            touched.extend(edge_closure(conn, &edge)?);
            edges::deactivate(conn, &edge, now)?;
            report.deactivated_edges.push(edge.id);
        }

        let payload = json!({
            "node_key": node.key,
            "domain": node.domain,
            "title": node.title,
            "cascade_root": root.key,
            "cascade_depth": level,
        });
        let event = events::insert(conn, id, &node.key, EventType::Deleted, &payload, now)?;
        report.events.push(event);

        cache::remove(conn, id)?;
        nodes::remove(conn, id)?;
        tracing::debug!(node = %node.key, level, "Deleted node");
        report.deleted.push(node.key);
    }

    nodes::bump_generations(conn, &touched)?;

    tracing::info!(
        root = %root.key,
        deleted = report.deleted.len(),
        edges = report.deactivated_edges.len(),
        depth,
        "Cascade delete complete"
    );
    Ok(report)
}

/// Notify every node that transitively depends on `root` through
/// cascade-update edges.
///
/// Records one `dependency_updated` event per reached dependent, breadth
/// first. Dependents themselves are never modified.
pub(crate) fn cascade_update(
    conn: &Connection,
    root: &Node,
    changes: &Value,
    policy: CascadePolicy,
    now: DateTime<Utc>,
) -> Result<Vec<(CompositeKey, EventId)>> {
    let plan = walk(conn, root.id, Direction::Dependents, None, |edge| {
        if edge.cascade_update {
            Follow::Expand
        } else {
            Follow::Skip
        }
    })?;
    policy.check(root, plan.max_depth())?;

    let mut notified = Vec::with_capacity(plan.steps.len());
    for step in &plan.steps {
        let payload = json!({
            "source": root.key,
            "changes": changes,
            "dependency_type": step.edge.dependency_type,
            "via_edge": step.edge.id,
            "depth": step.depth,
        });
        let event = events::insert(
            conn,
            step.edge.dependent_node_id,
            &step.edge.dependent_key,
            EventType::DependencyUpdated,
            &payload,
            now,
        )?;
        notified.push((step.edge.dependent_key.clone(), event));
    }

    tracing::info!(node = %root.key, notified = notified.len(), "Update cascade complete");
    Ok(notified)
}
