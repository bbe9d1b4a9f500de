//! Dependency edge operations and the edge history trail.
//!
//! Every transition of an edge writes one history row in the same
//! transaction: `created` on insert, `updated` on change, `deactivated` on
//! soft delete. Rows in `node_dependencies` are never removed.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;

use super::constraint_error;
use super::helpers::{EDGE_COLUMNS, HISTORY_COLUMNS, row_to_edge, row_to_history, to_micros};
use crate::domain::{DependencyEdge, DependencyHistory, EdgeId, EdgeUpdate, HistoryAction, Node, NodeId};
use crate::error::{Error, ResourceKind, Result};

/// A validated edge ready to insert.
#[derive(Debug, Clone)]
pub(crate) struct EdgeDraft<'a> {
    pub dependent: &'a Node,
    pub dependency: &'a Node,
    pub dependency_type: &'a str,
    pub strength: u8,
    pub priority: u8,
    pub cascade_delete: bool,
    pub cascade_update: bool,
    pub metadata: Option<&'a Value>,
    pub valid_until: Option<DateTime<Utc>>,
}

/// Insert an active edge and its `created` history row.
///
/// A second active edge with the same (dependent, dependency, type) fails
/// with [`Error::ConstraintViolation`].
pub(crate) fn insert(
    conn: &Connection,
    draft: &EdgeDraft<'_>,
    now: DateTime<Utc>,
) -> Result<DependencyEdge> {
    let metadata = draft.metadata.map(serde_json::to_string).transpose()?;
    conn.execute(
        "INSERT INTO node_dependencies
             (dependent_node_id, dependent_key, dependency_node_id, dependency_key,
              dependency_type, strength, priority, cascade_delete, cascade_update,
              metadata, valid_from, valid_until, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 1, ?11, ?11)",
        params![
            draft.dependent.id.as_i64(),
            draft.dependent.key.to_string(),
            draft.dependency.id.as_i64(),
            draft.dependency.key.to_string(),
            draft.dependency_type,
            draft.strength,
            draft.priority,
            draft.cascade_delete,
            draft.cascade_update,
            metadata,
            to_micros(now),
            draft.valid_until.map(to_micros),
        ],
    )
    .map_err(|e| {
        constraint_error(
            e,
            &format!(
                "cannot insert {} dependency {} -> {}",
                draft.dependency_type, draft.dependent.key, draft.dependency.key
            ),
        )
    })?;

    let edge = require(conn, EdgeId(conn.last_insert_rowid()))?;
    record_history(conn, &edge, HistoryAction::Created, None, now)?;
    Ok(edge)
}

/// Get an edge by id (active or not).
pub(crate) fn get(conn: &Connection, id: EdgeId) -> Result<Option<DependencyEdge>> {
    let sql = format!("SELECT {EDGE_COLUMNS} FROM node_dependencies WHERE id = ?1");
    Ok(conn
        .query_row(&sql, [id.as_i64()], row_to_edge)
        .optional()?)
}

/// Get an edge by id, failing with [`Error::NotFound`] if it never existed.
pub(crate) fn require(conn: &Connection, id: EdgeId) -> Result<DependencyEdge> {
    get(conn, id)?.ok_or_else(|| Error::not_found(ResourceKind::Dependency, id))
}

fn query_edges(conn: &Connection, filter: &str, node: NodeId) -> Result<Vec<DependencyEdge>> {
    let sql = format!(
        "SELECT {EDGE_COLUMNS} FROM node_dependencies WHERE is_active = 1 AND {filter} ORDER BY id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let edges = stmt
        .query_map([node.as_i64()], row_to_edge)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(edges)
}

/// Active edges where `node` is the dependent (what `node` depends on).
pub(crate) fn active_dependencies(conn: &Connection, node: NodeId) -> Result<Vec<DependencyEdge>> {
    query_edges(conn, "dependent_node_id = ?1", node)
}

/// Active edges where `node` is the dependency (what depends on `node`).
pub(crate) fn active_dependents(conn: &Connection, node: NodeId) -> Result<Vec<DependencyEdge>> {
    query_edges(conn, "dependency_node_id = ?1", node)
}

/// Active edges touching `node` in either direction.
pub(crate) fn active_touching(conn: &Connection, node: NodeId) -> Result<Vec<DependencyEdge>> {
    query_edges(
        conn,
        "(dependent_node_id = ?1 OR dependency_node_id = ?1)",
        node,
    )
}

/// All active edges, optionally restricted to edges whose endpoints are both
/// in `domain`.
pub(crate) fn active_edges(conn: &Connection, domain: Option<&str>) -> Result<Vec<DependencyEdge>> {
    let columns = EDGE_COLUMNS
        .split(", ")
        .map(|c| format!("e.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {columns} FROM node_dependencies e
         JOIN nodes a ON a.id = e.dependent_node_id
         JOIN nodes b ON b.id = e.dependency_node_id
         WHERE e.is_active = 1 AND (?1 IS NULL OR (a.domain = ?1 AND b.domain = ?1))
         ORDER BY e.id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let edges = stmt
        .query_map([domain], row_to_edge)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(edges)
}

/// Soft-delete an active edge and record a `deactivated` history row.
///
/// Returns the edge as it is after deactivation.
pub(crate) fn deactivate(
    conn: &Connection,
    edge: &DependencyEdge,
    now: DateTime<Utc>,
) -> Result<DependencyEdge> {
    let changed = conn.execute(
        "UPDATE node_dependencies SET is_active = 0, updated_at = ?2
         WHERE id = ?1 AND is_active = 1",
        params![edge.id.as_i64(), to_micros(now)],
    )?;
    if changed == 0 {
        return Err(Error::Validation(format!(
            "dependency {} is already inactive",
            edge.id
        )));
    }

    let after = require(conn, edge.id)?;
    record_history(conn, &after, HistoryAction::Deactivated, Some(edge), now)?;
    Ok(after)
}

/// Apply `update` to an active edge and record an `updated` history row.
pub(crate) fn update(
    conn: &Connection,
    edge: &DependencyEdge,
    update: &EdgeUpdate,
    now: DateTime<Utc>,
) -> Result<DependencyEdge> {
    let metadata = match &update.metadata {
        Some(m) => Some(serde_json::to_string(m)?),
        None => edge
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?,
    };

    let changed = conn.execute(
        "UPDATE node_dependencies
         SET strength = ?2, priority = ?3, cascade_delete = ?4, cascade_update = ?5,
             metadata = ?6, valid_until = ?7, updated_at = ?8
         WHERE id = ?1 AND is_active = 1",
        params![
            edge.id.as_i64(),
            update.strength.unwrap_or(edge.strength),
            update.priority.unwrap_or(edge.priority),
            update.cascade_delete.unwrap_or(edge.cascade_delete),
            update.cascade_update.unwrap_or(edge.cascade_update),
            metadata,
            update.valid_until.or(edge.valid_until).map(to_micros),
            to_micros(now),
        ],
    )?;
    if changed == 0 {
        return Err(Error::Validation(format!(
            "dependency {} is inactive and cannot be updated",
            edge.id
        )));
    }

    let after = require(conn, edge.id)?;
    record_history(conn, &after, HistoryAction::Updated, Some(edge), now)?;
    Ok(after)
}

fn record_history(
    conn: &Connection,
    after: &DependencyEdge,
    action: HistoryAction,
    before: Option<&DependencyEdge>,
    now: DateTime<Utc>,
) -> Result<()> {
    let previous = before.map(serde_json::to_string).transpose()?;
    let new = serde_json::to_string(after)?;
    conn.execute(
        "INSERT INTO dependency_history
             (dependency_id, action, previous_state, new_state, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            after.id.as_i64(),
            action.as_str(),
            previous,
            new,
            to_micros(now)
        ],
    )?;
    Ok(())
}

/// History of an edge, oldest first.
pub(crate) fn history(conn: &Connection, id: EdgeId) -> Result<Vec<DependencyHistory>> {
    let sql = format!(
        "SELECT {HISTORY_COLUMNS} FROM dependency_history WHERE dependency_id = ?1 ORDER BY id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([id.as_i64()], row_to_history)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Store, nodes};
    use serde_json::json;

    fn draft<'a>(dependent: &'a Node, dependency: &'a Node) -> EdgeDraft<'a> {
        EdgeDraft {
            dependent,
            dependency,
            dependency_type: "soft",
            strength: 50,
            priority: 50,
            cascade_delete: false,
            cascade_update: true,
            metadata: None,
            valid_until: None,
        }
    }

    fn two_nodes(tx: &Connection) -> Result<(Node, Node)> {
        let a = nodes::insert(tx, "url-db", "docs", "a", Utc::now())?;
        let b = nodes::insert(tx, "url-db", "docs", "b", Utc::now())?;
        Ok((a, b))
    }

    #[test]
    fn insert_records_created_history() {
        let store = Store::open_in_memory().unwrap();
        let (edge, history) = store
            .write(|tx| {
                let (a, b) = two_nodes(tx)?;
                let edge = insert(tx, &draft(&a, &b), Utc::now())?;
                let history = history(tx, edge.id)?;
                Ok((edge, history))
            })
            .unwrap();

        assert!(edge.is_active);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, HistoryAction::Created);
        assert!(history[0].previous_state.is_none());
    }

    #[test]
    fn duplicate_active_edge_is_constraint_violation() {
        let store = Store::open_in_memory().unwrap();
        let err = store
            .write(|tx| {
                let (a, b) = two_nodes(tx)?;
                insert(tx, &draft(&a, &b), Utc::now())?;
                insert(tx, &draft(&a, &b), Utc::now())
            })
            .unwrap_err();
        assert!(matches!(err, Error::ConstraintViolation(_)));
    }

    #[test]
    fn same_pair_with_another_type_is_allowed() {
        let store = Store::open_in_memory().unwrap();
        let count = store
            .write(|tx| {
                let (a, b) = two_nodes(tx)?;
                insert(tx, &draft(&a, &b), Utc::now())?;
                let mut other = draft(&a, &b);
                other.dependency_type = "runtime";
                insert(tx, &other, Utc::now())?;
                Ok(active_dependencies(tx, a.id)?.len())
            })
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn deactivated_edge_can_be_recreated() {
        let store = Store::open_in_memory().unwrap();
        let (first, second) = store
            .write(|tx| {
                let (a, b) = two_nodes(tx)?;
                let first = insert(tx, &draft(&a, &b), Utc::now())?;
                deactivate(tx, &first, Utc::now())?;
                let second = insert(tx, &draft(&a, &b), Utc::now())?;
                Ok((first.id, second.id))
            })
            .unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn unknown_type_is_rejected_by_foreign_key() {
        let store = Store::open_in_memory().unwrap();
        let err = store
            .write(|tx| {
                let (a, b) = two_nodes(tx)?;
                let mut bad = draft(&a, &b);
                bad.dependency_type = "weak";
                insert(tx, &bad, Utc::now())
            })
            .unwrap_err();
        assert!(matches!(err, Error::ConstraintViolation(_)));
    }

    #[test]
    fn update_keeps_unset_fields_and_snapshots_both_states() {
        let store = Store::open_in_memory().unwrap();
        let (edge, history) = store
            .write(|tx| {
                let (a, b) = two_nodes(tx)?;
                let edge = insert(tx, &draft(&a, &b), Utc::now())?;
                let change = EdgeUpdate {
                    strength: Some(75),
                    metadata: Some(json!({"note": "pinned"})),
                    ..EdgeUpdate::default()
                };
                let edge = update(tx, &edge, &change, Utc::now())?;
                Ok((edge.clone(), history(tx, edge.id)?))
            })
            .unwrap();

        assert_eq!(edge.strength, 75);
        assert_eq!(edge.priority, 50);
        assert!(edge.cascade_update);
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].action, HistoryAction::Updated);
        assert_eq!(history[1].previous_state.as_ref().unwrap()["strength"], 50);
        assert_eq!(history[1].new_state.as_ref().unwrap()["strength"], 75);
    }

    #[test]
    fn edges_are_never_hard_deleted() {
        let store = Store::open_in_memory().unwrap();
        let err = store
            .write(|tx| {
                let (a, b) = two_nodes(tx)?;
                let edge = insert(tx, &draft(&a, &b), Utc::now())?;
                tx.execute(
                    "DELETE FROM node_dependencies WHERE id = ?1",
                    [edge.id.as_i64()],
                )?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, Error::Database(_)));
    }

    #[test]
    fn active_edges_filters_by_domain() {
        let store = Store::open_in_memory().unwrap();
        let (all, docs) = store
            .write(|tx| {
                let (a, b) = two_nodes(tx)?;
                let c = nodes::insert(tx, "url-db", "blog", "c", Utc::now())?;
                insert(tx, &draft(&a, &b), Utc::now())?;
                insert(tx, &draft(&c, &a), Utc::now())?;
                Ok((active_edges(tx, None)?, active_edges(tx, Some("docs"))?))
            })
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(docs.len(), 1);
    }
}
