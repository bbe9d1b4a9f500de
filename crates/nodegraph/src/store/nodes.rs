//! Node registry operations.
//!
//! The registry is the graph's view of nodes owned by the node-CRUD
//! collaborator: enough for existence checks, key rendering and generation
//! counters. Rows are removed when a node is deleted; its edges and events
//! keep the node's key.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use super::helpers::{NODE_COLUMNS, row_to_node, to_micros};
use crate::domain::{Node, NodeId};
use crate::error::{Error, ResourceKind, Result};

/// Insert a node and return it with its assigned id.
pub(crate) fn insert(
    conn: &Connection,
    tool: &str,
    domain: &str,
    title: &str,
    now: DateTime<Utc>,
) -> Result<Node> {
    conn.execute(
        "INSERT INTO nodes (tool, domain, title, generation, created_at, updated_at)
         VALUES (?1, ?2, ?3, 0, ?4, ?4)",
        params![tool, domain, title, to_micros(now)],
    )?;
    let id = NodeId(conn.last_insert_rowid());
    require(conn, id)
}

/// Get a node by id.
pub(crate) fn get(conn: &Connection, id: NodeId) -> Result<Option<Node>> {
    let sql = format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = ?1");
    Ok(conn
        .query_row(&sql, [id.as_i64()], row_to_node)
        .optional()?)
}

/// Get a node by id, failing with [`Error::NotFound`] if it does not exist.
pub(crate) fn require(conn: &Connection, id: NodeId) -> Result<Node> {
    get(conn, id)?.ok_or_else(|| Error::not_found(ResourceKind::Node, id))
}

/// Update a node's title and `updated_at`.
pub(crate) fn touch(
    conn: &Connection,
    id: NodeId,
    title: Option<&str>,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "UPDATE nodes SET title = COALESCE(?2, title), updated_at = ?3 WHERE id = ?1",
        params![id.as_i64(), title, to_micros(now)],
    )?;
    Ok(())
}

/// Remove a node's registry row. Returns `false` if it was already gone.
pub(crate) fn remove(conn: &Connection, id: NodeId) -> Result<bool> {
    let removed = conn.execute("DELETE FROM nodes WHERE id = ?1", [id.as_i64()])?;
    Ok(removed > 0)
}

/// Bump the generation of every node in `ids`.
///
/// Ids of nodes that no longer exist are skipped.
pub(crate) fn bump_generations(conn: &Connection, ids: &BTreeSet<NodeId>) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let mut stmt = conn.prepare("UPDATE nodes SET generation = generation + 1 WHERE id = ?1")?;
    for id in ids {
        stmt.execute([id.as_i64()])?;
    }
    tracing::debug!(count = ids.len(), "Bumped node generations");
    Ok(())
}

/// List nodes, optionally restricted to one domain, ordered by id.
pub(crate) fn list(conn: &Connection, domain: Option<&str>) -> Result<Vec<Node>> {
    let sql = format!(
        "SELECT {NODE_COLUMNS} FROM nodes WHERE (?1 IS NULL OR domain = ?1) ORDER BY id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let nodes = stmt
        .query_map([domain], row_to_node)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(nodes)
}
