//! Graph cache rows.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use super::helpers::{timestamp, to_micros};
use crate::domain::NodeId;
use crate::error::Result;

/// A stored cache row. `graph_data` is the serialized neighborhood.
#[derive(Debug, Clone)]
pub(crate) struct CacheRow {
    pub graph_data: String,
    pub generation: i64,
    pub expires_at: DateTime<Utc>,
}

/// Get the cache row of a node.
pub(crate) fn get(conn: &Connection, node: NodeId) -> Result<Option<CacheRow>> {
    Ok(conn
        .query_row(
            "SELECT graph_data, generation, expires_at FROM dependency_graph_cache
             WHERE node_id = ?1",
            [node.as_i64()],
            |row| {
                Ok(CacheRow {
                    graph_data: row.get(0)?,
                    generation: row.get(1)?,
                    expires_at: timestamp(row, 2)?,
                })
            },
        )
        .optional()?)
}

/// Insert or replace the cache row of a node.
pub(crate) fn upsert(
    conn: &Connection,
    node: NodeId,
    graph_data: &str,
    generation: i64,
    has_circular: bool,
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO dependency_graph_cache
             (node_id, graph_data, generation, has_circular, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(node_id) DO UPDATE SET
             graph_data = excluded.graph_data,
             generation = excluded.generation,
             has_circular = excluded.has_circular,
             created_at = excluded.created_at,
             expires_at = excluded.expires_at",
        params![
            node.as_i64(),
            graph_data,
            generation,
            has_circular,
            to_micros(now),
            to_micros(expires_at)
        ],
    )?;
    Ok(())
}

/// Drop the cache row of a node.
pub(crate) fn remove(conn: &Connection, node: NodeId) -> Result<()> {
    conn.execute(
        "DELETE FROM dependency_graph_cache WHERE node_id = ?1",
        [node.as_i64()],
    )?;
    Ok(())
}

/// Delete every row that expired at or before `now`.
pub(crate) fn purge_expired(conn: &Connection, now: DateTime<Utc>) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM dependency_graph_cache WHERE expires_at <= ?1",
        [to_micros(now)],
    )?)
}
