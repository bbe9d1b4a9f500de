//! Event log operations.
//!
//! The log is append-only: rows are inserted with `processed_at = NULL` and
//! the only later write is the one conditional update that acknowledges an
//! event. Schema triggers reject anything else.

use chrono::{DateTime, Utc};
use nodegraph_key::CompositeKey;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;

use super::helpers::{EVENT_COLUMNS, parse_event_type, row_to_event, to_micros};
use crate::domain::{EventId, EventStats, EventType, NodeEvent, NodeId};
use crate::error::Result;

/// Append an unprocessed event.
pub(crate) fn insert(
    conn: &Connection,
    node: NodeId,
    node_key: &CompositeKey,
    event_type: EventType,
    payload: &Value,
    now: DateTime<Utc>,
) -> Result<EventId> {
    conn.execute(
        "INSERT INTO node_events (node_id, node_key, event_type, event_data, occurred_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            node.as_i64(),
            node_key.to_string(),
            event_type.as_str(),
            serde_json::to_string(payload)?,
            to_micros(now),
        ],
    )?;
    Ok(EventId(conn.last_insert_rowid()))
}

fn collect(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<NodeEvent>> {
    let mut stmt = conn.prepare(sql)?;
    let events = stmt
        .query_map(params, row_to_event)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(events)
}

/// Unprocessed events, oldest first.
pub(crate) fn pending(conn: &Connection, limit: usize) -> Result<Vec<NodeEvent>> {
    let sql = format!(
        "SELECT {EVENT_COLUMNS} FROM node_events WHERE processed_at IS NULL
         ORDER BY occurred_at, id LIMIT ?1"
    );
    collect(conn, &sql, [limit_param(limit)])
}

/// Events of one node, newest first.
pub(crate) fn for_node(conn: &Connection, node: NodeId, limit: usize) -> Result<Vec<NodeEvent>> {
    let sql = format!(
        "SELECT {EVENT_COLUMNS} FROM node_events WHERE node_id = ?1
         ORDER BY occurred_at DESC, id DESC LIMIT ?2"
    );
    collect(conn, &sql, [node.as_i64(), limit_param(limit)])
}

/// Events of one type with `start <= occurred_at <= end`, oldest first.
pub(crate) fn by_type(
    conn: &Connection,
    event_type: EventType,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<NodeEvent>> {
    let sql = format!(
        "SELECT {EVENT_COLUMNS} FROM node_events
         WHERE event_type = ?1 AND occurred_at BETWEEN ?2 AND ?3
         ORDER BY occurred_at, id"
    );
    collect(
        conn,
        &sql,
        params![event_type.as_str(), to_micros(start), to_micros(end)],
    )
}

/// Mark an event processed if it is not already.
///
/// Returns `true` if this call changed the row. Safe under concurrent
/// consumers: the `processed_at IS NULL` guard lets exactly one succeed.
pub(crate) fn mark_processed(conn: &Connection, id: EventId, now: DateTime<Utc>) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE node_events SET processed_at = ?2 WHERE id = ?1 AND processed_at IS NULL",
        params![id.as_i64(), to_micros(now)],
    )?;
    Ok(changed > 0)
}

/// Returns `true` if an event with `id` exists.
pub(crate) fn exists(conn: &Connection, id: EventId) -> Result<bool> {
    Ok(conn
        .query_row("SELECT 1 FROM node_events WHERE id = ?1", [id.as_i64()], |_| Ok(()))
        .optional()?
        .is_some())
}

/// Aggregate counts over the whole log.
pub(crate) fn stats(conn: &Connection) -> Result<EventStats> {
    let (total, pending, oldest): (i64, i64, Option<i64>) = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN processed_at IS NULL THEN 1 ELSE 0 END), 0),
                MIN(CASE WHEN processed_at IS NULL THEN occurred_at END)
         FROM node_events",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    let mut stmt =
        conn.prepare("SELECT event_type, COUNT(*) FROM node_events GROUP BY event_type")?;
    let by_type = stmt
        .query_map([], |row| {
            let event_type: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((parse_event_type(&event_type)?, count.unsigned_abs()))
        })?
        .collect::<std::result::Result<_, _>>()?;

    Ok(EventStats {
        total: total.unsigned_abs(),
        pending: pending.unsigned_abs(),
        processed: (total - pending).unsigned_abs(),
        by_type,
        oldest_pending: oldest.and_then(DateTime::from_timestamp_micros),
    })
}

/// Delete processed events that occurred before `cutoff`.
///
/// Pending events are never deleted, however old.
pub(crate) fn delete_processed_before(conn: &Connection, cutoff: DateTime<Utc>) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM node_events WHERE processed_at IS NOT NULL AND occurred_at < ?1",
        [to_micros(cutoff)],
    )?)
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Store, nodes};
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn pending_is_oldest_first_and_ack_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let t0 = Utc::now();

        let (first, second) = store
            .write(|tx| {
                let node = nodes::insert(tx, "url-db", "docs", "a", t0)?;
                let first = insert(tx, node.id, &node.key, EventType::Created, &json!({}), t0)?;
                let second = insert(
                    tx,
                    node.id,
                    &node.key,
                    EventType::Updated,
                    &json!({"title": "b"}),
                    t0 + Duration::seconds(1),
                )?;
                Ok((first, second))
            })
            .unwrap();

        let queued = store.read(|tx| pending(tx, 10)).unwrap();
        assert_eq!(
            queued.iter().map(|e| e.id).collect::<Vec<_>>(),
            vec![first, second]
        );

        assert!(store.write(|tx| mark_processed(tx, first, Utc::now())).unwrap());
        assert!(!store.write(|tx| mark_processed(tx, first, Utc::now())).unwrap());

        let remaining = store.read(|tx| pending(tx, 10)).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, second);
    }

    #[test]
    fn events_cannot_be_rewritten() {
        let store = Store::open_in_memory().unwrap();
        let err = store
            .write(|tx| {
                let node = nodes::insert(tx, "url-db", "docs", "a", Utc::now())?;
                let id = insert(tx, node.id, &node.key, EventType::Created, &json!({}), Utc::now())?;
                tx.execute(
                    "UPDATE node_events SET event_type = 'deleted' WHERE id = ?1",
                    [id.as_i64()],
                )?;
                Ok(())
            })
            .unwrap_err();
        assert!(err.to_string().contains("immutable"));
    }

    #[test]
    fn cleanup_keeps_pending_events() {
        let store = Store::open_in_memory().unwrap();
        let old = Utc::now() - Duration::days(30);

        let deleted = store
            .write(|tx| {
                let node = nodes::insert(tx, "url-db", "docs", "a", old)?;
                let done = insert(tx, node.id, &node.key, EventType::Created, &json!({}), old)?;
                insert(tx, node.id, &node.key, EventType::Updated, &json!({}), old)?;
                mark_processed(tx, done, Utc::now())?;
                delete_processed_before(tx, Utc::now() - Duration::days(1))
            })
            .unwrap();
        assert_eq!(deleted, 1);

        let summary = store.read(|tx| stats(tx)).unwrap();
        assert_eq!(summary.total, 1);
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.by_type.get(&EventType::Updated), Some(&1));
    }
}
