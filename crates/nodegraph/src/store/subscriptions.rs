//! Subscription CRUD operations.
//!
//! Subscriptions are routing configuration, not graph state: they are
//! hard-deleted, and their filters are stored and returned as opaque JSON.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;

use super::helpers::{SUBSCRIPTION_COLUMNS, row_to_subscription, to_micros};
use crate::domain::{EventType, Node, NodeId, Subscription, SubscriptionId};
use crate::error::{Error, ResourceKind, Result};

/// Insert an active subscription.
pub(crate) fn insert(
    conn: &Connection,
    service: &str,
    endpoint: Option<&str>,
    node: &Node,
    event_types: &[EventType],
    filter: Option<&Value>,
    now: DateTime<Utc>,
) -> Result<Subscription> {
    conn.execute(
        "INSERT INTO node_subscriptions
             (subscriber_service, subscriber_endpoint, subscribed_node_id, subscribed_node_key,
              event_types, filter_conditions, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)",
        params![
            service,
            endpoint,
            node.id.as_i64(),
            node.key.to_string(),
            serde_json::to_string(event_types)?,
            filter.map(serde_json::to_string).transpose()?,
            to_micros(now),
        ],
    )?;
    require(conn, SubscriptionId(conn.last_insert_rowid()))
}

/// Get a subscription by id.
pub(crate) fn get(conn: &Connection, id: SubscriptionId) -> Result<Option<Subscription>> {
    let sql = format!("SELECT {SUBSCRIPTION_COLUMNS} FROM node_subscriptions WHERE id = ?1");
    Ok(conn
        .query_row(&sql, [id.as_i64()], row_to_subscription)
        .optional()?)
}

/// Get a subscription by id, failing with [`Error::NotFound`].
pub(crate) fn require(conn: &Connection, id: SubscriptionId) -> Result<Subscription> {
    get(conn, id)?.ok_or_else(|| Error::not_found(ResourceKind::Subscription, id))
}

/// Overwrite the mutable fields of `sub`.
pub(crate) fn save(conn: &Connection, sub: &Subscription, now: DateTime<Utc>) -> Result<Subscription> {
    conn.execute(
        "UPDATE node_subscriptions
         SET subscriber_endpoint = ?2, event_types = ?3, filter_conditions = ?4,
             is_active = ?5, updated_at = ?6
         WHERE id = ?1",
        params![
            sub.id.as_i64(),
            sub.endpoint,
            serde_json::to_string(&sub.event_types)?,
            sub.filter.as_ref().map(serde_json::to_string).transpose()?,
            sub.is_active,
            to_micros(now),
        ],
    )?;
    require(conn, sub.id)
}

/// Delete a subscription. Returns `false` if it did not exist.
pub(crate) fn delete(conn: &Connection, id: SubscriptionId) -> Result<bool> {
    let removed = conn.execute("DELETE FROM node_subscriptions WHERE id = ?1", [id.as_i64()])?;
    Ok(removed > 0)
}

fn collect(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Subscription>> {
    let mut stmt = conn.prepare(sql)?;
    let subs = stmt
        .query_map(params, row_to_subscription)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(subs)
}

/// One page of all subscriptions, ordered by id, plus the total count.
pub(crate) fn page(conn: &Connection, offset: usize, limit: usize) -> Result<(Vec<Subscription>, u64)> {
    let sql = format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM node_subscriptions ORDER BY id LIMIT ?1 OFFSET ?2"
    );
    let items = collect(
        conn,
        &sql,
        [
            i64::try_from(limit).unwrap_or(i64::MAX),
            i64::try_from(offset).unwrap_or(i64::MAX),
        ],
    )?;
    let total: i64 = conn.query_row("SELECT COUNT(*) FROM node_subscriptions", [], |r| r.get(0))?;
    Ok((items, total.unsigned_abs()))
}

/// Subscriptions registered by `service`.
pub(crate) fn for_service(conn: &Connection, service: &str) -> Result<Vec<Subscription>> {
    let sql = format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM node_subscriptions
         WHERE subscriber_service = ?1 ORDER BY id"
    );
    collect(conn, &sql, [service])
}

/// Subscriptions on `node`.
pub(crate) fn for_node(conn: &Connection, node: NodeId) -> Result<Vec<Subscription>> {
    let sql = format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM node_subscriptions
         WHERE subscribed_node_id = ?1 ORDER BY id"
    );
    collect(conn, &sql, [node.as_i64()])
}

/// Active subscriptions on `node` that include `event_type`.
pub(crate) fn subscribers(
    conn: &Connection,
    node: NodeId,
    event_type: EventType,
) -> Result<Vec<Subscription>> {
    let sql = format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM node_subscriptions
         WHERE subscribed_node_id = ?1 AND is_active = 1
           AND EXISTS (SELECT 1 FROM json_each(event_types) WHERE value = ?2)
         ORDER BY id"
    );
    collect(conn, &sql, params![node.as_i64(), event_type.as_str()])
}
