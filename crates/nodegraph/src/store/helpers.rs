//! Helper functions for database row conversion and parsing.
//!
//! These utilities convert between database representations and domain types.
//! Also provides SQL column list constants to keep column ordering in one place.

use chrono::{DateTime, Utc};
use nodegraph_key::CompositeKey;
use rusqlite::Row;
use rusqlite::types::Type;
use serde::de::DeserializeOwned;

use crate::domain::{
    DependencyEdge, DependencyHistory, EdgeId, EventType, HistoryAction, Node, NodeEvent, NodeId,
    Subscription, SubscriptionId,
};

/// SQL column list for the nodes table.
///
/// Use with `row_to_node` for consistent column ordering.
pub(crate) const NODE_COLUMNS: &str = "id, tool, domain, title, generation, created_at, updated_at";

/// SQL column list for the `node_dependencies` table.
///
/// Use with `row_to_edge` for consistent column ordering.
pub(crate) const EDGE_COLUMNS: &str = "id, dependent_node_id, dependent_key, dependency_node_id, \
     dependency_key, dependency_type, strength, priority, cascade_delete, cascade_update, \
     metadata, valid_from, valid_until, is_active, created_at, updated_at";

/// SQL column list for the `dependency_history` table.
pub(crate) const HISTORY_COLUMNS: &str =
    "id, dependency_id, action, previous_state, new_state, recorded_at";

/// SQL column list for the `node_events` table.
pub(crate) const EVENT_COLUMNS: &str =
    "id, node_id, node_key, event_type, event_data, occurred_at, processed_at";

/// SQL column list for the `node_subscriptions` table.
pub(crate) const SUBSCRIPTION_COLUMNS: &str = "id, subscriber_service, subscriber_endpoint, \
     subscribed_node_id, subscribed_node_key, event_types, filter_conditions, is_active, \
     created_at, updated_at";

/// Convert a timestamp to its stored form (unix microseconds).
pub(crate) fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

/// Read a required timestamp column.
pub(crate) fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let micros: i64 = row.get(idx)?;
    DateTime::from_timestamp_micros(micros)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, micros))
}

/// Read a nullable timestamp column.
pub(crate) fn opt_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let micros: Option<i64> = row.get(idx)?;
    micros
        .map(|m| {
            DateTime::from_timestamp_micros(m).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, m))
        })
        .transpose()
}

/// Read a required JSON text column.
pub(crate) fn json<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a nullable JSON text column.
pub(crate) fn opt_json<T: DeserializeOwned>(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| {
        serde_json::from_str(&r)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

/// Read a composite key column.
pub(crate) fn key(row: &Row<'_>, idx: usize) -> rusqlite::Result<CompositeKey> {
    let raw: String = row.get(idx)?;
    nodegraph_key::decode(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a 0-100 percentage column.
fn percent(row: &Row<'_>, idx: usize) -> rusqlite::Result<u8> {
    let value: i64 = row.get(idx)?;
    u8::try_from(value).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, value))
}

/// Parse an event type string from the database.
///
/// Returns an error for unrecognized values, indicating possible database corruption.
pub(crate) fn parse_event_type(s: &str) -> rusqlite::Result<EventType> {
    s.parse().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            Type::Text,
            format!("Unknown event type '{s}' in database. Database may be corrupted or from a newer version.").into(),
        )
    })
}

fn parse_history_action(s: &str) -> rusqlite::Result<HistoryAction> {
    match s {
        "created" => Ok(HistoryAction::Created),
        "updated" => Ok(HistoryAction::Updated),
        "deactivated" => Ok(HistoryAction::Deactivated),
        unknown => Err(rusqlite::Error::FromSqlConversionFailure(
            0,
            Type::Text,
            format!("Unknown history action '{unknown}' in database.").into(),
        )),
    }
}

/// Convert a row selected with [`NODE_COLUMNS`].
pub(crate) fn row_to_node(row: &Row<'_>) -> rusqlite::Result<Node> {
    let id: i64 = row.get(0)?;
    let tool: String = row.get(1)?;
    let domain: String = row.get(2)?;
    let key = CompositeKey::node(tool, domain.clone(), id)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;

    Ok(Node {
        id: NodeId(id),
        key,
        domain,
        title: row.get(3)?,
        generation: row.get(4)?,
        created_at: timestamp(row, 5)?,
        updated_at: timestamp(row, 6)?,
    })
}

/// Convert a row selected with [`EDGE_COLUMNS`].
pub(crate) fn row_to_edge(row: &Row<'_>) -> rusqlite::Result<DependencyEdge> {
    Ok(DependencyEdge {
        id: EdgeId(row.get(0)?),
        dependent_node_id: NodeId(row.get(1)?),
        dependent_key: key(row, 2)?,
        dependency_node_id: NodeId(row.get(3)?),
        dependency_key: key(row, 4)?,
        dependency_type: row.get(5)?,
        strength: percent(row, 6)?,
        priority: percent(row, 7)?,
        cascade_delete: row.get(8)?,
        cascade_update: row.get(9)?,
        metadata: opt_json(row, 10)?,
        valid_from: timestamp(row, 11)?,
        valid_until: opt_timestamp(row, 12)?,
        is_active: row.get(13)?,
        created_at: timestamp(row, 14)?,
        updated_at: timestamp(row, 15)?,
    })
}

/// Convert a row selected with [`HISTORY_COLUMNS`].
pub(crate) fn row_to_history(row: &Row<'_>) -> rusqlite::Result<DependencyHistory> {
    let action: String = row.get(2)?;
    Ok(DependencyHistory {
        id: row.get(0)?,
        edge_id: EdgeId(row.get(1)?),
        action: parse_history_action(&action)?,
        previous_state: opt_json(row, 3)?,
        new_state: opt_json(row, 4)?,
        recorded_at: timestamp(row, 5)?,
    })
}

/// Convert a row selected with [`EVENT_COLUMNS`].
pub(crate) fn row_to_event(row: &Row<'_>) -> rusqlite::Result<NodeEvent> {
    let event_type: String = row.get(3)?;
    Ok(NodeEvent {
        id: row.get::<_, i64>(0)?.into(),
        node_id: NodeId(row.get(1)?),
        node_key: key(row, 2)?,
        event_type: parse_event_type(&event_type)?,
        payload: json(row, 4)?,
        occurred_at: timestamp(row, 5)?,
        processed_at: opt_timestamp(row, 6)?,
    })
}

/// Convert a row selected with [`SUBSCRIPTION_COLUMNS`].
pub(crate) fn row_to_subscription(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    Ok(Subscription {
        id: SubscriptionId(row.get(0)?),
        service: row.get(1)?,
        endpoint: row.get(2)?,
        node_id: NodeId(row.get(3)?),
        node_key: key(row, 4)?,
        event_types: json(row, 5)?,
        filter: opt_json(row, 6)?,
        is_active: row.get(7)?,
        created_at: timestamp(row, 8)?,
        updated_at: timestamp(row, 9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn micros_round_trip_through_sqlite() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let ts = Utc.with_ymd_and_hms(2024, 5, 17, 8, 30, 0).unwrap();

        let back = conn
            .query_row("SELECT ?1", [to_micros(ts)], |row| timestamp(row, 0))
            .unwrap();
        assert_eq!(back, ts);
    }

    #[test]
    fn null_timestamp_is_none() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let value = conn
            .query_row("SELECT NULL", [], |row| opt_timestamp(row, 0))
            .unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn corrupt_json_is_conversion_failure() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let err = conn
            .query_row("SELECT '{not json'", [], |row| {
                json::<serde_json::Value>(row, 0)
            })
            .unwrap_err();
        assert!(matches!(
            err,
            rusqlite::Error::FromSqlConversionFailure(0, Type::Text, _)
        ));
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        assert!(parse_event_type("exploded").is_err());
        assert_eq!(parse_event_type("deleted").unwrap(), EventType::Deleted);
    }
}
