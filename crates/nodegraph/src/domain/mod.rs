//! Domain types for the node dependency graph.
//!
//! These types represent the core data model:
//! - **Entities**: `Node`, `DependencyEdge`, `DependencyHistory`,
//!   `Subscription`, `NodeEvent` (stored in the database)
//! - **Requests**: `NewDependency`, `EdgeUpdate`, `NewSubscription`,
//!   `SubscriptionUpdate` (validated by the service before any write)
//! - **Enums**: `EventType`, `HistoryAction`, `ImpactType`
//!
//! Every entity that references a node carries the node's composite key, so
//! responses can be handed to outer protocol layers unchanged. Keys never
//! change once issued: node ids and domains are immutable.

use chrono::{DateTime, Utc};
use nodegraph_key::CompositeKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(
            /// Raw store id.
            pub i64,
        );

        impl $name {
            /// Extract the raw i64 value.
            #[must_use]
            pub fn as_i64(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// A node's registry id (the `id` segment of its composite key).
    NodeId
);
id_type!(
    /// A dependency edge id.
    EdgeId
);
id_type!(
    /// A node event id.
    EventId
);
id_type!(
    /// A subscription id.
    SubscriptionId
);

// ============================================================================
// Entities
// ============================================================================

/// A node as known to the graph registry.
///
/// The node-CRUD collaborator owns the node's content; the graph keeps only
/// what existence checks, cascades and cache invalidation need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Registry id, the last key segment.
    pub id: NodeId,
    /// Composite key issued for this node.
    pub key: CompositeKey,
    /// Domain segment of the key.
    pub domain: String,
    /// Display title.
    pub title: String,
    /// Bumped whenever an edge in this node's closure changes.
    pub generation: i64,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When the row last changed.
    pub updated_at: DateTime<Utc>,
}

/// A directed dependency edge: `dependent` depends on `dependency`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// Store id.
    pub id: EdgeId,
    /// The node that depends.
    pub dependent_node_id: NodeId,
    /// Composite key of the dependent.
    pub dependent_key: CompositeKey,
    /// The node depended upon.
    pub dependency_node_id: NodeId,
    /// Composite key of the dependency.
    pub dependency_key: CompositeKey,
    /// Catalog type name.
    pub dependency_type: String,
    /// 0-100.
    pub strength: u8,
    /// 0-100.
    pub priority: u8,
    /// Deleting the dependency deletes the dependent.
    pub cascade_delete: bool,
    /// Updating the dependency notifies the dependent.
    pub cascade_update: bool,
    /// Opaque JSON object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// When the edge took effect.
    pub valid_from: DateTime<Utc>,
    /// Expiry, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
    /// `false` once soft-deleted.
    pub is_active: bool,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When the row last changed.
    pub updated_at: DateTime<Utc>,
}

impl DependencyEdge {
    /// Returns `true` if the edge metadata carries a `version_constraint`.
    #[must_use]
    pub fn has_version_constraint(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(Value::as_object)
            .is_some_and(|m| m.contains_key("version_constraint"))
    }
}

/// The transition a history row records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryAction {
    /// The edge was created.
    Created,
    /// Edge fields changed.
    Updated,
    /// The edge was soft-deleted.
    Deactivated,
}

impl HistoryAction {
    /// The stored string form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deactivated => "deactivated",
        }
    }
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of an edge's append-only audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyHistory {
    /// Store id.
    pub id: i64,
    /// Edge id.
    pub edge_id: EdgeId,
    /// What happened to the edge.
    pub action: HistoryAction,
    /// Edge snapshot before the transition (absent for `created`).
    pub previous_state: Option<Value>,
    /// Edge snapshot after the transition.
    pub new_state: Option<Value>,
    /// When the transition was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// Node lifecycle event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// The node was registered.
    Created,
    /// The node changed.
    Updated,
    /// The node was deleted, directly or by cascade.
    Deleted,
    /// An attribute of the node changed.
    AttributeChanged,
    /// An edge touching the node was created, updated or deleted.
    ConnectionChanged,
    /// A node this one depends on was updated.
    DependencyUpdated,
}

impl EventType {
    /// All event types, in declaration order.
    pub const ALL: [EventType; 6] = [
        Self::Created,
        Self::Updated,
        Self::Deleted,
        Self::AttributeChanged,
        Self::ConnectionChanged,
        Self::DependencyUpdated,
    ];

    /// The stored string form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::AttributeChanged => "attribute_changed",
            Self::ConnectionChanged => "connection_changed",
            Self::DependencyUpdated => "dependency_updated",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("unknown event type '{s}'")))
    }
}

/// An immutable record of something that happened to a node.
///
/// Only `processed_at` ever changes after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEvent {
    /// Store id.
    pub id: EventId,
    /// Registry id of the node.
    pub node_id: NodeId,
    /// Key of the node, kept after it is deleted.
    pub node_key: CompositeKey,
    /// What happened.
    pub event_type: EventType,
    /// Event-specific JSON payload.
    pub payload: Value,
    /// When it happened.
    pub occurred_at: DateTime<Utc>,
    /// Set once a consumer acknowledges the event.
    pub processed_at: Option<DateTime<Utc>>,
}

impl NodeEvent {
    /// Returns `true` once a consumer has acknowledged the event.
    #[must_use]
    pub fn is_processed(&self) -> bool {
        self.processed_at.is_some()
    }
}

/// Outcome of acknowledging an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckOutcome {
    /// This call marked the event processed.
    Acknowledged,
    /// The event was already processed; nothing changed.
    AlreadyProcessed,
}

/// Aggregate counts over the event log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStats {
    /// Every event in the log.
    pub total: u64,
    /// Events not yet acknowledged.
    pub pending: u64,
    /// Acknowledged events.
    pub processed: u64,
    /// Counts per event type.
    pub by_type: BTreeMap<EventType, u64>,
    /// When the oldest pending event occurred.
    pub oldest_pending: Option<DateTime<Utc>>,
}

/// A registration of interest in a node's events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// Store id.
    pub id: SubscriptionId,
    /// Subscribing service name.
    pub service: String,
    /// Where the service wants deliveries, if it says.
    pub endpoint: Option<String>,
    /// Registry id of the node.
    pub node_id: NodeId,
    /// Composite key of the node.
    pub node_key: CompositeKey,
    /// Event types routed to this subscription.
    pub event_types: Vec<EventType>,
    /// Opaque filter object; stored and returned, never evaluated.
    pub filter: Option<Value>,
    /// Inactive subscriptions receive nothing.
    pub is_active: bool,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When the row last changed.
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Returns `true` if this subscription routes events of type `event_type`.
    #[must_use]
    pub fn wants(&self, event_type: EventType) -> bool {
        self.is_active && self.event_types.contains(&event_type)
    }
}

/// One page of subscriptions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionPage {
    /// Subscriptions on this page.
    pub items: Vec<Subscription>,
    /// Total number of subscriptions across all pages.
    pub total: u64,
    /// 1-based page number actually served.
    pub page: usize,
    /// Effective page size.
    pub page_size: usize,
}

// ============================================================================
// Requests
// ============================================================================

/// Request to create a dependency edge.
///
/// Unset fields fall back to the dependency type's defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewDependency {
    /// Composite key of the node that depends on `dependency`.
    pub dependent: String,
    /// Composite key of the node being depended upon.
    pub dependency: String,
    /// Catalog type name.
    pub dependency_type: String,
    /// Overrides the type's default.
    #[serde(default)]
    pub cascade_delete: Option<bool>,
    /// Overrides the type's default.
    #[serde(default)]
    pub cascade_update: Option<bool>,
    /// 0-100; the type default when unset.
    #[serde(default)]
    pub strength: Option<u8>,
    /// 0-100; the type default when unset.
    #[serde(default)]
    pub priority: Option<u8>,
    /// Opaque JSON object.
    #[serde(default)]
    pub metadata: Option<Value>,
    /// Must be in the future.
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
}

impl NewDependency {
    /// A request using every default of `dependency_type`.
    pub fn new(
        dependent: impl Into<String>,
        dependency: impl Into<String>,
        dependency_type: impl Into<String>,
    ) -> Self {
        Self {
            dependent: dependent.into(),
            dependency: dependency.into(),
            dependency_type: dependency_type.into(),
            ..Self::default()
        }
    }

    /// Override the type's cascade-delete default.
    #[must_use]
    pub fn cascade_delete(mut self, cascade: bool) -> Self {
        self.cascade_delete = Some(cascade);
        self
    }

    /// Override the type's cascade-update default.
    #[must_use]
    pub fn cascade_update(mut self, cascade: bool) -> Self {
        self.cascade_update = Some(cascade);
        self
    }

    /// Override the type's default strength.
    #[must_use]
    pub fn strength(mut self, strength: u8) -> Self {
        self.strength = Some(strength);
        self
    }

    /// Attach edge metadata (must be a JSON object).
    #[must_use]
    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Changes to apply to an active edge. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeUpdate {
    /// New strength, 0-100.
    #[serde(default)]
    pub strength: Option<u8>,
    /// New priority, 0-100.
    #[serde(default)]
    pub priority: Option<u8>,
    /// New cascade-delete flag.
    #[serde(default)]
    pub cascade_delete: Option<bool>,
    /// New cascade-update flag.
    #[serde(default)]
    pub cascade_update: Option<bool>,
    /// Replacement metadata object.
    #[serde(default)]
    pub metadata: Option<Value>,
    /// New expiry.
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
}

impl EdgeUpdate {
    /// Returns `true` if no field would change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Request to create a subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSubscription {
    /// Subscribing service name.
    pub service: String,
    /// Delivery endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Composite key of the subscribed node.
    pub node: String,
    /// At least one event type.
    pub event_types: Vec<EventType>,
    /// Opaque JSON object, stored but never evaluated.
    #[serde(default)]
    pub filter: Option<Value>,
}

/// Changes to apply to a subscription. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionUpdate {
    /// New delivery endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Replacement event types; must not be empty.
    #[serde(default)]
    pub event_types: Option<Vec<EventType>>,
    /// Replacement filter object.
    #[serde(default)]
    pub filter: Option<Value>,
    /// Pause or resume delivery.
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// The kind of change an impact analysis simulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactType {
    /// The node is deleted.
    Delete,
    /// The node is updated.
    Update,
    /// The node's version changes.
    VersionChange,
}

impl ImpactType {
    /// The string form used on the wire.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Update => "update",
            Self::VersionChange => "version_change",
        }
    }
}

impl fmt::Display for ImpactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImpactType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delete" => Ok(Self::Delete),
            "update" => Ok(Self::Update),
            "version_change" => Ok(Self::VersionChange),
            other => Err(Error::Validation(format!(
                "unknown impact type '{other}' (expected delete, update or version_change)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("created", EventType::Created)]
    #[case("attribute_changed", EventType::AttributeChanged)]
    #[case("dependency_updated", EventType::DependencyUpdated)]
    fn event_type_parses_stored_form(#[case] input: &str, #[case] expected: EventType) {
        assert_eq!(input.parse::<EventType>().unwrap(), expected);
        assert_eq!(expected.to_string(), input);
    }

    #[test]
    fn event_type_serde_matches_stored_form() {
        for event_type in EventType::ALL {
            let json = serde_json::to_string(&event_type).unwrap();
            assert_eq!(json, format!("\"{}\"", event_type.as_str()));
        }
    }

    #[test]
    fn unknown_event_type_is_validation_error() {
        assert!(matches!(
            "exploded".parse::<EventType>(),
            Err(Error::Validation(_))
        ));
    }

    #[rstest]
    #[case("delete", ImpactType::Delete)]
    #[case("update", ImpactType::Update)]
    #[case("version_change", ImpactType::VersionChange)]
    fn impact_type_parses(#[case] input: &str, #[case] expected: ImpactType) {
        assert_eq!(input.parse::<ImpactType>().unwrap(), expected);
    }

    #[test]
    fn id_types_serialize_as_bare_integers() {
        assert_eq!(serde_json::to_string(&NodeId(7)).unwrap(), "7");
        assert_eq!(EdgeId::from(3).as_i64(), 3);
    }

    #[test]
    fn edge_update_default_is_empty() {
        assert!(EdgeUpdate::default().is_empty());
        let update = EdgeUpdate {
            strength: Some(10),
            ..EdgeUpdate::default()
        };
        assert!(!update.is_empty());
    }

    #[test]
    fn new_dependency_builder_sets_overrides() {
        let req = NewDependency::new("url-db:docs:1", "url-db:docs:2", "soft")
            .cascade_delete(true)
            .strength(12)
            .metadata(json!({"version_constraint": ">=1.0"}));

        assert_eq!(req.cascade_delete, Some(true));
        assert_eq!(req.cascade_update, None);
        assert_eq!(req.strength, Some(12));
        assert!(req.metadata.is_some());
    }
}
