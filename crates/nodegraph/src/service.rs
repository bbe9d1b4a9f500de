//! The `NodeGraph` engine: every operation the graph exposes, addressed by
//! composite-key strings.
//!
//! Each method runs in exactly one store transaction. Mutations use
//! [`Store::write`], so validation, the cycle check, the write itself, cache
//! invalidation and the resulting events commit or roll back together.

use chrono::{DateTime, Duration, Utc};
use nodegraph_key::CompositeKey;
use rusqlite::Connection;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::config::NodeGraphConfig;
use crate::domain::{
    AckOutcome, DependencyEdge, DependencyHistory, EdgeId, EdgeUpdate, EventId, EventStats,
    EventType, ImpactType, NewDependency, NewSubscription, Node, NodeEvent, NodeId, Subscription,
    SubscriptionId, SubscriptionPage, SubscriptionUpdate,
};
use crate::error::{Error, ResourceKind, Result};
use crate::graph::{
    self, CacheLookup, CascadePolicy, CascadeReport, Cycle, DependencyGraph, GraphCache,
    ImpactAnalysis, UpdateReport,
};
use crate::registry::TypeRegistry;
use crate::store::edges::EdgeDraft;
use crate::store::{Store, edges, events, nodes, subscriptions};

/// Default and maximum subscription page sizes.
const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

/// Node dependency graph engine.
///
/// `NodeGraph` is `Send + Sync`; share it across threads with an `Arc`.
///
/// # Example
///
/// ```
/// use nodegraph::{NewDependency, NodeGraph, NodeGraphConfig};
///
/// let graph = NodeGraph::in_memory(NodeGraphConfig::default())?;
/// let page = graph.register_node("docs", "Getting started")?;
/// let site = graph.register_node("docs", "Site index")?;
///
/// graph.create_dependency(&NewDependency::new(
///     site.key.to_string(),
///     page.key.to_string(),
///     "hard",
/// ))?;
///
/// let report = graph.delete_node(&page.key.to_string())?;
/// assert_eq!(report.deleted.len(), 2);
/// # Ok::<(), nodegraph::Error>(())
/// ```
pub struct NodeGraph {
    store: Store,
    registry: TypeRegistry,
    cache: GraphCache,
    config: NodeGraphConfig,
}

impl NodeGraph {
    /// Open the engine on the database named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` is invalid and
    /// [`Error::Database`] or [`Error::Io`] if the database cannot be opened.
    pub fn open(config: NodeGraphConfig) -> Result<Self> {
        config.validate()?;
        let store = Store::open(&config.storage.database, config.storage.busy_timeout())?;
        Ok(Self::with_store(store, config))
    }

    /// Open the engine on a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` is invalid.
    pub fn in_memory(config: NodeGraphConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_store(Store::open_in_memory()?, config))
    }

    fn with_store(store: Store, config: NodeGraphConfig) -> Self {
        Self {
            store,
            registry: TypeRegistry::builtin(),
            cache: GraphCache::new(&config.cache),
            config,
        }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &NodeGraphConfig {
        &self.config
    }

    /// The dependency type catalog.
    #[must_use]
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    fn cascade_policy(&self) -> CascadePolicy {
        CascadePolicy {
            max_depth: self.config.cascade.max_depth,
        }
    }

    // === Keys ===

    /// Decode a node key issued by this store.
    fn parse_node_key(&self, key: &str) -> Result<CompositeKey> {
        let parsed = nodegraph_key::decode(key)?;
        if parsed.kind().is_some() {
            return Err(Error::Validation(format!(
                "'{key}' addresses a {} resource, not a node",
                parsed.kind().unwrap_or_default()
            )));
        }
        if parsed.tool() != self.config.tool_name {
            return Err(Error::Validation(format!(
                "'{key}' was issued by tool '{}', not '{}'",
                parsed.tool(),
                self.config.tool_name
            )));
        }
        Ok(parsed)
    }

    /// Load the node `key` names.
    ///
    /// A node that exists under a different domain is a constraint violation:
    /// ids are global, so the key can only be stale or forged.
    fn resolve(&self, conn: &Connection, key: &str) -> Result<Node> {
        let parsed = self.parse_node_key(key)?;
        let node = nodes::get(conn, NodeId(parsed.id()))?
            .ok_or_else(|| Error::not_found(ResourceKind::Node, key))?;
        if node.domain != parsed.domain() {
            return Err(Error::ConstraintViolation(format!(
                "node {} belongs to domain '{}', not '{}'",
                node.id,
                node.domain,
                parsed.domain()
            )));
        }
        Ok(node)
    }

    // === Nodes ===

    /// Look up a node by key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no such node exists and
    /// [`Error::InvalidKey`] if `key` does not decode.
    pub fn node(&self, key: &str) -> Result<Node> {
        self.store.read(|tx| self.resolve(tx, key))
    }

    /// Every registered node, optionally limited to one domain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Database`] if the query fails.
    pub fn nodes(&self, domain: Option<&str>) -> Result<Vec<Node>> {
        self.store.read(|tx| nodes::list(tx, domain))
    }

    /// Register a node created by the node owner and record its `created`
    /// event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if `domain` cannot appear in a key.
    pub fn register_node(&self, domain: &str, title: &str) -> Result<Node> {
        // Any id will do; only the tool and domain segments are checked.
        CompositeKey::node(self.config.tool_name.as_str(), domain, 1)?;

        let now = Utc::now();
        let node = self.store.write(|tx| {
            let node = nodes::insert(tx, &self.config.tool_name, domain, title, now)?;
            let payload = json!({"node_key": node.key, "domain": node.domain, "title": node.title});
            events::insert(tx, node.id, &node.key, EventType::Created, &payload, now)?;
            Ok(node)
        })?;

        info!(node = %node.key, "Registered node");
        Ok(node)
    }

    /// Record an update of `key` and notify its cascade-update dependents.
    ///
    /// `changes` must be a JSON object; a string `title` in it also updates
    /// the registry row. One `updated` event is recorded for the node and one
    /// `dependency_updated` event for every dependent reached through
    /// cascade-update edges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if `changes` is not an object and
    /// [`Error::CascadeFailure`] if the notification cascade fails, in which
    /// case nothing is recorded.
    pub fn update_node(&self, key: &str, changes: &Value) -> Result<UpdateReport> {
        require_object("changes", changes)?;
        let now = Utc::now();

        let report = self.store.write(|tx| {
            let node = self.resolve(tx, key)?;
            let title = changes.get("title").and_then(Value::as_str);
            nodes::touch(tx, node.id, title, now)?;

            let payload = json!({"node_key": node.key, "changes": changes});
            let event = events::insert(tx, node.id, &node.key, EventType::Updated, &payload, now)?;

            let notified = graph::cascade_update(tx, &node, changes, self.cascade_policy(), now)
                .map_err(|e| e.into_cascade_failure(&node.key))?;
            let (notified, event_ids) = notified.into_iter().unzip();
            Ok(UpdateReport {
                node: node.key,
                event,
                notified,
                events: event_ids,
            })
        })?;

        info!(node = %report.node, notified = report.notified.len(), "Updated node");
        Ok(report)
    }

    /// Record an `attribute_changed` event for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if `changes` is not an object and
    /// [`Error::NotFound`] if the node does not exist.
    pub fn record_attribute_change(&self, key: &str, changes: &Value) -> Result<EventId> {
        require_object("changes", changes)?;
        let now = Utc::now();
        self.store.write(|tx| {
            let node = self.resolve(tx, key)?;
            nodes::touch(tx, node.id, None, now)?;
            let payload = json!({"node_key": node.key, "changes": changes});
            events::insert(tx, node.id, &node.key, EventType::AttributeChanged, &payload, now)
        })
    }

    /// Delete `key` and run the delete cascade.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the node does not exist and
    /// [`Error::CascadeFailure`] if any cascade step fails, in which case
    /// nothing is deleted.
    pub fn delete_node(&self, key: &str) -> Result<CascadeReport> {
        let now = Utc::now();
        let report = self.store.write(|tx| {
            let node = self.resolve(tx, key)?;
            graph::cascade_delete(tx, &node, self.cascade_policy(), now)
                .map_err(|e| e.into_cascade_failure(&node.key))
        })?;

        info!(
            node = %report.root,
            deleted = report.deleted.len(),
            "Deleted node"
        );
        Ok(report)
    }

    // === Dependencies ===

    /// Create a dependency edge after the cycle check approves it.
    ///
    /// Unset cascade flags, strength and priority take the type's defaults.
    /// Both endpoints receive a `connection_changed` event.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for an unknown type, out-of-range values or
    ///   non-object metadata
    /// - [`Error::NotFound`] if either node does not exist
    /// - [`Error::CircularDependency`] if the edge would close a cycle
    /// - [`Error::ConstraintViolation`] if an identical active edge exists
    pub fn create_dependency(&self, request: &NewDependency) -> Result<DependencyEdge> {
        let kind = self.registry.lookup(&request.dependency_type)?;
        let strength = request.strength.unwrap_or(kind.default_strength);
        let priority = request.priority.unwrap_or(kind.default_priority);
        check_percent("strength", strength)?;
        check_percent("priority", priority)?;
        if let Some(metadata) = &request.metadata {
            require_object("metadata", metadata)?;
        }
        let now = Utc::now();
        check_valid_until(request.valid_until, now)?;

        let edge = self.store.write(|tx| {
            let dependent = self.resolve(tx, &request.dependent)?;
            let dependency = self.resolve(tx, &request.dependency)?;

            if graph::would_create_cycle(tx, dependent.id, dependency.id)? {
                warn!(
                    dependent = %dependent.key,
                    dependency = %dependency.key,
                    dependency_type = kind.name,
                    "Rejected circular dependency"
                );
                return Err(Error::CircularDependency {
                    dependent: dependent.key.to_string(),
                    dependency: dependency.key.to_string(),
                });
            }

            let edge = edges::insert(
                tx,
                &EdgeDraft {
                    dependent: &dependent,
                    dependency: &dependency,
                    dependency_type: kind.name,
                    strength,
                    priority,
                    cascade_delete: request.cascade_delete.unwrap_or(kind.cascade_delete),
                    cascade_update: request.cascade_update.unwrap_or(kind.cascade_update),
                    metadata: request.metadata.as_ref(),
                    valid_until: request.valid_until,
                },
                now,
            )?;
            graph::invalidate_edge(tx, &edge)?;
            connection_changed(tx, &edge, "created", now)?;
            Ok(edge)
        })?;

        info!(
            edge = %edge.id,
            dependent = %edge.dependent_key,
            dependency = %edge.dependency_key,
            dependency_type = %edge.dependency_type,
            "Created dependency"
        );
        Ok(edge)
    }

    /// Active edges where `key` is the dependent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the node does not exist.
    pub fn list_dependencies(&self, key: &str) -> Result<Vec<DependencyEdge>> {
        self.store.read(|tx| {
            let node = self.resolve(tx, key)?;
            edges::active_dependencies(tx, node.id)
        })
    }

    /// Active edges where `key` is the dependency.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the node does not exist.
    pub fn list_dependents(&self, key: &str) -> Result<Vec<DependencyEdge>> {
        self.store.read(|tx| {
            let node = self.resolve(tx, key)?;
            edges::active_dependents(tx, node.id)
        })
    }

    /// Look up an edge by id, active or not.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the edge never existed.
    pub fn dependency(&self, id: EdgeId) -> Result<DependencyEdge> {
        self.store.read(|tx| edges::require(tx, id))
    }

    /// Soft-delete an edge. Its row and history remain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the edge never existed and
    /// [`Error::Validation`] if it is already inactive.
    pub fn delete_dependency(&self, id: EdgeId) -> Result<DependencyEdge> {
        let now = Utc::now();
        let edge = self.store.write(|tx| {
            let edge = edges::require(tx, id)?;
            if !edge.is_active {
                return Err(Error::Validation(format!("dependency {id} is already inactive")));
            }
            // The closure is computed while the edge still links both sides.
            graph::invalidate_edge(tx, &edge)?;
            let edge = edges::deactivate(tx, &edge, now)?;
            connection_changed(tx, &edge, "deleted", now)?;
            Ok(edge)
        })?;

        info!(edge = %edge.id, "Deleted dependency");
        Ok(edge)
    }

    /// Change the strength, priority, cascade flags, metadata or expiry of
    /// an active edge.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an empty or out-of-range update or
    /// an inactive edge, and [`Error::NotFound`] if the edge never existed.
    pub fn update_dependency(&self, id: EdgeId, update: &EdgeUpdate) -> Result<DependencyEdge> {
        if update.is_empty() {
            return Err(Error::Validation("no dependency fields to update".to_string()));
        }
        if let Some(strength) = update.strength {
            check_percent("strength", strength)?;
        }
        if let Some(priority) = update.priority {
            check_percent("priority", priority)?;
        }
        if let Some(metadata) = &update.metadata {
            require_object("metadata", metadata)?;
        }
        let now = Utc::now();
        check_valid_until(update.valid_until, now)?;

        let edge = self.store.write(|tx| {
            let before = edges::require(tx, id)?;
            let edge = edges::update(tx, &before, update, now)?;
            graph::invalidate_edge(tx, &edge)?;
            connection_changed(tx, &edge, "updated", now)?;
            Ok(edge)
        })?;

        info!(edge = %edge.id, "Updated dependency");
        Ok(edge)
    }

    /// The append-only history of an edge, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the edge never existed.
    pub fn dependency_history(&self, id: EdgeId) -> Result<Vec<DependencyHistory>> {
        self.store.read(|tx| {
            edges::require(tx, id)?;
            edges::history(tx, id)
        })
    }

    // === Subscriptions ===

    /// Subscribe `request.service` to events on a node.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an empty service, no event types or
    /// a non-object filter, and [`Error::NotFound`] if the node does not
    /// exist.
    pub fn create_subscription(&self, request: &NewSubscription) -> Result<Subscription> {
        if request.service.trim().is_empty() {
            return Err(Error::Validation("subscriber service must not be empty".to_string()));
        }
        let event_types = dedup_event_types(&request.event_types)?;
        if let Some(filter) = &request.filter {
            require_object("filter", filter)?;
        }
        let now = Utc::now();

        let sub = self.store.write(|tx| {
            let node = self.resolve(tx, &request.node)?;
            subscriptions::insert(
                tx,
                &request.service,
                request.endpoint.as_deref(),
                &node,
                &event_types,
                request.filter.as_ref(),
                now,
            )
        })?;

        info!(
            subscription = %sub.id,
            service = %sub.service,
            node = %sub.node_key,
            "Created subscription"
        );
        Ok(sub)
    }

    /// Look up a subscription.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if it does not exist.
    pub fn get_subscription(&self, id: SubscriptionId) -> Result<Subscription> {
        self.store.read(|tx| subscriptions::require(tx, id))
    }

    /// Apply `update` to a subscription.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an empty event type list or a
    /// non-object filter, and [`Error::NotFound`] if it does not exist.
    pub fn update_subscription(
        &self,
        id: SubscriptionId,
        update: &SubscriptionUpdate,
    ) -> Result<Subscription> {
        let event_types = update
            .event_types
            .as_deref()
            .map(dedup_event_types)
            .transpose()?;
        if let Some(filter) = &update.filter {
            require_object("filter", filter)?;
        }
        let now = Utc::now();

        let sub = self.store.write(|tx| {
            let mut sub = subscriptions::require(tx, id)?;
            if let Some(endpoint) = &update.endpoint {
                sub.endpoint = Some(endpoint.clone());
            }
            if let Some(event_types) = event_types {
                sub.event_types = event_types;
            }
            if let Some(filter) = &update.filter {
                sub.filter = Some(filter.clone());
            }
            if let Some(active) = update.is_active {
                sub.is_active = active;
            }
            subscriptions::save(tx, &sub, now)
        })?;

        info!(subscription = %sub.id, active = sub.is_active, "Updated subscription");
        Ok(sub)
    }

    /// Remove a subscription.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if it does not exist.
    pub fn delete_subscription(&self, id: SubscriptionId) -> Result<()> {
        let removed = self.store.write(|tx| subscriptions::delete(tx, id))?;
        if !removed {
            return Err(Error::not_found(ResourceKind::Subscription, id));
        }
        info!(subscription = %id, "Deleted subscription");
        Ok(())
    }

    /// One page of every subscription, ordered by id.
    ///
    /// `page` below 1 becomes 1; `page_size` outside `1..=100` becomes 20.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Database`] if the query fails.
    pub fn list_subscriptions(&self, page: i64, page_size: i64) -> Result<SubscriptionPage> {
        let page = usize::try_from(page).ok().filter(|&p| p >= 1).unwrap_or(1);
        let page_size = usize::try_from(page_size)
            .ok()
            .filter(|s| (1..=MAX_PAGE_SIZE).contains(s))
            .unwrap_or(DEFAULT_PAGE_SIZE);
        let offset = (page - 1).saturating_mul(page_size);

        let (items, total) = self
            .store
            .read(|tx| subscriptions::page(tx, offset, page_size))?;
        Ok(SubscriptionPage {
            items,
            total,
            page,
            page_size,
        })
    }

    /// Subscriptions registered by one service.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Database`] if the query fails.
    pub fn service_subscriptions(&self, service: &str) -> Result<Vec<Subscription>> {
        self.store.read(|tx| subscriptions::for_service(tx, service))
    }

    /// Subscriptions on one node.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the node does not exist.
    pub fn node_subscriptions(&self, key: &str) -> Result<Vec<Subscription>> {
        self.store.read(|tx| {
            let node = self.resolve(tx, key)?;
            subscriptions::for_node(tx, node.id)
        })
    }

    /// Active subscriptions an event of `event_type` on `key` routes to.
    ///
    /// Routing uses the node and the event type only; filters are left to
    /// the subscriber.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if `key` does not decode.
    pub fn subscribers_for(&self, key: &str, event_type: EventType) -> Result<Vec<Subscription>> {
        let parsed = self.parse_node_key(key)?;
        self.store
            .read(|tx| subscriptions::subscribers(tx, NodeId(parsed.id()), event_type))
    }

    // === Events ===

    /// Events of one node, newest first.
    ///
    /// Works for deleted nodes too: their events outlive them. `limit`
    /// outside `1..=max-node-limit` becomes the configured default.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if `key` does not decode.
    pub fn node_events(&self, key: &str, limit: i64) -> Result<Vec<NodeEvent>> {
        let parsed = self.parse_node_key(key)?;
        let limit = self.config.events.node_limit(limit);
        self.store
            .read(|tx| events::for_node(tx, NodeId(parsed.id()), limit))
    }

    /// Unprocessed events, oldest first.
    ///
    /// `limit` outside `1..=max-pending-limit` becomes the configured default.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Database`] if the query fails.
    pub fn pending_events(&self, limit: i64) -> Result<Vec<NodeEvent>> {
        let limit = self.config.events.pending_limit(limit);
        self.store.read(|tx| events::pending(tx, limit))
    }

    /// Acknowledge an event. Acknowledging twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] only if the event never existed.
    pub fn process_event(&self, id: EventId) -> Result<AckOutcome> {
        let now = Utc::now();
        let outcome = self.store.write(|tx| {
            if events::mark_processed(tx, id, now)? {
                Ok(AckOutcome::Acknowledged)
            } else if events::exists(tx, id)? {
                Ok(AckOutcome::AlreadyProcessed)
            } else {
                Err(Error::not_found(ResourceKind::Event, id))
            }
        })?;

        tracing::debug!(event = %id, ?outcome, "Processed event");
        Ok(outcome)
    }

    /// Counts over the whole event log.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Database`] if the query fails.
    pub fn event_stats(&self) -> Result<EventStats> {
        self.store.read(|tx| events::stats(tx))
    }

    /// Events of one type that occurred within `start..=end`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if `start` is after `end`.
    pub fn events_by_type(
        &self,
        event_type: EventType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<NodeEvent>> {
        if start > end {
            return Err(Error::Validation(format!(
                "start {start} is after end {end}"
            )));
        }
        self.store
            .read(|tx| events::by_type(tx, event_type, start, end))
    }

    /// Delete processed events older than `older_than`. Pending events are
    /// never deleted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if `older_than` is shorter than the
    /// configured minimum retention.
    pub fn cleanup_events(&self, older_than: Duration) -> Result<usize> {
        let hours = i64::try_from(self.config.events.min_retention_hours).unwrap_or(i64::MAX);
        let minimum = Duration::try_hours(hours).unwrap_or(Duration::MAX);
        if older_than < minimum {
            return Err(Error::Validation(format!(
                "retention must be at least {} hours",
                self.config.events.min_retention_hours
            )));
        }

        let cutoff = Utc::now() - older_than;
        let deleted = self
            .store
            .write(|tx| events::delete_processed_before(tx, cutoff))?;
        info!(deleted, %cutoff, "Cleaned up processed events");
        Ok(deleted)
    }

    // === Graph ===

    /// Predict what `impact_type` applied to `key` would affect. Read-only.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the node does not exist.
    pub fn analyze_impact(&self, key: &str, impact_type: ImpactType) -> Result<ImpactAnalysis> {
        self.store.read(|tx| {
            let node = self.resolve(tx, key)?;
            graph::analyze(tx, &self.registry, &node, impact_type, Utc::now())
        })
    }

    /// The neighborhood of `key`, served from the graph cache when valid.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the node does not exist.
    pub fn dependency_graph(&self, key: &str) -> Result<DependencyGraph> {
        self.dependency_graph_lookup(key).map(|(graph, _)| graph)
    }

    /// Like [`dependency_graph`](Self::dependency_graph), also reporting
    /// whether the cache served it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the node does not exist.
    pub fn dependency_graph_lookup(&self, key: &str) -> Result<(DependencyGraph, CacheLookup)> {
        let now = Utc::now();
        let (cached, _) = self.store.read(|tx| {
            let node = self.resolve(tx, key)?;
            self.cache.lookup(tx, &node, now)
        })?;
        if let Some(graph) = cached {
            return Ok((graph, CacheLookup::Hit));
        }

        // Only a refresh takes the write lock; the entry is checked again
        // under it.
        self.store.write(|tx| {
            let node = self.resolve(tx, key)?;
            self.cache.get(tx, &node, now)
        })
    }

    /// Drop expired graph cache entries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Database`] if the delete fails.
    pub fn purge_expired_cache(&self) -> Result<usize> {
        self.store
            .write(|tx| self.cache.purge_expired(tx, Utc::now()))
    }

    /// Audit the active graph (optionally one domain) for cycles.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Database`] if the query fails.
    pub fn detect_cycles(&self, domain: Option<&str>) -> Result<Vec<Cycle>> {
        let edges = self.store.read(|tx| edges::active_edges(tx, domain))?;
        Ok(graph::find_cycles(&edges))
    }
}

/// Record `connection_changed` on both ends of `edge`.
fn connection_changed(
    conn: &Connection,
    edge: &DependencyEdge,
    change: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let payload = json!({
        "change": change,
        "edge_id": edge.id,
        "dependent": edge.dependent_key,
        "dependency": edge.dependency_key,
        "dependency_type": edge.dependency_type,
    });
    for (id, key) in [
        (edge.dependent_node_id, &edge.dependent_key),
        (edge.dependency_node_id, &edge.dependency_key),
    ] {
        events::insert(conn, id, key, EventType::ConnectionChanged, &payload, now)?;
    }
    Ok(())
}

fn check_percent(field: &str, value: u8) -> Result<()> {
    if value > 100 {
        return Err(Error::Validation(format!(
            "{field} must be between 0 and 100, got {value}"
        )));
    }
    Ok(())
}

fn require_object(field: &str, value: &Value) -> Result<()> {
    if !value.is_object() {
        return Err(Error::Validation(format!("{field} must be a JSON object")));
    }
    Ok(())
}

fn check_valid_until(valid_until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Result<()> {
    match valid_until {
        Some(until) if until <= now => Err(Error::Validation(format!(
            "valid_until {until} is not in the future"
        ))),
        _ => Ok(()),
    }
}

fn dedup_event_types(types: &[EventType]) -> Result<Vec<EventType>> {
    let mut types = types.to_vec();
    types.sort_unstable();
    types.dedup();
    if types.is_empty() {
        return Err(Error::Validation(
            "a subscription needs at least one event type".to_string(),
        ));
    }
    Ok(types)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn engine() -> NodeGraph {
        NodeGraph::in_memory(NodeGraphConfig::default()).unwrap()
    }

    fn key(node: &Node) -> String {
        node.key.to_string()
    }

    #[test]
    fn engine_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NodeGraph>();
    }

    #[test]
    fn register_node_records_created_event() {
        let graph = engine();
        let node = graph.register_node("docs", "Intro").unwrap();

        assert_eq!(key(&node), format!("url-db:docs:{}", node.id));
        let events = graph.node_events(&key(&node), 0).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Created);
    }

    #[rstest]
    #[case("")]
    #[case("has:colon")]
    fn register_node_rejects_unusable_domains(#[case] domain: &str) {
        let err = engine().register_node(domain, "x").unwrap_err();
        assert!(matches!(err, Error::InvalidKey(_)));
    }

    #[test]
    fn keys_from_another_tool_or_domain_are_rejected() {
        let graph = engine();
        let node = graph.register_node("docs", "a").unwrap();

        let foreign = format!("other-tool:docs:{}", node.id);
        assert!(matches!(graph.node(&foreign), Err(Error::Validation(_))));

        let wrong_domain = format!("url-db:blog:{}", node.id);
        assert!(matches!(
            graph.node(&wrong_domain),
            Err(Error::ConstraintViolation(_))
        ));

        let with_kind = format!("url-db:docs:attribute:{}", node.id);
        assert!(matches!(graph.node(&with_kind), Err(Error::Validation(_))));

        assert!(matches!(graph.node("url-db:docs:999"), Err(Error::NotFound { .. })));
        assert!(matches!(graph.node("garbage"), Err(Error::InvalidKey(_))));
    }

    #[test]
    fn create_dependency_applies_type_defaults_and_overrides() {
        let graph = engine();
        let a = graph.register_node("docs", "a").unwrap();
        let b = graph.register_node("docs", "b").unwrap();

        let edge = graph
            .create_dependency(&NewDependency::new(key(&b), key(&a), "soft").cascade_delete(true))
            .unwrap();

        assert_eq!(edge.strength, 50);
        assert_eq!(edge.priority, 50);
        assert!(edge.cascade_delete);
        assert!(edge.cascade_update);
        assert_eq!(edge.dependent_key, b.key);
    }

    #[rstest]
    #[case(NewDependency::new("", "", "weird"))]
    #[case(NewDependency::new("", "", "hard").strength(101))]
    #[case(NewDependency::new("", "", "hard").metadata(serde_json::json!([1, 2])))]
    fn create_dependency_validates_before_touching_the_store(#[case] request: NewDependency) {
        let err = engine().create_dependency(&request).unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "{err}");
    }

    #[test]
    fn edge_mutations_emit_connection_changed_on_both_ends() {
        let graph = engine();
        let a = graph.register_node("docs", "a").unwrap();
        let b = graph.register_node("docs", "b").unwrap();
        let edge = graph
            .create_dependency(&NewDependency::new(key(&b), key(&a), "reference"))
            .unwrap();
        graph.delete_dependency(edge.id).unwrap();

        for node in [&a, &b] {
            let changes = graph
                .node_events(&key(node), 50)
                .unwrap()
                .into_iter()
                .filter(|e| e.event_type == EventType::ConnectionChanged)
                .count();
            assert_eq!(changes, 2);
        }
    }

    #[test]
    fn update_dependency_requires_changes_and_an_active_edge() {
        let graph = engine();
        let a = graph.register_node("docs", "a").unwrap();
        let b = graph.register_node("docs", "b").unwrap();
        let edge = graph
            .create_dependency(&NewDependency::new(key(&b), key(&a), "soft"))
            .unwrap();

        assert!(matches!(
            graph.update_dependency(edge.id, &EdgeUpdate::default()),
            Err(Error::Validation(_))
        ));

        let updated = graph
            .update_dependency(
                edge.id,
                &EdgeUpdate {
                    strength: Some(75),
                    ..EdgeUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(updated.strength, 75);

        graph.delete_dependency(edge.id).unwrap();
        assert!(matches!(
            graph.delete_dependency(edge.id),
            Err(Error::Validation(_))
        ));
        assert_eq!(graph.dependency_history(edge.id).unwrap().len(), 3);
    }

    #[rstest]
    #[case(0, 0, 1, 20)]
    #[case(-3, 500, 1, 20)]
    #[case(2, 5, 2, 5)]
    #[case(1, 100, 1, 100)]
    fn subscription_paging_is_clamped(
        #[case] page: i64,
        #[case] size: i64,
        #[case] expected_page: usize,
        #[case] expected_size: usize,
    ) {
        let listed = engine().list_subscriptions(page, size).unwrap();
        assert_eq!(listed.page, expected_page);
        assert_eq!(listed.page_size, expected_size);
        assert_eq!(listed.total, 0);
    }

    #[test]
    fn cleanup_rejects_short_retention() {
        let err = engine().cleanup_events(Duration::hours(1)).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn events_by_type_rejects_inverted_range() {
        let now = Utc::now();
        let err = engine()
            .events_by_type(EventType::Created, now, now - Duration::seconds(1))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn update_node_changes_title_and_records_event() {
        let graph = engine();
        let node = graph.register_node("docs", "old").unwrap();

        let report = graph
            .update_node(&key(&node), &serde_json::json!({"title": "new"}))
            .unwrap();

        assert!(report.notified.is_empty());
        assert_eq!(graph.node(&key(&node)).unwrap().title, "new");
        assert!(matches!(
            graph.update_node(&key(&node), &serde_json::json!("title")),
            Err(Error::Validation(_))
        ));
    }
}
