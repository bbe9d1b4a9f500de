//! Database schema definition for the graph store.
//!
//! All timestamps are unix microseconds (UTC). Composite keys are stored
//! alongside node ids on edges, events and subscriptions: keys are immutable,
//! and a deleted node's edges and events must still render their keys.

/// Database schema definition.
pub(crate) const SCHEMA: &str = r"
-- Node registry. AUTOINCREMENT so a deleted node's id (and key) is never reissued.
CREATE TABLE IF NOT EXISTS nodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tool TEXT NOT NULL,
    domain TEXT NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    generation INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_nodes_domain ON nodes(domain);

-- Fixed type catalog, seeded on open
CREATE TABLE IF NOT EXISTS dependency_types (
    name TEXT PRIMARY KEY,
    category TEXT NOT NULL,
    cascade_delete INTEGER NOT NULL,
    cascade_update INTEGER NOT NULL,
    validation_required INTEGER NOT NULL,
    default_strength INTEGER NOT NULL,
    default_priority INTEGER NOT NULL,
    description TEXT NOT NULL
);

-- Dependency edges: dependent_node_id depends on dependency_node_id.
-- Edges are soft-deleted (is_active = 0), never removed.
CREATE TABLE IF NOT EXISTS node_dependencies (
    id INTEGER PRIMARY KEY,
    dependent_node_id INTEGER NOT NULL,
    dependent_key TEXT NOT NULL,
    dependency_node_id INTEGER NOT NULL,
    dependency_key TEXT NOT NULL,
    dependency_type TEXT NOT NULL REFERENCES dependency_types(name),
    strength INTEGER NOT NULL CHECK (strength BETWEEN 0 AND 100),
    priority INTEGER NOT NULL CHECK (priority BETWEEN 0 AND 100),
    cascade_delete INTEGER NOT NULL,
    cascade_update INTEGER NOT NULL,
    metadata TEXT,
    valid_from INTEGER NOT NULL,
    valid_until INTEGER,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    CHECK (dependent_node_id <> dependency_node_id)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_dependencies_active_unique
    ON node_dependencies(dependent_node_id, dependency_node_id, dependency_type)
    WHERE is_active = 1;
CREATE INDEX IF NOT EXISTS idx_dependencies_dependent
    ON node_dependencies(dependent_node_id) WHERE is_active = 1;
CREATE INDEX IF NOT EXISTS idx_dependencies_dependency
    ON node_dependencies(dependency_node_id) WHERE is_active = 1;

CREATE TRIGGER IF NOT EXISTS node_dependencies_no_delete
BEFORE DELETE ON node_dependencies
BEGIN
    SELECT RAISE(ABORT, 'dependency edges are soft-deleted only');
END;

-- Append-only audit trail of edge transitions
CREATE TABLE IF NOT EXISTS dependency_history (
    id INTEGER PRIMARY KEY,
    dependency_id INTEGER NOT NULL REFERENCES node_dependencies(id),
    action TEXT NOT NULL CHECK (action IN ('created', 'updated', 'deactivated')),
    previous_state TEXT,
    new_state TEXT,
    recorded_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_history_dependency ON dependency_history(dependency_id, id);

CREATE TRIGGER IF NOT EXISTS dependency_history_no_update
BEFORE UPDATE ON dependency_history
BEGIN
    SELECT RAISE(ABORT, 'dependency history is append-only');
END;

CREATE TRIGGER IF NOT EXISTS dependency_history_no_delete
BEFORE DELETE ON dependency_history
BEGIN
    SELECT RAISE(ABORT, 'dependency history is append-only');
END;

-- Memoized neighborhoods; valid while generation matches the node's
CREATE TABLE IF NOT EXISTS dependency_graph_cache (
    node_id INTEGER PRIMARY KEY,
    graph_data TEXT NOT NULL,
    generation INTEGER NOT NULL,
    has_circular INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_graph_cache_expires ON dependency_graph_cache(expires_at);

-- Event subscriptions (filter_conditions is opaque JSON)
CREATE TABLE IF NOT EXISTS node_subscriptions (
    id INTEGER PRIMARY KEY,
    subscriber_service TEXT NOT NULL,
    subscriber_endpoint TEXT,
    subscribed_node_id INTEGER NOT NULL,
    subscribed_node_key TEXT NOT NULL,
    event_types TEXT NOT NULL,
    filter_conditions TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_subscriptions_service ON node_subscriptions(subscriber_service);
CREATE INDEX IF NOT EXISTS idx_subscriptions_node ON node_subscriptions(subscribed_node_id);

-- Durable event log; only processed_at ever changes, and only once
CREATE TABLE IF NOT EXISTS node_events (
    id INTEGER PRIMARY KEY,
    node_id INTEGER NOT NULL,
    node_key TEXT NOT NULL,
    event_type TEXT NOT NULL,
    event_data TEXT NOT NULL,
    occurred_at INTEGER NOT NULL,
    processed_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_events_pending
    ON node_events(occurred_at, id) WHERE processed_at IS NULL;
CREATE INDEX IF NOT EXISTS idx_events_node ON node_events(node_id, occurred_at);
CREATE INDEX IF NOT EXISTS idx_events_type ON node_events(event_type, occurred_at);

CREATE TRIGGER IF NOT EXISTS node_events_immutable
BEFORE UPDATE OF node_id, node_key, event_type, event_data, occurred_at ON node_events
BEGIN
    SELECT RAISE(ABORT, 'node events are immutable');
END;

CREATE TRIGGER IF NOT EXISTS node_events_processed_once
BEFORE UPDATE OF processed_at ON node_events
WHEN OLD.processed_at IS NOT NULL
BEGIN
    SELECT RAISE(ABORT, 'node event already processed');
END;
";
