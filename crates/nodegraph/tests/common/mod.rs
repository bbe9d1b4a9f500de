//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use nodegraph::{DependencyEdge, NewDependency, NodeGraph, NodeGraphConfig};
use tempfile::TempDir;

/// An engine on a private in-memory database.
pub fn engine() -> NodeGraph {
    NodeGraph::in_memory(NodeGraphConfig::default()).expect("should open in-memory engine")
}

/// An engine on a database file in a fresh temp dir.
pub fn file_engine() -> (TempDir, NodeGraph) {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let config = NodeGraphConfig::with_database(dir.path().join("graph.db"));
    let graph = NodeGraph::open(config).expect("should open file engine");
    (dir, graph)
}

/// Register a node in the `docs` domain and return its key.
pub fn node(graph: &NodeGraph, title: &str) -> String {
    graph
        .register_node("docs", title)
        .expect("should register node")
        .key
        .to_string()
}

/// Create `dependent -> dependency` with the type's defaults.
pub fn link(graph: &NodeGraph, dependent: &str, dependency: &str, kind: &str) -> DependencyEdge {
    graph
        .create_dependency(&NewDependency::new(dependent, dependency, kind))
        .expect("should create dependency")
}
