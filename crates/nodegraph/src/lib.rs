//! # nodegraph: node dependency graph engine
//!
//! `nodegraph` keeps a mutable dependency graph between domain nodes and
//! guarantees it stays acyclic, even with several writers. It also provides:
//!
//! - atomic cascade delete and update notification along cascading edges
//! - read-only impact analysis (blast radius, severity, 0-100 score)
//! - a durable event queue with idempotent acknowledgement and subscriber
//!   routing
//! - memoized neighborhoods with generation-based invalidation
//!
//! Every resource is addressed by a composite key (`tool:domain[:kind]:id`,
//! see [`nodegraph_key`]); the [`NodeGraph`] façade accepts and returns keys
//! in that string form.
//!
//! ## Quick Start
//!
//! ```
//! use nodegraph::{ImpactType, NewDependency, NodeGraph, NodeGraphConfig};
//!
//! let graph = NodeGraph::in_memory(NodeGraphConfig::default())?;
//! let api = graph.register_node("services", "api")?;
//! let web = graph.register_node("services", "web")?;
//!
//! graph.create_dependency(&NewDependency::new(
//!     web.key.to_string(),
//!     api.key.to_string(),
//!     "runtime",
//! ))?;
//!
//! let impact = graph.analyze_impact(&api.key.to_string(), ImpactType::Delete)?;
//! assert_eq!(impact.affected_nodes.len(), 1);
//! # Ok::<(), nodegraph::Error>(())
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod domain;
pub mod error;
pub mod graph;
pub mod registry;
pub mod service;
pub mod store;

pub use nodegraph_key::{CompositeKey, KeyError};

pub use config::NodeGraphConfig;
pub use domain::{
    AckOutcome, DependencyEdge, DependencyHistory, EdgeId, EdgeUpdate, EventId, EventStats,
    EventType, HistoryAction, ImpactType, NewDependency, NewSubscription, Node, NodeEvent, NodeId,
    Subscription, SubscriptionId, SubscriptionPage, SubscriptionUpdate,
};
pub use error::{Error, ResourceKind, Result};
pub use graph::{
    AffectedNode, CacheLookup, CascadeReport, Cycle, DependencyGraph, GraphNode, ImpactAnalysis,
    ImpactLevel, UpdateReport,
};
pub use registry::{Category, DependencyType, TypeRegistry};
pub use service::NodeGraph;
