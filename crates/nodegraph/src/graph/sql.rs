//! `SQLite`-backed implementations of [`GraphRead`].

use rusqlite::{Connection, Transaction};

use super::GraphRead;
use crate::domain::{DependencyEdge, NodeId};
use crate::error::Result;
use crate::store::edges;

impl GraphRead for Connection {
    fn dependencies_of(&self, node: NodeId) -> Result<Vec<DependencyEdge>> {
        edges::active_dependencies(self, node)
    }

    fn dependents_of(&self, node: NodeId) -> Result<Vec<DependencyEdge>> {
        edges::active_dependents(self, node)
    }
}

// Lets traversals run against the transaction the caller is writing in.
impl GraphRead for Transaction<'_> {
    fn dependencies_of(&self, node: NodeId) -> Result<Vec<DependencyEdge>> {
        edges::active_dependencies(self, node)
    }

    fn dependents_of(&self, node: NodeId) -> Result<Vec<DependencyEdge>> {
        edges::active_dependents(self, node)
    }
}
