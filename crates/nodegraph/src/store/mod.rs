//! `SQLite` storage layer for the dependency graph.
//!
//! `SQLite` is the source of truth for nodes, edges, history, events,
//! subscriptions and cached neighborhoods. Traversals live in the `graph`
//! module and run in application code over the [`GraphRead`](crate::graph::GraphRead)
//! trait; this layer only does single-statement lookups and writes.
//!
//! ## Module Structure
//!
//! - `schema` - Database schema (DDL)
//! - `helpers` - Row conversion and parsing utilities
//! - `nodes` - Node registry and generation counters
//! - `edges` - Dependency edges and their history
//! - `events` - Append-only event log
//! - `subscriptions` - Subscription CRUD
//! - `cache` - Graph cache rows
//!
//! ## Transactions
//!
//! Every mutation goes through [`Store::write`], which opens an `IMMEDIATE`
//! transaction: `SQLite`'s write lock is taken at `BEGIN`, so a cycle check and
//! the insert it approves cannot interleave with another writer, even one in
//! a different process. Reads go through [`Store::read`] for a consistent
//! snapshot.

pub(crate) mod cache;
pub(crate) mod edges;
pub(crate) mod events;
mod helpers;
pub(crate) mod nodes;
mod schema;
pub(crate) mod subscriptions;

pub(crate) use schema::SCHEMA;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior, params};

use crate::error::{Error, Result};
use crate::registry::CATALOG;

/// `SQLite` database wrapper for the graph.
///
/// The connection is wrapped in a `Mutex` so the store (and the engine that
/// owns it) is `Send + Sync`. The lock serializes access within a process;
/// `SQLite`'s own locking serializes writers across processes.
pub struct Store {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Store {
    /// Open or create the graph database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the parent directory cannot be created and
    /// [`Error::Database`] if the database cannot be opened or migrated.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(busy_timeout)?;
        let conn = Self::initialize(conn)?;

        tracing::debug!(path = %path.display(), "Opened graph database");
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a private in-memory database (tests and dry runs).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Database`] if the schema cannot be applied.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Self::initialize(Connection::open_in_memory()?)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    fn initialize(conn: Connection) -> Result<Connection> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Self::seed_types(&conn)?;
        Ok(conn)
    }

    /// Write the fixed type catalog so edges can reference it.
    fn seed_types(conn: &Connection) -> Result<()> {
        let mut stmt = conn.prepare(
            "INSERT INTO dependency_types
                 (name, category, cascade_delete, cascade_update, validation_required,
                  default_strength, default_priority, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(name) DO UPDATE SET
                 category = excluded.category,
                 cascade_delete = excluded.cascade_delete,
                 cascade_update = excluded.cascade_update,
                 validation_required = excluded.validation_required,
                 default_strength = excluded.default_strength,
                 default_priority = excluded.default_priority,
                 description = excluded.description",
        )?;
        for t in &CATALOG {
            stmt.execute(params![
                t.name,
                t.category.to_string(),
                t.cascade_delete,
                t.cascade_update,
                t.validation_required,
                t.default_strength,
                t.default_priority,
                t.description,
            ])?;
        }
        Ok(())
    }

    /// Path of the database file, `None` for in-memory stores.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Acquire the connection lock.
    pub(crate) fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            Error::Internal(format!(
                "database connection mutex poisoned (a thread panicked while holding the lock): {e}"
            ))
        })
    }

    /// Run `f` inside an `IMMEDIATE` transaction.
    ///
    /// Commits if `f` returns `Ok`; any error drops the transaction, which
    /// rolls back every statement `f` executed.
    pub(crate) fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Run `f` inside a deferred (read) transaction.
    pub(crate) fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

/// Map a constraint failure to [`Error::ConstraintViolation`], passing every
/// other error through.
pub(crate) fn constraint_error(err: rusqlite::Error, context: &str) -> Error {
    match &err {
        rusqlite::Error::SqliteFailure(e, msg)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            let detail = msg.as_deref().unwrap_or("constraint failed");
            Error::ConstraintViolation(format!("{context}: {detail}"))
        }
        _ => Error::Database(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("graph.db");

        let store = Store::open(&path, Duration::from_millis(100)).unwrap();
        assert!(path.exists());
        assert_eq!(store.path(), Some(path.as_path()));
    }

    #[test]
    fn reopening_keeps_schema_and_catalog() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.db");

        drop(Store::open(&path, Duration::from_millis(100)).unwrap());
        let store = Store::open(&path, Duration::from_millis(100)).unwrap();

        let count: i64 = store
            .read(|tx| Ok(tx.query_row("SELECT COUNT(*) FROM dependency_types", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 8);
    }

    #[test]
    fn failed_write_rolls_back() {
        let store = Store::open_in_memory().unwrap();

        let result: Result<()> = store.write(|tx| {
            tx.execute(
                "INSERT INTO nodes (tool, domain, title, created_at, updated_at)
                 VALUES ('url-db', 'docs', 'a', 0, 0)",
                [],
            )?;
            Err(Error::Internal("abort".to_string()))
        });
        assert!(result.is_err());

        let count: i64 = store
            .read(|tx| Ok(tx.query_row("SELECT COUNT(*) FROM nodes", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn constraint_failures_are_classified() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (x INTEGER UNIQUE); INSERT INTO t VALUES (1);")
            .unwrap();
        let err = conn.execute("INSERT INTO t VALUES (1)", []).unwrap_err();

        assert!(matches!(
            constraint_error(err, "insert"),
            Error::ConstraintViolation(msg) if msg.starts_with("insert")
        ));
    }
}
