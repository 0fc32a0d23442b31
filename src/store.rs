//! Durable persistence for the digest tree (C1): a `TreeStore` trait with a
//! `rusqlite`-backed implementation for production hosts and an in-memory
//! implementation for tests.
//!
//! The persisted table follows the external-interface contract literally:
//! `NDN_REPO_SYNC(name BLOB PRIMARY KEY, seq INTEGER)`, with `name` the
//! creator's encoded name and `seq` its last-known sequence number. A third
//! `first` column is carried beyond what the contract names, recording the
//! cursor below which entries have been folded into a published snapshot
//! and are no longer present in the `ActionLog` — without it a restart
//! could not tell a truncated prefix from a creator it has simply never
//! seen. The SQLite connection setup (`PRAGMA synchronous = OFF`, `PRAGMA
//! journal_mode = WAL`) and the `from_rusqlite`-style error mapping follow
//! the pattern used by this ecosystem's `ettlex-store` crate for its own
//! CAS/blob table.

use crate::errors::{Result, SyncError};
use crate::identifiers::Name;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// A persisted row: a creator's `(first, last)` cursor pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeRow {
    pub first: u64,
    pub last: u64,
}

/// Durable storage for the digest tree's per-creator cursors.
///
/// Implementations must make `put`/`get`/`all` durable across process
/// restarts; the in-memory implementation exists only for tests and the
/// `testkit` simulator.
pub trait TreeStore: Send + Sync {
    /// Persist (or update) a creator's cursor pair.
    fn put(&self, creator: &Name, row: TreeRow) -> Result<()>;

    /// Load a single creator's cursor pair, if known.
    fn get(&self, creator: &Name) -> Result<Option<TreeRow>>;

    /// Load every creator's cursor pair, for rebuilding the in-memory
    /// `SyncTree` at startup or after a snapshot restore.
    fn all(&self) -> Result<HashMap<Name, TreeRow>>;

    /// Remove a creator's row entirely (used when a snapshot restore
    /// wholesale replaces the known creator set).
    fn remove(&self, creator: &Name) -> Result<()>;
}

/// SQLite-backed `TreeStore`, one row per known creator.
pub struct SqliteTreeStore {
    conn: Mutex<Connection>,
}

impl SqliteTreeStore {
    /// Open (creating if absent) a SQLite database file and ensure its
    /// schema exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// An in-process SQLite database, useful for tests that still want to
    /// exercise the real SQL path.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute("PRAGMA synchronous = OFF", [])?;
        conn.execute("PRAGMA journal_mode = WAL", [])?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS NDN_REPO_SYNC (
                name  BLOB PRIMARY KEY,
                seq   INTEGER NOT NULL,
                first INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(SqliteTreeStore {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SyncError::Storage("tree store connection lock poisoned".into()))
    }
}

impl TreeStore for SqliteTreeStore {
    fn put(&self, creator: &Name, row: TreeRow) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO NDN_REPO_SYNC (name, seq, first) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET seq = excluded.seq, first = excluded.first",
            params![creator.to_string().into_bytes(), row.last as i64, row.first as i64],
        )?;
        Ok(())
    }

    fn get(&self, creator: &Name) -> Result<Option<TreeRow>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT first, seq FROM NDN_REPO_SYNC WHERE name = ?1",
                params![creator.to_string().into_bytes()],
                |r| {
                    let first: i64 = r.get(0)?;
                    let seq: i64 = r.get(1)?;
                    Ok(TreeRow {
                        first: first as u64,
                        last: seq as u64,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    fn all(&self) -> Result<HashMap<Name, TreeRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT name, first, seq FROM NDN_REPO_SYNC")?;
        let rows = stmt.query_map([], |r| {
            let name: Vec<u8> = r.get(0)?;
            let first: i64 = r.get(1)?;
            let seq: i64 = r.get(2)?;
            Ok((
                Name::parse(&String::from_utf8_lossy(&name)),
                TreeRow {
                    first: first as u64,
                    last: seq as u64,
                },
            ))
        })?;
        let mut out = HashMap::new();
        for row in rows {
            let (creator, tree_row) = row?;
            out.insert(creator, tree_row);
        }
        Ok(out)
    }

    fn remove(&self, creator: &Name) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM NDN_REPO_SYNC WHERE name = ?1",
            params![creator.to_string().into_bytes()],
        )?;
        Ok(())
    }
}

/// In-memory `TreeStore`, used by the `testkit` simulator and unit tests
/// that don't need SQLite durability.
#[derive(Debug, Default)]
pub struct InMemoryTreeStore {
    rows: Mutex<HashMap<Name, TreeRow>>,
}

impl InMemoryTreeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TreeStore for InMemoryTreeStore {
    fn put(&self, creator: &Name, row: TreeRow) -> Result<()> {
        self.rows
            .lock()
            .map_err(|_| SyncError::Storage("in-memory tree store lock poisoned".into()))?
            .insert(creator.clone(), row);
        Ok(())
    }

    fn get(&self, creator: &Name) -> Result<Option<TreeRow>> {
        Ok(self
            .rows
            .lock()
            .map_err(|_| SyncError::Storage("in-memory tree store lock poisoned".into()))?
            .get(creator)
            .copied())
    }

    fn all(&self) -> Result<HashMap<Name, TreeRow>> {
        Ok(self
            .rows
            .lock()
            .map_err(|_| SyncError::Storage("in-memory tree store lock poisoned".into()))?
            .clone())
    }

    fn remove(&self, creator: &Name) -> Result<()> {
        self.rows
            .lock()
            .map_err(|_| SyncError::Storage("in-memory tree store lock poisoned".into()))?
            .remove(creator);
        Ok(())
    }
}
