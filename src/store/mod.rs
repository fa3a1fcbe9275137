//! The relational store: SQLite schema management, dedup resolution, and
//! the batched transactional writer.

pub mod resolve;
pub mod schema;
pub mod writer;

use std::path::{Path, PathBuf};

use rusqlite::Connection;

use crate::error::Result;

/// Handle to the target SQLite database.
///
/// Exclusively owned by the importing process for the duration of a run;
/// concurrent imports against the same file are unsupported. All transaction
/// boundaries belong to [`writer::StoreWriter`].
pub struct Store {
    path: PathBuf,
    conn: Connection,
}

impl Store {
    /// Open (or create) the database file and ensure the schema is present
    /// and compatible. Fails fast with `ImportError::Schema` on an
    /// incompatible existing table, before any write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        schema::ensure_schema(&conn)?;
        Ok(Self { path, conn })
    }

    /// In-memory store, for tests.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::ensure_schema(&conn)?;
        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Shared access to the underlying connection (read-only use).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Mutable access for transaction scopes. Only the writer uses this.
    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Create the receipt-timestamp index. Called once, after the archive
    /// stream is exhausted, so bulk inserts don't pay per-row index upkeep.
    pub fn finalize_index(&self) -> Result<()> {
        schema::finalize_index(&self.conn)
    }

    /// Number of persisted messages.
    pub fn message_count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM emails", [], |row| row.get(0))?;
        Ok(count)
    }
}
