mod change_set;
mod members;
mod schema;
mod shopping;
mod tasks;

use std::ops::Deref;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};
use uuid::Uuid;

#[cfg(test)]
pub(crate) use schema::run_migrations;
pub use change_set::{ChangeSet, EntityKind, EntitySet, EntryState, Persist, StagedEntry};
pub use members::list_members_with_task_counts;
pub use shopping::{list_shopping_items, ShoppingRow};
pub use tasks::{find_task_row, list_task_rows, TaskRow};

/// Handle to the SQLite store.
///
/// The connection sits behind an async mutex: queries take it for the duration
/// of one read, commands take it for the whole of their transaction.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    committed_writes: Arc<AtomicU64>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    pub fn open_default() -> Result<Self> {
        Self::open(default_path()?)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            committed_writes: Arc::new(AtomicU64::new(0)),
        })
    }

    pub async fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        schema::run_migrations(&conn)
    }

    /// Exclusive access to the connection for a single read or write.
    pub async fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().await
    }

    /// Open a write transaction. The connection stays locked until the
    /// returned handle is committed, rolled back or dropped.
    pub async fn begin(&self) -> Result<Transaction> {
        let conn = self.conn.clone().lock_owned().await;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Transaction {
            conn,
            committed_writes: self.committed_writes.clone(),
            pending_writes: 0,
            finished: false,
        })
    }

    /// Rows written by transactions that committed. Rolled back work is not
    /// counted.
    pub fn committed_writes(&self) -> u64 {
        self.committed_writes.load(Ordering::SeqCst)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            committed_writes: self.committed_writes.clone(),
        }
    }
}

/// An open `BEGIN IMMEDIATE` scope. Dropping it without calling
/// [`Transaction::commit`] rolls back.
pub struct Transaction {
    conn: OwnedMutexGuard<Connection>,
    committed_writes: Arc<AtomicU64>,
    pending_writes: u64,
    finished: bool,
}

impl Transaction {
    pub fn record_writes(&mut self, rows: usize) {
        self.pending_writes += rows as u64;
    }

    pub fn commit(mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        self.committed_writes
            .fetch_add(self.pending_writes, Ordering::SeqCst);
        Ok(())
    }

    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

impl Deref for Transaction {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            tracing::error!("Failed to roll back abandoned transaction: {}", e);
        }
    }
}

fn default_path() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "family-hub")
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
    Ok(dirs.data_dir().join("family-hub.db"))
}

fn conversion_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

pub(crate) fn parse_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn parse_uuid_opt(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

pub(crate) fn parse_datetime(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    rfc3339(&raw).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn parse_datetime_opt(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| rfc3339(&raw).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn rfc3339(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}
