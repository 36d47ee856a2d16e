pub mod migrations;
pub mod models;
pub mod queries;

#[cfg(test)]
mod tests;

pub use queries::{chat, friends, groups, posts, users};

use anyhow::Result;
use rusqlite::{Connection, ErrorCode, ffi};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Handle to the SQLite store. Cloning is cheap; all clones share one
/// connection behind a mutex, so units of work are serialized.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent readers from other processes
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let db = Self::init(conn)?;

        info!("Database opened at {}", path.display());
        Ok(db)
    }

    /// Open a private in-memory database; used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` inside a single transaction.
    ///
    /// The transaction commits only when `f` returns `Ok`. On `Err` (or a
    /// panic) it is dropped, which rolls it back, and the connection lock is
    /// released either way.
    pub fn unit_of_work<F, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Connection) -> std::result::Result<T, E>,
        E: From<anyhow::Error>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        let tx = conn.transaction().map_err(anyhow::Error::from)?;
        let out = f(&*tx)?;
        tx.commit().map_err(anyhow::Error::from)?;
        Ok(out)
    }
}

/// True when `err` is a SQLite UNIQUE or PRIMARY KEY constraint failure.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<rusqlite::Error>() {
        Some(rusqlite::Error::SqliteFailure(e, _)) => {
            e.code == ErrorCode::ConstraintViolation
                && (e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}
