//! SQLite-backed insight store.
//!
//! The database lives at `~/.focusdeck/focusdeck.db` and holds everything this
//! service owns: the user/token table, one `task_insights` row per external
//! task, and the append-only `energy_samples` log. Task text itself is owned
//! by TickTick — rows here are a cache of AI-derived metadata keyed by the
//! external task id, so every write is an upsert against that key.

use std::path::PathBuf;

use rusqlite::Connection;

pub mod types;
pub use types::*;

mod energy;
mod insights;
mod users;

pub use insights::{EmailProvenance, InsightPatch};

pub struct InsightDb {
    conn: Connection,
}

impl InsightDb {
    /// Open (or create) the database at `~/.focusdeck/focusdeck.db` and apply
    /// the schema.
    pub fn open() -> Result<Self, DbError> {
        let path = Self::db_path()?;
        Self::open_at(path)
    }

    /// Open a database at an explicit path. Useful for testing.
    pub fn open_at(path: PathBuf) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;

        // WAL for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(Self { conn })
    }

    /// Default on-disk location: `~/.focusdeck/focusdeck.db`.
    fn db_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".focusdeck").join("focusdeck.db"))
    }

    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Execute a closure within a SQLite transaction.
    /// Commits on Ok, rolls back on Err.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Self) -> Result<T, DbError>,
    {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(self) {
            Ok(val) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(val)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }
}
