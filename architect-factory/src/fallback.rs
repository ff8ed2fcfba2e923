//! Local key-value store backed by SQLite.
//!
//! Holds JSON-encoded project records the remote store refused, so a failed
//! insert never silently drops a finished cycle.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{Connection, ErrorCode};

use crate::error::{Error, Result};

/// A buffered record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: String,
    pub created_at: String,
}

/// Capability interface over the fallback write path.
pub trait FallbackStore: Send + Sync {
    /// Store `value` under a key that must not exist yet.
    fn put(&self, key: &str, value: &str) -> Result<()>;
}

/// Time-derived key for a buffered project record.
pub fn project_key() -> String {
    format!("project_{}", Utc::now().timestamp_micros())
}

fn store_err(e: rusqlite::Error) -> Error {
    Error::Store(format!("local store: {e}"))
}

/// SQLite-backed `FallbackStore`.
pub struct LocalStore {
    db: Mutex<Connection>,
}

impl LocalStore {
    /// Open or create the store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Connection::open(path).map_err(store_err)?;
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                created_at TEXT NOT NULL
            );",
        )
        .map_err(store_err)?;
        Ok(Self { db: Mutex::new(db) })
    }

    /// Open an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::open(Path::new(":memory:"))
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db
            .prepare("SELECT value FROM kv WHERE key = ?1")
            .map_err(store_err)?;
        match stmt.query_row(rusqlite::params![key], |row| row.get::<_, String>(0)) {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(store_err(e)),
        }
    }

    /// All buffered entries, oldest first.
    pub fn entries(&self) -> Result<Vec<Entry>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db
            .prepare("SELECT key, value, created_at FROM kv ORDER BY created_at ASC, key ASC")
            .map_err(store_err)?;
        let entries = stmt
            .query_map([], |row| {
                Ok(Entry {
                    key: row.get(0)?,
                    value: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })
            .map_err(store_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(store_err)?;
        Ok(entries)
    }
}

impl FallbackStore for LocalStore {
    fn put(&self, key: &str, value: &str) -> Result<()> {
        if key.trim().is_empty() {
            return Err(Error::Validation("fallback key must be non-empty".into()));
        }
        let db = self.db.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO kv (key, value, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![key, value, now],
        )
        .map_err(|e| match e.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => {
                Error::Store(format!("local store: key {key} already exists"))
            }
            _ => store_err(e),
        })?;
        Ok(())
    }
}
