//! SQLite storage for pipelines, their event log, notes and attachments.
//!
//! A single connection sits behind a mutex; cloning a [`Database`] shares it.
//! Per-pipeline write ordering is enforced with the `revision` column rather
//! than with the mutex, so a caller holding a stale copy gets a conflict
//! instead of silently overwriting newer state.

mod attachments;
pub mod events;
mod notes;
mod pipelines;
mod runs;
mod schema;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use uuid::Uuid;

use crate::error::{CoreError, Result};

pub use schema::SCHEMA;

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        Self::from_connection(conn)
    }

    /// Opens the database at the platform data directory.
    pub fn open_default() -> Result<Self> {
        let path = Self::default_path()?;
        tracing::debug!("Opening database at {}", path.display());
        Self::open(path)
    }

    pub fn open_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn default_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("dev", "salesline", "salesline")
            .ok_or(CoreError::NoDataDir)?;
        Ok(dirs.data_dir().join("salesline.db"))
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        register_functions(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        self.with_connection(|conn| conn.execute_batch(SCHEMA))?;
        Ok(())
    }

    /// Runs `f` with exclusive access to the underlying connection.
    pub fn with_connection<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Connection) -> std::result::Result<T, E>,
    {
        // A panic while holding the lock leaves no partial transaction behind:
        // rusqlite rolls back uncommitted transactions on drop.
        let mut conn = self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut conn)
    }
}

/// SQLite's `lower()` only folds ASCII; search needs the full Unicode mapping.
fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "unicode_lower",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value: Option<String> = ctx.get(0)?;
            Ok(value.map(|v| v.to_lowercase()))
        },
    )
}

// Fixed-width UTC timestamps so that TEXT comparison in SQL orders correctly.
pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| CoreError::DataIntegrity(format!("invalid {column} timestamp '{value}': {e}")))
}

pub(crate) fn parse_opt_ts(column: &str, value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_ts(column, &v)).transpose()
}

pub(crate) fn parse_uuid(column: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| CoreError::DataIntegrity(format!("invalid {column} id '{value}': {e}")))
}

pub(crate) fn parse_opt_uuid(column: &str, value: Option<String>) -> Result<Option<Uuid>> {
    value.map(|v| parse_uuid(column, &v)).transpose()
}

pub(crate) fn to_u32(column: &str, value: i64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| CoreError::DataIntegrity(format!("{column} value {value} out of range")))
}
