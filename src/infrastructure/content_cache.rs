//! SQLite-backed content cache for exported conversations.
//!
//! One table keyed by conversation id, holding the JSON record. The schema
//! is versioned; migrations only ever add to it so cached rows survive
//! upgrades.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection};

use crate::domain::{AppError, ContentCache, ConversationRecord, Result};

/// Latest schema version written by `migrate`.
const SCHEMA_VERSION: i64 = 2;

/// Content cache stored in a local SQLite file.
pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    /// Opens or creates the cache database.
    ///
    /// # Errors
    /// Returns error if database cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::io("Failed to create cache directory", e))?;
        }

        let conn = Connection::open(path).map_err(AppError::database)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(AppError::database)?;

        Self::from_connection(conn)
    }

    /// Opens a throwaway in-memory cache.
    ///
    /// # Errors
    /// Returns error if the schema cannot be created.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(AppError::database)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| AppError::Database {
            message: "Cache connection lock poisoned".into(),
            source: None,
        })
    }
}

/// Bring the schema up to `SCHEMA_VERSION`.
fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        );",
    )
    .map_err(AppError::database)?;

    let version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .map_err(AppError::database)?;

    if version < 1 {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS chats (
                id TEXT PRIMARY KEY,
                record TEXT NOT NULL
            );
            INSERT INTO schema_version (version) VALUES (1);",
        )
        .map_err(AppError::database)?;
    }

    if version < 2 {
        conn.execute_batch(
            "ALTER TABLE chats ADD COLUMN cached_at TEXT;
            UPDATE chats SET cached_at = datetime('now') WHERE cached_at IS NULL;
            INSERT INTO schema_version (version) VALUES (2);",
        )
        .map_err(AppError::database)?;
    }

    if version < SCHEMA_VERSION {
        tracing::info!(from = version, to = SCHEMA_VERSION, "Migrated cache schema");
    }

    Ok(())
}

impl ContentCache for SqliteCache {
    fn put(&self, record: &ConversationRecord) -> Result<()> {
        let json = serde_json::to_string(record).map_err(AppError::json_parse)?;

        self.lock()?
            .execute(
                r"
            INSERT INTO chats (id, record, cached_at)
            VALUES (?1, ?2, datetime('now'))
            ON CONFLICT(id) DO UPDATE SET
                record = excluded.record,
                cached_at = excluded.cached_at
            ",
                params![&record.id, json],
            )
            .map_err(AppError::database)?;

        tracing::debug!(id = %record.id, "Cached conversation");
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<ConversationRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, record FROM chats")
            .map_err(AppError::database)?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(AppError::database)?;

        let mut records = Vec::new();
        for row in rows {
            let (id, json) = row.map_err(AppError::database)?;
            match serde_json::from_str::<ConversationRecord>(&json) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "Skipping unreadable cache entry");
                }
            }
        }

        Ok(records)
    }

    fn clear(&self) -> Result<()> {
        let removed = self
            .lock()?
            .execute("DELETE FROM chats", [])
            .map_err(AppError::database)?;

        tracing::info!(removed, "Cleared content cache");
        Ok(())
    }
}
