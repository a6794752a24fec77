use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;

use crate::error::KvError;

const DB_PATH: &str = "data/capture.sqlite";

/// A value together with the version stamp it was read at.
#[derive(Debug, Clone)]
pub struct Versioned {
    pub version: u64,
    pub value: Value,
}

/// Whole-aggregate key-value persistence. Writes carry the version the
/// caller read, so interleaved read-modify-write cycles fail loudly
/// instead of silently losing updates. An absent key reads as `None` and
/// writes against version 0.
pub trait KeyValue {
    fn load(&self, key: &str) -> Result<Option<Versioned>, KvError>;
    fn store(&self, key: &str, expected_version: u64, value: &Value) -> Result<u64, KvError>;
    fn remove(&self, key: &str) -> Result<(), KvError>;
}

pub struct SqliteKv {
    conn: Connection,
}

impl SqliteKv {
    pub fn connect() -> Result<Self, KvError> {
        if let Some(parent) = std::path::Path::new(DB_PATH).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(DB_PATH)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init_schema(&conn)?;
        Ok(SqliteKv { conn })
    }

    pub fn in_memory() -> Result<Self, KvError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(SqliteKv { conn })
    }

    fn init_schema(conn: &Connection) -> Result<(), KvError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS kv (
                key        TEXT PRIMARY KEY,
                version    INTEGER NOT NULL,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            ",
        )?;
        Ok(())
    }
}

impl KeyValue for SqliteKv {
    fn load(&self, key: &str) -> Result<Option<Versioned>, KvError> {
        let row: Option<(u64, String)> = self
            .conn
            .query_row(
                "SELECT version, value FROM kv WHERE key = ?1",
                rusqlite::params![key],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        match row {
            Some((version, raw)) => Ok(Some(Versioned {
                version,
                value: serde_json::from_str(&raw)?,
            })),
            None => Ok(None),
        }
    }

    fn store(&self, key: &str, expected_version: u64, value: &Value) -> Result<u64, KvError> {
        let tx = self.conn.unchecked_transaction()?;
        let current: u64 = tx
            .query_row(
                "SELECT version FROM kv WHERE key = ?1",
                rusqlite::params![key],
                |r| r.get(0),
            )
            .optional()?
            .unwrap_or(0);
        if current != expected_version {
            return Err(KvError::VersionConflict(key.to_string()));
        }
        let next = current + 1;
        tx.execute(
            "INSERT OR REPLACE INTO kv (key, version, value, updated_at)
             VALUES (?1, ?2, ?3, datetime('now'))",
            rusqlite::params![key, next, serde_json::to_string(value)?],
        )?;
        tx.commit()?;
        Ok(next)
    }

    fn remove(&self, key: &str) -> Result<(), KvError> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", rusqlite::params![key])?;
        Ok(())
    }
}
