//! SQLite storage engine

use super::{KeyValueStorage, StorageError, StorageKey, StorageResult};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS dialog_state (
    key TEXT PRIMARY KEY,
    bot_id INTEGER NOT NULL,
    chat_id INTEGER NOT NULL,
    purpose TEXT NOT NULL,
    payload TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_dialog_state_chat ON dialog_state(bot_id, chat_id);
";

/// Thread-safe SQLite handle
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Number of stored records for a chat
    pub fn count_for_chat(&self, bot_id: i64, chat_id: i64) -> StorageResult<i64> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM dialog_state WHERE bot_id = ?1 AND chat_id = ?2",
            params![bot_id, chat_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[async_trait]
impl KeyValueStorage for SqliteStorage {
    async fn get(&self, key: &StorageKey) -> StorageResult<Option<Map<String, Value>>> {
        let conn = self.conn.lock().unwrap();
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM dialog_state WHERE key = ?1",
                params![key.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        drop(conn);

        match payload {
            Some(text) => match serde_json::from_str::<Value>(&text)? {
                Value::Object(map) => Ok(Some(map)),
                other => Err(StorageError::Backend(format!(
                    "record {key} is not an object: {other}"
                ))),
            },
            None => Ok(None),
        }
    }

    async fn set(&self, key: &StorageKey, value: Map<String, Value>) -> StorageResult<()> {
        let payload = serde_json::to_string(&Value::Object(value))?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO dialog_state (key, bot_id, chat_id, purpose, payload, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(key) DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at",
            params![
                key.to_string(),
                key.bot_id,
                key.chat_id,
                key.purpose.as_str(),
                payload,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    async fn clear(&self, key: &StorageKey) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM dialog_state WHERE key = ?1",
            params![key.to_string()],
        )?;
        Ok(())
    }
}
