//! Per-script persistent key/value storage.
//!
//! Every row is keyed by `(script_id, key)`, so two scripts can use the
//! same key without ever seeing each other's values. The namespace
//! outlives a page session.

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

use scriptcell_core::{Error, Result};

pub struct ScriptStore {
    conn: Arc<Mutex<Connection>>,
}

impl ScriptStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| Error::Storage(format!("Failed to open {}: {}", path.display(), e)))?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Storage(format!("Failed to open in-memory store: {}", e)))?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS script_kv (
                script_id  TEXT NOT NULL,
                key        TEXT NOT NULL,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (script_id, key)
            );
            "#,
        )
        .map_err(|e| Error::Storage(format!("Failed to init schema: {}", e)))?;
        Ok(())
    }

    pub fn get(&self, script_id: &str, key: &str) -> Result<Option<Value>> {
        let conn = self.conn.lock().unwrap();
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM script_kv WHERE script_id = ?1 AND key = ?2",
                params![script_id, key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::Storage(format!("get failed: {}", e)))?;
        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    pub fn set(&self, script_id: &str, key: &str, value: &Value) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO script_kv (script_id, key, value, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (script_id, key) DO UPDATE SET value = ?3, updated_at = ?4
            "#,
            params![script_id, key, value.to_string(), now],
        )
        .map_err(|e| Error::Storage(format!("set failed: {}", e)))?;
        debug!(script = script_id, key = key, "Stored script value");
        Ok(())
    }

    pub fn delete(&self, script_id: &str, key: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let affected = conn
            .execute(
                "DELETE FROM script_kv WHERE script_id = ?1 AND key = ?2",
                params![script_id, key],
            )
            .map_err(|e| Error::Storage(format!("delete failed: {}", e)))?;
        Ok(affected > 0)
    }

    pub fn keys(&self, script_id: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT key FROM script_kv WHERE script_id = ?1 ORDER BY key")
            .map_err(|e| Error::Storage(format!("keys failed: {}", e)))?;
        let rows = stmt
            .query_map(params![script_id], |row| row.get::<_, String>(0))
            .map_err(|e| Error::Storage(format!("keys failed: {}", e)))?;
        let mut keys = Vec::new();
        for row in rows {
            keys.push(row.map_err(|e| Error::Storage(format!("keys failed: {}", e)))?);
        }
        Ok(keys)
    }

    /// Remove every value belonging to one script.
    pub fn clear_script(&self, script_id: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let affected = conn
            .execute("DELETE FROM script_kv WHERE script_id = ?1", params![script_id])
            .map_err(|e| Error::Storage(format!("clear failed: {}", e)))?;
        Ok(affected)
    }
}
