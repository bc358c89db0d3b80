//! Last-write-wins key-value records, one row per `(table, user_id)`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde_json::Value;

use rearm_core::error::RearmError;
use rearm_core::types::Table;

use crate::db::Database;

/// A stored value together with its key and write time.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub value: Value,
    pub updated_at: DateTime<Utc>,
}

/// Durable `user_id -> value` storage.
///
/// No compare-and-swap is offered: `put` simply overwrites. Errors propagate
/// unchanged to the caller.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, table: Table, user_id: &str) -> Result<Option<Record>, RearmError>;

    async fn put(&self, table: Table, user_id: &str, value: Value) -> Result<(), RearmError>;

    /// All keys present in a table, sorted.
    async fn keys(&self, table: Table) -> Result<Vec<String>, RearmError>;
}

/// Record store on the shared SQLite database.
pub struct SqliteRecordStore {
    db: Arc<Database>,
}

impl SqliteRecordStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn get(&self, table: Table, user_id: &str) -> Result<Option<Record>, RearmError> {
        let row: Option<(String, String)> = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT value, updated_at FROM records WHERE tbl = ?1 AND id = ?2",
                params![table.name(), user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| RearmError::Storage(format!("Record lookup failed: {}", e)))
        })?;

        let Some((raw, updated_at)) = row else {
            return Ok(None);
        };
        let updated_at = DateTime::parse_from_rfc3339(&updated_at)
            .map_err(|e| RearmError::Storage(format!("Bad updated_at on {}: {}", table, e)))?
            .with_timezone(&Utc);
        tracing::debug!(table = %table, user_id = %user_id, "Record loaded");
        Ok(Some(Record {
            id: user_id.to_string(),
            value: serde_json::from_str(&raw)?,
            updated_at,
        }))
    }

    async fn put(&self, table: Table, user_id: &str, value: Value) -> Result<(), RearmError> {
        let raw = serde_json::to_string(&value)?;
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO records (tbl, id, value, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (tbl, id) DO UPDATE SET value = excluded.value,
                                                     updated_at = excluded.updated_at",
                params![table.name(), user_id, raw, now],
            )
            .map_err(|e| RearmError::Storage(format!("Record write failed: {}", e)))
        })?;
        tracing::debug!(table = %table, user_id = %user_id, "Record stored");
        Ok(())
    }

    async fn keys(&self, table: Table) -> Result<Vec<String>, RearmError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id FROM records WHERE tbl = ?1 ORDER BY id")
                .map_err(|e| RearmError::Storage(format!("Keys query prepare: {}", e)))?;
            let rows = stmt
                .query_map(params![table.name()], |row| row.get::<_, String>(0))
                .map_err(|e| RearmError::Storage(format!("Keys query: {}", e)))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| RearmError::Storage(e.to_string()))
        })
    }
}

/// Process-local record store for tests and throwaway runs.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<(Table, String), Record>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<(Table, String), Record>>, RearmError> {
        self.records
            .lock()
            .map_err(|e| RearmError::Storage(format!("Lock poisoned: {}", e)))
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, table: Table, user_id: &str) -> Result<Option<Record>, RearmError> {
        Ok(self.lock()?.get(&(table, user_id.to_string())).cloned())
    }

    async fn put(&self, table: Table, user_id: &str, value: Value) -> Result<(), RearmError> {
        let record = Record {
            id: user_id.to_string(),
            value,
            updated_at: Utc::now(),
        };
        self.lock()?.insert((table, user_id.to_string()), record);
        Ok(())
    }

    async fn keys(&self, table: Table) -> Result<Vec<String>, RearmError> {
        let mut keys: Vec<String> = self
            .lock()?
            .keys()
            .filter(|(t, _)| *t == table)
            .map(|(_, id)| id.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
