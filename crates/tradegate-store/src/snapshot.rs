use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use moka::future::Cache;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use tracing::warn;
use tradegate_models::snapshot::{key_patterns, SnapshotRow, SNAPSHOT_TABLE_DDL};
use tradegate_models::world_state::{AccountContext, AgentMemory, MarketContext, Timeframe};

use crate::error::StoreError;

/// SQLite accessor for the shared snapshot table.
pub struct SnapshotDb {
    conn: Connection,
}

impl SnapshotDb {
    /// Read-only connection to a snapshot file written by the data pipeline.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// Read-write connection that creates the schema. For tools and tests that seed snapshots.
    pub fn open_writable(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SNAPSHOT_TABLE_DDL)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SNAPSHOT_TABLE_DDL)?;
        Ok(Self { conn })
    }

    /// Returns None if the key is missing or expired.
    pub fn get(&self, key: &str) -> Result<Option<SnapshotRow>, StoreError> {
        let now = Utc::now().to_rfc3339();
        let mut stmt = self.conn.prepare_cached(
            "SELECT key, category, value_json, source, symbol, created_at, expires_at, updated_at \
             FROM cache_entries WHERE key = ?1 AND expires_at > ?2",
        )?;
        let row = stmt
            .query_row(params![key, now], |row| {
                Ok(SnapshotRow {
                    key: row.get(0)?,
                    category: row.get(1)?,
                    value_json: row.get(2)?,
                    source: row.get(3)?,
                    symbol: row.get(4)?,
                    created_at: row.get(5)?,
                    expires_at: row.get(6)?,
                    updated_at: row.get(7)?,
                })
            })
            .optional()?;
        Ok(row)
    }

    pub fn upsert(&self, row: &SnapshotRow) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO cache_entries \
             (key, category, value_json, source, symbol, created_at, expires_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                row.key,
                row.category,
                row.value_json,
                row.source,
                row.symbol,
                row.created_at,
                row.expires_at,
                row.updated_at,
            ],
        )?;
        Ok(())
    }
}

/// Typed reader over the snapshot table.
///
/// Market and memory snapshots read through a moka hot cache holding raw JSON
/// and promote SQLite hits, so a stale entry lives at most one TTL. Account
/// snapshots always go to SQLite so positions and P&L are never stale.
pub struct SnapshotReader {
    hot: Cache<String, String>,
    db: Mutex<SnapshotDb>,
}

impl SnapshotReader {
    pub fn new(db: SnapshotDb, max_capacity: u64, memory_ttl: Duration) -> Self {
        Self {
            hot: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(memory_ttl)
                .build(),
            db: Mutex::new(db),
        }
    }

    fn read_row(&self, key: &str) -> Result<Option<SnapshotRow>, StoreError> {
        let db = self
            .db
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("SQLite mutex poisoned: {e}")))?;
        db.get(key)
    }

    async fn get_cached<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        if let Some(json) = self.hot.get(key).await {
            match serde_json::from_str(&json) {
                Ok(value) => return Ok(Some(value)),
                Err(e) => {
                    warn!(key, error = %e, "Dropping undecodable hot cache entry");
                    self.hot.invalidate(key).await;
                }
            }
        }

        let Some(row) = self.read_row(key)? else {
            return Ok(None);
        };
        let value = serde_json::from_str(&row.value_json)?;
        self.hot.insert(key.to_string(), row.value_json).await;
        Ok(Some(value))
    }

    fn get_fresh<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.read_row(key)? {
            Some(row) => Ok(Some(serde_json::from_str(&row.value_json)?)),
            None => Ok(None),
        }
    }

    pub async fn market(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<MarketContext>, StoreError> {
        self.get_cached(&key_patterns::market(symbol, timeframe.as_str()))
            .await
    }

    pub fn account(&self, name: &str) -> Result<Option<AccountContext>, StoreError> {
        self.get_fresh(&key_patterns::account(name))
    }

    pub async fn memory(&self, symbol: &str) -> Result<Option<AgentMemory>, StoreError> {
        self.get_cached(&key_patterns::memory(symbol)).await
    }
}
