use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use rust_decimal::Decimal;
use tracing::debug;
use tradegate_models::agent_config::{AgentConfig, ConfigPatch};
use tradegate_models::decision::{DecisionFilter, DecisionPatch, DecisionRecord};
use uuid::Uuid;

use crate::error::StoreError;
use crate::traits::{apply_patch, ConfigStore, LedgerStore};

/// Ledger and config schema.
///
/// Timestamps are RFC 3339 UTC with nanoseconds, so text order is time order.
/// Triggers keep the immutable columns immutable and forbid deletes.
pub const LEDGER_DDL: &str = "\
CREATE TABLE IF NOT EXISTS decisions (
    id                  TEXT PRIMARY KEY,
    timestamp           TEXT NOT NULL,
    symbol              TEXT NOT NULL,
    context_snapshot    TEXT NOT NULL,
    proposed_order      TEXT NOT NULL,
    brains_output       TEXT NOT NULL,
    coordinator_output  TEXT NOT NULL,
    safety              TEXT NOT NULL,
    user_action         TEXT NOT NULL DEFAULT 'pending',
    user_notes          TEXT,
    confidence          TEXT NOT NULL,
    mode                TEXT NOT NULL,
    result              TEXT
);
CREATE INDEX IF NOT EXISTS idx_decisions_timestamp ON decisions(timestamp);
CREATE INDEX IF NOT EXISTS idx_decisions_symbol ON decisions(symbol);
CREATE INDEX IF NOT EXISTS idx_decisions_user_action ON decisions(user_action);

CREATE TRIGGER IF NOT EXISTS decisions_immutable
BEFORE UPDATE OF id, timestamp, symbol, context_snapshot, proposed_order, brains_output,
                 coordinator_output, safety, confidence, mode
ON decisions
BEGIN
    SELECT RAISE(ABORT, 'decision records are immutable');
END;

CREATE TRIGGER IF NOT EXISTS decisions_action_once
BEFORE UPDATE OF user_action ON decisions
WHEN OLD.user_action <> 'pending' AND NEW.user_action <> OLD.user_action
BEGIN
    SELECT RAISE(ABORT, 'user action already recorded');
END;

CREATE TRIGGER IF NOT EXISTS decisions_no_delete
BEFORE DELETE ON decisions
BEGIN
    SELECT RAISE(ABORT, 'decision records cannot be deleted');
END;

CREATE TABLE IF NOT EXISTS agent_config (
    id          INTEGER PRIMARY KEY CHECK (id = 1),
    config_json TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
";

const DECISION_COLUMNS: &str = "id, timestamp, symbol, context_snapshot, proposed_order, \
    brains_output, coordinator_output, safety, user_action, user_notes, confidence, mode, result";

/// SQLite-backed ledger and config store.
///
/// `rusqlite::Connection` is not `Sync`, so access is serialized through a `Mutex`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store file in WAL mode.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_millis(500))?;
        conn.execute_batch(LEDGER_DDL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(LEDGER_DDL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("SQLite mutex poisoned: {e}")))
    }

    pub fn decision_count(&self) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let count: usize = conn.query_row("SELECT COUNT(*) FROM decisions", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn format_ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp '{raw}': {e}")))
}

/// Column values as stored, before JSON decoding.
struct RawDecision {
    id: String,
    timestamp: String,
    symbol: String,
    context_snapshot: String,
    proposed_order: String,
    brains_output: String,
    coordinator_output: String,
    safety: String,
    user_action: String,
    user_notes: Option<String>,
    confidence: String,
    mode: String,
    result: Option<String>,
}

impl RawDecision {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            symbol: row.get(2)?,
            context_snapshot: row.get(3)?,
            proposed_order: row.get(4)?,
            brains_output: row.get(5)?,
            coordinator_output: row.get(6)?,
            safety: row.get(7)?,
            user_action: row.get(8)?,
            user_notes: row.get(9)?,
            confidence: row.get(10)?,
            mode: row.get(11)?,
            result: row.get(12)?,
        })
    }

    fn into_record(self) -> Result<DecisionRecord, StoreError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| StoreError::Corrupt(format!("id '{}': {e}", self.id)))?;
        let confidence = Decimal::from_str(&self.confidence)
            .map_err(|e| StoreError::Corrupt(format!("confidence '{}': {e}", self.confidence)))?;
        Ok(DecisionRecord {
            id,
            timestamp: parse_ts(&self.timestamp)?,
            symbol: self.symbol,
            context_snapshot: serde_json::from_str(&self.context_snapshot)?,
            proposed_order: serde_json::from_str(&self.proposed_order)?,
            brains_output: serde_json::from_str(&self.brains_output)?,
            coordinator_output: serde_json::from_str(&self.coordinator_output)?,
            safety: serde_json::from_str(&self.safety)?,
            user_action: self.user_action.parse().map_err(StoreError::Corrupt)?,
            user_notes: self.user_notes,
            confidence,
            mode: self.mode.parse().map_err(StoreError::Corrupt)?,
            result: self
                .result
                .map(|raw| serde_json::from_str(&raw))
                .transpose()?,
        })
    }
}

fn select_decision(conn: &Connection, id: Uuid) -> Result<Option<DecisionRecord>, StoreError> {
    let mut stmt =
        conn.prepare_cached(&format!("SELECT {DECISION_COLUMNS} FROM decisions WHERE id = ?1"))?;
    let raw = stmt
        .query_row(params![id.to_string()], RawDecision::from_row)
        .optional()?;
    raw.map(RawDecision::into_record).transpose()
}

fn select_config(conn: &Connection) -> Result<Option<AgentConfig>, StoreError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT config_json FROM agent_config WHERE id = 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(raw.map(|json| serde_json::from_str(&json)).transpose()?)
}

#[async_trait]
impl ConfigStore for SqliteStore {
    async fn get_config(&self) -> Result<AgentConfig, StoreError> {
        let conn = self.lock()?;
        Ok(select_config(&conn)?.unwrap_or_default())
    }

    async fn upsert_config(&self, patch: &ConfigPatch) -> Result<AgentConfig, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current = select_config(&tx)?.unwrap_or_default();
        let next = current.merged(patch, Utc::now());
        tx.execute(
            "INSERT INTO agent_config (id, config_json, updated_at) VALUES (1, ?1, ?2) \
             ON CONFLICT(id) DO UPDATE SET config_json = excluded.config_json, \
             updated_at = excluded.updated_at",
            params![serde_json::to_string(&next)?, format_ts(&next.updated_at)],
        )?;
        tx.commit()?;
        debug!(mode = %next.mode, trading_enabled = next.trading_enabled, "Config upserted");
        Ok(next)
    }
}

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn append_decision(&self, record: &DecisionRecord) -> Result<Uuid, StoreError> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            &format!(
                "INSERT INTO decisions ({DECISION_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13) \
                 ON CONFLICT(id) DO NOTHING"
            ),
            params![
                record.id.to_string(),
                format_ts(&record.timestamp),
                record.symbol,
                serde_json::to_string(&record.context_snapshot)?,
                serde_json::to_string(&record.proposed_order)?,
                serde_json::to_string(&record.brains_output)?,
                serde_json::to_string(&record.coordinator_output)?,
                serde_json::to_string(&record.safety)?,
                record.user_action.as_str(),
                record.user_notes,
                record.confidence.to_string(),
                record.mode.as_str(),
                record
                    .result
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
            ],
        )?;
        if inserted == 0 {
            debug!(id = %record.id, "Decision already appended");
        }
        Ok(record.id)
    }

    async fn update_decision(
        &self,
        id: Uuid,
        patch: &DecisionPatch,
    ) -> Result<DecisionRecord, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut record = select_decision(&tx, id)?.ok_or(StoreError::NotFound(id))?;
        apply_patch(&mut record, patch)?;
        tx.execute(
            "UPDATE decisions SET user_action = ?2, user_notes = ?3, result = ?4 WHERE id = ?1",
            params![
                id.to_string(),
                record.user_action.as_str(),
                record.user_notes,
                record
                    .result
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
            ],
        )?;
        tx.commit()?;
        Ok(record)
    }

    async fn query_decisions(
        &self,
        filter: &DecisionFilter,
    ) -> Result<Vec<DecisionRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {DECISION_COLUMNS} FROM decisions \
             WHERE (?1 IS NULL OR timestamp >= ?1) \
               AND (?2 IS NULL OR timestamp <= ?2) \
               AND (?3 IS NULL OR user_action = ?3) \
               AND (?4 IS NULL OR symbol = ?4) \
             ORDER BY timestamp DESC, id DESC \
             LIMIT ?5"
        ))?;
        let limit = i64::try_from(filter.limit).unwrap_or(i64::MAX);
        let raws = stmt
            .query_map(
                params![
                    filter.since.as_ref().map(format_ts),
                    filter.until.as_ref().map(format_ts),
                    filter.user_action.map(|a| a.as_str()),
                    filter.symbol,
                    limit,
                ],
                RawDecision::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        raws.into_iter().map(RawDecision::into_record).collect()
    }

    async fn get_decision(&self, id: Uuid) -> Result<Option<DecisionRecord>, StoreError> {
        let conn = self.lock()?;
        select_decision(&conn, id)
    }
}
