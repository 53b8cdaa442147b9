use serde::{Deserialize, Serialize};

/// What a snapshot row describes. Written by the data pipeline alongside the key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotCategory {
    Market,
    Account,
    Memory,
}

impl SnapshotCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotCategory::Market => "market",
            SnapshotCategory::Account => "account",
            SnapshotCategory::Memory => "memory",
        }
    }
}

/// Shared snapshot table. The data pipeline writes it, tradegate reads it.
pub const SNAPSHOT_TABLE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS cache_entries (
    key         TEXT PRIMARY KEY,
    category    TEXT NOT NULL,
    value_json  TEXT NOT NULL,
    source      TEXT NOT NULL,
    symbol      TEXT,
    created_at  TEXT NOT NULL,
    expires_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cache_category ON cache_entries(category);
CREATE INDEX IF NOT EXISTS idx_cache_symbol ON cache_entries(symbol);
CREATE INDEX IF NOT EXISTS idx_cache_expires ON cache_entries(expires_at);
";

/// Key conventions for snapshot rows.
///
/// - Market context: `market:{symbol}:{timeframe}` (e.g. `market:EURUSD:1h`)
/// - Account context: `account:{name}` (e.g. `account:primary`)
/// - Agent memory: `memory:{symbol}` (e.g. `memory:EURUSD`)
pub mod key_patterns {
    pub const PRIMARY_ACCOUNT: &str = "primary";

    pub fn market(symbol: &str, timeframe: &str) -> String {
        format!("market:{symbol}:{timeframe}")
    }

    pub fn account(name: &str) -> String {
        format!("account:{name}")
    }

    pub fn memory(symbol: &str) -> String {
        format!("memory:{symbol}")
    }
}

/// A raw snapshot row as stored in SQLite.
#[derive(Debug, Clone)]
pub struct SnapshotRow {
    pub key: String,
    pub category: String,
    pub value_json: String,
    pub source: String,
    pub symbol: Option<String>,
    pub created_at: String,
    pub expires_at: String,
    pub updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_patterns() {
        assert_eq!(key_patterns::market("EURUSD", "1h"), "market:EURUSD:1h");
        assert_eq!(
            key_patterns::account(key_patterns::PRIMARY_ACCOUNT),
            "account:primary"
        );
        assert_eq!(key_patterns::memory("GBPUSD"), "memory:GBPUSD");
    }
}
