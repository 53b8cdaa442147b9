//! tradegate - mode-gated trade proposal and safety pipeline
//!
//! Three brains read a per-request world state, a coordinator folds their
//! votes into one direction, and every proposal passes hard safety checks
//! before it lands in an append-only audit ledger. Nothing here sends orders.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use tradegate::engine::{AgentParts, BrainSet, TradingAgent};
//! use tradegate::models::config::GateConfig;
//! use tradegate::models::world_state::Timeframe;
//! use tradegate::store::{SnapshotReader, SqliteStore};
//! ```

pub mod sources;

pub use tradegate_engine as engine;
pub use tradegate_models as models;
pub use tradegate_store as store;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tradegate_engine::{AgentParts, BrainSet, TradingAgent};
use tradegate_models::config::GateConfig;
use tradegate_store::{SnapshotDb, SnapshotReader, SqliteStore};

use crate::sources::SnapshotSources;

/// Read a TOML config file. Missing sections fall back to defaults.
pub fn load_config(path: &str) -> Result<GateConfig, anyhow::Error> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {path}"))?;
    toml::from_str(&raw).with_context(|| format!("Failed to parse config: {path}"))
}

/// Wire a [`TradingAgent`] over the SQLite ledger and the snapshot table.
///
/// The ledger file is created if missing. The snapshot file must already
/// exist since another process owns it.
pub fn build_agent(config: &GateConfig) -> Result<TradingAgent, anyhow::Error> {
    let ledger_path = &config.store.ledger_path;
    if let Some(parent) = Path::new(ledger_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let store = Arc::new(
        SqliteStore::open(ledger_path)
            .with_context(|| format!("Failed to open ledger: {ledger_path}"))?,
    );

    let snapshot_path = &config.store.snapshot_path;
    let snapshots = SnapshotDb::open(snapshot_path)
        .with_context(|| format!("Failed to open snapshots: {snapshot_path}"))?;
    let reader = Arc::new(SnapshotReader::new(
        snapshots,
        config.store.memory_max_capacity,
        Duration::from_secs(config.store.memory_ttl_seconds),
    ));
    let sources = Arc::new(SnapshotSources::new(reader));

    let brains = BrainSet::reference(&config.brains)?;

    let agent = TradingAgent::new(
        AgentParts {
            config_store: store.clone(),
            ledger_store: store,
            market: sources.clone(),
            memory: sources,
            venue: None,
            brains,
        },
        config,
    )?;
    Ok(agent)
}
