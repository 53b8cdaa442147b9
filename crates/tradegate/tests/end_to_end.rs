//! Wiring tests: `build_agent` over a file-backed ledger and a seeded
//! snapshot table, with the reference brains.
//!
//! Run with:
//! ```bash
//! cargo test -p tradegate --test end_to_end
//! ```

use chrono::Utc;
use rust_decimal_macros::dec;
use tempfile::TempDir;
use tradegate::engine::test_support::sample_inputs;
use tradegate::engine::{EngineError, ProposalOutcome};
use tradegate::models::agent_config::AgentMode;
use tradegate::models::config::GateConfig;
use tradegate::models::decision::{DecisionFilter, UserAction};
use tradegate::models::snapshot::{key_patterns, SnapshotCategory, SnapshotRow};
use tradegate::models::world_state::Timeframe;
use tradegate::store::SnapshotDb;

fn row(key: String, category: SnapshotCategory, value_json: String) -> SnapshotRow {
    let now = Utc::now();
    SnapshotRow {
        key,
        category: category.as_str().to_string(),
        value_json,
        source: "seed".to_string(),
        symbol: None,
        created_at: now.to_rfc3339(),
        expires_at: (now + chrono::Duration::minutes(10)).to_rfc3339(),
        updated_at: now.to_rfc3339(),
    }
}

/// Config pointing at a fresh temp dir with EURUSD 1h and the primary account seeded.
fn seeded_config(dir: &TempDir) -> GateConfig {
    let snapshot_path = dir.path().join("cache.db").to_string_lossy().to_string();
    let inputs = sample_inputs(dec!(1.0850));
    let db = SnapshotDb::open_writable(&snapshot_path).unwrap();
    db.upsert(&row(
        key_patterns::market("EURUSD", Timeframe::H1.as_str()),
        SnapshotCategory::Market,
        serde_json::to_string(&inputs.market).unwrap(),
    ))
    .unwrap();
    db.upsert(&row(
        key_patterns::account(key_patterns::PRIMARY_ACCOUNT),
        SnapshotCategory::Account,
        serde_json::to_string(&inputs.account).unwrap(),
    ))
    .unwrap();

    let mut config = GateConfig::default();
    config.store.snapshot_path = snapshot_path;
    config.store.ledger_path = dir
        .path()
        .join("ledger")
        .join("tradegate.db")
        .to_string_lossy()
        .to_string();
    config
}

#[tokio::test]
async fn fresh_install_starts_off_and_proposes_nothing() {
    let dir = TempDir::new().unwrap();
    let agent = tradegate::build_agent(&seeded_config(&dir)).unwrap();

    let config = agent.get_config().await.unwrap();
    assert_eq!(config.mode, AgentMode::Off);
    assert!(!config.trading_enabled);

    let outcome = agent.propose_trade("EURUSD", Timeframe::H1).await.unwrap();
    assert!(matches!(outcome, ProposalOutcome::CapabilityDenied { .. }));
    let logged = agent.list_decisions(&DecisionFilter::default()).await.unwrap();
    assert!(logged.is_empty());
}

#[tokio::test]
async fn proposal_and_decision_survive_a_restart() {
    let dir = TempDir::new().unwrap();
    let config = seeded_config(&dir);

    let id = {
        let agent = tradegate::build_agent(&config).unwrap();
        agent.set_mode(AgentMode::Paper).await.unwrap();
        agent.set_kill_switch(true).await.unwrap();

        let outcome = agent.propose_trade("EURUSD", Timeframe::H1).await.unwrap();
        let proposal = outcome.proposal().expect("paper mode proposes").clone();
        assert_eq!(proposal.symbol, "EURUSD");
        assert_eq!(proposal.mode, AgentMode::Paper);

        agent
            .record_user_decision(proposal.id, UserAction::Rejected, Some("not today".into()), None)
            .await
            .unwrap();
        proposal.id
    };

    let agent = tradegate::build_agent(&config).unwrap();
    let config = agent.get_config().await.unwrap();
    assert_eq!(config.mode, AgentMode::Paper);
    assert!(config.trading_enabled);

    let logged = agent.list_decisions(&DecisionFilter::default()).await.unwrap();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].id, id);
    assert_eq!(logged[0].user_action, UserAction::Rejected);
    assert_eq!(logged[0].user_notes.as_deref(), Some("not today"));
}

#[tokio::test]
async fn unseeded_symbol_is_data_unavailable() {
    let dir = TempDir::new().unwrap();
    let agent = tradegate::build_agent(&seeded_config(&dir)).unwrap();
    agent.set_mode(AgentMode::Paper).await.unwrap();

    let err = agent.propose_trade("USDJPY", Timeframe::H1).await.unwrap_err();
    match err {
        EngineError::DataUnavailable { symbol, .. } => assert_eq!(symbol, "USDJPY"),
        other => panic!("expected DataUnavailable, got {other:?}"),
    }
    let logged = agent.list_decisions(&DecisionFilter::default()).await.unwrap();
    assert!(logged.is_empty());
}

#[test]
fn missing_snapshot_file_fails_to_build() {
    let dir = TempDir::new().unwrap();
    let mut config = GateConfig::default();
    config.store.ledger_path = dir.path().join("tradegate.db").to_string_lossy().to_string();
    config.store.snapshot_path = dir.path().join("absent.db").to_string_lossy().to_string();
    assert!(tradegate::build_agent(&config).is_err());
}

#[test]
fn shipped_config_parses() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/tradegate.toml");
    let config = tradegate::load_config(path).unwrap();
    assert_eq!(config.brains.len(), 3);
    assert_eq!(config.coordinator.agreement_threshold, dec!(0.5));
}
