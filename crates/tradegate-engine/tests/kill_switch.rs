//! Kill switch behavior across the persisted flag and the execution venue.
//!
//! The persisted flag always wins. Venue failures must show up in the
//! outcome and in health, never as a silently "off" switch. Config patches
//! that touch the switch are written in one piece.

use std::sync::Arc;

use tradegate_engine::test_support::{paper_config, Harness, RecordingVenue};
use tradegate_engine::{EngineError, ExecutionVenue, HealthStatus, Propagation, ProposalOutcome};
use tradegate_models::agent_config::{AgentConfig, AgentMode, ConfigPatch};
use tradegate_models::world_state::Timeframe;

#[tokio::test]
async fn unreachable_venue_still_engages_locally() {
    let venue = Arc::new(RecordingVenue::new().unreachable(true));
    let h = Harness::builder().venue(venue.clone()).build();

    let outcome = h.agent.set_kill_switch(false).await.unwrap();
    assert!(matches!(outcome.propagation, Propagation::Failed { .. }));
    assert!(!h.agent.get_config().await.unwrap().trading_enabled);

    let health = h.agent.health().await.unwrap();
    assert_eq!(health.status, HealthStatus::Degraded);
    assert!(health
        .messages
        .iter()
        .any(|m| m.contains("propagation failed")));

    match h.agent.propose_trade("EURUSD", Timeframe::H1).await.unwrap() {
        ProposalOutcome::Proposed { safety, .. } => {
            assert!(!safety.allowed);
            assert_eq!(safety.reasons[0], "kill switch engaged");
        }
        other => panic!("expected a logged proposal, got {other:?}"),
    }
}

#[tokio::test]
async fn reachable_venue_follows_the_switch() {
    let venue = Arc::new(RecordingVenue::new());
    let h = Harness::builder().venue(venue.clone()).build();

    let outcome = h.agent.set_kill_switch(false).await.unwrap();
    assert_eq!(outcome.propagation, Propagation::Confirmed);
    assert!(venue.is_halted());

    let outcome = h.agent.set_kill_switch(true).await.unwrap();
    assert_eq!(outcome.propagation, Propagation::Confirmed);
    assert!(!venue.is_halted());
    assert_eq!(h.agent.health().await.unwrap().status, HealthStatus::Healthy);
}

#[tokio::test]
async fn venue_halt_denies_even_when_enabled_locally() {
    let venue = Arc::new(RecordingVenue::new());
    venue.halt_trading().await.unwrap();
    let h = Harness::builder().venue(venue.clone()).build();

    match h.agent.propose_trade("EURUSD", Timeframe::H1).await.unwrap() {
        ProposalOutcome::Proposed { safety, .. } => {
            assert!(!safety.allowed);
            assert_eq!(
                safety.reasons,
                vec!["execution venue reports trading halted".to_string()]
            );
        }
        other => panic!("expected a logged proposal, got {other:?}"),
    }

    let health = h.agent.health().await.unwrap();
    assert_eq!(health.status, HealthStatus::Degraded);
    assert!(health.messages[0].contains("mismatch"));
}

#[tokio::test]
async fn set_config_propagates_only_when_the_switch_changes() {
    let venue = Arc::new(RecordingVenue::new());
    let h = Harness::builder().venue(venue.clone()).build();

    let update = h
        .agent
        .set_config(ConfigPatch {
            allow_overnight: Some(true),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(update.config.allow_overnight);
    assert!(update.propagation.is_none());
    assert_eq!(venue.calls(), 0);

    let update = h
        .agent
        .set_config(ConfigPatch {
            max_open_positions: Some(3),
            trading_enabled: Some(false),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(update.config.max_open_positions, 3);
    assert!(!update.config.trading_enabled);
    assert_eq!(update.propagation, Some(Propagation::Confirmed));
    assert!(venue.is_halted());
}

#[tokio::test]
async fn gated_mode_skips_the_venue() {
    let venue = Arc::new(RecordingVenue::new().unreachable(true));
    let h = Harness::builder()
        .config(AgentConfig {
            mode: AgentMode::Learn,
            ..paper_config()
        })
        .venue(venue.clone())
        .build();

    let outcome = h.agent.set_kill_switch(false).await.unwrap();
    assert_eq!(outcome.propagation, Propagation::NotRequired);
    assert_eq!(venue.calls(), 0);
    assert_eq!(h.agent.health().await.unwrap().status, HealthStatus::Healthy);
}

#[tokio::test]
async fn config_patch_with_kill_switch_is_one_write() {
    let venue = Arc::new(RecordingVenue::new());
    let h = Harness::builder()
        .venue(venue.clone())
        .config_writes(1)
        .build();
    let writes = h.config_store.clone().unwrap();

    let update = h
        .agent
        .set_config(ConfigPatch {
            mode: Some(AgentMode::LiveAssisted),
            trading_enabled: Some(false),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(writes.upserts(), 1);
    assert_eq!(update.config.mode, AgentMode::LiveAssisted);
    assert!(!update.config.trading_enabled);
    assert_eq!(update.propagation, Some(Propagation::Confirmed));
    assert!(venue.is_halted());
}

#[tokio::test]
async fn failed_config_write_changes_nothing() {
    let h = Harness::builder().config_writes(0).build();

    let err = h
        .agent
        .set_config(ConfigPatch {
            mode: Some(AgentMode::LiveAssisted),
            trading_enabled: Some(false),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));

    let stored = h.agent.get_config().await.unwrap();
    assert_eq!(stored, paper_config());
}

#[tokio::test]
async fn entering_an_executing_mode_pushes_the_switch() {
    let venue = Arc::new(RecordingVenue::new());
    let h = Harness::builder()
        .config(AgentConfig {
            mode: AgentMode::Learn,
            ..paper_config()
        })
        .venue(venue.clone())
        .build();

    let outcome = h.agent.set_kill_switch(false).await.unwrap();
    assert_eq!(outcome.propagation, Propagation::NotRequired);
    assert!(!venue.is_halted());

    let update = h.agent.set_mode(AgentMode::Paper).await.unwrap();
    assert_eq!(update.propagation, Some(Propagation::Confirmed));
    assert!(venue.is_halted());
    assert_eq!(h.agent.health().await.unwrap().status, HealthStatus::Healthy);

    let calls = venue.calls();
    let update = h.agent.set_mode(AgentMode::Paper).await.unwrap();
    assert_eq!(update.propagation, None);
    assert_eq!(venue.calls(), calls);
}
