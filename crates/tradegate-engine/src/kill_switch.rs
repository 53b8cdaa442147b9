//! Kill switch: the persisted `trading_enabled` flag plus best-effort
//! propagation to the execution venue.
//!
//! The persisted flag is authoritative. Propagation failures never undo it;
//! they show up in the call's outcome and as degraded health until a later
//! propagation succeeds.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tradegate_models::agent_config::{AgentConfig, AgentMode, ConfigPatch};
use tradegate_models::mode::{execution_type, ExecutionType};
use tradegate_store::ConfigStore;

use crate::error::{EngineError, VenueError};
use crate::retry::{with_retry, RetryPolicy};

/// Where approved orders would go. Only consulted when the mode executes.
#[async_trait]
pub trait ExecutionVenue: Send + Sync {
    async fn halt_trading(&self) -> Result<(), VenueError>;

    async fn resume_trading(&self) -> Result<(), VenueError>;

    async fn trading_halted(&self) -> Result<bool, VenueError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Propagation {
    /// No venue is wired in.
    NotConfigured,
    /// The current mode never reaches the venue.
    NotRequired,
    Confirmed,
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KillSwitchOutcome {
    pub config: AgentConfig,
    pub propagation: Propagation,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub mode: AgentMode,
    pub trading_enabled: bool,
    pub messages: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

pub struct KillSwitch {
    config_store: Arc<dyn ConfigStore>,
    venue: Option<Arc<dyn ExecutionVenue>>,
    policy: RetryPolicy,
    propagation_failure: Mutex<Option<String>>,
}

impl KillSwitch {
    pub fn new(
        config_store: Arc<dyn ConfigStore>,
        venue: Option<Arc<dyn ExecutionVenue>>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            config_store,
            venue,
            policy,
            propagation_failure: Mutex::new(None),
        }
    }

    /// Persist `trading_enabled`, then push it to the venue.
    pub async fn set(&self, trading_enabled: bool) -> Result<KillSwitchOutcome, EngineError> {
        let patch = ConfigPatch::trading_enabled(trading_enabled);
        let config = with_retry("upsert_config", &self.policy, || {
            self.config_store.upsert_config(&patch)
        })
        .await
        .map_err(|e| EngineError::Config(e.to_string()))?;

        info!(trading_enabled, mode = %config.mode, "Kill switch persisted");
        let propagation = self.propagate(&config).await;
        Ok(KillSwitchOutcome {
            config,
            propagation,
        })
    }

    /// Bring the venue in line with `config.trading_enabled`.
    pub async fn propagate(&self, config: &AgentConfig) -> Propagation {
        let Some(venue) = self.venue_for(config.mode) else {
            return if self.venue.is_none() {
                Propagation::NotConfigured
            } else {
                Propagation::NotRequired
            };
        };

        let result = if config.trading_enabled {
            with_retry("resume_trading", &self.policy, || venue.resume_trading()).await
        } else {
            with_retry("halt_trading", &self.policy, || venue.halt_trading()).await
        };

        match result {
            Ok(()) => {
                self.record_failure(None);
                info!(trading_enabled = config.trading_enabled, "Kill switch propagated to venue");
                Propagation::Confirmed
            }
            Err(e) => {
                let error = e.to_string();
                warn!(
                    trading_enabled = config.trading_enabled,
                    error = %error,
                    "Kill switch propagation failed"
                );
                self.record_failure(Some(format!("kill switch propagation failed: {error}")));
                Propagation::Failed { error }
            }
        }
    }

    /// The venue's halt flag, when a venue applies to `mode` and answers.
    pub async fn venue_halted(&self, mode: AgentMode) -> Option<bool> {
        let venue = self.venue_for(mode)?;
        match with_retry("trading_halted", &self.policy, || venue.trading_halted()).await {
            Ok(halted) => Some(halted),
            Err(e) => {
                warn!(error = %e, "Venue halt status unavailable");
                None
            }
        }
    }

    pub async fn health(&self, config: &AgentConfig) -> HealthReport {
        let mut messages: Vec<String> = self.last_failure().into_iter().collect();

        if let Some(venue) = self.venue_for(config.mode) {
            match with_retry("trading_halted", &self.policy, || venue.trading_halted()).await {
                Ok(halted) if halted == config.trading_enabled => messages.push(format!(
                    "kill switch mismatch: trading_enabled is {} but venue halted is {halted}",
                    config.trading_enabled
                )),
                Ok(_) => {}
                Err(e) => messages.push(format!("venue unreachable: {e}")),
            }
        }

        let status = if messages.is_empty() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        HealthReport {
            status,
            mode: config.mode,
            trading_enabled: config.trading_enabled,
            messages,
            checked_at: Utc::now(),
        }
    }

    fn venue_for(&self, mode: AgentMode) -> Option<&Arc<dyn ExecutionVenue>> {
        match execution_type(mode) {
            ExecutionType::None => None,
            ExecutionType::Simulated | ExecutionType::Live => self.venue.as_ref(),
        }
    }

    fn record_failure(&self, failure: Option<String>) {
        let mut slot = self
            .propagation_failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = failure;
    }

    fn last_failure(&self) -> Option<String> {
        self.propagation_failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
