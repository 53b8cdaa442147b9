use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use tradegate_models::agent_config::{AgentConfig, AgentMode, ConfigPatch};
use tradegate_models::config::GateConfig;
use tradegate_models::decision::{
    DecisionFilter, DecisionRecord, DecisionResult, ExecutionPermit, UserAction,
};
use tradegate_models::mode::{can_approve_in_mode, can_execute_in_mode, execution_type};
use tradegate_models::world_state::Timeframe;
use tradegate_store::{ConfigStore, LedgerStore};
use uuid::Uuid;

use crate::brains::BrainSet;
use crate::coordinator::Coordinator;
use crate::error::EngineError;
use crate::kill_switch::{ExecutionVenue, HealthReport, KillSwitch, KillSwitchOutcome, Propagation};
use crate::ledger::AuditLedger;
use crate::pipeline::{PipelineParts, ProposalOutcome, ProposalPipeline};
use crate::retry::{with_retry, RetryPolicy};
use crate::safety::{SafetyEvaluator, KILL_SWITCH_REASON, VENUE_HALTED_REASON};
use crate::sizing::ProposalSizer;
use crate::world_state::{MarketDataProvider, MemoryProvider, WorldStateBuilder};

/// External collaborators of a [`TradingAgent`].
pub struct AgentParts {
    pub config_store: Arc<dyn ConfigStore>,
    pub ledger_store: Arc<dyn LedgerStore>,
    pub market: Arc<dyn MarketDataProvider>,
    pub memory: Arc<dyn MemoryProvider>,
    pub venue: Option<Arc<dyn ExecutionVenue>>,
    pub brains: BrainSet,
}

/// Result of a config update. `propagation` is set when the patch touched
/// the kill switch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigUpdate {
    pub config: AgentConfig,
    pub propagation: Option<Propagation>,
}

struct Inner {
    pipeline: ProposalPipeline,
    config_store: Arc<dyn ConfigStore>,
    ledger: Arc<AuditLedger>,
    kill_switch: Arc<KillSwitch>,
    store_policy: RetryPolicy,
}

/// The operations exposed to callers. Cheap to clone.
#[derive(Clone)]
pub struct TradingAgent {
    inner: Arc<Inner>,
}

impl TradingAgent {
    pub fn new(parts: AgentParts, config: &GateConfig) -> Result<Self, EngineError> {
        if parts.brains.is_empty() {
            return Err(EngineError::InvalidRequest(
                "at least one brain must be registered".to_string(),
            ));
        }

        let pipeline_cfg = &config.pipeline;
        let provider_policy =
            RetryPolicy::new(pipeline_cfg.provider_timeout_ms, pipeline_cfg.retry_base_delay_ms);
        let store_policy =
            RetryPolicy::new(pipeline_cfg.store_timeout_ms, pipeline_cfg.retry_base_delay_ms);

        let ledger = Arc::new(AuditLedger::new(parts.ledger_store, store_policy));
        let kill_switch = Arc::new(KillSwitch::new(
            Arc::clone(&parts.config_store),
            parts.venue,
            store_policy,
        ));

        let pipeline = ProposalPipeline::new(PipelineParts {
            config_store: Arc::clone(&parts.config_store),
            world: WorldStateBuilder::new(parts.market, parts.memory, provider_policy),
            brains: parts.brains,
            coordinator: Coordinator::new(config.coordinator.clone()),
            sizer: ProposalSizer::new(config.sizing.clone()),
            safety: SafetyEvaluator::new(config.safety.clone()),
            ledger: Arc::clone(&ledger),
            kill_switch: Arc::clone(&kill_switch),
            store_policy,
            brain_deadline: std::time::Duration::from_millis(pipeline_cfg.brain_deadline_ms),
            max_concurrent_brains: pipeline_cfg.max_concurrent_brains,
        });

        Ok(Self {
            inner: Arc::new(Inner {
                pipeline,
                config_store: parts.config_store,
                ledger,
                kill_switch,
                store_policy,
            }),
        })
    }

    /// Run the proposal pipeline for `symbol`.
    ///
    /// The run is detached from the caller: dropping the returned future
    /// does not stop it, and the ledger write still happens.
    pub async fn propose_trade(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<ProposalOutcome, EngineError> {
        let symbol = symbol.trim().to_string();
        if symbol.is_empty() {
            return Err(EngineError::InvalidRequest("symbol must not be empty".to_string()));
        }
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.pipeline.run(&symbol, timeframe).await })
            .await
            .map_err(|e| EngineError::Internal(format!("proposal task failed: {e}")))?
    }

    pub async fn get_config(&self) -> Result<AgentConfig, EngineError> {
        self.inner.pipeline.load_config().await
    }

    pub async fn get_mode(&self) -> Result<AgentMode, EngineError> {
        Ok(self.get_config().await?.mode)
    }

    pub async fn set_mode(&self, mode: AgentMode) -> Result<ConfigUpdate, EngineError> {
        let update = self.apply(ConfigPatch::mode(mode)).await?;
        info!(mode = %update.config.mode, "Mode changed");
        Ok(update)
    }

    /// Merge `patch` into the stored config in one write. Limits must stay positive.
    ///
    /// The venue is brought in line when the patch touches the kill switch or
    /// moves the mode to a different execution type.
    pub async fn set_config(&self, patch: ConfigPatch) -> Result<ConfigUpdate, EngineError> {
        validate_patch(&patch)?;
        self.apply(patch).await
    }

    /// Persist `trading_enabled` and propagate it to the venue.
    pub async fn set_kill_switch(
        &self,
        trading_enabled: bool,
    ) -> Result<KillSwitchOutcome, EngineError> {
        self.inner.kill_switch.set(trading_enabled).await
    }

    /// Record the human's answer to a logged proposal.
    ///
    /// Approving or modifying needs a mode that can approve. Rejecting is
    /// always accepted.
    pub async fn record_user_decision(
        &self,
        id: Uuid,
        action: UserAction,
        notes: Option<String>,
        result: Option<DecisionResult>,
    ) -> Result<DecisionRecord, EngineError> {
        if action == UserAction::Pending {
            return Err(EngineError::InvalidRequest(
                "user action must be approved, rejected or modified".to_string(),
            ));
        }
        if action.is_acceptance() {
            let mode = self.get_mode().await?;
            if !can_approve_in_mode(mode) {
                return Err(EngineError::ModeForbids {
                    mode,
                    action: "approve",
                });
            }
        }
        self.inner.ledger.log_decision(id, action, notes, result).await
    }

    pub async fn list_decisions(
        &self,
        filter: &DecisionFilter,
    ) -> Result<Vec<DecisionRecord>, EngineError> {
        self.inner.ledger.query(filter).await
    }

    pub async fn health(&self) -> Result<HealthReport, EngineError> {
        let config = self.get_config().await?;
        Ok(self.inner.kill_switch.health(&config).await)
    }

    /// Whether the logged decision `id` may be sent for execution now.
    ///
    /// Checked against the current config, not the one it was proposed under.
    pub async fn execution_permit(&self, id: Uuid) -> Result<ExecutionPermit, EngineError> {
        let record = self.inner.ledger.get(id).await?;
        let config = self.get_config().await?;
        let mut reasons = Vec::new();

        if !record.user_action.is_acceptance() {
            reasons.push(format!("decision is {}, not approved", record.user_action));
        }
        if !can_execute_in_mode(config.mode) {
            reasons.push(format!("mode {} does not allow execution", config.mode));
        } else if execution_type(record.mode) != execution_type(config.mode) {
            reasons.push(format!(
                "proposed under {}, current mode {} requires a fresh proposal and approval",
                record.mode, config.mode
            ));
        }
        if !config.trading_enabled {
            reasons.push(KILL_SWITCH_REASON.to_string());
        }
        if !record.proposed_order.direction.is_actionable() {
            reasons.push("FLAT proposal has nothing to execute".to_string());
        }
        if !record.safety.allowed {
            reasons.push("proposal was denied by safety checks".to_string());
        }
        if !config.symbol_allowed(&record.symbol) {
            reasons.push(format!(
                "symbol {} is not in the allowed symbols list",
                record.symbol
            ));
        }
        if self.inner.kill_switch.venue_halted(config.mode).await == Some(true) {
            reasons.push(VENUE_HALTED_REASON.to_string());
        }

        if reasons.is_empty() {
            Ok(ExecutionPermit::Granted {
                execution_type: execution_type(config.mode),
            })
        } else {
            info!(%id, reasons = reasons.len(), "Execution blocked");
            Ok(ExecutionPermit::Blocked { reasons })
        }
    }

    async fn apply(&self, patch: ConfigPatch) -> Result<ConfigUpdate, EngineError> {
        let previous_execution = match patch.mode {
            Some(_) => Some(execution_type(self.get_config().await?.mode)),
            None => None,
        };

        let store = &self.inner.config_store;
        let config = with_retry("upsert_config", &self.inner.store_policy, || {
            store.upsert_config(&patch)
        })
        .await
        .map_err(|e| EngineError::Config(e.to_string()))?;

        let execution_moved =
            previous_execution.is_some_and(|before| before != execution_type(config.mode));
        let propagation = if patch.trading_enabled.is_some() || execution_moved {
            if patch.trading_enabled.is_some() {
                info!(
                    trading_enabled = config.trading_enabled,
                    mode = %config.mode,
                    "Kill switch persisted"
                );
            }
            Some(self.inner.kill_switch.propagate(&config).await)
        } else {
            None
        };
        Ok(ConfigUpdate {
            config,
            propagation,
        })
    }
}

fn validate_patch(patch: &ConfigPatch) -> Result<(), EngineError> {
    let positive = |name: &str, value: Option<Decimal>| match value {
        Some(v) if v <= Decimal::ZERO => Err(EngineError::InvalidRequest(format!(
            "{name} must be positive, got {v}"
        ))),
        _ => Ok(()),
    };
    positive("max_risk_per_trade", patch.max_risk_per_trade)?;
    positive("daily_loss_limit", patch.daily_loss_limit)?;
    if patch
        .allowed_symbols
        .as_ref()
        .is_some_and(|symbols| symbols.iter().any(|s| s.trim().is_empty()))
    {
        return Err(EngineError::InvalidRequest(
            "allowed symbols must not be blank".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn non_positive_limits_are_rejected() {
        let patch = ConfigPatch {
            max_risk_per_trade: Some(dec!(0)),
            ..Default::default()
        };
        assert!(validate_patch(&patch).is_err());
        let patch = ConfigPatch {
            daily_loss_limit: Some(dec!(-5)),
            ..Default::default()
        };
        assert!(validate_patch(&patch).is_err());
        let patch = ConfigPatch {
            max_risk_per_trade: Some(dec!(250)),
            ..Default::default()
        };
        assert!(validate_patch(&patch).is_ok());
    }
}
