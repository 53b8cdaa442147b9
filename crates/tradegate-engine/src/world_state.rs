use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::debug;
use tradegate_models::agent_config::AgentMode;
use tradegate_models::world_state::{AgentMemory, Timeframe, WorldState, WorldStateInputs};

use crate::error::{EngineError, ProviderError};
use crate::retry::{with_retry, RetryPolicy};

/// Source of market and account context for one request.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn world_state_inputs(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<WorldStateInputs, ProviderError>;
}

/// Source of lessons, rules, journaled trades and psychology signals.
#[async_trait]
pub trait MemoryProvider: Send + Sync {
    async fn agent_memory(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        mode: AgentMode,
    ) -> Result<AgentMemory, ProviderError>;
}

/// Assembles a fresh [`WorldState`] per request. Never substitutes a neutral snapshot.
pub struct WorldStateBuilder {
    market: Arc<dyn MarketDataProvider>,
    memory: Arc<dyn MemoryProvider>,
    policy: RetryPolicy,
}

impl WorldStateBuilder {
    pub fn new(
        market: Arc<dyn MarketDataProvider>,
        memory: Arc<dyn MemoryProvider>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            market,
            memory,
            policy,
        }
    }

    pub async fn fetch_memory(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        mode: AgentMode,
    ) -> Result<AgentMemory, EngineError> {
        with_retry("agent_memory", &self.policy, || {
            self.memory.agent_memory(symbol, timeframe, mode)
        })
        .await
        .map_err(|e| EngineError::DataUnavailable {
            symbol: symbol.to_string(),
            reason: format!("agent memory: {e}"),
        })
    }

    pub async fn build(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        memory: AgentMemory,
    ) -> Result<WorldState, EngineError> {
        let inputs = with_retry("world_state_inputs", &self.policy, || {
            self.market.world_state_inputs(symbol, timeframe)
        })
        .await
        .map_err(|e| EngineError::DataUnavailable {
            symbol: symbol.to_string(),
            reason: format!("market data: {e}"),
        })?;

        validate(symbol, &inputs)?;
        debug!(symbol, price = %inputs.market.price, "World state inputs fetched");

        Ok(WorldState {
            symbol: symbol.to_string(),
            timeframe,
            built_at: Utc::now(),
            market: inputs.market,
            account: inputs.account,
            memory,
        })
    }
}

fn validate(symbol: &str, inputs: &WorldStateInputs) -> Result<(), EngineError> {
    let invalid = |reason: String| EngineError::DataUnavailable {
        symbol: symbol.to_string(),
        reason,
    };
    if inputs.market.price <= Decimal::ZERO {
        return Err(invalid(format!(
            "non-positive price {}",
            inputs.market.price
        )));
    }
    if inputs.market.volatility_pct.is_sign_negative() {
        return Err(invalid(format!(
            "negative volatility {}",
            inputs.market.volatility_pct
        )));
    }
    Ok(())
}
