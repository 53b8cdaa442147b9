use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use tradegate_engine::{MarketDataProvider, MemoryProvider, ProviderError};
use tradegate_models::agent_config::AgentMode;
use tradegate_models::snapshot::key_patterns;
use tradegate_models::world_state::{AgentMemory, Timeframe, WorldStateInputs};
use tradegate_store::{SnapshotReader, StoreError};

/// World state inputs read from the shared snapshot table.
///
/// Market and account rows are required. A symbol with no journal yet gets
/// empty memory.
pub struct SnapshotSources {
    reader: Arc<SnapshotReader>,
}

impl SnapshotSources {
    pub fn new(reader: Arc<SnapshotReader>) -> Self {
        Self { reader }
    }
}

fn provider_error(e: StoreError) -> ProviderError {
    if e.is_transient() {
        ProviderError::Transient(e.to_string())
    } else {
        ProviderError::Unavailable(e.to_string())
    }
}

#[async_trait]
impl MarketDataProvider for SnapshotSources {
    async fn world_state_inputs(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<WorldStateInputs, ProviderError> {
        let market = self
            .reader
            .market(symbol, timeframe)
            .await
            .map_err(provider_error)?
            .ok_or_else(|| {
                ProviderError::Unavailable(format!(
                    "no fresh market snapshot for {symbol} {timeframe}"
                ))
            })?;
        let account = self
            .reader
            .account(key_patterns::PRIMARY_ACCOUNT)
            .map_err(provider_error)?
            .ok_or_else(|| {
                ProviderError::Unavailable(format!(
                    "no fresh account snapshot for {}",
                    key_patterns::PRIMARY_ACCOUNT
                ))
            })?;
        Ok(WorldStateInputs { market, account })
    }
}

#[async_trait]
impl MemoryProvider for SnapshotSources {
    async fn agent_memory(
        &self,
        symbol: &str,
        _timeframe: Timeframe,
        _mode: AgentMode,
    ) -> Result<AgentMemory, ProviderError> {
        match self.reader.memory(symbol).await.map_err(provider_error)? {
            Some(memory) => Ok(memory),
            None => {
                debug!(symbol, "No memory snapshot, starting empty");
                Ok(AgentMemory::default())
            }
        }
    }
}
