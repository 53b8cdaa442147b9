//! The brain set: independent scoring modules over one world state.
//!
//! Brains never see each other's output and keep no state between calls.

pub mod market;
pub mod psychology;
pub mod risk;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tradegate_models::brain::{AgentContext, BrainId, BrainOutput};
use tradegate_models::config::BrainConfig;
use tradegate_models::world_state::WorldState;

use crate::error::{BrainError, EngineError};

pub use market::MarketBrain;
pub use psychology::PsychologyBrain;
pub use risk::RiskBrain;

/// A scoring module. Mockable for testing.
#[async_trait]
pub trait Brain: Send + Sync {
    fn id(&self) -> BrainId;

    async fn evaluate(
        &self,
        state: &WorldState,
        context: &AgentContext,
    ) -> Result<BrainOutput, BrainError>;
}

#[derive(Clone)]
pub struct RegisteredBrain {
    pub id: BrainId,
    pub weight: Decimal,
    pub brain: Arc<dyn Brain>,
}

/// Brains registered with explicit weights, at most one per [`BrainId`].
#[derive(Clone, Default)]
pub struct BrainSet {
    brains: Vec<RegisteredBrain>,
}

impl BrainSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `brain` under its own id. Re-registering an id replaces it.
    pub fn register(mut self, brain: Arc<dyn Brain>, weight: Decimal) -> Result<Self, EngineError> {
        if weight <= Decimal::ZERO {
            return Err(EngineError::InvalidRequest(format!(
                "brain {} weight must be positive, got {weight}",
                brain.id()
            )));
        }
        let id = brain.id();
        self.brains.retain(|b| b.id != id);
        self.brains.push(RegisteredBrain { id, weight, brain });
        self.brains.sort_by_key(|b| b.id);
        Ok(self)
    }

    /// The reference Market, Risk and Psychology brains for every enabled entry.
    pub fn reference(configs: &[BrainConfig]) -> Result<Self, EngineError> {
        configs
            .iter()
            .filter(|c| c.enabled)
            .try_fold(BrainSet::new(), |set, c| {
                let brain: Arc<dyn Brain> = match c.id {
                    BrainId::Market => Arc::new(MarketBrain),
                    BrainId::Risk => Arc::new(RiskBrain),
                    BrainId::Psychology => Arc::new(PsychologyBrain),
                };
                set.register(brain, c.weight)
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredBrain> {
        self.brains.iter()
    }

    pub fn len(&self) -> usize {
        self.brains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.brains.is_empty()
    }

    pub fn weights(&self) -> BTreeMap<BrainId, Decimal> {
        self.brains.iter().map(|b| (b.id, b.weight)).collect()
    }
}

/// Evidence helper: decimals go in as strings so they round-trip exactly.
pub(crate) fn decimal_evidence(value: Decimal) -> serde_json::Value {
    serde_json::Value::String(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn reference_set_skips_disabled_brains() {
        let configs = vec![
            BrainConfig {
                id: BrainId::Market,
                weight: dec!(2),
                enabled: true,
            },
            BrainConfig {
                id: BrainId::Risk,
                weight: dec!(1),
                enabled: false,
            },
            BrainConfig {
                id: BrainId::Psychology,
                weight: dec!(0.5),
                enabled: true,
            },
        ];
        let set = BrainSet::reference(&configs).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(
            set.weights(),
            BTreeMap::from([(BrainId::Market, dec!(2)), (BrainId::Psychology, dec!(0.5))])
        );
    }

    #[test]
    fn non_positive_weight_is_rejected() {
        let err = BrainSet::new()
            .register(Arc::new(MarketBrain), Decimal::ZERO)
            .err()
            .unwrap();
        assert!(err.to_string().contains("weight must be positive"));
    }

    #[test]
    fn re_registering_replaces() {
        let set = BrainSet::new()
            .register(Arc::new(RiskBrain), dec!(1))
            .unwrap()
            .register(Arc::new(RiskBrain), dec!(3))
            .unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.weights()[&BrainId::Risk], dec!(3));
    }
}
