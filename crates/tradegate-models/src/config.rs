use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::brain::BrainId;

/// Static process configuration, loaded from TOML at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GateConfig {
    pub store: StoreConfig,
    pub pipeline: PipelineConfig,
    pub coordinator: CoordinatorConfig,
    pub safety: SafetyConfig,
    pub sizing: SizingConfig,
    pub brains: Vec<BrainConfig>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            pipeline: PipelineConfig::default(),
            coordinator: CoordinatorConfig::default(),
            safety: SafetyConfig::default(),
            sizing: SizingConfig::default(),
            brains: default_brains(),
        }
    }
}

/// Where the ledger, config row and market snapshots live.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite file holding `decisions` and `agent_config`.
    pub ledger_path: String,
    /// Shared SQLite cache written by the data pipeline.
    pub snapshot_path: String,
    pub memory_max_capacity: u64,
    pub memory_ttl_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ledger_path: "data/tradegate.db".to_string(),
            snapshot_path: "data/tradegate_cache.db".to_string(),
            memory_max_capacity: 10_000,
            memory_ttl_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Shared deadline for the whole brain fan-out.
    pub brain_deadline_ms: u64,
    /// Timeout for each market, account or memory fetch attempt.
    pub provider_timeout_ms: u64,
    /// Timeout for each config or ledger store call attempt.
    pub store_timeout_ms: u64,
    /// Base delay before the single retry. Jitter of ±25% is applied.
    pub retry_base_delay_ms: u64,
    pub max_concurrent_brains: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            brain_deadline_ms: 2_000,
            provider_timeout_ms: 3_000,
            store_timeout_ms: 2_000,
            retry_base_delay_ms: 100,
            max_concurrent_brains: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Below this agreement the consensus is forced to FLAT.
    pub agreement_threshold: Decimal,
    /// Vote masses closer than this count as a tie.
    pub tie_epsilon: Decimal,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            agreement_threshold: dec!(0.5),
            tie_epsilon: dec!(0.01),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SafetyConfig {
    pub event_lookahead_minutes: i64,
    /// Volatility percentage at or above which an imminent event denies.
    pub elevated_volatility_pct: Decimal,
    /// Risk above this fraction of `max_risk_per_trade` raises a flag.
    pub risk_flag_ratio: Decimal,
    /// Projected daily loss above this fraction of the limit raises a flag.
    pub daily_loss_flag_ratio: Decimal,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            event_lookahead_minutes: 30,
            elevated_volatility_pct: dec!(2.0),
            risk_flag_ratio: dec!(0.8),
            daily_loss_flag_ratio: dec!(0.8),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SizingConfig {
    /// Stop distance as a multiple of the volatility range.
    pub stop_multiplier: Decimal,
    /// Expected holding period in bars of the request timeframe.
    pub hold_bars: i64,
    /// Target distance as a multiple of the stop distance.
    pub target_multiple: Decimal,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            stop_multiplier: dec!(1.5),
            hold_bars: 4,
            target_multiple: dec!(2),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrainConfig {
    pub id: BrainId,
    pub weight: Decimal,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_brains() -> Vec<BrainConfig> {
    BrainId::ALL
        .into_iter()
        .map(|id| BrainConfig {
            id,
            weight: Decimal::ONE,
            enabled: true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_brain_set_has_equal_weights() {
        let config = GateConfig::default();
        assert_eq!(config.brains.len(), 3);
        assert!(config.brains.iter().all(|b| b.weight == Decimal::ONE && b.enabled));
    }

    #[test]
    fn config_from_toml() {
        let toml_str = r#"
[store]
ledger_path = "/tmp/ledger.db"

[coordinator]
agreement_threshold = "0.6"

[safety]
event_lookahead_minutes = 45

[[brains]]
id = "market"
weight = "2"

[[brains]]
id = "psychology"
weight = "0.5"
enabled = false
"#;
        let config: GateConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.store.ledger_path, "/tmp/ledger.db");
        assert_eq!(config.store.memory_ttl_seconds, 60);
        assert_eq!(config.coordinator.agreement_threshold, dec!(0.6));
        assert_eq!(config.coordinator.tie_epsilon, dec!(0.01));
        assert_eq!(config.safety.event_lookahead_minutes, 45);
        assert_eq!(config.brains.len(), 2);
        assert_eq!(config.brains[0].weight, dec!(2));
        assert!(!config.brains[1].enabled);
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config: GateConfig = toml::from_str("").unwrap();
        assert_eq!(config.pipeline, PipelineConfig::default());
        assert_eq!(config.brains.len(), 3);
    }
}
