use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Operating mode of the agent. Drives the capability table in [`crate::mode`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    #[default]
    Off,
    Learn,
    Paper,
    LiveAssisted,
}

impl AgentMode {
    pub const ALL: [AgentMode; 4] = [
        AgentMode::Off,
        AgentMode::Learn,
        AgentMode::Paper,
        AgentMode::LiveAssisted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentMode::Off => "off",
            AgentMode::Learn => "learn",
            AgentMode::Paper => "paper",
            AgentMode::LiveAssisted => "live_assisted",
        }
    }
}

impl fmt::Display for AgentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(AgentMode::Off),
            "learn" => Ok(AgentMode::Learn),
            "paper" => Ok(AgentMode::Paper),
            "live_assisted" => Ok(AgentMode::LiveAssisted),
            other => Err(format!(
                "invalid mode '{other}', expected one of: off, learn, paper, live_assisted"
            )),
        }
    }
}

/// How much the psychology layer lets sizing stretch or shrink.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PsychologyMode {
    Aggressive,
    #[default]
    Normal,
    Cautious,
}

impl PsychologyMode {
    /// Multiplier applied to the per-trade risk budget when sizing a proposal.
    pub fn size_multiplier(&self) -> Decimal {
        match self {
            PsychologyMode::Aggressive => dec!(1.1),
            PsychologyMode::Normal => Decimal::ONE,
            PsychologyMode::Cautious => dec!(0.8),
        }
    }
}

impl FromStr for PsychologyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aggressive" => Ok(PsychologyMode::Aggressive),
            "normal" => Ok(PsychologyMode::Normal),
            "cautious" => Ok(PsychologyMode::Cautious),
            other => Err(format!(
                "invalid psychology mode '{other}', expected one of: aggressive, normal, cautious"
            )),
        }
    }
}

/// Persisted agent configuration. One logical row, replaced as a whole on every update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub mode: AgentMode,
    pub max_risk_per_trade: Decimal,
    pub daily_loss_limit: Decimal,
    /// Empty means every symbol is allowed.
    pub allowed_symbols: BTreeSet<String>,
    pub psychology_mode: PsychologyMode,
    pub allow_overnight: bool,
    pub max_open_positions: u32,
    /// Kill switch. `false` blocks every proposal.
    pub trading_enabled: bool,
    pub updated_at: DateTime<Utc>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            mode: AgentMode::Off,
            max_risk_per_trade: dec!(500),
            daily_loss_limit: dec!(2000),
            allowed_symbols: BTreeSet::new(),
            psychology_mode: PsychologyMode::Normal,
            allow_overnight: false,
            max_open_positions: 5,
            trading_enabled: false,
            updated_at: DateTime::<Utc>::default(),
        }
    }
}

impl AgentConfig {
    pub fn symbol_allowed(&self, symbol: &str) -> bool {
        self.allowed_symbols.is_empty() || self.allowed_symbols.contains(symbol)
    }

    /// Merge a patch over this config, producing the next full row.
    pub fn merged(&self, patch: &ConfigPatch, now: DateTime<Utc>) -> AgentConfig {
        AgentConfig {
            mode: patch.mode.unwrap_or(self.mode),
            max_risk_per_trade: patch.max_risk_per_trade.unwrap_or(self.max_risk_per_trade),
            daily_loss_limit: patch.daily_loss_limit.unwrap_or(self.daily_loss_limit),
            allowed_symbols: patch
                .allowed_symbols
                .clone()
                .unwrap_or_else(|| self.allowed_symbols.clone()),
            psychology_mode: patch.psychology_mode.unwrap_or(self.psychology_mode),
            allow_overnight: patch.allow_overnight.unwrap_or(self.allow_overnight),
            max_open_positions: patch.max_open_positions.unwrap_or(self.max_open_positions),
            trading_enabled: patch.trading_enabled.unwrap_or(self.trading_enabled),
            updated_at: now,
        }
    }
}

/// Partial update for [`AgentConfig`]. `None` keeps the stored value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<AgentMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_risk_per_trade: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_loss_limit: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_symbols: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub psychology_mode: Option<PsychologyMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_overnight: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_open_positions: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trading_enabled: Option<bool>,
}

impl ConfigPatch {
    pub fn mode(mode: AgentMode) -> Self {
        Self {
            mode: Some(mode),
            ..Default::default()
        }
    }

    pub fn trading_enabled(enabled: bool) -> Self {
        Self {
            trading_enabled: Some(enabled),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == ConfigPatch::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_engages_kill_switch() {
        let config = AgentConfig::default();
        assert_eq!(config.mode, AgentMode::Off);
        assert!(!config.trading_enabled);
        assert_eq!(config.max_risk_per_trade, dec!(500));
        assert_eq!(config.daily_loss_limit, dec!(2000));
        assert_eq!(config.max_open_positions, 5);
    }

    #[test]
    fn merge_keeps_unpatched_fields() {
        let mut base = AgentConfig::default();
        base.allowed_symbols.insert("EURUSD".to_string());
        base.trading_enabled = true;

        let patch = ConfigPatch {
            max_risk_per_trade: Some(dec!(250)),
            ..Default::default()
        };
        let now = Utc::now();
        let merged = base.merged(&patch, now);

        assert_eq!(merged.max_risk_per_trade, dec!(250));
        assert!(merged.trading_enabled);
        assert!(merged.allowed_symbols.contains("EURUSD"));
        assert_eq!(merged.updated_at, now);
    }

    #[test]
    fn empty_allowlist_allows_everything() {
        let config = AgentConfig::default();
        assert!(config.symbol_allowed("ANYTHING"));

        let mut restricted = config.clone();
        restricted.allowed_symbols.insert("EURUSD".to_string());
        assert!(restricted.symbol_allowed("EURUSD"));
        assert!(!restricted.symbol_allowed("GBPUSD"));
    }

    #[test]
    fn mode_parse_and_display() {
        for mode in AgentMode::ALL {
            assert_eq!(mode.to_string().parse::<AgentMode>().unwrap(), mode);
        }
        assert!("live".parse::<AgentMode>().is_err());
        assert_eq!(
            serde_json::to_string(&AgentMode::LiveAssisted).unwrap(),
            "\"live_assisted\""
        );
    }

    #[test]
    fn patch_skips_absent_fields() {
        let patch = ConfigPatch::trading_enabled(false);
        let json = serde_json::to_string(&patch).unwrap();
        assert_eq!(json, r#"{"trading_enabled":false}"#);
        assert!(ConfigPatch::default().is_empty());
    }
}
