use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::agent_config::{AgentConfig, AgentMode};

/// The closed set of scoring modules.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum BrainId {
    Market,
    Risk,
    Psychology,
}

impl BrainId {
    pub const ALL: [BrainId; 3] = [BrainId::Market, BrainId::Risk, BrainId::Psychology];

    pub fn as_str(&self) -> &'static str {
        match self {
            BrainId::Market => "market",
            BrainId::Risk => "risk",
            BrainId::Psychology => "psychology",
        }
    }
}

impl fmt::Display for BrainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BrainId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "market" => Ok(BrainId::Market),
            "risk" => Ok(BrainId::Risk),
            "psychology" => Ok(BrainId::Psychology),
            other => Err(format!("unknown brain '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
    Flat,
}

impl Direction {
    pub fn is_actionable(&self) -> bool {
        !matches!(self, Direction::Flat)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Buy => "BUY",
            Direction::Sell => "SELL",
            Direction::Flat => "FLAT",
        })
    }
}

/// One brain's opinion on a world state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrainOutput {
    pub brain_id: BrainId,
    pub direction: Direction,
    /// 0.0 to 1.0.
    pub confidence: Decimal,
    pub rationale: String,
    #[serde(default)]
    pub evidence: BTreeMap<String, serde_json::Value>,
}

impl BrainOutput {
    /// Zero-confidence FLAT opinion used when a brain fails, panics or times out.
    pub fn abstain(brain_id: BrainId, reason: impl Into<String>) -> Self {
        Self {
            brain_id,
            direction: Direction::Flat,
            confidence: Decimal::ZERO,
            rationale: reason.into(),
            evidence: BTreeMap::from([("abstained".to_string(), serde_json::Value::Bool(true))]),
        }
    }

    pub fn is_abstention(&self) -> bool {
        self.evidence
            .get("abstained")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// Weighted vote mass per direction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct VoteTally {
    pub buy: Decimal,
    pub sell: Decimal,
    pub flat: Decimal,
}

impl VoteTally {
    pub fn add(&mut self, direction: Direction, mass: Decimal) {
        match direction {
            Direction::Buy => self.buy += mass,
            Direction::Sell => self.sell += mass,
            Direction::Flat => self.flat += mass,
        }
    }

    pub fn get(&self, direction: Direction) -> Decimal {
        match direction {
            Direction::Buy => self.buy,
            Direction::Sell => self.sell,
            Direction::Flat => self.flat,
        }
    }

    pub fn total(&self) -> Decimal {
        self.buy + self.sell + self.flat
    }
}

/// Consensus over the brain set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoordinatorOutput {
    pub brains: Vec<BrainOutput>,
    pub consensus_direction: Direction,
    pub consensus_confidence: Decimal,
    /// Fraction of configured weight that voted for the raw winner.
    pub agreement_score: Decimal,
    /// Direction with the most vote mass before the agreement override.
    pub raw_winner: Direction,
    pub votes: VoteTally,
}

/// What a brain may know about the caller besides the world state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentContext {
    pub mode: AgentMode,
    pub config: AgentConfig,
}
