use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent_config::AgentMode;
use crate::brain::Direction;
use crate::world_state::Timeframe;

/// A sized proposal that has not been written to the ledger yet.
///
/// Never handed to callers. [`DraftProposal::into_proposal`] is only reached
/// through the ledger, which supplies the id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DraftProposal {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub direction: Direction,
    pub size: Decimal,
    /// Worst-case loss if the stop is hit.
    pub risk_amount: Decimal,
    pub entry: Option<Decimal>,
    pub stop: Option<Decimal>,
    pub target: Option<Decimal>,
    pub confidence: Decimal,
    pub generated_at: DateTime<Utc>,
    pub mode: AgentMode,
    /// Reduces or closes an existing position in this symbol.
    pub closes_position: bool,
    /// Expected hold extends past the session close.
    pub holds_overnight: bool,
}

impl DraftProposal {
    pub fn into_proposal(self, id: Uuid) -> TradeProposal {
        TradeProposal {
            id,
            symbol: self.symbol,
            timeframe: self.timeframe,
            direction: self.direction,
            size: self.size,
            risk_amount: self.risk_amount,
            entry: self.entry,
            stop: self.stop,
            target: self.target,
            confidence: self.confidence,
            generated_at: self.generated_at,
            mode: self.mode,
            closes_position: self.closes_position,
            holds_overnight: self.holds_overnight,
        }
    }
}

/// A proposal with a ledger id. Every instance has exactly one decision record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeProposal {
    pub id: Uuid,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub direction: Direction,
    pub size: Decimal,
    pub risk_amount: Decimal,
    pub entry: Option<Decimal>,
    pub stop: Option<Decimal>,
    pub target: Option<Decimal>,
    pub confidence: Decimal,
    pub generated_at: DateTime<Utc>,
    pub mode: AgentMode,
    pub closes_position: bool,
    pub holds_overnight: bool,
}
