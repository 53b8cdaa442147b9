use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent_config::AgentMode;
use crate::brain::{BrainOutput, CoordinatorOutput};
use crate::mode::ExecutionType;
use crate::proposal::TradeProposal;
use crate::safety::SafetyResult;
use crate::world_state::{TradeOutcome, WorldState};

pub const DEFAULT_DECISION_LIMIT: usize = 50;

/// What the human did with a proposal. `Pending` until they act.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UserAction {
    Approved,
    Rejected,
    Modified,
    Pending,
}

impl UserAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserAction::Approved => "approved",
            UserAction::Rejected => "rejected",
            UserAction::Modified => "modified",
            UserAction::Pending => "pending",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, UserAction::Pending)
    }

    /// Approved or modified: the human wants the trade to happen.
    pub fn is_acceptance(&self) -> bool {
        matches!(self, UserAction::Approved | UserAction::Modified)
    }
}

impl fmt::Display for UserAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(UserAction::Approved),
            "rejected" => Ok(UserAction::Rejected),
            "modified" => Ok(UserAction::Modified),
            "pending" => Ok(UserAction::Pending),
            other => Err(format!(
                "invalid user action '{other}', expected one of: approved, rejected, modified, pending"
            )),
        }
    }
}

/// Execution outcome reported back after an approved decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DecisionResult {
    pub executed: bool,
    #[serde(default)]
    pub filled: bool,
    pub fill_price: Option<Decimal>,
    pub fill_quantity: Option<Decimal>,
    #[serde(default)]
    pub simulated: bool,
    pub error: Option<String>,
    pub outcome: Option<TradeOutcome>,
}

/// One row of the append-only decision ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub context_snapshot: WorldState,
    pub proposed_order: TradeProposal,
    pub brains_output: Vec<BrainOutput>,
    pub coordinator_output: CoordinatorOutput,
    pub safety: SafetyResult,
    pub user_action: UserAction,
    pub user_notes: Option<String>,
    pub confidence: Decimal,
    pub mode: AgentMode,
    pub result: Option<DecisionResult>,
}

/// The only fields of a [`DecisionRecord`] that may change after append.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DecisionPatch {
    pub user_action: Option<UserAction>,
    pub user_notes: Option<String>,
    pub result: Option<DecisionResult>,
}

/// Query over the ledger. Results come back newest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionFilter {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub user_action: Option<UserAction>,
    pub symbol: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_DECISION_LIMIT
}

impl Default for DecisionFilter {
    fn default() -> Self {
        Self {
            since: None,
            until: None,
            user_action: None,
            symbol: None,
            limit: DEFAULT_DECISION_LIMIT,
        }
    }
}

impl DecisionFilter {
    /// Time bounds are inclusive.
    pub fn matches(&self, record: &DecisionRecord) -> bool {
        self.since.map_or(true, |s| record.timestamp >= s)
            && self.until.map_or(true, |u| record.timestamp <= u)
            && self.user_action.map_or(true, |a| record.user_action == a)
            && self.symbol.as_deref().map_or(true, |s| record.symbol == s)
    }
}

/// Whether a logged decision may be sent for execution right now.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionPermit {
    Granted { execution_type: ExecutionType },
    Blocked { reasons: Vec<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_defaults_to_fifty() {
        assert_eq!(DecisionFilter::default().limit, 50);
        let parsed: DecisionFilter = serde_json::from_str(r#"{"since":null,"until":null,"user_action":"pending","symbol":null}"#).unwrap();
        assert_eq!(parsed.limit, 50);
        assert_eq!(parsed.user_action, Some(UserAction::Pending));
    }

    #[test]
    fn terminal_actions() {
        assert!(!UserAction::Pending.is_terminal());
        assert!(UserAction::Rejected.is_terminal());
        assert!(UserAction::Modified.is_acceptance());
        assert!(!UserAction::Rejected.is_acceptance());
        assert!("cancelled".parse::<UserAction>().is_err());
    }

    #[test]
    fn permit_serializes_with_status_tag() {
        let permit = ExecutionPermit::Granted {
            execution_type: ExecutionType::Simulated,
        };
        let json = serde_json::to_value(&permit).unwrap();
        assert_eq!(json["status"], "granted");
        assert_eq!(json["execution_type"], "simulated");
    }
}
