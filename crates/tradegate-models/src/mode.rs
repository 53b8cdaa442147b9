//! Mode gate: the capability table for each [`AgentMode`].
//!
//! Pure lookups only. The pipeline consults [`can_propose_in_mode`] before it
//! spends anything on data fetching or brain evaluation.

use serde::{Deserialize, Serialize};

use crate::agent_config::AgentMode;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionType {
    None,
    Simulated,
    Live,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ModeSemantics {
    pub can_propose: bool,
    pub can_approve: bool,
    pub can_execute: bool,
    pub execution_type: ExecutionType,
    pub description: &'static str,
}

const OFF: ModeSemantics = ModeSemantics {
    can_propose: false,
    can_approve: false,
    can_execute: false,
    execution_type: ExecutionType::None,
    description: "Agent disabled - no proposals or executions",
};

const LEARN: ModeSemantics = ModeSemantics {
    can_propose: false,
    can_approve: false,
    can_execute: false,
    execution_type: ExecutionType::None,
    description: "Read-only learning mode - agent analyzes but does not propose trades",
};

const PAPER: ModeSemantics = ModeSemantics {
    can_propose: true,
    can_approve: true,
    can_execute: true,
    execution_type: ExecutionType::Simulated,
    description: "Full proposals with simulated execution only",
};

const LIVE_ASSISTED: ModeSemantics = ModeSemantics {
    can_propose: true,
    can_approve: true,
    can_execute: true,
    execution_type: ExecutionType::Live,
    description: "Real execution with explicit human approval required",
};

pub fn semantics(mode: AgentMode) -> ModeSemantics {
    match mode {
        AgentMode::Off => OFF,
        AgentMode::Learn => LEARN,
        AgentMode::Paper => PAPER,
        AgentMode::LiveAssisted => LIVE_ASSISTED,
    }
}

pub fn can_propose_in_mode(mode: AgentMode) -> bool {
    semantics(mode).can_propose
}

pub fn can_approve_in_mode(mode: AgentMode) -> bool {
    semantics(mode).can_approve
}

pub fn can_execute_in_mode(mode: AgentMode) -> bool {
    semantics(mode).can_execute
}

pub fn execution_type(mode: AgentMode) -> ExecutionType {
    semantics(mode).execution_type
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_table_matches_modes() {
        let expected = [
            (AgentMode::Off, false, false, false, ExecutionType::None),
            (AgentMode::Learn, false, false, false, ExecutionType::None),
            (AgentMode::Paper, true, true, true, ExecutionType::Simulated),
            (AgentMode::LiveAssisted, true, true, true, ExecutionType::Live),
        ];
        for (mode, propose, approve, execute, exec_type) in expected {
            let s = semantics(mode);
            assert_eq!(s.can_propose, propose, "{mode}");
            assert_eq!(s.can_approve, approve, "{mode}");
            assert_eq!(s.can_execute, execute, "{mode}");
            assert_eq!(s.execution_type, exec_type, "{mode}");
        }
    }

    #[test]
    fn execution_requires_proposal_capability() {
        for mode in AgentMode::ALL {
            if can_execute_in_mode(mode) {
                assert!(can_propose_in_mode(mode));
                assert!(can_approve_in_mode(mode));
                assert_ne!(execution_type(mode), ExecutionType::None);
            } else {
                assert_eq!(execution_type(mode), ExecutionType::None);
            }
        }
    }
}
