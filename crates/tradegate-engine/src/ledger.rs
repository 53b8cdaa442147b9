use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};
use tradegate_models::brain::{BrainOutput, CoordinatorOutput};
use tradegate_models::decision::{
    DecisionFilter, DecisionPatch, DecisionRecord, DecisionResult, UserAction,
};
use tradegate_models::proposal::{DraftProposal, TradeProposal};
use tradegate_models::safety::SafetyResult;
use tradegate_models::world_state::WorldState;
use tradegate_store::{LedgerStore, StoreError};
use uuid::Uuid;

use crate::error::EngineError;
use crate::retry::{with_retry, CallError, RetryPolicy};

/// Append-only audit trail of every proposal and the human's answer to it.
///
/// The ledger is the only place a [`TradeProposal`] id is minted, so a
/// proposal never exists without its record.
pub struct AuditLedger {
    store: Arc<dyn LedgerStore>,
    policy: RetryPolicy,
}

impl AuditLedger {
    pub fn new(store: Arc<dyn LedgerStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Persist a pending decision record and return the proposal it describes.
    pub async fn log_proposal(
        &self,
        draft: DraftProposal,
        context: WorldState,
        brains: Vec<BrainOutput>,
        coordinator: CoordinatorOutput,
        safety: SafetyResult,
    ) -> Result<TradeProposal, EngineError> {
        let proposal = draft.into_proposal(Uuid::new_v4());
        let record = DecisionRecord {
            id: proposal.id,
            timestamp: Utc::now(),
            symbol: proposal.symbol.clone(),
            context_snapshot: context,
            proposed_order: proposal.clone(),
            brains_output: brains,
            coordinator_output: coordinator,
            confidence: proposal.confidence,
            mode: proposal.mode,
            safety,
            user_action: UserAction::Pending,
            user_notes: None,
            result: None,
        };

        with_retry("append_decision", &self.policy, || {
            self.store.append_decision(&record)
        })
        .await
        .map_err(|e| {
            error!(id = %record.id, symbol = %record.symbol, error = %e, "Ledger append failed");
            EngineError::LedgerWrite(e.to_string())
        })?;

        info!(
            id = %proposal.id,
            symbol = %proposal.symbol,
            direction = %proposal.direction,
            allowed = record.safety.allowed,
            "Proposal logged"
        );
        Ok(proposal)
    }

    /// Record the human's action on a logged proposal.
    ///
    /// Only `user_action`, `user_notes` and `result` change. Repeating the
    /// same action refreshes notes and result; a different terminal action
    /// is rejected.
    pub async fn log_decision(
        &self,
        id: Uuid,
        action: UserAction,
        notes: Option<String>,
        result: Option<DecisionResult>,
    ) -> Result<DecisionRecord, EngineError> {
        let patch = DecisionPatch {
            user_action: Some(action),
            user_notes: notes,
            result,
        };
        let record = with_retry("update_decision", &self.policy, || {
            self.store.update_decision(id, &patch)
        })
        .await
        .map_err(|e| match e {
            CallError::Failed(StoreError::NotFound(id)) => EngineError::NotFound(id),
            CallError::Failed(StoreError::Conflict { id, existing }) => {
                EngineError::AlreadyDecided { id, existing }
            }
            CallError::Failed(StoreError::InvalidPatch(msg)) => EngineError::InvalidRequest(msg),
            other => {
                error!(%id, error = %other, "Ledger update failed");
                EngineError::LedgerWrite(other.to_string())
            }
        })?;

        info!(%id, action = %action, "Decision recorded");
        Ok(record)
    }

    pub async fn query(&self, filter: &DecisionFilter) -> Result<Vec<DecisionRecord>, EngineError> {
        with_retry("query_decisions", &self.policy, || {
            self.store.query_decisions(filter)
        })
        .await
        .map_err(|e| EngineError::LedgerRead(e.to_string()))
    }

    pub async fn get(&self, id: Uuid) -> Result<DecisionRecord, EngineError> {
        with_retry("get_decision", &self.policy, || self.store.get_decision(id))
            .await
            .map_err(|e| EngineError::LedgerRead(e.to_string()))?
            .ok_or(EngineError::NotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{coordinator_output, draft_for, sample_state};
    use rust_decimal_macros::dec;
    use tradegate_models::brain::Direction;
    use tradegate_store::InMemoryStore;

    fn ledger(store: Arc<InMemoryStore>) -> AuditLedger {
        AuditLedger::new(store, RetryPolicy::new(100, 1))
    }

    async fn logged(ledger: &AuditLedger) -> TradeProposal {
        let state = sample_state("EURUSD", dec!(1.0850));
        let coordinator = coordinator_output(Direction::Buy, dec!(0.8), vec![]);
        ledger
            .log_proposal(
                draft_for(&state, Direction::Buy),
                state,
                coordinator.brains.clone(),
                coordinator,
                SafetyResult::from_checks(vec![], vec![]),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn proposal_is_logged_pending() {
        let store = Arc::new(InMemoryStore::new());
        let ledger = ledger(store.clone());
        let proposal = logged(&ledger).await;

        let record = ledger.get(proposal.id).await.unwrap();
        assert_eq!(record.user_action, UserAction::Pending);
        assert_eq!(record.proposed_order, proposal);
        assert_eq!(store.decision_count().await, 1);
    }

    #[tokio::test]
    async fn second_decision_keeps_analysis_intact() {
        let ledger = ledger(Arc::new(InMemoryStore::new()));
        let proposal = logged(&ledger).await;

        let first = ledger
            .log_decision(proposal.id, UserAction::Rejected, Some("too late".into()), None)
            .await
            .unwrap();
        let second = ledger
            .log_decision(proposal.id, UserAction::Rejected, Some("news risk".into()), None)
            .await
            .unwrap();

        assert_eq!(second.user_notes.as_deref(), Some("news risk"));
        assert_eq!(
            serde_json::to_string(&first.brains_output).unwrap(),
            serde_json::to_string(&second.brains_output).unwrap()
        );
        assert_eq!(first.coordinator_output, second.coordinator_output);
        assert_eq!(first.safety, second.safety);
    }

    #[tokio::test]
    async fn conflicting_action_is_already_decided() {
        let ledger = ledger(Arc::new(InMemoryStore::new()));
        let proposal = logged(&ledger).await;
        ledger
            .log_decision(proposal.id, UserAction::Approved, None, None)
            .await
            .unwrap();
        let err = ledger
            .log_decision(proposal.id, UserAction::Rejected, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::AlreadyDecided { .. }));
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let ledger = ledger(Arc::new(InMemoryStore::new()));
        let id = Uuid::new_v4();
        let err = ledger
            .log_decision(id, UserAction::Rejected, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(found) if found == id));
        assert!(matches!(ledger.get(id).await, Err(EngineError::NotFound(_))));
    }
}
