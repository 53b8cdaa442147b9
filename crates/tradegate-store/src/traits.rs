use async_trait::async_trait;
use tradegate_models::agent_config::{AgentConfig, ConfigPatch};
use tradegate_models::decision::{DecisionFilter, DecisionPatch, DecisionRecord, UserAction};
use uuid::Uuid;

use crate::error::StoreError;

/// Persisted agent configuration. One row, replaced whole on every upsert.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// The stored config, or [`AgentConfig::default`] when nothing was ever written.
    async fn get_config(&self) -> Result<AgentConfig, StoreError>;

    /// Merge `patch` over the current row and write the result. Returns the new row.
    async fn upsert_config(&self, patch: &ConfigPatch) -> Result<AgentConfig, StoreError>;
}

/// Append-only decision ledger.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert a record. Appending the same id twice is a no-op.
    async fn append_decision(&self, record: &DecisionRecord) -> Result<Uuid, StoreError>;

    /// Apply the mutable fields of `patch`. Returns the updated record.
    async fn update_decision(
        &self,
        id: Uuid,
        patch: &DecisionPatch,
    ) -> Result<DecisionRecord, StoreError>;

    /// Matching records, newest first, at most `filter.limit`.
    async fn query_decisions(
        &self,
        filter: &DecisionFilter,
    ) -> Result<Vec<DecisionRecord>, StoreError>;

    async fn get_decision(&self, id: Uuid) -> Result<Option<DecisionRecord>, StoreError>;
}

/// Apply a patch under the once-only user action rule.
///
/// `pending` moves to a terminal action exactly once. Repeating the same
/// terminal action only refreshes notes and result. A different action is a
/// [`StoreError::Conflict`].
pub fn apply_patch(record: &mut DecisionRecord, patch: &DecisionPatch) -> Result<(), StoreError> {
    if let Some(action) = patch.user_action {
        if action == UserAction::Pending {
            return Err(StoreError::InvalidPatch(
                "user action cannot be reset to pending".to_string(),
            ));
        }
        if record.user_action.is_terminal() && record.user_action != action {
            return Err(StoreError::Conflict {
                id: record.id,
                existing: record.user_action.to_string(),
            });
        }
        record.user_action = action;
    }
    if let Some(notes) = &patch.user_notes {
        record.user_notes = Some(notes.clone());
    }
    if let Some(result) = &patch.result {
        record.result = Some(result.clone());
    }
    Ok(())
}
