use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tradegate_models::agent_config::{AgentConfig, ConfigPatch};
use tradegate_models::decision::{DecisionFilter, DecisionPatch, DecisionRecord};
use uuid::Uuid;

use crate::error::StoreError;
use crate::traits::{apply_patch, ConfigStore, LedgerStore};

/// Process-local store. Used by tests and dry runs without a database file.
#[derive(Default)]
pub struct InMemoryStore {
    config: RwLock<Option<AgentConfig>>,
    decisions: RwLock<Vec<DecisionRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: AgentConfig) -> Self {
        Self {
            config: RwLock::new(Some(config)),
            decisions: RwLock::new(Vec::new()),
        }
    }

    pub async fn decision_count(&self) -> usize {
        self.decisions.read().await.len()
    }
}

#[async_trait]
impl ConfigStore for InMemoryStore {
    async fn get_config(&self) -> Result<AgentConfig, StoreError> {
        Ok(self.config.read().await.clone().unwrap_or_default())
    }

    async fn upsert_config(&self, patch: &ConfigPatch) -> Result<AgentConfig, StoreError> {
        let mut slot = self.config.write().await;
        let next = slot.clone().unwrap_or_default().merged(patch, Utc::now());
        *slot = Some(next.clone());
        Ok(next)
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn append_decision(&self, record: &DecisionRecord) -> Result<Uuid, StoreError> {
        let mut decisions = self.decisions.write().await;
        if !decisions.iter().any(|d| d.id == record.id) {
            decisions.push(record.clone());
        }
        Ok(record.id)
    }

    async fn update_decision(
        &self,
        id: Uuid,
        patch: &DecisionPatch,
    ) -> Result<DecisionRecord, StoreError> {
        let mut decisions = self.decisions.write().await;
        let record = decisions
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or(StoreError::NotFound(id))?;
        let mut next = record.clone();
        apply_patch(&mut next, patch)?;
        *record = next.clone();
        Ok(next)
    }

    async fn query_decisions(
        &self,
        filter: &DecisionFilter,
    ) -> Result<Vec<DecisionRecord>, StoreError> {
        let decisions = self.decisions.read().await;
        let mut matching: Vec<DecisionRecord> = decisions
            .iter()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        matching.truncate(filter.limit);
        Ok(matching)
    }

    async fn get_decision(&self, id: Uuid) -> Result<Option<DecisionRecord>, StoreError> {
        Ok(self
            .decisions
            .read()
            .await
            .iter()
            .find(|d| d.id == id)
            .cloned())
    }
}
