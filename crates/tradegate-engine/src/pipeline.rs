use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::time::timeout_at;
use tracing::{error, info, warn};
use tradegate_models::agent_config::{AgentConfig, AgentMode};
use tradegate_models::brain::{AgentContext, BrainOutput, CoordinatorOutput};
use tradegate_models::mode::{can_propose_in_mode, semantics};
use tradegate_models::proposal::TradeProposal;
use tradegate_models::safety::SafetyResult;
use tradegate_models::world_state::{Timeframe, WorldState};
use tradegate_store::ConfigStore;

use crate::brains::BrainSet;
use crate::coordinator::Coordinator;
use crate::error::EngineError;
use crate::kill_switch::KillSwitch;
use crate::ledger::AuditLedger;
use crate::retry::{with_retry, RetryPolicy};
use crate::safety::SafetyEvaluator;
use crate::sizing::ProposalSizer;
use crate::world_state::WorldStateBuilder;

/// Result of a proposal request that did not fail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProposalOutcome {
    /// Logged proposal. `safety.allowed` may still be false.
    Proposed {
        proposal: TradeProposal,
        coordinator: CoordinatorOutput,
        safety: SafetyResult,
    },
    /// The current mode does not propose. Nothing was fetched or logged.
    CapabilityDenied { mode: AgentMode, reason: String },
}

impl ProposalOutcome {
    pub fn proposal(&self) -> Option<&TradeProposal> {
        match self {
            ProposalOutcome::Proposed { proposal, .. } => Some(proposal),
            ProposalOutcome::CapabilityDenied { .. } => None,
        }
    }
}

/// Everything a pipeline run needs, wired once at startup.
pub struct PipelineParts {
    pub config_store: Arc<dyn ConfigStore>,
    pub world: WorldStateBuilder,
    pub brains: BrainSet,
    pub coordinator: Coordinator,
    pub sizer: ProposalSizer,
    pub safety: SafetyEvaluator,
    pub ledger: Arc<AuditLedger>,
    pub kill_switch: Arc<KillSwitch>,
    pub store_policy: RetryPolicy,
    pub brain_deadline: Duration,
    pub max_concurrent_brains: usize,
}

/// Mode gate, world state, brains, coordinator, sizing, safety, ledger.
pub struct ProposalPipeline {
    parts: PipelineParts,
}

impl ProposalPipeline {
    pub fn new(parts: PipelineParts) -> Self {
        Self { parts }
    }

    /// Run one proposal request end to end.
    ///
    /// The agent config is read once and used for the whole run, so a mode
    /// or kill switch change lands on the next request.
    pub async fn run(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<ProposalOutcome, EngineError> {
        let start = Instant::now();
        let p = &self.parts;

        let config = self.load_config().await?;
        let mode = config.mode;
        if !can_propose_in_mode(mode) {
            info!(symbol, mode = %mode, "Mode does not propose, skipping pipeline");
            return Ok(ProposalOutcome::CapabilityDenied {
                mode,
                reason: semantics(mode).description.to_string(),
            });
        }

        info!(symbol, timeframe = %timeframe, mode = %mode, "Starting proposal");

        let memory = p.world.fetch_memory(symbol, timeframe, mode).await?;
        let state = p.world.build(symbol, timeframe, memory).await?;
        let context = AgentContext {
            mode,
            config: config.clone(),
        };

        let outputs = self.evaluate_brains(&state, &context).await;
        let coordinator = p.coordinator.combine(outputs.clone(), &p.brains.weights());

        let now = Utc::now();
        let draft = p.sizer.draft(&state, &coordinator, &context, now);
        let venue_halted = p.kill_switch.venue_halted(mode).await;
        let safety = p.safety.evaluate(&draft, &state, &config, venue_halted, now);

        let proposal = p
            .ledger
            .log_proposal(draft, state, outputs, coordinator.clone(), safety.clone())
            .await?;

        info!(
            symbol,
            id = %proposal.id,
            direction = %proposal.direction,
            confidence = %proposal.confidence,
            allowed = safety.allowed,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Proposal complete"
        );

        Ok(ProposalOutcome::Proposed {
            proposal,
            coordinator,
            safety,
        })
    }

    pub(crate) async fn load_config(&self) -> Result<AgentConfig, EngineError> {
        let store = &self.parts.config_store;
        with_retry("get_config", &self.parts.store_policy, || store.get_config())
            .await
            .map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Fan out to every registered brain under one shared deadline.
    ///
    /// Output order follows the brain set. A brain that errors, panics or
    /// misses the deadline abstains.
    async fn evaluate_brains(&self, state: &WorldState, context: &AgentContext) -> Vec<BrainOutput> {
        let p = &self.parts;
        let deadline = tokio::time::Instant::now() + p.brain_deadline;
        let deadline_ms = p.brain_deadline.as_millis() as u64;
        let slots = Arc::new(Semaphore::new(p.max_concurrent_brains.max(1)));
        let state = Arc::new(state.clone());
        let context = Arc::new(context.clone());

        let mut handles = Vec::with_capacity(p.brains.len());
        for registered in p.brains.iter() {
            let brain = Arc::clone(&registered.brain);
            let slots = Arc::clone(&slots);
            let state = Arc::clone(&state);
            let context = Arc::clone(&context);

            let handle = tokio::spawn(async move {
                let agent_start = Instant::now();
                let Ok(Ok(_permit)) = timeout_at(deadline, slots.acquire_owned()).await else {
                    let reason = format!("no slot before the {deadline_ms} ms deadline");
                    return (Err(reason), agent_start.elapsed());
                };
                let result = match timeout_at(deadline, brain.evaluate(&state, &context)).await {
                    Ok(Ok(output)) => Ok(output),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!("timed out after {deadline_ms} ms")),
                };
                (result, agent_start.elapsed())
            });
            handles.push((registered.id, handle));
        }

        let mut outputs = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            let output = match handle.await {
                Ok((Ok(mut output), elapsed)) => {
                    output.brain_id = id;
                    output.confidence = output.confidence.clamp(Decimal::ZERO, Decimal::ONE);
                    info!(
                        brain = %id,
                        direction = %output.direction,
                        confidence = %output.confidence,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Brain evaluated"
                    );
                    output
                }
                Ok((Err(reason), elapsed)) => {
                    warn!(
                        brain = %id,
                        reason = %reason,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Brain abstained"
                    );
                    BrainOutput::abstain(id, format!("abstained: {reason}"))
                }
                Err(e) => {
                    error!(brain = %id, error = %e, "Brain task panicked");
                    BrainOutput::abstain(id, format!("abstained: brain task failed: {e}"))
                }
            };
            outputs.push(output);
        }
        outputs
    }
}
