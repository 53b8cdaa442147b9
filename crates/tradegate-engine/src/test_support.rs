//! Fakes and fixtures for exercising the pipeline without real providers.
//!
//! Providers and venues count their calls so tests can assert that a gated
//! request never reached them. [`ScriptedBrain`] returns a fixed vote, or
//! fails, stalls or panics on demand.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tradegate_models::agent_config::{AgentConfig, AgentMode, ConfigPatch, PsychologyMode};
use tradegate_models::brain::{
    AgentContext, BrainId, BrainOutput, CoordinatorOutput, Direction, VoteTally,
};
use tradegate_models::config::GateConfig;
use tradegate_models::decision::{DecisionFilter, DecisionPatch, DecisionRecord};
use tradegate_models::proposal::DraftProposal;
use tradegate_models::world_state::{
    AccountContext, AgentMemory, MarketContext, SessionContext, Timeframe, TrendDirection,
    TrendReading, WorldState, WorldStateInputs,
};
use tradegate_store::{ConfigStore, InMemoryStore, LedgerStore, StoreError};
use uuid::Uuid;

use crate::brains::{Brain, BrainSet};
use crate::error::{BrainError, ProviderError, VenueError};
use crate::kill_switch::ExecutionVenue;
use crate::service::{AgentParts, TradingAgent};
use crate::world_state::{MarketDataProvider, MemoryProvider};

/// Calm, weakly rising market with a flat book and an untouched loss budget.
pub fn sample_inputs(price: Decimal) -> WorldStateInputs {
    let now = Utc::now();
    WorldStateInputs {
        market: MarketContext {
            price,
            volatility_pct: dec!(0.6),
            sma_20: None,
            sma_50: None,
            trend: Some(TrendReading {
                direction: TrendDirection::Up,
                strength: dec!(0.4),
            }),
            risk_off: false,
            session: SessionContext {
                is_open: true,
                minutes_to_close: None,
            },
            calendar: vec![],
            as_of: now,
        },
        account: AccountContext {
            account_id: "paper-1".to_string(),
            equity: dec!(25000),
            buying_power: dec!(50000),
            daily_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            positions: vec![],
            as_of: now,
        },
    }
}

pub fn sample_state(symbol: &str, price: Decimal) -> WorldState {
    let inputs = sample_inputs(price);
    WorldState {
        symbol: symbol.to_string(),
        timeframe: Timeframe::H1,
        built_at: Utc::now(),
        market: inputs.market,
        account: inputs.account,
        memory: AgentMemory::default(),
    }
}

/// Paper mode, trading enabled, default limits.
pub fn paper_config() -> AgentConfig {
    AgentConfig {
        mode: AgentMode::Paper,
        max_risk_per_trade: dec!(500),
        daily_loss_limit: dec!(2000),
        psychology_mode: PsychologyMode::Normal,
        allow_overnight: false,
        max_open_positions: 5,
        trading_enabled: true,
        updated_at: Utc::now(),
        ..AgentConfig::default()
    }
}

pub fn paper_context() -> AgentContext {
    AgentContext {
        mode: AgentMode::Paper,
        config: paper_config(),
    }
}

/// A consensus with the given direction, agreement 1 and the given brains.
pub fn coordinator_output(
    direction: Direction,
    confidence: Decimal,
    brains: Vec<BrainOutput>,
) -> CoordinatorOutput {
    let mut votes = VoteTally::default();
    votes.add(direction, confidence);
    CoordinatorOutput {
        brains,
        consensus_direction: direction,
        consensus_confidence: confidence,
        agreement_score: Decimal::ONE,
        raw_winner: direction,
        votes,
    }
}

/// A small actionable draft at the current price of `state`.
pub fn draft_for(state: &WorldState, direction: Direction) -> DraftProposal {
    DraftProposal {
        symbol: state.symbol.clone(),
        timeframe: state.timeframe,
        direction,
        size: dec!(100000),
        risk_amount: dec!(300),
        entry: Some(state.market.price),
        stop: Some(state.market.price - dec!(0.003)),
        target: Some(state.market.price + dec!(0.006)),
        confidence: dec!(0.82),
        generated_at: Utc::now(),
        mode: AgentMode::Paper,
        closes_position: false,
        holds_overnight: false,
    }
}

/// Static config with short timeouts so failure paths finish quickly.
pub fn fast_gate_config() -> GateConfig {
    let mut config = GateConfig::default();
    config.pipeline.brain_deadline_ms = 200;
    config.pipeline.provider_timeout_ms = 200;
    config.pipeline.store_timeout_ms = 200;
    config.pipeline.retry_base_delay_ms = 1;
    config
}

/// Market provider returning fixed inputs, optionally failing the first calls.
pub struct CountingMarketProvider {
    inputs: WorldStateInputs,
    failure: Option<(ProviderError, u32)>,
    calls: AtomicU32,
}

impl CountingMarketProvider {
    pub fn new(inputs: WorldStateInputs) -> Self {
        Self {
            inputs,
            failure: None,
            calls: AtomicU32::new(0),
        }
    }

    /// Fail the first `times` calls with `error`.
    pub fn failing_with(mut self, error: ProviderError, times: u32) -> Self {
        self.failure = Some((error, times));
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataProvider for CountingMarketProvider {
    async fn world_state_inputs(
        &self,
        _symbol: &str,
        _timeframe: Timeframe,
    ) -> Result<WorldStateInputs, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some((error, times)) if call < *times => Err(error.clone()),
            _ => Ok(self.inputs.clone()),
        }
    }
}

pub struct CountingMemoryProvider {
    memory: AgentMemory,
    failure: Option<ProviderError>,
    calls: AtomicU32,
}

impl CountingMemoryProvider {
    pub fn new(memory: AgentMemory) -> Self {
        Self {
            memory,
            failure: None,
            calls: AtomicU32::new(0),
        }
    }

    /// Fail every call with `error`.
    pub fn failing_with(mut self, error: ProviderError) -> Self {
        self.failure = Some(error);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MemoryProvider for CountingMemoryProvider {
    async fn agent_memory(
        &self,
        _symbol: &str,
        _timeframe: Timeframe,
        _mode: AgentMode,
    ) -> Result<AgentMemory, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(self.memory.clone()),
        }
    }
}

enum Script {
    Vote {
        direction: Direction,
        confidence: Decimal,
    },
    Fail(String),
    Panic,
}

pub struct ScriptedBrain {
    id: BrainId,
    script: Script,
    delay: Option<Duration>,
    evidence: BTreeMap<String, serde_json::Value>,
    calls: AtomicU32,
}

impl ScriptedBrain {
    fn with_script(id: BrainId, script: Script) -> Self {
        Self {
            id,
            script,
            delay: None,
            evidence: BTreeMap::new(),
            calls: AtomicU32::new(0),
        }
    }

    pub fn vote(id: BrainId, direction: Direction, confidence: Decimal) -> Self {
        Self::with_script(
            id,
            Script::Vote {
                direction,
                confidence,
            },
        )
    }

    pub fn failing(id: BrainId, message: &str) -> Self {
        Self::with_script(id, Script::Fail(message.to_string()))
    }

    pub fn panicking(id: BrainId) -> Self {
        Self::with_script(id, Script::Panic)
    }

    /// Sleep before answering.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_evidence(mut self, key: &str, value: serde_json::Value) -> Self {
        self.evidence.insert(key.to_string(), value);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Brain for ScriptedBrain {
    fn id(&self) -> BrainId {
        self.id
    }

    async fn evaluate(
        &self,
        _state: &WorldState,
        _context: &AgentContext,
    ) -> Result<BrainOutput, BrainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.script {
            Script::Vote {
                direction,
                confidence,
            } => Ok(BrainOutput {
                brain_id: self.id,
                direction: *direction,
                confidence: *confidence,
                rationale: format!("scripted {direction}"),
                evidence: self.evidence.clone(),
            }),
            Script::Fail(message) => Err(BrainError::Evaluation(message.clone())),
            Script::Panic => panic!("scripted brain {} panicked", self.id),
        }
    }
}

/// Market BUY@0.8, Risk BUY@0.6, Psychology FLAT@0.3.
pub fn scenario_brains() -> Vec<Arc<ScriptedBrain>> {
    vec![
        Arc::new(ScriptedBrain::vote(BrainId::Market, Direction::Buy, dec!(0.8))),
        Arc::new(ScriptedBrain::vote(BrainId::Risk, Direction::Buy, dec!(0.6))),
        Arc::new(ScriptedBrain::vote(
            BrainId::Psychology,
            Direction::Flat,
            dec!(0.3),
        )),
    ]
}

/// Venue that remembers its halt flag and can be made unreachable.
#[derive(Default)]
pub struct RecordingVenue {
    halted: AtomicBool,
    unreachable: AtomicBool,
    calls: AtomicU32,
}

impl RecordingVenue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unreachable(self, unreachable: bool) -> Self {
        self.set_unreachable(unreachable);
        self
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn reach(&self) -> Result<(), VenueError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.load(Ordering::SeqCst) {
            Err(VenueError::Unreachable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ExecutionVenue for RecordingVenue {
    async fn halt_trading(&self) -> Result<(), VenueError> {
        self.reach()?;
        self.halted.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn resume_trading(&self) -> Result<(), VenueError> {
        self.reach()?;
        self.halted.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn trading_halted(&self) -> Result<bool, VenueError> {
        self.reach()?;
        Ok(self.is_halted())
    }
}

/// Ledger whose writes always fail. Reads see nothing.
#[derive(Default)]
pub struct FailingLedger {
    attempts: AtomicU32,
}

impl FailingLedger {
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerStore for FailingLedger {
    async fn append_decision(&self, _record: &DecisionRecord) -> Result<Uuid, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("disk full".to_string()))
    }

    async fn update_decision(
        &self,
        id: Uuid,
        _patch: &DecisionPatch,
    ) -> Result<DecisionRecord, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::NotFound(id))
    }

    async fn query_decisions(
        &self,
        _filter: &DecisionFilter,
    ) -> Result<Vec<DecisionRecord>, StoreError> {
        Ok(vec![])
    }

    async fn get_decision(&self, _id: Uuid) -> Result<Option<DecisionRecord>, StoreError> {
        Ok(None)
    }
}

/// Config store over an [`InMemoryStore`] that accepts a fixed number of
/// writes and then fails every later one. Reads always go through.
pub struct FlakyConfigStore {
    inner: Arc<InMemoryStore>,
    writes_left: AtomicU32,
    upserts: AtomicU32,
}

impl FlakyConfigStore {
    pub fn new(inner: Arc<InMemoryStore>, allowed_writes: u32) -> Self {
        Self {
            inner,
            writes_left: AtomicU32::new(allowed_writes),
            upserts: AtomicU32::new(0),
        }
    }

    pub fn upserts(&self) -> u32 {
        self.upserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfigStore for FlakyConfigStore {
    async fn get_config(&self) -> Result<AgentConfig, StoreError> {
        self.inner.get_config().await
    }

    async fn upsert_config(&self, patch: &ConfigPatch) -> Result<AgentConfig, StoreError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        let granted = self
            .writes_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if granted {
            self.inner.upsert_config(patch).await
        } else {
            Err(StoreError::Unavailable("config store is read-only".to_string()))
        }
    }
}

/// A [`TradingAgent`] over in-memory stores and counting fakes.
pub struct Harness {
    pub agent: TradingAgent,
    pub store: Arc<InMemoryStore>,
    pub market: Arc<CountingMarketProvider>,
    pub memory: Arc<CountingMemoryProvider>,
    pub brains: Vec<Arc<ScriptedBrain>>,
    /// Set when the builder capped config writes.
    pub config_store: Option<Arc<FlakyConfigStore>>,
}

pub struct HarnessBuilder {
    config: AgentConfig,
    market: CountingMarketProvider,
    memory: CountingMemoryProvider,
    brains: Vec<Arc<ScriptedBrain>>,
    venue: Option<Arc<dyn ExecutionVenue>>,
    ledger: Option<Arc<dyn LedgerStore>>,
    config_writes: Option<u32>,
    gate: GateConfig,
}

impl Harness {
    /// Paper mode, EURUSD at 1.0850 and the scenario brains unless overridden.
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            config: paper_config(),
            market: CountingMarketProvider::new(sample_inputs(dec!(1.0850))),
            memory: CountingMemoryProvider::new(AgentMemory::default()),
            brains: scenario_brains(),
            venue: None,
            ledger: None,
            config_writes: None,
            gate: fast_gate_config(),
        }
    }
}

impl HarnessBuilder {
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn market(mut self, market: CountingMarketProvider) -> Self {
        self.market = market;
        self
    }

    pub fn memory(mut self, memory: CountingMemoryProvider) -> Self {
        self.memory = memory;
        self
    }

    pub fn brains(mut self, brains: Vec<Arc<ScriptedBrain>>) -> Self {
        self.brains = brains;
        self
    }

    pub fn venue(mut self, venue: Arc<dyn ExecutionVenue>) -> Self {
        self.venue = Some(venue);
        self
    }

    pub fn ledger(mut self, ledger: Arc<dyn LedgerStore>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Let the config store take `writes` upserts, then fail the rest.
    pub fn config_writes(mut self, writes: u32) -> Self {
        self.config_writes = Some(writes);
        self
    }

    pub fn gate(mut self, gate: GateConfig) -> Self {
        self.gate = gate;
        self
    }

    pub fn build(self) -> Harness {
        let store = Arc::new(InMemoryStore::with_config(self.config));
        let market = Arc::new(self.market);
        let memory = Arc::new(self.memory);

        let brain_set = self
            .brains
            .iter()
            .try_fold(BrainSet::new(), |set, b| {
                set.register(Arc::clone(b) as Arc<dyn Brain>, Decimal::ONE)
            })
            .expect("scripted brains register with weight 1");

        let ledger_store: Arc<dyn LedgerStore> = match self.ledger {
            Some(ledger) => ledger,
            None => store.clone() as Arc<dyn LedgerStore>,
        };
        let flaky = self
            .config_writes
            .map(|writes| Arc::new(FlakyConfigStore::new(store.clone(), writes)));
        let config_store: Arc<dyn ConfigStore> = match &flaky {
            Some(flaky) => flaky.clone() as Arc<dyn ConfigStore>,
            None => store.clone() as Arc<dyn ConfigStore>,
        };
        let agent = TradingAgent::new(
            AgentParts {
                config_store,
                ledger_store,
                market: market.clone(),
                memory: memory.clone(),
                venue: self.venue,
                brains: brain_set,
            },
            &self.gate,
        )
        .expect("harness agent");

        Harness {
            agent,
            store,
            market,
            memory,
            brains: self.brains,
            config_store: flaky,
        }
    }
}
