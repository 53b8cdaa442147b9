pub mod brains;
pub mod coordinator;
pub mod error;
pub mod kill_switch;
pub mod ledger;
pub mod pipeline;
pub mod retry;
pub mod safety;
pub mod service;
pub mod sizing;
pub mod world_state;

pub mod test_support;

pub use brains::{Brain, BrainSet, MarketBrain, PsychologyBrain, RiskBrain};
pub use coordinator::Coordinator;
pub use error::{BrainError, EngineError, ProviderError, VenueError};
pub use kill_switch::{
    ExecutionVenue, HealthReport, HealthStatus, KillSwitch, KillSwitchOutcome, Propagation,
};
pub use ledger::AuditLedger;
pub use pipeline::{ProposalOutcome, ProposalPipeline};
pub use retry::RetryPolicy;
pub use safety::SafetyEvaluator;
pub use service::{AgentParts, ConfigUpdate, TradingAgent};
pub use sizing::ProposalSizer;
pub use world_state::{MarketDataProvider, MemoryProvider, WorldStateBuilder};
