pub mod agent_config;
pub mod brain;
pub mod config;
pub mod decision;
pub mod mode;
pub mod proposal;
pub mod safety;
pub mod snapshot;
pub mod world_state;

pub use agent_config::{AgentConfig, AgentMode, ConfigPatch, PsychologyMode};
pub use brain::{AgentContext, BrainId, BrainOutput, CoordinatorOutput, Direction, VoteTally};
pub use config::{
    BrainConfig, CoordinatorConfig, GateConfig, PipelineConfig, SafetyConfig, SizingConfig,
    StoreConfig,
};
pub use decision::{
    DecisionFilter, DecisionPatch, DecisionRecord, DecisionResult, ExecutionPermit, UserAction,
};
pub use mode::{ExecutionType, ModeSemantics};
pub use proposal::{DraftProposal, TradeProposal};
pub use safety::SafetyResult;
pub use snapshot::{SnapshotCategory, SnapshotRow};
pub use world_state::{
    AccountContext, AgentMemory, CalendarEvent, EventImpact, MarketContext, MemoryItem, Position,
    PositionSide, PsychologySignals, RecentTrade, SessionContext, Timeframe, TradeOutcome,
    TrendDirection, TrendReading, WorldState, WorldStateInputs,
};
