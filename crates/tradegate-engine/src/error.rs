use thiserror::Error;
use tradegate_models::agent_config::AgentMode;
use uuid::Uuid;

/// Failures surfaced to callers of the engine. A proposal is never returned
/// alongside any of these.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Config store unavailable: {0}")]
    Config(String),

    #[error("Data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("Ledger write failed: {0}")]
    LedgerWrite(String),

    #[error("Ledger read failed: {0}")]
    LedgerRead(String),

    #[error("Mode {mode} does not allow {action}")]
    ModeForbids { mode: AgentMode, action: &'static str },

    #[error("Decision not found: {0}")]
    NotFound(Uuid),

    #[error("Decision {id} already recorded as {existing}")]
    AlreadyDecided { id: Uuid, existing: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors from market, account and memory providers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Permanent: the data does not exist or the source is down for good.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Worth one more attempt.
    #[error("transient failure: {0}")]
    Transient(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrainError {
    #[error("evaluation failed: {0}")]
    Evaluation(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VenueError {
    #[error("venue unreachable: {0}")]
    Unreachable(String),

    #[error("venue rejected request: {0}")]
    Rejected(String),
}
