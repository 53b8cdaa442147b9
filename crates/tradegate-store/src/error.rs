use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store not available: {0}")]
    Unavailable(String),

    #[error("Decision not found: {0}")]
    NotFound(Uuid),

    #[error("Decision {id} already recorded as {existing}")]
    Conflict { id: Uuid, existing: String },

    #[error("Invalid update: {0}")]
    InvalidPatch(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Busy and locked databases clear on their own; everything else needs a human.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}
