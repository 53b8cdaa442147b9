pub mod error;
pub mod in_memory;
pub mod snapshot;
pub mod sqlite;
pub mod traits;

#[cfg(test)]
mod test_records;

pub use error::StoreError;
pub use in_memory::InMemoryStore;
pub use snapshot::{SnapshotDb, SnapshotReader};
pub use sqlite::SqliteStore;
pub use traits::{ConfigStore, LedgerStore};
