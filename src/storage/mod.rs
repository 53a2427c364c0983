pub mod json_backend;
pub mod memory;

use crate::{
    core::errors::{BudgetError, Result},
    ledger::{Ledger, CURRENT_SCHEMA_VERSION},
};

/// Persistent home for a single ledger record.
pub trait RecordStore: Send + Sync {
    /// Returns `None` when nothing has been stored yet.
    fn load(&self) -> Result<Option<Ledger>>;
    fn save(&self, ledger: &Ledger) -> Result<()>;
    /// Human-readable location for log lines.
    fn describe(&self) -> String;
}

pub use json_backend::JsonFileStore;
pub use memory::MemoryStore;

pub(crate) fn decode_ledger(data: &str, source: &str) -> Result<Ledger> {
    let ledger: Ledger = serde_json::from_str(data)?;
    if ledger.schema_version > CURRENT_SCHEMA_VERSION {
        return Err(BudgetError::Storage(format!(
            "{} uses schema version {} but {} is the newest supported",
            source, ledger.schema_version, CURRENT_SCHEMA_VERSION
        )));
    }
    Ok(ledger)
}
