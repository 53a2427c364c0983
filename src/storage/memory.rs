use std::sync::Mutex;

use crate::{
    core::errors::{BudgetError, Result},
    ledger::Ledger,
};

use super::{decode_ledger, RecordStore};

/// Keeps the serialized ledger in memory. Useful for tests and previews.
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ledger(ledger: &Ledger) -> Result<Self> {
        let store = Self::new();
        store.save(ledger)?;
        Ok(store)
    }

    /// Raw JSON of the last save.
    pub fn snapshot(&self) -> Option<String> {
        self.record.lock().ok().and_then(|record| record.clone())
    }
}

impl RecordStore for MemoryStore {
    fn load(&self) -> Result<Option<Ledger>> {
        let record = self
            .record
            .lock()
            .map_err(|_| BudgetError::Storage("memory store lock poisoned".into()))?;
        record
            .as_deref()
            .map(|data| decode_ledger(data, "memory store"))
            .transpose()
    }

    fn save(&self, ledger: &Ledger) -> Result<()> {
        let json = serde_json::to_string(ledger)?;
        let mut record = self
            .record
            .lock()
            .map_err(|_| BudgetError::Storage("memory store lock poisoned".into()))?;
        *record = Some(json);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".into()
    }
}
