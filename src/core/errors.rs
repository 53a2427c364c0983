use std::result::Result as StdResult;

use thiserror::Error;
use uuid::Uuid;

/// Unified error type for the history, allocation, rollover and storage layers.
#[derive(Error, Debug)]
pub enum BudgetError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),
    #[error("Invalid pay period: {0}")]
    InvalidPeriod(String),
    #[error("Negative magnitude {0} cents; the sign is derived from the mutation kind")]
    NegativeMagnitude(i64),
    #[error("Opening entry conflict: {0}")]
    OpeningEntryConflict(String),
    #[error("Ledger entry not found: {0}")]
    EntryNotFound(Uuid),
    #[error("Mutation not found: {0}")]
    MutationNotFound(Uuid),
    #[error("Reimbursement not found: {0}")]
    ReimbursementNotFound(Uuid),
    #[error("Week not found: {0}")]
    WeekNotFound(u32),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Persistence error: {0}")]
    Storage(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = StdResult<T, BudgetError>;

impl From<std::io::Error> for BudgetError {
    fn from(err: std::io::Error) -> Self {
        BudgetError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for BudgetError {
    fn from(err: serde_json::Error) -> Self {
        BudgetError::Storage(err.to_string())
    }
}
