//! Ledger aggregate, per-account change histories, and cascade bookkeeping.

pub mod history;
#[allow(clippy::module_inception)]
pub mod ledger;
pub mod suppression;

pub use history::{AccountHistory, AccountKey, HistoryBook};
pub use ledger::{Ledger, CURRENT_SCHEMA_VERSION};
pub use suppression::{CascadeGuard, CascadeSuppression};
