pub mod errors;
pub mod ledger_manager;
pub mod services;

pub use ledger_manager::LedgerManager;
