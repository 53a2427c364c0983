#![doc(test(attr(deny(warnings))))]

//! Bi-weekly budget ledger: paycheck splitting across two-week pay periods,
//! dated per-account histories with running balances, and a rollover cascade
//! that carries each week's leftover forward into savings.

pub mod config;
pub mod core;
pub mod domain;
pub mod ledger;
pub mod storage;
pub mod utils;

pub use crate::core::errors::{BudgetError, Result};
pub use crate::core::LedgerManager;

use std::sync::Once;

static INIT_TRACING: Once = Once::new();

/// Initializes global tracing with the default filter and emits a startup log.
pub fn init() {
    init_with_filter(None);
}

/// Like [`init`], layering an extra directive such as a config's `log_filter`.
pub fn init_with_filter(directive: Option<&str>) {
    INIT_TRACING.call_once(|| {
        utils::init_tracing(directive);
        tracing::info!("biweekly ledger tracing initialized");
    });
}
