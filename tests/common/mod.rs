#![allow(dead_code)]

use std::{path::PathBuf, sync::Mutex};

use biweekly_ledger::{
    config::{Config, ConfigManager},
    core::services::PaycheckRequest,
    domain::{Money, TrackableAccount},
    storage::MemoryStore,
    LedgerManager,
};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use tempfile::TempDir;
use uuid::Uuid;

/// Holds TempDir guards so temporary folders live for the duration of the test run.
static TEST_DIRS: Lazy<Mutex<Vec<TempDir>>> = Lazy::new(|| Mutex::new(Vec::new()));

pub fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, month, day).expect("valid date")
}

pub fn cents(value: i64) -> Money {
    Money::from_cents(value)
}

/// Creates an isolated base directory with a config manager rooted in it.
pub fn setup_test_env() -> (ConfigManager, PathBuf) {
    let temp = TempDir::new().expect("create temp dir");
    let base = temp.path().to_path_buf();
    TEST_DIRS.lock().expect("lock temp dir registry").push(temp);
    let config_manager =
        ConfigManager::with_base_dir(base.clone()).expect("create config manager for temp dir");
    (config_manager, base)
}

pub fn file_manager(base: &PathBuf, config: &Config) -> LedgerManager {
    LedgerManager::from_config(config, base).expect("open json-backed manager")
}

pub fn memory_manager() -> LedgerManager {
    LedgerManager::open(Box::new(MemoryStore::new()), "Scenario").expect("open memory manager")
}

pub struct Household {
    pub rent: Uuid,
    pub savings: Uuid,
}

/// Rent reserve with a $300 deduction and a default savings accumulator
/// holding $500.
pub fn open_household(manager: &mut LedgerManager) -> Household {
    let rent = manager
        .open_account(
            TrackableAccount::reserve("Rent", cents(120_000)).with_deduction(cents(30_000)),
            Money::ZERO,
            date(1, 1),
        )
        .expect("open rent");
    let savings = manager
        .open_account(
            TrackableAccount::accumulator("Savings", Some(cents(1_000_000))).with_default_rollover(),
            cents(50_000),
            date(1, 1),
        )
        .expect("open savings");
    Household { rent, savings }
}

/// $4625 paid on Monday 2025-01-06 for weeks 1 and 2.
pub fn first_paycheck() -> PaycheckRequest {
    PaycheckRequest::new(cents(462_500), date(1, 6), 1, date(1, 6))
}
