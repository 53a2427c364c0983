use std::{collections::BTreeMap, path::Path};

use chrono::NaiveDate;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::Config,
    core::{
        errors::{BudgetError, Result},
        services::{
            AccountChanges, AccountService, AccountStatus, AllocationService, CashFlowSummary,
            MutationService, PaycheckReport, PaycheckRequest, PaycheckSplit, PeriodSummary,
            RecalcOutcome, ReimbursementService, ReimbursementTotals, RolloverService,
            SummaryService, WeekSummary,
        },
    },
    domain::{
        ChangeEntry, Money, Mutation, MutationPatch, NewMutation, NewReimbursement,
        Reimbursement, ReimbursementPatch, ReimbursementState, TrackableAccount,
    },
    ledger::Ledger,
    storage::RecordStore,
};

/// Facade pairing the in-memory ledger with its record store.
///
/// Every mutating call runs against the ledger as one unit: on error the
/// ledger is restored to its state before the call, on success it is written
/// back when autosave is on.
pub struct LedgerManager {
    ledger: Ledger,
    store: Box<dyn RecordStore>,
    autosave: bool,
}

impl LedgerManager {
    /// Loads the stored ledger, or starts an empty one named `name`.
    pub fn open(store: Box<dyn RecordStore>, name: &str) -> Result<Self> {
        let ledger = match store.load()? {
            Some(ledger) => {
                info!(location = %store.describe(), ledger = %ledger.name, "ledger loaded");
                Self::report_warnings(&ledger);
                ledger
            }
            None => {
                info!(location = %store.describe(), "starting new ledger");
                Ledger::new(name)
            }
        };
        Ok(Self {
            ledger,
            store,
            autosave: true,
        })
    }

    /// Opens the JSON store described by `config`.
    pub fn from_config(config: &Config, base_dir: &Path) -> Result<Self> {
        let store = config.open_store(base_dir)?;
        let mut manager = Self::open(Box::new(store), &config.ledger_name)?;
        manager.autosave = config.autosave;
        Ok(manager)
    }

    pub fn set_autosave(&mut self, autosave: bool) {
        self.autosave = autosave;
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    pub fn save(&self) -> Result<()> {
        self.store.save(&self.ledger)
    }

    /// Replaces the in-memory ledger with the stored one.
    pub fn reload(&mut self) -> Result<()> {
        let ledger = self
            .store
            .load()?
            .ok_or_else(|| BudgetError::Storage(format!("{} is empty", self.store.describe())))?;
        Self::report_warnings(&ledger);
        self.ledger = ledger;
        Ok(())
    }

    pub fn open_account(
        &mut self,
        account: TrackableAccount,
        opening_balance: Money,
        opened_on: NaiveDate,
    ) -> Result<Uuid> {
        self.apply(|ledger| AccountService::open(ledger, account, opening_balance, opened_on))
    }

    pub fn edit_account(&mut self, id: Uuid, changes: AccountChanges) -> Result<()> {
        self.apply(|ledger| AccountService::edit(ledger, id, changes))
    }

    pub fn set_default_rollover(&mut self, id: Uuid) -> Result<()> {
        self.apply(|ledger| AccountService::set_default_rollover(ledger, id))
    }

    pub fn deactivate_account(&mut self, id: Uuid, on: NaiveDate) -> Result<()> {
        self.apply(|ledger| AccountService::deactivate(ledger, id, on))
    }

    pub fn reactivate_account(&mut self, id: Uuid, from: NaiveDate) -> Result<()> {
        self.apply(|ledger| AccountService::reactivate(ledger, id, from))
    }

    pub fn purge_account(&mut self, id: Uuid) -> Result<TrackableAccount> {
        self.apply(|ledger| AccountService::purge(ledger, id))
    }

    pub fn add_mutation(&mut self, draft: NewMutation) -> Result<Uuid> {
        self.apply(|ledger| MutationService::add(ledger, draft))
    }

    pub fn update_mutation(&mut self, id: Uuid, patch: MutationPatch) -> Result<()> {
        self.apply(|ledger| MutationService::update(ledger, id, patch))
    }

    pub fn delete_mutation(&mut self, id: Uuid) -> Result<Mutation> {
        self.apply(|ledger| MutationService::delete(ledger, id))
    }

    pub fn transfer_between(
        &mut self,
        from: Uuid,
        to: Uuid,
        amount: Money,
        date: NaiveDate,
        week: Option<u32>,
    ) -> Result<(Uuid, Uuid)> {
        self.apply(|ledger| MutationService::transfer_between(ledger, from, to, amount, date, week))
    }

    /// Preview of a paycheck split using the deductions active on `pay_date`.
    pub fn split_paycheck(&self, gross: Money, pay_date: NaiveDate) -> PaycheckSplit {
        AllocationService::preview(&self.ledger, gross, pay_date)
    }

    pub fn process_paycheck(&mut self, request: PaycheckRequest) -> Result<PaycheckReport> {
        self.apply(|ledger| AllocationService::process_paycheck(ledger, request))
    }

    pub fn recalculate_period(&mut self, week: u32) -> Result<RecalcOutcome> {
        self.apply(|ledger| RolloverService::recalculate_period(ledger, week))
    }

    pub fn finalize_elapsed_periods(&mut self, today: NaiveDate) -> Result<Vec<RecalcOutcome>> {
        self.apply(|ledger| RolloverService::finalize_elapsed_periods(ledger, today))
    }

    /// Latest running balance, `None` when the account has no history.
    pub fn current_balance(&self, account_id: Uuid) -> Result<Option<Money>> {
        self.ledger.require_account(account_id)?;
        Ok(self.ledger.current_balance(account_id))
    }

    /// Balance at the end of `date`, `None` before the opening entry.
    pub fn balance_as_of(&self, account_id: Uuid, date: NaiveDate) -> Result<Option<Money>> {
        self.ledger.require_account(account_id)?;
        Ok(self.ledger.balance_as_of(account_id, date))
    }

    pub fn account_history(&self, account_id: Uuid) -> Result<&[ChangeEntry]> {
        self.ledger
            .history
            .history(account_id)
            .map(|history| history.entries())
            .ok_or_else(|| BudgetError::AccountNotFound(account_id.to_string()))
    }

    pub fn mutations_for_week(&self, week: u32) -> Vec<&Mutation> {
        self.ledger.mutations_for_week(week)
    }

    pub fn week_summary(&self, week: u32) -> Result<WeekSummary> {
        SummaryService::week_summary(&self.ledger, week)
    }

    pub fn period_summary(&self, week: u32) -> Result<PeriodSummary> {
        SummaryService::period_summary(&self.ledger, week)
    }

    pub fn account_status(&self, account_id: Uuid, as_of: Option<NaiveDate>) -> Result<AccountStatus> {
        SummaryService::account_status(&self.ledger, account_id, as_of)
    }

    pub fn accounts(&self) -> Vec<&TrackableAccount> {
        AccountService::list(&self.ledger)
    }

    /// Case-insensitive lookup by account name.
    pub fn find_account(&self, name: &str) -> Option<&TrackableAccount> {
        AccountService::find_by_name(&self.ledger, name)
    }

    pub fn account_statuses(&self, as_of: Option<NaiveDate>) -> Vec<AccountStatus> {
        SummaryService::account_statuses(&self.ledger, as_of)
    }

    pub fn spending_by_category(&self, analytics_only: bool) -> BTreeMap<String, Money> {
        SummaryService::spending_by_category(&self.ledger, analytics_only)
    }

    pub fn spending_by_week(&self, analytics_only: bool) -> BTreeMap<u32, Money> {
        SummaryService::spending_by_week(&self.ledger, analytics_only)
    }

    pub fn cash_flow(&self) -> CashFlowSummary {
        SummaryService::cash_flow(&self.ledger)
    }

    pub fn add_reimbursement(&mut self, draft: NewReimbursement, today: NaiveDate) -> Result<Uuid> {
        self.apply(|ledger| ReimbursementService::add(ledger, draft, today))
    }

    pub fn update_reimbursement(
        &mut self,
        id: Uuid,
        patch: ReimbursementPatch,
        today: NaiveDate,
    ) -> Result<()> {
        self.apply(|ledger| ReimbursementService::update(ledger, id, patch, today))
    }

    pub fn change_reimbursement_state(
        &mut self,
        id: Uuid,
        state: ReimbursementState,
        today: NaiveDate,
    ) -> Result<()> {
        self.apply(|ledger| ReimbursementService::change_state(ledger, id, state, today))
    }

    pub fn delete_reimbursement(&mut self, id: Uuid) -> Result<Reimbursement> {
        self.apply(|ledger| ReimbursementService::delete(ledger, id))
    }

    pub fn delete_reimbursements(&mut self, ids: &[Uuid]) -> Result<usize> {
        self.apply(|ledger| Ok(ReimbursementService::delete_many(ledger, ids)))
    }

    pub fn reimbursement_totals(
        &self,
        paid_between: Option<(NaiveDate, NaiveDate)>,
    ) -> ReimbursementTotals {
        ReimbursementService::totals(&self.ledger, paid_between)
    }

    fn apply<T>(&mut self, op: impl FnOnce(&mut Ledger) -> Result<T>) -> Result<T> {
        let snapshot = self.ledger.clone();
        let outcome = op(&mut self.ledger).and_then(|value| {
            if self.autosave {
                self.store.save(&self.ledger)?;
            }
            Ok(value)
        });
        if let Err(err) = &outcome {
            warn!(error = %err, "operation failed; ledger restored");
            self.ledger = snapshot;
        }
        outcome
    }

    fn report_warnings(ledger: &Ledger) {
        for warning in ledger.warnings() {
            warn!(ledger = %ledger.name, "{}", warning);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    #[test]
    fn failed_operation_restores_state() {
        let mut manager = LedgerManager::open(Box::new(MemoryStore::new()), "Facade").unwrap();
        let savings = manager
            .open_account(
                TrackableAccount::accumulator("Savings", None),
                Money::from_cents(1_000),
                day(1),
            )
            .unwrap();
        let before = manager.ledger().mutations.len();

        let err = manager
            .transfer_between(savings, Uuid::new_v4(), Money::from_cents(10), day(2), None)
            .unwrap_err();
        assert!(matches!(err, BudgetError::AccountNotFound(_)));
        assert_eq!(manager.ledger().mutations.len(), before);
        assert_eq!(
            manager.current_balance(savings).unwrap(),
            Some(Money::from_cents(1_000))
        );
    }

    #[test]
    fn autosave_writes_through() {
        let mut manager = LedgerManager::open(Box::new(MemoryStore::new()), "Facade").unwrap();
        manager
            .open_account(
                TrackableAccount::accumulator("Savings", None),
                Money::ZERO,
                day(1),
            )
            .unwrap();
        let stored = manager.store().load().unwrap().unwrap();
        assert_eq!(stored.accounts.len(), 1);

        manager.set_autosave(false);
        manager
            .open_account(
                TrackableAccount::accumulator("Trip", None),
                Money::ZERO,
                day(1),
            )
            .unwrap();
        assert_eq!(manager.store().load().unwrap().unwrap().accounts.len(), 1);
        manager.save().unwrap();
        assert_eq!(manager.store().load().unwrap().unwrap().accounts.len(), 2);
    }

    struct ReadOnlyStore;

    impl RecordStore for ReadOnlyStore {
        fn load(&self) -> Result<Option<Ledger>> {
            Ok(None)
        }

        fn save(&self, _ledger: &Ledger) -> Result<()> {
            Err(BudgetError::Storage("read-only store".into()))
        }

        fn describe(&self) -> String {
            "read-only".into()
        }
    }

    #[test]
    fn failed_save_discards_the_change() {
        let mut manager = LedgerManager::open(Box::new(ReadOnlyStore), "Facade").unwrap();
        for _ in 0..2 {
            let err = manager
                .open_account(
                    TrackableAccount::accumulator("Savings", None),
                    Money::from_cents(1_000),
                    day(1),
                )
                .unwrap_err();
            assert!(matches!(err, BudgetError::Storage(_)));
            assert!(manager.ledger().accounts.is_empty());
            assert!(manager.ledger().history.histories().next().is_none());
        }
    }

    #[test]
    fn balances_before_opening_are_absent() {
        let mut ledger = Ledger::new("Stored");
        let empty = AccountService::open(
            &mut ledger,
            TrackableAccount::accumulator("Empty", None),
            Money::ZERO,
            day(10),
        )
        .unwrap();
        let store = MemoryStore::with_ledger(&ledger).unwrap();
        let manager = LedgerManager::open(Box::new(store), "Ignored").unwrap();

        assert_eq!(manager.ledger().name, "Stored");
        assert_eq!(manager.balance_as_of(empty, day(9)).unwrap(), None);
        assert_eq!(manager.balance_as_of(empty, day(10)).unwrap(), Some(Money::ZERO));
        assert_eq!(manager.current_balance(empty).unwrap(), Some(Money::ZERO));
    }

    #[test]
    fn unknown_account_queries_fail() {
        let manager = LedgerManager::open(Box::new(MemoryStore::new()), "Facade").unwrap();
        assert!(manager.current_balance(Uuid::new_v4()).is_err());
        assert!(manager.account_history(Uuid::new_v4()).is_err());
    }
}
