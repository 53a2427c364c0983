use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    core::errors::{BudgetError, Result},
    domain::{
        AccountKind, BudgetWeek, LastPayment, Money, Mutation, MutationKind, NewMutation,
        PayPeriod, Reimbursement, TrackableAccount,
    },
};

use super::{
    history::{AccountKey, HistoryBook},
    suppression::CascadeSuppression,
};

pub const CURRENT_SCHEMA_VERSION: u8 = 1;

/// Complete persisted state: accounts, weeks, mutations and their histories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub accounts: Vec<TrackableAccount>,
    #[serde(default)]
    pub weeks: Vec<BudgetWeek>,
    #[serde(default)]
    pub mutations: Vec<Mutation>,
    #[serde(default)]
    pub history: HistoryBook,
    /// Side-tracked expenses; never part of the budget figures.
    #[serde(default)]
    pub reimbursements: Vec<Reimbursement>,
    #[serde(default)]
    next_mutation_sequence: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default = "Ledger::schema_version_default")]
    pub schema_version: u8,
    #[serde(skip)]
    cascade: CascadeSuppression,
}

impl Ledger {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            accounts: Vec::new(),
            weeks: Vec::new(),
            mutations: Vec::new(),
            history: HistoryBook::new(),
            reimbursements: Vec::new(),
            next_mutation_sequence: 0,
            created_at: now,
            updated_at: now,
            schema_version: CURRENT_SCHEMA_VERSION,
            cascade: CascadeSuppression::default(),
        }
    }

    pub fn account(&self, id: Uuid) -> Option<&TrackableAccount> {
        self.accounts.iter().find(|account| account.id == id)
    }

    pub fn account_mut(&mut self, id: Uuid) -> Option<&mut TrackableAccount> {
        self.accounts.iter_mut().find(|account| account.id == id)
    }

    pub fn require_account(&self, id: Uuid) -> Result<&TrackableAccount> {
        self.account(id)
            .ok_or_else(|| BudgetError::AccountNotFound(id.to_string()))
    }

    pub fn account_key(&self, id: Uuid) -> Result<AccountKey> {
        self.require_account(id)
            .map(|account| AccountKey::new(account.id, account.kind))
    }

    /// The accumulator that receives end-of-period rollovers, if one is flagged.
    pub fn default_rollover_account(&self) -> Option<&TrackableAccount> {
        self.accounts
            .iter()
            .find(|account| account.kind == AccountKind::Accumulator && account.is_default_rollover)
    }

    pub fn week(&self, number: u32) -> Option<&BudgetWeek> {
        self.weeks.iter().find(|week| week.number == number)
    }

    pub fn week_mut(&mut self, number: u32) -> Option<&mut BudgetWeek> {
        self.weeks.iter_mut().find(|week| week.number == number)
    }

    /// Both weeks of `period`, or `None` while either is missing.
    pub fn period_weeks(&self, period: PayPeriod) -> Option<(&BudgetWeek, &BudgetWeek)> {
        Some((self.week(period.first())?, self.week(period.second())?))
    }

    /// Inserts a week or overwrites its dates and base allocation.
    /// Week numbers start at 1.
    pub fn upsert_week(
        &mut self,
        number: u32,
        start_date: NaiveDate,
        base: Money,
    ) -> Result<&BudgetWeek> {
        if number == 0 {
            return Err(BudgetError::InvalidPeriod("week numbers start at 1".into()));
        }
        let fresh = BudgetWeek::new(number, start_date, base);
        let index = match self.weeks.iter().position(|week| week.number == number) {
            Some(index) => {
                let week = &mut self.weeks[index];
                week.start_date = fresh.start_date;
                week.end_date = fresh.end_date;
                week.base_allocation = fresh.base_allocation;
                index
            }
            None => {
                let index = self.weeks.partition_point(|week| week.number < number);
                self.weeks.insert(index, fresh);
                index
            }
        };
        self.touch();
        Ok(&self.weeks[index])
    }

    pub fn mutation(&self, id: Uuid) -> Option<&Mutation> {
        self.mutations.iter().find(|mutation| mutation.id == id)
    }

    pub fn mutation_mut(&mut self, id: Uuid) -> Option<&mut Mutation> {
        self.mutations.iter_mut().find(|mutation| mutation.id == id)
    }

    /// Mutations owned by week `number`, ordered by value date then creation.
    ///
    /// Ownership is the explicit `owner_week` field, never the value date.
    pub fn mutations_for_week(&self, number: u32) -> Vec<&Mutation> {
        let mut owned: Vec<&Mutation> = self
            .mutations
            .iter()
            .filter(|mutation| mutation.owner_week == Some(number))
            .collect();
        owned.sort_by_key(|mutation| (mutation.value_date, mutation.sequence));
        owned
    }

    pub fn mutations_for_account(&self, account_id: Uuid) -> Vec<&Mutation> {
        self.mutations
            .iter()
            .filter(|mutation| mutation.account_id == Some(account_id))
            .collect()
    }

    /// Re-derives an account's last payment from its reserve payouts.
    pub(crate) fn refresh_last_payment(&mut self, account_id: Uuid) {
        let latest = self
            .mutations
            .iter()
            .filter(|mutation| {
                mutation.account_id == Some(account_id)
                    && mutation.kind == MutationKind::ReservePayout
            })
            .max_by_key(|mutation| (mutation.value_date, mutation.sequence))
            .map(|mutation| LastPayment {
                date: mutation.value_date,
                amount: mutation.magnitude,
            });
        if let Some(account) = self.account_mut(account_id) {
            account.last_payment = latest;
        }
    }

    /// Stores a validated mutation and returns its identifier.
    pub(crate) fn record_mutation(&mut self, draft: NewMutation) -> Uuid {
        self.next_mutation_sequence += 1;
        let mutation = Mutation {
            id: Uuid::new_v4(),
            kind: draft.kind,
            magnitude: draft.magnitude,
            value_date: draft.value_date,
            owner_week: draft.owner_week,
            account_id: draft.account_id,
            origin: draft.origin,
            transfer_group: draft.transfer_group,
            category: draft.category,
            note: draft.note,
            include_in_analytics: draft.include_in_analytics,
            sequence: self.next_mutation_sequence,
            created_at: Utc::now(),
        };
        let id = mutation.id;
        self.mutations.push(mutation);
        self.touch();
        id
    }

    pub(crate) fn take_mutation(&mut self, id: Uuid) -> Option<Mutation> {
        let index = self.mutations.iter().position(|mutation| mutation.id == id)?;
        self.touch();
        Some(self.mutations.remove(index))
    }

    pub fn reimbursement(&self, id: Uuid) -> Option<&Reimbursement> {
        self.reimbursements.iter().find(|item| item.id == id)
    }

    pub fn reimbursement_mut(&mut self, id: Uuid) -> Option<&mut Reimbursement> {
        self.reimbursements.iter_mut().find(|item| item.id == id)
    }

    pub fn cascade(&self) -> &CascadeSuppression {
        &self.cascade
    }

    pub fn current_balance(&self, account_id: Uuid) -> Option<Money> {
        self.history.current_balance(account_id)
    }

    pub fn balance_as_of(&self, account_id: Uuid, date: NaiveDate) -> Option<Money> {
        self.history.balance_as_of(account_id, date)
    }

    /// Detects dangling references and broken running balances.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for mutation in &self.mutations {
            if let Some(account_id) = mutation.account_id {
                if self.account(account_id).is_none() {
                    warnings.push(format!(
                        "mutation {} references unknown account {}",
                        mutation.id, account_id
                    ));
                } else if self.history.entry_for_mutation(mutation.id).is_none() {
                    warnings.push(format!("mutation {} has no ledger entry", mutation.id));
                }
            }
            if let Some(week) = mutation.owner_week {
                if self.week(week).is_none() {
                    warnings.push(format!(
                        "mutation {} is owned by missing week {}",
                        mutation.id, week
                    ));
                }
            }
        }
        for account in &self.accounts {
            if let Err(err) = self.history.verify(account.id) {
                warnings.push(format!("account {}: {}", account.name, err));
            }
        }
        warnings
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn schema_version_default() -> u8 {
        CURRENT_SCHEMA_VERSION
    }
}
