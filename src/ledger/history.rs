//! Per-account change histories with point-in-time running balances.
//!
//! Every account owns a vector of [`ChangeEntry`] values kept sorted by
//! `(date, sequence)`. Each write re-derives the running balance of the
//! touched entry and everything after it in one pass seeded by the
//! predecessor's balance, so a historical insert, edit or delete always leaves
//! `balance[i] == balance[i - 1] + amount[i]`.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::{
    core::errors::{BudgetError, Result},
    domain::{AccountKind, ChangeEntry, Money},
};

/// Identifies the history an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountKey {
    pub account_id: Uuid,
    pub kind: AccountKind,
}

impl AccountKey {
    pub fn new(account_id: Uuid, kind: AccountKind) -> Self {
        Self { account_id, kind }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountHistory {
    pub account_id: Uuid,
    pub kind: AccountKind,
    entries: Vec<ChangeEntry>,
}

impl AccountHistory {
    fn new(key: AccountKey) -> Self {
        Self {
            account_id: key.account_id,
            kind: key.kind,
            entries: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[ChangeEntry] {
        &self.entries
    }

    pub fn opening(&self) -> Option<&ChangeEntry> {
        self.entries.iter().find(|entry| entry.is_opening())
    }

    fn position(&self, entry_id: Uuid) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id == entry_id)
    }

    /// Index at which an entry with this sort key keeps the vector ordered.
    fn insertion_point(&self, date: NaiveDate, sequence: u64) -> usize {
        self.entries
            .partition_point(|entry| entry.sort_key() <= (date, sequence))
    }

    fn earliest_mutation_date(&self) -> Option<NaiveDate> {
        self.entries
            .iter()
            .filter(|entry| !entry.is_opening())
            .map(|entry| entry.date)
            .min()
    }

    /// Recomputes balances from `start` to the end, seeded by the predecessor.
    fn propagate_from(&mut self, start: usize) {
        let mut running = match start {
            0 => Money::ZERO,
            n => self.entries[n - 1].balance,
        };
        for entry in self.entries.iter_mut().skip(start) {
            running += entry.amount;
            entry.balance = running;
        }
    }

    /// Re-sorts and replays every entry from zero.
    fn rebuild(&mut self) {
        self.entries.sort_by_key(ChangeEntry::sort_key);
        self.propagate_from(0);
    }

    /// Moves the opening entry to the day before the earliest mutation entry
    /// when it no longer precedes it. Returns whether a rebuild happened.
    fn enforce_opening_precedence(&mut self) -> bool {
        let Some(earliest) = self.earliest_mutation_date() else {
            return false;
        };
        let Some(opening) = self.entries.iter_mut().find(|entry| entry.is_opening()) else {
            return false;
        };
        if opening.date <= earliest {
            return false;
        }
        let relocated = earliest - Duration::days(1);
        debug!(
            account = %self.account_id,
            from = %opening.date,
            to = %relocated,
            "relocating opening entry ahead of earlier mutation"
        );
        opening.date = relocated;
        self.rebuild();
        true
    }
}

/// Owns every account history; the single writer of running balances.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryBook {
    #[serde(default)]
    accounts: BTreeMap<Uuid, AccountHistory>,
    #[serde(default)]
    next_sequence: u64,
}

impl HistoryBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the opening entry for a new account.
    pub fn open_account(
        &mut self,
        key: AccountKey,
        opening_balance: Money,
        date: NaiveDate,
        note: Option<String>,
    ) -> Result<Uuid> {
        let id = self.post_entry(key, opening_balance, date, None)?;
        if let Some(entry) = self.entry_mut(id) {
            entry.note = note;
        }
        Ok(id)
    }

    /// Inserts a dated change at its chronological position and propagates
    /// running balances forward from there.
    ///
    /// An entry without `source_mutation` is the account's opening entry; an
    /// account may hold only one. Any other entry requires an opened account.
    pub fn post_entry(
        &mut self,
        key: AccountKey,
        amount: Money,
        date: NaiveDate,
        source_mutation: Option<Uuid>,
    ) -> Result<Uuid> {
        match (self.accounts.get(&key.account_id), source_mutation) {
            (Some(history), None) if history.opening().is_some() => {
                return Err(BudgetError::OpeningEntryConflict(format!(
                    "account {} already has an opening entry",
                    key.account_id
                )));
            }
            (Some(history), _) if history.kind != key.kind => {
                return Err(BudgetError::AccountNotFound(format!(
                    "{} is not a {:?} account",
                    key.account_id, key.kind
                )));
            }
            (Some(history), Some(_)) if history.opening().is_none() => {
                return Err(BudgetError::AccountNotFound(format!(
                    "account {} has no opening entry",
                    key.account_id
                )));
            }
            (None, Some(_)) => {
                return Err(BudgetError::AccountNotFound(key.account_id.to_string()));
            }
            _ => {}
        }

        let sequence = self.next_sequence();
        let history = self
            .accounts
            .entry(key.account_id)
            .or_insert_with(|| AccountHistory::new(key));
        let entry = ChangeEntry {
            id: Uuid::new_v4(),
            account_id: key.account_id,
            account_kind: key.kind,
            amount,
            date,
            source_mutation,
            balance: Money::ZERO,
            note: None,
            sequence,
        };
        let id = entry.id;
        let index = history.insertion_point(date, sequence);
        history.entries.insert(index, entry);

        if !history.enforce_opening_precedence() {
            history.propagate_from(index);
        }
        Ok(id)
    }

    /// Rewrites an entry's amount and/or date, then re-derives balances.
    ///
    /// Stored fields are overwritten first; propagation reads them back to
    /// seed the pass.
    pub fn update_entry(
        &mut self,
        entry_id: Uuid,
        new_amount: Option<Money>,
        new_date: Option<NaiveDate>,
    ) -> Result<()> {
        let history = self
            .history_containing_mut(entry_id)
            .ok_or(BudgetError::EntryNotFound(entry_id))?;
        let old_index = history
            .position(entry_id)
            .ok_or(BudgetError::EntryNotFound(entry_id))?;

        if let Some(date) = new_date {
            let entry = &history.entries[old_index];
            if entry.is_opening() {
                if let Some(earliest) = history.earliest_mutation_date() {
                    if date > earliest {
                        return Err(BudgetError::Validation(format!(
                            "opening entry cannot move past the first mutation on {}",
                            earliest
                        )));
                    }
                }
            }
        }

        let entry = &mut history.entries[old_index];
        if let Some(amount) = new_amount {
            entry.amount = amount;
        }
        let mut start = old_index;
        if let Some(date) = new_date.filter(|date| *date != entry.date) {
            entry.date = date;
            let moved = history.entries.remove(old_index);
            let new_index = history.insertion_point(moved.date, moved.sequence);
            history.entries.insert(new_index, moved);
            start = start.min(new_index);
        }

        if !history.enforce_opening_precedence() {
            history.propagate_from(start);
        }
        Ok(())
    }

    /// Removes an entry and re-seeds everything after it from the new predecessor.
    pub fn delete_entry(&mut self, entry_id: Uuid) -> Result<ChangeEntry> {
        let history = self
            .history_containing_mut(entry_id)
            .ok_or(BudgetError::EntryNotFound(entry_id))?;
        let index = history
            .position(entry_id)
            .ok_or(BudgetError::EntryNotFound(entry_id))?;
        if history.entries[index].is_opening() {
            return Err(BudgetError::Validation(
                "the opening entry is only removed together with its account".into(),
            ));
        }
        let removed = history.entries.remove(index);
        history.propagate_from(index);
        Ok(removed)
    }

    /// Balance of the last entry dated on or before `date`.
    pub fn balance_as_of(&self, account_id: Uuid, date: NaiveDate) -> Option<Money> {
        let entries = &self.accounts.get(&account_id)?.entries;
        let upto = entries.partition_point(|entry| entry.date <= date);
        upto.checked_sub(1).map(|index| entries[index].balance)
    }

    /// Balance of the chronologically last entry.
    pub fn current_balance(&self, account_id: Uuid) -> Option<Money> {
        self.accounts
            .get(&account_id)?
            .entries
            .last()
            .map(|entry| entry.balance)
    }

    /// Full replay from zero, used after the opening entry moves.
    pub fn rebuild_account(&mut self, account_id: Uuid) -> Result<()> {
        let history = self
            .accounts
            .get_mut(&account_id)
            .ok_or_else(|| BudgetError::AccountNotFound(account_id.to_string()))?;
        history.rebuild();
        Ok(())
    }

    /// Removes an account's whole history.
    pub fn purge_account(&mut self, account_id: Uuid) -> Option<AccountHistory> {
        self.accounts.remove(&account_id)
    }

    pub fn has_account(&self, account_id: Uuid) -> bool {
        self.accounts.contains_key(&account_id)
    }

    pub fn history(&self, account_id: Uuid) -> Option<&AccountHistory> {
        self.accounts.get(&account_id)
    }

    pub fn histories(&self) -> impl Iterator<Item = &AccountHistory> {
        self.accounts.values()
    }

    pub fn entry(&self, entry_id: Uuid) -> Option<&ChangeEntry> {
        self.accounts
            .values()
            .flat_map(|history| history.entries.iter())
            .find(|entry| entry.id == entry_id)
    }

    pub fn entry_for_mutation(&self, mutation_id: Uuid) -> Option<&ChangeEntry> {
        self.accounts
            .values()
            .flat_map(|history| history.entries.iter())
            .find(|entry| entry.source_mutation == Some(mutation_id))
    }

    /// Checks ordering and the running-balance recurrence for one account.
    pub fn verify(&self, account_id: Uuid) -> Result<()> {
        let history = self
            .accounts
            .get(&account_id)
            .ok_or_else(|| BudgetError::AccountNotFound(account_id.to_string()))?;
        let mut running = Money::ZERO;
        let mut previous: Option<(NaiveDate, u64)> = None;
        for entry in &history.entries {
            if previous.map_or(false, |key| key > entry.sort_key()) {
                return Err(BudgetError::Validation(format!(
                    "entry {} is out of chronological order",
                    entry.id
                )));
            }
            running += entry.amount;
            if entry.balance != running {
                return Err(BudgetError::Validation(format!(
                    "entry {} holds balance {} but its history sums to {}",
                    entry.id, entry.balance, running
                )));
            }
            previous = Some(entry.sort_key());
        }
        Ok(())
    }

    /// Runs [`HistoryBook::verify`] over every account.
    pub fn verify_all(&self) -> Result<()> {
        self.accounts
            .keys()
            .try_for_each(|account_id| self.verify(*account_id))
    }

    fn next_sequence(&mut self) -> u64 {
        self.next_sequence += 1;
        self.next_sequence
    }

    fn entry_mut(&mut self, entry_id: Uuid) -> Option<&mut ChangeEntry> {
        self.accounts
            .values_mut()
            .flat_map(|history| history.entries.iter_mut())
            .find(|entry| entry.id == entry_id)
    }

    fn history_containing_mut(&mut self, entry_id: Uuid) -> Option<&mut AccountHistory> {
        self.accounts
            .values_mut()
            .find(|history| history.position(entry_id).is_some())
    }
}
