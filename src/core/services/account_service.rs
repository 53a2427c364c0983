use std::collections::BTreeSet;

use chrono::NaiveDate;
use tracing::info;
use uuid::Uuid;

use crate::{
    core::errors::BudgetError,
    domain::{AccountKind, ActivationPeriod, Money, PaymentFrequency, TrackableAccount},
    ledger::{AccountKey, Ledger},
};

use super::{MutationService, ServiceResult};

const MAX_BASIS_POINTS: u32 = 10_000;

/// Editable account attributes. Identity, kind and history stay untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountChanges {
    pub name: Option<String>,
    pub target_amount: Option<Option<Money>>,
    pub per_period_deduction: Option<Money>,
    pub deduction_basis_points: Option<u32>,
    pub payment_frequency: Option<Option<PaymentFrequency>>,
    pub is_variable: Option<bool>,
    pub notes: Option<Option<String>>,
}

pub struct AccountService;

impl AccountService {
    /// Registers an account and posts its opening entry.
    pub fn open(
        ledger: &mut Ledger,
        account: TrackableAccount,
        opening_balance: Money,
        opened_on: NaiveDate,
    ) -> ServiceResult<Uuid> {
        Self::validate_name(ledger, None, &account.name)?;
        Self::validate_amounts(&account)?;
        if account.is_default_rollover && account.kind != AccountKind::Accumulator {
            return Err(BudgetError::Validation(
                "only accumulators can receive period rollovers".into(),
            ));
        }

        let id = account.id;
        let key = AccountKey::new(id, account.kind);
        let note = format!("Opening balance for {}", account.name);
        if account.is_default_rollover {
            Self::clear_default_rollover(ledger);
        }
        info!(account = %account.name, kind = ?account.kind, %opening_balance, "account opened");
        ledger.accounts.push(account);
        if let Err(err) = ledger
            .history
            .open_account(key, opening_balance, opened_on, Some(note))
        {
            ledger.accounts.retain(|account| account.id != id);
            return Err(err);
        }
        ledger.touch();
        Ok(id)
    }

    pub fn edit(ledger: &mut Ledger, id: Uuid, changes: AccountChanges) -> ServiceResult<()> {
        let mut updated = ledger.require_account(id)?.clone();
        if let Some(name) = changes.name {
            Self::validate_name(ledger, Some(id), &name)?;
            updated.name = name;
        }
        if let Some(target) = changes.target_amount {
            updated.target_amount = target;
        }
        if let Some(deduction) = changes.per_period_deduction {
            updated.per_period_deduction = deduction;
        }
        if let Some(basis_points) = changes.deduction_basis_points {
            updated.deduction_basis_points = basis_points;
        }
        if let Some(frequency) = changes.payment_frequency {
            updated.payment_frequency = frequency;
        }
        if let Some(variable) = changes.is_variable {
            updated.is_variable = variable;
        }
        if let Some(notes) = changes.notes {
            updated.notes = notes;
        }
        Self::validate_amounts(&updated)?;

        if let Some(account) = ledger.account_mut(id) {
            *account = updated;
        }
        ledger.touch();
        Ok(())
    }

    /// Makes `id` the only accumulator that receives period rollovers.
    ///
    /// Periods are not recalculated here; the next recalculation of a period
    /// moves its rollover to the new account.
    pub fn set_default_rollover(ledger: &mut Ledger, id: Uuid) -> ServiceResult<()> {
        let account = ledger.require_account(id)?;
        if account.kind != AccountKind::Accumulator {
            return Err(BudgetError::Validation(format!(
                "`{}` is not an accumulator",
                account.name
            )));
        }
        Self::clear_default_rollover(ledger);
        if let Some(account) = ledger.account_mut(id) {
            account.is_default_rollover = true;
        }
        ledger.touch();
        Ok(())
    }

    /// Closes the account's open activation period at `on`.
    pub fn deactivate(ledger: &mut Ledger, id: Uuid, on: NaiveDate) -> ServiceResult<()> {
        let opened = ledger
            .history
            .history(id)
            .and_then(|history| history.opening())
            .map(|entry| entry.date);
        let account = ledger
            .account_mut(id)
            .ok_or_else(|| BudgetError::AccountNotFound(id.to_string()))?;
        let open = account
            .activation_periods
            .iter()
            .position(|period| period.is_open());
        match open {
            Some(index) => {
                let period = &mut account.activation_periods[index];
                if on < period.start {
                    return Err(BudgetError::Validation(format!(
                        "cannot deactivate before the activation start {}",
                        period.start
                    )));
                }
                period.end = Some(on);
            }
            None if account.activation_periods.is_empty() => {
                let start = opened.unwrap_or(on).min(on);
                account.activation_periods.push(ActivationPeriod {
                    start,
                    end: Some(on),
                });
            }
            None => {
                return Err(BudgetError::Validation(format!(
                    "`{}` is already inactive",
                    account.name
                )));
            }
        }
        ledger.touch();
        Ok(())
    }

    /// Opens a new activation period starting at `from`.
    pub fn reactivate(ledger: &mut Ledger, id: Uuid, from: NaiveDate) -> ServiceResult<()> {
        let account = ledger
            .account_mut(id)
            .ok_or_else(|| BudgetError::AccountNotFound(id.to_string()))?;
        if account.activation_periods.is_empty()
            || account.activation_periods.iter().any(|period| period.is_open())
        {
            return Err(BudgetError::Validation(format!(
                "`{}` is already active",
                account.name
            )));
        }
        if let Some(last_end) = account
            .activation_periods
            .iter()
            .filter_map(|period| period.end)
            .max()
        {
            if from <= last_end {
                return Err(BudgetError::Validation(format!(
                    "reactivation must start after {}",
                    last_end
                )));
            }
        }
        account
            .activation_periods
            .push(ActivationPeriod { start: from, end: None });
        ledger.touch();
        Ok(())
    }

    /// Removes an account together with its history and every mutation that
    /// targets it, then recalculates the periods those mutations touched.
    pub fn purge(ledger: &mut Ledger, id: Uuid) -> ServiceResult<TrackableAccount> {
        ledger.require_account(id)?;
        let targeting: Vec<Uuid> = ledger
            .mutations_for_account(id)
            .into_iter()
            .map(|mutation| mutation.id)
            .collect();

        let mut affected = BTreeSet::new();
        for mutation_id in targeting {
            if let Some(removed) = ledger.take_mutation(mutation_id) {
                if removed.can_trigger_recalculation() || removed.is_rollover() {
                    affected.extend(removed.owner_week);
                }
            }
        }
        ledger.history.purge_account(id);
        let index = ledger
            .accounts
            .iter()
            .position(|account| account.id == id)
            .ok_or_else(|| BudgetError::AccountNotFound(id.to_string()))?;
        let account = ledger.accounts.remove(index);
        ledger.touch();
        info!(account = %account.name, "account purged");

        MutationService::recalculate_affected(ledger, affected)?;
        Ok(account)
    }

    pub fn list(ledger: &Ledger) -> Vec<&TrackableAccount> {
        ledger.accounts.iter().collect()
    }

    pub fn find_by_name<'a>(ledger: &'a Ledger, name: &str) -> Option<&'a TrackableAccount> {
        let normalized = name.trim().to_ascii_lowercase();
        ledger
            .accounts
            .iter()
            .find(|account| account.name.trim().to_ascii_lowercase() == normalized)
    }

    fn clear_default_rollover(ledger: &mut Ledger) {
        for account in &mut ledger.accounts {
            account.is_default_rollover = false;
        }
    }

    fn validate_amounts(account: &TrackableAccount) -> ServiceResult<()> {
        if account.per_period_deduction.is_negative() {
            return Err(BudgetError::NegativeMagnitude(
                account.per_period_deduction.cents(),
            ));
        }
        if account.deduction_basis_points > MAX_BASIS_POINTS {
            return Err(BudgetError::Validation(format!(
                "`{}` cannot set aside more than 100% of a paycheck",
                account.name
            )));
        }
        if account.kind == AccountKind::Accumulator
            && (account.payment_frequency.is_some() || account.is_variable)
        {
            return Err(BudgetError::Validation(format!(
                "payment schedules apply to reserves, `{}` is an accumulator",
                account.name
            )));
        }
        match (account.kind, account.target_amount) {
            (_, Some(target)) if target.is_negative() => {
                Err(BudgetError::NegativeMagnitude(target.cents()))
            }
            (AccountKind::Reserve, None) => Err(BudgetError::Validation(format!(
                "reserve `{}` needs a target amount",
                account.name
            ))),
            _ => Ok(()),
        }
    }

    fn validate_name(ledger: &Ledger, exclude: Option<Uuid>, candidate: &str) -> ServiceResult<()> {
        if candidate.trim().is_empty() {
            return Err(BudgetError::Validation("account name cannot be empty".into()));
        }
        let normalized = candidate.trim().to_ascii_lowercase();
        let duplicate = ledger.accounts.iter().any(|account| {
            let name = account.name.trim().to_ascii_lowercase();
            name == normalized && exclude.map_or(true, |id| account.id != id)
        });
        if duplicate {
            Err(BudgetError::Validation(format!(
                "Account `{}` already exists",
                candidate
            )))
        } else {
            Ok(())
        }
    }
}
