use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    core::errors::BudgetError,
    domain::{
        AccountKind, LastPayment, Money, Mutation, MutationKind, MutationOrigin,
        PaymentFrequency, PayPeriod, RolloverLeg,
    },
    ledger::Ledger,
};

/// Bucket for spending recorded without a category.
pub const UNCATEGORIZED: &str = "Uncategorized";

use super::{RolloverService, ServiceResult};

/// Read-only view of one budget week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekSummary {
    pub number: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub base_allocation: Money,
    /// Signed sum of the period transfers owned by the week.
    pub carried_in: Money,
    pub starting_balance: Money,
    pub income: Money,
    pub spent: Money,
    pub remaining: Money,
    pub mutation_count: usize,
    pub period_processed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub period: PayPeriod,
    pub first: Option<WeekSummary>,
    pub second: Option<WeekSummary>,
    pub week_to_week: Option<Money>,
    pub week_to_accumulator: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountStatus {
    pub account_id: Uuid,
    pub name: String,
    pub kind: AccountKind,
    pub balance: Money,
    pub target_amount: Option<Money>,
    /// Capped at 100.
    pub progress_percent: Option<f64>,
    pub remaining_to_target: Option<Money>,
    pub active: bool,
    pub is_default_rollover: bool,
    pub payment_frequency: Option<PaymentFrequency>,
    pub last_payment: Option<LastPayment>,
}

/// Totals over every recorded mutation. Generated rollovers are left out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashFlowSummary {
    pub income: Money,
    /// Spending flagged for analytics only.
    pub spending: Money,
    pub reserve_payouts: Money,
    pub accumulator_contributions: Money,
    /// `income - spending - reserve_payouts`.
    pub net: Money,
}

pub struct SummaryService;

impl SummaryService {
    pub fn week_summary(ledger: &Ledger, number: u32) -> ServiceResult<WeekSummary> {
        let week = ledger
            .week(number)
            .ok_or(BudgetError::WeekNotFound(number))?;
        let owned = ledger.mutations_for_week(number);
        let carried_in: Money = owned
            .iter()
            .filter(|mutation| mutation.kind.is_period_transfer())
            .map(|mutation| mutation.signed_amount())
            .sum();
        let income: Money = owned
            .iter()
            .filter(|mutation| mutation.kind == MutationKind::Income)
            .map(|mutation| mutation.magnitude)
            .sum();
        let spent = RolloverService::spent_in_week(ledger, number);
        let starting_balance = week.base_allocation + carried_in;

        Ok(WeekSummary {
            number,
            start_date: week.start_date,
            end_date: week.end_date,
            base_allocation: week.base_allocation,
            carried_in,
            starting_balance,
            income,
            spent,
            remaining: starting_balance - spent,
            mutation_count: owned.len(),
            period_processed: week.period_processed,
        })
    }

    pub fn period_summary(ledger: &Ledger, week: u32) -> ServiceResult<PeriodSummary> {
        let period = PayPeriod::containing(week)?;
        let leg = |leg: RolloverLeg| {
            ledger
                .mutations
                .iter()
                .find(|mutation| {
                    mutation.origin == MutationOrigin::Rollover(leg)
                        && mutation.owner_week == Some(period.second())
                })
                .map(|mutation| mutation.signed_amount())
        };
        Ok(PeriodSummary {
            period,
            first: Self::week_summary(ledger, period.first()).ok(),
            second: Self::week_summary(ledger, period.second()).ok(),
            week_to_week: leg(RolloverLeg::WeekToWeek),
            week_to_accumulator: leg(RolloverLeg::WeekToAccumulator),
        })
    }

    /// Balance and goal progress, read as of `as_of` or at the latest entry.
    pub fn account_status(
        ledger: &Ledger,
        id: Uuid,
        as_of: Option<NaiveDate>,
    ) -> ServiceResult<AccountStatus> {
        let account = ledger.require_account(id)?;
        let balance = match as_of {
            Some(date) => ledger.balance_as_of(id, date),
            None => ledger.current_balance(id),
        }
        .unwrap_or(Money::ZERO);

        let target = account.target_amount.filter(|target| *target > Money::ZERO);
        let progress_percent = target.map(|target| {
            (balance.cents() as f64 / target.cents() as f64 * 100.0).clamp(0.0, 100.0)
        });
        let remaining_to_target = target.map(|target| (target - balance).max(Money::ZERO));
        let active = as_of
            .or_else(|| ledger.history.history(id)?.entries().last().map(|entry| entry.date))
            .map_or(true, |date| account.is_active_on(date));

        Ok(AccountStatus {
            account_id: id,
            name: account.name.clone(),
            kind: account.kind,
            balance,
            target_amount: account.target_amount,
            progress_percent,
            remaining_to_target,
            active,
            is_default_rollover: account.is_default_rollover,
            payment_frequency: account.payment_frequency,
            last_payment: account.last_payment,
        })
    }

    pub fn account_statuses(ledger: &Ledger, as_of: Option<NaiveDate>) -> Vec<AccountStatus> {
        ledger
            .accounts
            .iter()
            .filter_map(|account| Self::account_status(ledger, account.id, as_of).ok())
            .collect()
    }

    /// Spending totals keyed by category.
    pub fn spending_by_category(ledger: &Ledger, analytics_only: bool) -> BTreeMap<String, Money> {
        let mut totals = BTreeMap::new();
        for mutation in Self::spending(ledger, analytics_only) {
            let category = mutation
                .category
                .as_deref()
                .filter(|category| !category.trim().is_empty())
                .unwrap_or(UNCATEGORIZED);
            *totals.entry(category.to_string()).or_insert(Money::ZERO) += mutation.magnitude;
        }
        totals
    }

    /// Spending totals keyed by owning week.
    pub fn spending_by_week(ledger: &Ledger, analytics_only: bool) -> BTreeMap<u32, Money> {
        let mut totals = BTreeMap::new();
        for mutation in Self::spending(ledger, analytics_only) {
            if let Some(week) = mutation.owner_week {
                *totals.entry(week).or_insert(Money::ZERO) += mutation.magnitude;
            }
        }
        totals
    }

    pub fn cash_flow(ledger: &Ledger) -> CashFlowSummary {
        let total = |kind: MutationKind| -> Money {
            ledger
                .mutations
                .iter()
                .filter(|mutation| mutation.kind == kind && !mutation.is_rollover())
                .map(|mutation| mutation.magnitude)
                .sum()
        };
        let income = total(MutationKind::Income);
        let spending: Money = Self::spending(ledger, true)
            .map(|mutation| mutation.magnitude)
            .sum();
        let reserve_payouts = total(MutationKind::ReservePayout);
        CashFlowSummary {
            income,
            spending,
            reserve_payouts,
            accumulator_contributions: total(MutationKind::AccumulatorContribution),
            net: income - spending - reserve_payouts,
        }
    }

    fn spending(ledger: &Ledger, analytics_only: bool) -> impl Iterator<Item = &Mutation> {
        ledger.mutations.iter().filter(move |mutation| {
            mutation.kind == MutationKind::Spending
                && (!analytics_only || mutation.include_in_analytics)
        })
    }
}
