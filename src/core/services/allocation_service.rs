use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    core::errors::BudgetError,
    domain::{
        week::DAYS_PER_WEEK, AccountKind, Money, MutationKind, MutationOrigin, NewMutation,
        PayPeriod,
    },
    ledger::Ledger,
};

use super::{MutationService, RecalcOutcome, RolloverService, ServiceResult};

/// Result of splitting one paycheck across a pay period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaycheckSplit {
    pub gross: Money,
    pub reserve_deductions: Money,
    pub accumulator_deductions: Money,
    pub spendable: Money,
    /// Rounded down when `spendable` has an odd cent.
    pub week1_base: Money,
    pub week2_base: Money,
}

impl PaycheckSplit {
    pub fn total_deductions(&self) -> Money {
        self.reserve_deductions + self.accumulator_deductions
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaycheckRequest {
    pub gross: Money,
    pub pay_date: NaiveDate,
    pub first_week: u32,
    pub second_week: u32,
    /// Start of the first week; the second starts seven days later.
    pub week_start: NaiveDate,
}

impl PaycheckRequest {
    pub fn new(gross: Money, pay_date: NaiveDate, first_week: u32, week_start: NaiveDate) -> Self {
        Self {
            gross,
            pay_date,
            first_week,
            second_week: first_week + 1,
            week_start,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaycheckReport {
    pub split: PaycheckSplit,
    pub income_mutation: Uuid,
    pub contribution_mutations: Vec<Uuid>,
    pub rollover: RecalcOutcome,
}

pub struct AllocationService;

impl AllocationService {
    /// Pure split: deductions come off the top and the rest is halved.
    pub fn split_paycheck(
        gross: Money,
        reserve_deductions: &[Money],
        accumulator_deductions: &[Money],
    ) -> PaycheckSplit {
        let reserve_deductions: Money = reserve_deductions.iter().sum();
        let accumulator_deductions: Money = accumulator_deductions.iter().sum();
        let spendable = gross - reserve_deductions - accumulator_deductions;
        let (week1_base, week2_base) = spendable.halves();
        PaycheckSplit {
            gross,
            reserve_deductions,
            accumulator_deductions,
            spendable,
            week1_base,
            week2_base,
        }
    }

    /// Splits a paycheck using the deductions of every account active on the
    /// pay date, without touching the ledger. Percentage deductions are taken
    /// from `gross`.
    pub fn preview(ledger: &Ledger, gross: Money, pay_date: NaiveDate) -> PaycheckSplit {
        let mut reserves = Vec::new();
        let mut accumulators = Vec::new();
        for (_, kind, amount) in Self::active_deductions(ledger, gross, pay_date) {
            match kind {
                AccountKind::Reserve => reserves.push(amount),
                AccountKind::Accumulator => accumulators.push(amount),
            }
        }
        Self::split_paycheck(gross, &reserves, &accumulators)
    }

    /// Applies a paycheck to a pay period.
    ///
    /// Both weeks are created or overwritten with the split bases. Income and
    /// per-account contributions from an earlier run for the same period are
    /// replaced. The contributions post without triggering the cascade and the
    /// period is recalculated once at the end.
    pub fn process_paycheck(
        ledger: &mut Ledger,
        request: PaycheckRequest,
    ) -> ServiceResult<PaycheckReport> {
        let period = PayPeriod::new(request.first_week, request.second_week)?;
        if request.gross.is_negative() {
            return Err(BudgetError::NegativeMagnitude(request.gross.cents()));
        }
        let deductions = Self::active_deductions(ledger, request.gross, request.pay_date);
        let split = Self::preview(ledger, request.gross, request.pay_date);

        ledger.upsert_week(period.first(), request.week_start, split.week1_base)?;
        ledger.upsert_week(
            period.second(),
            request.week_start + Duration::days(DAYS_PER_WEEK),
            split.week2_base,
        )?;

        let (income_mutation, contribution_mutations) = {
            let _guard = ledger.cascade().enter();
            Self::clear_previous_paycheck(ledger, period)?;

            let income = NewMutation::income(period.first(), request.gross, request.pay_date)
                .with_origin(MutationOrigin::Paycheck)
                .with_note("Bi-weekly paycheck");
            let income_mutation = MutationService::add(ledger, income)?;

            let mut contributions = Vec::with_capacity(deductions.len());
            for (account_id, kind, amount) in deductions {
                let mutation_kind = match kind {
                    AccountKind::Reserve => MutationKind::ReserveContribution,
                    AccountKind::Accumulator => MutationKind::AccumulatorContribution,
                };
                let draft = NewMutation::new(mutation_kind, amount, request.pay_date)
                    .in_week(period.first())
                    .for_account(account_id)
                    .with_origin(MutationOrigin::Paycheck)
                    .with_note("Paycheck deduction");
                contributions.push(MutationService::add(ledger, draft)?);
            }
            (income_mutation, contributions)
        };

        let rollover = RolloverService::recalculate_period(ledger, period.first())?;
        info!(
            period = period.first(),
            gross = %split.gross,
            spendable = %split.spendable,
            contributions = contribution_mutations.len(),
            "paycheck processed"
        );
        Ok(PaycheckReport {
            split,
            income_mutation,
            contribution_mutations,
            rollover,
        })
    }

    fn active_deductions(
        ledger: &Ledger,
        gross: Money,
        pay_date: NaiveDate,
    ) -> Vec<(Uuid, AccountKind, Money)> {
        ledger
            .accounts
            .iter()
            .filter(|account| account.has_active_deduction(pay_date))
            .map(|account| (account.id, account.kind, account.deduction_for(gross)))
            .filter(|(_, _, amount)| *amount > Money::ZERO)
            .collect()
    }

    fn clear_previous_paycheck(ledger: &mut Ledger, period: PayPeriod) -> ServiceResult<()> {
        let stale: Vec<Uuid> = ledger
            .mutations
            .iter()
            .filter(|mutation| {
                mutation.origin == MutationOrigin::Paycheck
                    && mutation
                        .owner_week
                        .map_or(false, |week| period.contains(week))
            })
            .map(|mutation| mutation.id)
            .collect();
        for id in stale {
            MutationService::delete(ledger, id)?;
        }
        Ok(())
    }
}
