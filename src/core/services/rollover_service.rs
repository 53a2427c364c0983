//! Rollover cascade for one pay period.
//!
//! Week 1's leftover (`base - spending`) becomes a period transfer owned by
//! week 2 and dated on week 1's last day. Week 2's leftover, including that
//! transfer, becomes a contribution to the default accumulator dated on week
//! 2's last day, or a withdrawal from it when the period ran a deficit.
//!
//! Both transfers are deleted and reposted on every recalculation, so running
//! it twice leaves the same amounts, dates and balances behind.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    core::errors::BudgetError,
    domain::{
        BudgetWeek, Money, MutationKind, MutationOrigin, NewMutation, PayPeriod, RolloverLeg,
    },
    ledger::Ledger,
};

use super::{MutationService, ServiceResult};

/// Why a recalculation request changed nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoOpReason {
    WeekMissing(u32),
    SiblingMissing { week: u32, sibling: u32 },
}

/// Amounts posted by one pass of the cascade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodRollover {
    pub period: PayPeriod,
    pub week_to_week: Money,
    pub week_to_week_mutation: Uuid,
    /// `None` when no default rollover accumulator is configured.
    pub week_to_accumulator: Option<Money>,
    pub week_to_accumulator_mutation: Option<Uuid>,
    pub accumulator_id: Option<Uuid>,
    pub accumulator_balance_at_close: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecalcOutcome {
    Applied(PeriodRollover),
    NoOp(NoOpReason),
}

impl RecalcOutcome {
    pub fn applied(&self) -> Option<&PeriodRollover> {
        match self {
            RecalcOutcome::Applied(rollover) => Some(rollover),
            RecalcOutcome::NoOp(_) => None,
        }
    }
}

pub struct RolloverService;

impl RolloverService {
    /// Recomputes both rollover transitions of the period containing `week`.
    ///
    /// Returns [`RecalcOutcome::NoOp`] rather than an error while either week
    /// of the period has not been created yet.
    pub fn recalculate_period(ledger: &mut Ledger, week: u32) -> ServiceResult<RecalcOutcome> {
        let period = PayPeriod::containing(week)?;
        let (week1, week2) = match ledger.period_weeks(period) {
            Some((first, second)) => (first.clone(), second.clone()),
            None => {
                let reason = match ledger.week(week) {
                    None => NoOpReason::WeekMissing(week),
                    Some(_) => NoOpReason::SiblingMissing {
                        week,
                        sibling: period.sibling_of(week).unwrap_or(week),
                    },
                };
                debug!(week, ?reason, "rollover skipped");
                return Ok(RecalcOutcome::NoOp(reason));
            }
        };

        let _guard = ledger.cascade().enter();
        Self::clear_generated(ledger, period)?;

        let week_to_week = week1.base_allocation - Self::spent_in_week(ledger, week1.number);
        let week_to_week_mutation = Self::post_week_to_week(ledger, &week1, &week2, week_to_week)?;
        let carried = ledger
            .mutation(week_to_week_mutation)
            .map(|mutation| mutation.signed_amount())
            .ok_or(BudgetError::MutationNotFound(week_to_week_mutation))?;

        let leftover =
            week2.base_allocation + carried - Self::spent_in_week(ledger, week2.number);
        let accumulator_id = ledger.default_rollover_account().map(|account| account.id);
        let (week_to_accumulator, week_to_accumulator_mutation) = match accumulator_id {
            Some(account_id) => {
                let id = Self::post_week_to_accumulator(ledger, &week2, account_id, leftover)?;
                (Some(leftover), Some(id))
            }
            None => {
                warn!(
                    period = period.first(),
                    %leftover,
                    "no default rollover accumulator; period leftover not transferred"
                );
                (None, None)
            }
        };
        let accumulator_balance_at_close =
            accumulator_id.and_then(|account_id| ledger.balance_as_of(account_id, week2.end_date));

        info!(
            period = period.first(),
            %week_to_week,
            leftover = %leftover,
            "period recalculated"
        );
        Ok(RecalcOutcome::Applied(PeriodRollover {
            period,
            week_to_week,
            week_to_week_mutation,
            week_to_accumulator,
            week_to_accumulator_mutation,
            accumulator_id,
            accumulator_balance_at_close,
        }))
    }

    /// Recalculates every complete period whose second week ended before
    /// `today` and marks both weeks processed.
    pub fn finalize_elapsed_periods(
        ledger: &mut Ledger,
        today: NaiveDate,
    ) -> ServiceResult<Vec<RecalcOutcome>> {
        let due: Vec<PayPeriod> = ledger
            .weeks
            .iter()
            .filter(|week| week.number % 2 == 0 && week.end_date < today && !week.period_processed)
            .filter_map(|week| week.period().ok())
            .filter(|period| ledger.week(period.first()).is_some())
            .collect();

        let mut outcomes = Vec::with_capacity(due.len());
        for period in due {
            let outcome = Self::recalculate_period(ledger, period.first())?;
            if outcome.applied().is_some() {
                for number in period.weeks() {
                    if let Some(week) = ledger.week_mut(number) {
                        week.period_processed = true;
                    }
                }
                ledger.touch();
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Sum of spending magnitudes owned by `week`.
    pub fn spent_in_week(ledger: &Ledger, week: u32) -> Money {
        ledger
            .mutations
            .iter()
            .filter(|mutation| {
                mutation.owner_week == Some(week) && mutation.kind == MutationKind::Spending
            })
            .map(|mutation| mutation.magnitude)
            .sum()
    }

    /// Generated rollover mutations owned by either week of `period`.
    pub fn generated_for_period(ledger: &Ledger, period: PayPeriod) -> Vec<Uuid> {
        ledger
            .mutations
            .iter()
            .filter(|mutation| {
                mutation.is_rollover()
                    && mutation
                        .owner_week
                        .map_or(false, |week| period.contains(week))
            })
            .map(|mutation| mutation.id)
            .collect()
    }

    fn clear_generated(ledger: &mut Ledger, period: PayPeriod) -> ServiceResult<()> {
        for id in Self::generated_for_period(ledger, period) {
            MutationService::delete(ledger, id)?;
        }
        Ok(())
    }

    fn post_week_to_week(
        ledger: &mut Ledger,
        week1: &BudgetWeek,
        week2: &BudgetWeek,
        amount: Money,
    ) -> ServiceResult<Uuid> {
        let kind = if amount.is_negative() {
            MutationKind::PeriodTransferOut
        } else {
            MutationKind::PeriodTransferIn
        };
        let draft = NewMutation::new(kind, amount.abs(), week1.end_date)
            .in_week(week2.number)
            .with_origin(MutationOrigin::Rollover(RolloverLeg::WeekToWeek))
            .with_note(format!("Rollover from week {}", week1.number));
        MutationService::add(ledger, draft)
    }

    fn post_week_to_accumulator(
        ledger: &mut Ledger,
        week2: &BudgetWeek,
        account_id: Uuid,
        amount: Money,
    ) -> ServiceResult<Uuid> {
        let kind = if amount.is_negative() {
            MutationKind::TransferOut
        } else {
            MutationKind::AccumulatorContribution
        };
        let draft = NewMutation::new(kind, amount.abs(), week2.end_date)
            .in_week(week2.number)
            .for_account(account_id)
            .with_origin(MutationOrigin::Rollover(RolloverLeg::WeekToAccumulator))
            .with_note(format!("End of period rollover from week {}", week2.number));
        MutationService::add(ledger, draft)
    }
}
