//! The single entry point for every ledger-affecting mutation.
//!
//! Each call validates the request, keeps the mutation record and its history
//! entry in step, then decides whether the owning pay period must be
//! recalculated. Recalculation runs only for spending and accumulator
//! contributions that are not transfers or generated rollovers, and never
//! while the cascade itself is posting.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    core::errors::BudgetError,
    domain::{Money, Mutation, MutationKind, MutationPatch, NewMutation, PayPeriod},
    ledger::Ledger,
};

use super::{RolloverService, ServiceResult};

pub struct MutationService;

impl MutationService {
    /// Records a mutation, posts its ledger entry when it targets an account,
    /// and recalculates the owning period when the kind calls for it.
    pub fn add(ledger: &mut Ledger, draft: NewMutation) -> ServiceResult<Uuid> {
        let id = Self::record(ledger, draft)?;
        let mutation = ledger
            .mutation(id)
            .ok_or(BudgetError::MutationNotFound(id))?;
        let triggers = Self::trigger_weeks([mutation]);
        let payouts = Self::payout_accounts([mutation]);
        Self::refresh_last_payments(ledger, payouts);
        Self::recalculate_affected(ledger, triggers)?;
        Ok(id)
    }

    /// Applies `patch` to the mutation and its ledger entry.
    ///
    /// The mutation's stored fields are rewritten first and the history entry
    /// is then updated in place, so propagation always starts from the new
    /// amount. Both the previous and the new owning period are recalculated.
    pub fn update(ledger: &mut Ledger, id: Uuid, patch: MutationPatch) -> ServiceResult<()> {
        let before = ledger
            .mutation(id)
            .cloned()
            .ok_or(BudgetError::MutationNotFound(id))?;
        if !patch.has_effect() {
            return Ok(());
        }

        let mut after = before.clone();
        if let Some(magnitude) = patch.magnitude {
            after.magnitude = magnitude;
        }
        if let Some(date) = patch.value_date {
            after.value_date = date;
        }
        if let Some(week) = patch.owner_week {
            after.owner_week = week;
        }
        if let Some(account_id) = patch.account_id {
            after.account_id = account_id;
        }
        if let Some(category) = patch.category {
            after.category = category;
        }
        if let Some(note) = patch.note {
            after.note = note;
        }
        if let Some(include) = patch.include_in_analytics {
            after.include_in_analytics = include;
        }
        Self::validate(
            ledger,
            after.kind,
            after.magnitude,
            after.owner_week,
            after.account_id,
        )?;

        if let Some(stored) = ledger.mutation_mut(id) {
            *stored = after.clone();
        }
        if let Err(err) = Self::sync_entry(ledger, &before, &after) {
            if let Some(stored) = ledger.mutation_mut(id) {
                *stored = before;
            }
            return Err(err);
        }
        ledger.touch();
        debug!(mutation = %id, kind = ?after.kind, "mutation updated");
        Self::refresh_last_payments(ledger, Self::payout_accounts([&before, &after]));

        let triggers = Self::trigger_weeks([&before, &after]);
        Self::recalculate_affected(ledger, triggers)
    }

    /// Removes a mutation and its ledger entry, returning the removed record.
    pub fn delete(ledger: &mut Ledger, id: Uuid) -> ServiceResult<Mutation> {
        if ledger.mutation(id).is_none() {
            return Err(BudgetError::MutationNotFound(id));
        }
        if let Some(entry_id) = ledger.history.entry_for_mutation(id).map(|entry| entry.id) {
            ledger.history.delete_entry(entry_id)?;
        }
        let removed = ledger
            .take_mutation(id)
            .ok_or(BudgetError::MutationNotFound(id))?;
        debug!(mutation = %id, kind = ?removed.kind, "mutation deleted");
        Self::refresh_last_payments(ledger, Self::payout_accounts([&removed]));

        let triggers = Self::trigger_weeks([&removed]);
        Self::recalculate_affected(ledger, triggers)?;
        Ok(removed)
    }

    /// Moves money between two accounts as a linked transfer-out / transfer-in
    /// pair. The outgoing half is rolled back when the incoming half fails.
    pub fn transfer_between(
        ledger: &mut Ledger,
        from: Uuid,
        to: Uuid,
        amount: Money,
        date: NaiveDate,
        week: Option<u32>,
    ) -> ServiceResult<(Uuid, Uuid)> {
        if from == to {
            return Err(BudgetError::Validation(
                "transfer source and destination must differ".into(),
            ));
        }
        let group = Uuid::new_v4();
        let half = |kind, account_id| {
            let mut draft = NewMutation::new(kind, amount, date).for_account(account_id);
            draft.owner_week = week;
            draft.transfer_group = Some(group);
            draft
        };

        let outgoing = Self::add(ledger, half(MutationKind::TransferOut, from))?;
        match Self::add(ledger, half(MutationKind::TransferIn, to)) {
            Ok(incoming) => Ok((outgoing, incoming)),
            Err(err) => {
                warn!(%from, %to, error = %err, "rolling back half-applied transfer");
                Self::delete(ledger, outgoing)?;
                Err(err)
            }
        }
    }

    /// Both halves of the transfer identified by `group`.
    pub fn transfer_pair(ledger: &Ledger, group: Uuid) -> Vec<&Mutation> {
        ledger
            .mutations
            .iter()
            .filter(|mutation| mutation.transfer_group == Some(group))
            .collect()
    }

    /// Recalculates every pay period touched by `weeks` unless a cascade is
    /// already running.
    pub(crate) fn recalculate_affected(
        ledger: &mut Ledger,
        weeks: BTreeSet<u32>,
    ) -> ServiceResult<()> {
        if weeks.is_empty() {
            return Ok(());
        }
        if ledger.cascade().is_active() {
            debug!(?weeks, "rollover cascade in progress; recalculation suppressed");
            return Ok(());
        }
        let mut periods = BTreeSet::new();
        for week in weeks {
            periods.insert(PayPeriod::containing(week)?.first());
        }
        for first in periods {
            RolloverService::recalculate_period(ledger, first)?;
        }
        Ok(())
    }

    fn trigger_weeks<'a>(mutations: impl IntoIterator<Item = &'a Mutation>) -> BTreeSet<u32> {
        mutations
            .into_iter()
            .filter(|mutation| mutation.can_trigger_recalculation())
            .filter_map(|mutation| mutation.owner_week)
            .collect()
    }

    fn payout_accounts<'a>(mutations: impl IntoIterator<Item = &'a Mutation>) -> BTreeSet<Uuid> {
        mutations
            .into_iter()
            .filter(|mutation| mutation.kind == MutationKind::ReservePayout)
            .filter_map(|mutation| mutation.account_id)
            .collect()
    }

    fn refresh_last_payments(ledger: &mut Ledger, accounts: BTreeSet<Uuid>) {
        for account_id in accounts {
            ledger.refresh_last_payment(account_id);
        }
    }

    /// Validates and stores a mutation plus its ledger entry, without
    /// triggering recalculation.
    fn record(ledger: &mut Ledger, draft: NewMutation) -> ServiceResult<Uuid> {
        Self::validate(
            ledger,
            draft.kind,
            draft.magnitude,
            draft.owner_week,
            draft.account_id,
        )?;
        let account_id = draft.account_id;
        let signed = draft.kind.signed(draft.magnitude);
        let date = draft.value_date;
        let id = ledger.record_mutation(draft);

        if let Some(account_id) = account_id {
            let posted = ledger
                .account_key(account_id)
                .and_then(|key| ledger.history.post_entry(key, signed, date, Some(id)));
            if let Err(err) = posted {
                ledger.take_mutation(id);
                return Err(err);
            }
        }
        Ok(id)
    }

    fn validate(
        ledger: &Ledger,
        kind: MutationKind,
        magnitude: Money,
        owner_week: Option<u32>,
        account_id: Option<Uuid>,
    ) -> ServiceResult<()> {
        if magnitude.is_negative() {
            return Err(BudgetError::NegativeMagnitude(magnitude.cents()));
        }
        if let Some(week) = owner_week {
            PayPeriod::containing(week)?;
            if ledger.week(week).is_none() {
                return Err(BudgetError::WeekNotFound(week));
            }
        }
        match account_id {
            Some(_) if !kind.allows_account() => Err(BudgetError::Validation(format!(
                "{:?} mutations are week-level and cannot target an account",
                kind
            ))),
            Some(account_id) => {
                let account = ledger.require_account(account_id)?;
                match kind.required_account_kind() {
                    Some(required) if required != account.kind => {
                        Err(BudgetError::Validation(format!(
                            "{:?} requires a {:?} account but `{}` is {:?}",
                            kind, required, account.name, account.kind
                        )))
                    }
                    _ => Ok(()),
                }
            }
            None if kind.requires_account() => Err(BudgetError::Validation(format!(
                "{:?} mutations need an account",
                kind
            ))),
            None => Ok(()),
        }
    }

    /// Brings the history entry in line with an updated mutation.
    fn sync_entry(ledger: &mut Ledger, before: &Mutation, after: &Mutation) -> ServiceResult<()> {
        let existing = ledger
            .history
            .entry_for_mutation(before.id)
            .map(|entry| entry.id);
        match (existing, after.account_id) {
            (Some(entry_id), Some(account_id)) if before.account_id == Some(account_id) => {
                ledger.history.update_entry(
                    entry_id,
                    Some(after.signed_amount()),
                    Some(after.value_date),
                )?;
            }
            (existing, target) => {
                if let Some(entry_id) = existing {
                    ledger.history.delete_entry(entry_id)?;
                }
                if let Some(account_id) = target {
                    let key = ledger.account_key(account_id)?;
                    ledger.history.post_entry(
                        key,
                        after.signed_amount(),
                        after.value_date,
                        Some(after.id),
                    )?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::services::AccountService,
        domain::{MutationOrigin, RolloverLeg, TrackableAccount},
    };

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn ledger_with_weeks() -> Ledger {
        let mut ledger = Ledger::new("Gateway");
        ledger.upsert_week(1, day(6), Money::from_cents(10_000)).unwrap();
        ledger.upsert_week(2, day(13), Money::from_cents(10_000)).unwrap();
        ledger
    }

    fn open(ledger: &mut Ledger, account: TrackableAccount, balance: i64) -> Uuid {
        AccountService::open(ledger, account, Money::from_cents(balance), day(1)).unwrap()
    }

    #[test]
    fn negative_magnitude_is_rejected() {
        let mut ledger = ledger_with_weeks();
        let err = MutationService::add(
            &mut ledger,
            NewMutation::spending(1, Money::from_cents(-500), day(7)),
        )
        .expect_err("negative amounts must fail");
        assert!(matches!(err, BudgetError::NegativeMagnitude(-500)));
        assert!(ledger.mutations.is_empty());
    }

    #[test]
    fn payout_posts_negative_delta() {
        let mut ledger = ledger_with_weeks();
        let rent = open(
            &mut ledger,
            TrackableAccount::reserve("Rent", Money::from_cents(120_000)),
            50_000,
        );
        let draft = NewMutation::new(MutationKind::ReservePayout, Money::from_cents(20_000), day(8))
            .for_account(rent)
            .in_week(1);
        let id = MutationService::add(&mut ledger, draft).unwrap();

        assert_eq!(ledger.current_balance(rent), Some(Money::from_cents(30_000)));
        let entry = ledger.history.entry_for_mutation(id).unwrap();
        assert_eq!(entry.amount, Money::from_cents(-20_000));
    }

    #[test]
    fn payouts_track_the_last_payment() {
        let mut ledger = ledger_with_weeks();
        let rent = open(
            &mut ledger,
            TrackableAccount::reserve("Rent", Money::from_cents(120_000)),
            200_000,
        );
        let payout = |amount: i64, date: NaiveDate| {
            NewMutation::new(MutationKind::ReservePayout, Money::from_cents(amount), date)
                .for_account(rent)
        };
        let january = MutationService::add(&mut ledger, payout(118_000, day(3))).unwrap();
        let later = MutationService::add(&mut ledger, payout(121_500, day(31))).unwrap();

        let last = ledger.account(rent).unwrap().last_payment.unwrap();
        assert_eq!((last.date, last.amount), (day(31), Money::from_cents(121_500)));

        MutationService::update(&mut ledger, january, MutationPatch::magnitude(Money::from_cents(119_000)))
            .unwrap();
        assert_eq!(
            ledger.account(rent).unwrap().last_payment.unwrap().amount,
            Money::from_cents(121_500)
        );

        MutationService::delete(&mut ledger, later).unwrap();
        let last = ledger.account(rent).unwrap().last_payment.unwrap();
        assert_eq!((last.date, last.amount), (day(3), Money::from_cents(119_000)));

        MutationService::delete(&mut ledger, january).unwrap();
        assert!(ledger.account(rent).unwrap().last_payment.is_none());
    }

    #[test]
    fn week_level_kinds_reject_accounts() {
        let mut ledger = ledger_with_weeks();
        let savings = open(&mut ledger, TrackableAccount::accumulator("Savings", None), 0);
        let err = MutationService::add(
            &mut ledger,
            NewMutation::spending(1, Money::from_cents(5), day(7)).for_account(savings),
        )
        .unwrap_err();
        assert!(matches!(err, BudgetError::Validation(_)));

        let err = MutationService::add(
            &mut ledger,
            NewMutation::new(MutationKind::ReserveContribution, Money::from_cents(5), day(7))
                .for_account(savings),
        )
        .unwrap_err();
        assert!(matches!(err, BudgetError::Validation(_)));
    }

    #[test]
    fn unknown_week_is_rejected() {
        let mut ledger = ledger_with_weeks();
        let err = MutationService::add(
            &mut ledger,
            NewMutation::spending(9, Money::from_cents(5), day(7)),
        )
        .unwrap_err();
        assert!(matches!(err, BudgetError::WeekNotFound(9)));
    }

    #[test]
    fn week_zero_is_rejected_before_recording() {
        let mut ledger = ledger_with_weeks();
        let err = MutationService::add(
            &mut ledger,
            NewMutation::spending(0, Money::from_cents(5), day(7)),
        )
        .unwrap_err();
        assert!(matches!(err, BudgetError::InvalidPeriod(_)));
        assert!(ledger.mutations.is_empty());
    }

    #[test]
    fn update_moves_entry_between_accounts() {
        let mut ledger = ledger_with_weeks();
        let first = open(&mut ledger, TrackableAccount::accumulator("First", None), 1_000);
        let second = open(&mut ledger, TrackableAccount::accumulator("Second", None), 0);
        let id = MutationService::add(
            &mut ledger,
            NewMutation::new(MutationKind::Income, Money::from_cents(250), day(3)).for_account(first),
        )
        .unwrap();

        let patch = MutationPatch {
            account_id: Some(Some(second)),
            magnitude: Some(Money::from_cents(300)),
            ..MutationPatch::default()
        };
        MutationService::update(&mut ledger, id, patch).unwrap();

        assert_eq!(ledger.current_balance(first), Some(Money::from_cents(1_000)));
        assert_eq!(ledger.current_balance(second), Some(Money::from_cents(300)));
        assert_eq!(
            ledger.history.entry_for_mutation(id).unwrap().account_id,
            second
        );
    }

    #[test]
    fn update_rewrites_amount_and_date_in_place() {
        let mut ledger = ledger_with_weeks();
        let savings = open(&mut ledger, TrackableAccount::accumulator("Savings", None), 1_000);
        let early = MutationService::add(
            &mut ledger,
            NewMutation::new(MutationKind::Income, Money::from_cents(100), day(3)).for_account(savings),
        )
        .unwrap();
        MutationService::add(
            &mut ledger,
            NewMutation::new(MutationKind::Income, Money::from_cents(50), day(5)).for_account(savings),
        )
        .unwrap();

        let patch = MutationPatch {
            magnitude: Some(Money::from_cents(400)),
            value_date: Some(day(9)),
            ..MutationPatch::default()
        };
        MutationService::update(&mut ledger, early, patch).unwrap();

        assert_eq!(ledger.balance_as_of(savings, day(6)), Some(Money::from_cents(1_050)));
        assert_eq!(ledger.current_balance(savings), Some(Money::from_cents(1_450)));
        ledger.history.verify(savings).unwrap();
    }

    #[test]
    fn delete_removes_entry_and_record() {
        let mut ledger = ledger_with_weeks();
        let savings = open(&mut ledger, TrackableAccount::accumulator("Savings", None), 1_000);
        let id = MutationService::add(
            &mut ledger,
            NewMutation::new(MutationKind::Income, Money::from_cents(100), day(3)).for_account(savings),
        )
        .unwrap();
        let removed = MutationService::delete(&mut ledger, id).unwrap();

        assert_eq!(removed.id, id);
        assert!(ledger.mutation(id).is_none());
        assert!(ledger.history.entry_for_mutation(id).is_none());
        assert_eq!(ledger.current_balance(savings), Some(Money::from_cents(1_000)));
    }

    #[test]
    fn transfer_pair_rolls_back_on_failure() {
        let mut ledger = ledger_with_weeks();
        let savings = open(&mut ledger, TrackableAccount::accumulator("Savings", None), 1_000);
        let err = MutationService::transfer_between(
            &mut ledger,
            savings,
            Uuid::new_v4(),
            Money::from_cents(400),
            day(4),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, BudgetError::AccountNotFound(_)));
        assert!(ledger.mutations.is_empty());
        assert_eq!(ledger.current_balance(savings), Some(Money::from_cents(1_000)));
    }

    #[test]
    fn transfer_pair_moves_money() {
        let mut ledger = ledger_with_weeks();
        let savings = open(&mut ledger, TrackableAccount::accumulator("Savings", None), 1_000);
        let rent = open(
            &mut ledger,
            TrackableAccount::reserve("Rent", Money::from_cents(1_000)),
            0,
        );
        let (out, inc) = MutationService::transfer_between(
            &mut ledger,
            savings,
            rent,
            Money::from_cents(400),
            day(4),
            Some(1),
        )
        .unwrap();

        assert_eq!(ledger.current_balance(savings), Some(Money::from_cents(600)));
        assert_eq!(ledger.current_balance(rent), Some(Money::from_cents(400)));
        let group = ledger.mutation(out).unwrap().transfer_group.unwrap();
        let pair: Vec<Uuid> = MutationService::transfer_pair(&ledger, group)
            .into_iter()
            .map(|mutation| mutation.id)
            .collect();
        assert_eq!(pair, vec![out, inc]);
    }

    #[test]
    fn rollover_mutations_do_not_recalculate() {
        let mut ledger = ledger_with_weeks();
        let draft = NewMutation::new(MutationKind::PeriodTransferIn, Money::from_cents(77), day(12))
            .in_week(2)
            .with_origin(MutationOrigin::Rollover(RolloverLeg::WeekToWeek));
        MutationService::add(&mut ledger, draft).unwrap();

        // A recalculation would have replaced the hand-posted rollover.
        let week_two = ledger.mutations_for_week(2);
        assert_eq!(week_two.len(), 1);
        assert_eq!(week_two[0].magnitude, Money::from_cents(77));
    }
}
