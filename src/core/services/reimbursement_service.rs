use std::collections::BTreeSet;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    core::errors::BudgetError,
    domain::{
        Money, NewReimbursement, Reimbursement, ReimbursementPatch, ReimbursementState,
    },
    ledger::Ledger,
};

use super::ServiceResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReimbursementSort {
    #[default]
    Date,
    Amount,
    State,
    Category,
    Location,
}

/// Running totals per lifecycle stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReimbursementTotals {
    pub pending: Money,
    /// Submitted or partially paid.
    pub outstanding: Money,
    pub reimbursed: Money,
}

pub struct ReimbursementService;

impl ReimbursementService {
    pub fn add(ledger: &mut Ledger, draft: NewReimbursement, today: NaiveDate) -> ServiceResult<Uuid> {
        Self::validate_amount(draft.amount)?;
        let reimbursement = Reimbursement::from_draft(draft, today);
        let id = reimbursement.id;
        info!(%id, amount = %reimbursement.amount, state = ?reimbursement.state, "reimbursement recorded");
        ledger.reimbursements.push(reimbursement);
        ledger.touch();
        Ok(id)
    }

    /// Applies `patch`; a state change fills blank lifecycle dates with `today`.
    pub fn update(
        ledger: &mut Ledger,
        id: Uuid,
        patch: ReimbursementPatch,
        today: NaiveDate,
    ) -> ServiceResult<()> {
        if let Some(amount) = patch.amount {
            Self::validate_amount(amount)?;
        }
        let item = ledger
            .reimbursement_mut(id)
            .ok_or(BudgetError::ReimbursementNotFound(id))?;
        if let Some(amount) = patch.amount {
            item.amount = amount;
        }
        if let Some(date) = patch.date {
            item.date = date;
        }
        if let Some(notes) = patch.notes {
            item.notes = notes;
        }
        if let Some(category) = patch.category {
            item.category = category;
        }
        if let Some(location) = patch.location {
            item.location = location;
        }
        match patch.state {
            Some(state) if state != item.state => item.move_to(state, today),
            _ => item.updated_at = Utc::now(),
        }
        debug!(%id, state = ?item.state, "reimbursement updated");
        ledger.touch();
        Ok(())
    }

    pub fn change_state(
        ledger: &mut Ledger,
        id: Uuid,
        state: ReimbursementState,
        today: NaiveDate,
    ) -> ServiceResult<()> {
        let patch = ReimbursementPatch {
            state: Some(state),
            ..ReimbursementPatch::default()
        };
        Self::update(ledger, id, patch, today)
    }

    pub fn delete(ledger: &mut Ledger, id: Uuid) -> ServiceResult<Reimbursement> {
        let index = ledger
            .reimbursements
            .iter()
            .position(|item| item.id == id)
            .ok_or(BudgetError::ReimbursementNotFound(id))?;
        ledger.touch();
        Ok(ledger.reimbursements.remove(index))
    }

    /// Deletes every listed reimbursement that exists; returns how many went.
    pub fn delete_many(ledger: &mut Ledger, ids: &[Uuid]) -> usize {
        let before = ledger.reimbursements.len();
        ledger.reimbursements.retain(|item| !ids.contains(&item.id));
        let removed = before - ledger.reimbursements.len();
        if removed > 0 {
            ledger.touch();
        }
        removed
    }

    pub fn list(ledger: &Ledger, sort: ReimbursementSort, ascending: bool) -> Vec<&Reimbursement> {
        let mut items: Vec<&Reimbursement> = ledger.reimbursements.iter().collect();
        match sort {
            ReimbursementSort::Date => items.sort_by_key(|item| item.date),
            ReimbursementSort::Amount => items.sort_by_key(|item| item.amount),
            ReimbursementSort::State => items.sort_by_key(|item| item.state),
            ReimbursementSort::Category => items.sort_by(|a, b| a.category.cmp(&b.category)),
            ReimbursementSort::Location => items.sort_by(|a, b| a.location.cmp(&b.location)),
        }
        if !ascending {
            items.reverse();
        }
        items
    }

    /// Matching reimbursements, newest purchase first.
    pub fn filter<'a>(
        ledger: &'a Ledger,
        predicate: impl Fn(&Reimbursement) -> bool,
    ) -> Vec<&'a Reimbursement> {
        let mut items: Vec<&Reimbursement> = ledger
            .reimbursements
            .iter()
            .filter(|item| predicate(item))
            .collect();
        items.sort_by(|a, b| b.date.cmp(&a.date));
        items
    }

    pub fn in_state(ledger: &Ledger, state: ReimbursementState) -> Vec<&Reimbursement> {
        Self::filter(ledger, |item| item.state == state)
    }

    pub fn outstanding(ledger: &Ledger) -> Vec<&Reimbursement> {
        Self::filter(ledger, |item| item.state.is_outstanding())
    }

    pub fn at_location<'a>(ledger: &'a Ledger, location: &str) -> Vec<&'a Reimbursement> {
        Self::filter(ledger, |item| item.location.as_deref() == Some(location))
    }

    pub fn in_category<'a>(ledger: &'a Ledger, category: &str) -> Vec<&'a Reimbursement> {
        Self::filter(ledger, |item| item.category.as_deref() == Some(category))
    }

    /// Purchases dated within `start..=end`.
    pub fn between(ledger: &Ledger, start: NaiveDate, end: NaiveDate) -> Vec<&Reimbursement> {
        Self::filter(ledger, |item| item.date >= start && item.date <= end)
    }

    pub fn categories(ledger: &Ledger) -> BTreeSet<&str> {
        ledger
            .reimbursements
            .iter()
            .filter_map(|item| item.category.as_deref())
            .filter(|category| !category.is_empty())
            .collect()
    }

    pub fn locations(ledger: &Ledger) -> BTreeSet<&str> {
        ledger
            .reimbursements
            .iter()
            .filter_map(|item| item.location.as_deref())
            .filter(|location| !location.is_empty())
            .collect()
    }

    /// Totals per stage. `reimbursed` only counts items paid back within
    /// `paid_between` when a range is given.
    pub fn totals(
        ledger: &Ledger,
        paid_between: Option<(NaiveDate, NaiveDate)>,
    ) -> ReimbursementTotals {
        let mut totals = ReimbursementTotals::default();
        for item in &ledger.reimbursements {
            match item.state {
                ReimbursementState::Pending => totals.pending += item.amount,
                state if state.is_outstanding() => totals.outstanding += item.amount,
                ReimbursementState::Reimbursed => {
                    let in_range = match (paid_between, item.reimbursed_date) {
                        (None, _) => true,
                        (Some((start, end)), Some(paid)) => paid >= start && paid <= end,
                        (Some(_), None) => false,
                    };
                    if in_range {
                        totals.reimbursed += item.amount;
                    }
                }
                _ => {}
            }
        }
        totals
    }

    fn validate_amount(amount: Money) -> ServiceResult<()> {
        if amount.is_negative() {
            return Err(BudgetError::NegativeMagnitude(amount.cents()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, d).unwrap()
    }

    fn trip_ledger() -> (Ledger, [Uuid; 4]) {
        let mut ledger = Ledger::new("Trips");
        let mut add = |draft| ReimbursementService::add(&mut ledger, draft, day(10)).unwrap();
        let flight = add(
            NewReimbursement::new(Money::from_cents(62_000), day(1))
                .with_category("Transportation")
                .at("Spain"),
        );
        let hotel = add(
            NewReimbursement::new(Money::from_cents(48_000), day(3))
                .with_category("Hotel")
                .at("Spain")
                .in_state(ReimbursementState::Submitted),
        );
        let dinner = add(
            NewReimbursement::new(Money::from_cents(4_500), day(4))
                .with_category("Meals")
                .at("Conference2025"),
        );
        let loan = add(
            NewReimbursement::new(Money::from_cents(10_000), day(6)).with_notes("Lunch for Sam"),
        );
        (ledger, [flight, hotel, dinner, loan])
    }

    #[test]
    fn totals_follow_state_changes() {
        let (mut ledger, [flight, hotel, dinner, _]) = trip_ledger();
        let totals = ReimbursementService::totals(&ledger, None);
        assert_eq!(totals.pending, Money::from_cents(76_500));
        assert_eq!(totals.outstanding, Money::from_cents(48_000));
        assert_eq!(totals.reimbursed, Money::ZERO);

        ReimbursementService::change_state(&mut ledger, hotel, ReimbursementState::Reimbursed, day(20))
            .unwrap();
        ReimbursementService::change_state(&mut ledger, flight, ReimbursementState::Partial, day(22))
            .unwrap();
        ReimbursementService::change_state(&mut ledger, dinner, ReimbursementState::Denied, day(22))
            .unwrap();

        let hotel = ledger.reimbursement(hotel).unwrap();
        assert_eq!(hotel.submitted_date, Some(day(10)));
        assert_eq!(hotel.reimbursed_date, Some(day(20)));

        let totals = ReimbursementService::totals(&ledger, None);
        assert_eq!(totals.pending, Money::from_cents(10_000));
        assert_eq!(totals.outstanding, Money::from_cents(62_000));
        assert_eq!(totals.reimbursed, Money::from_cents(48_000));
        assert_eq!(
            ReimbursementService::totals(&ledger, Some((day(21), day(30)))).reimbursed,
            Money::ZERO
        );
    }

    #[test]
    fn queries_filter_and_sort() {
        let (ledger, [flight, hotel, dinner, loan]) = trip_ledger();
        let ids = |items: Vec<&Reimbursement>| items.iter().map(|item| item.id).collect::<Vec<_>>();

        assert_eq!(ids(ReimbursementService::at_location(&ledger, "Spain")), vec![hotel, flight]);
        assert_eq!(ids(ReimbursementService::in_category(&ledger, "Meals")), vec![dinner]);
        assert_eq!(ids(ReimbursementService::outstanding(&ledger)), vec![hotel]);
        assert_eq!(
            ids(ReimbursementService::in_state(&ledger, ReimbursementState::Pending)),
            vec![loan, dinner, flight]
        );
        assert_eq!(ids(ReimbursementService::between(&ledger, day(3), day(4))), vec![dinner, hotel]);
        assert_eq!(
            ids(ReimbursementService::list(&ledger, ReimbursementSort::Amount, false)),
            vec![flight, hotel, loan, dinner]
        );
        assert_eq!(
            ReimbursementService::locations(&ledger).into_iter().collect::<Vec<_>>(),
            vec!["Conference2025", "Spain"]
        );
        assert_eq!(ReimbursementService::categories(&ledger).len(), 3);
    }

    #[test]
    fn reimbursements_stay_off_the_books() {
        let (mut ledger, [flight, hotel, _, _]) = trip_ledger();
        assert!(ledger.mutations.is_empty());
        assert!(ledger.history.histories().next().is_none());

        let err = ReimbursementService::update(
            &mut ledger,
            flight,
            ReimbursementPatch {
                amount: Some(Money::from_cents(-1)),
                ..ReimbursementPatch::default()
            },
            day(11),
        )
        .unwrap_err();
        assert!(matches!(err, BudgetError::NegativeMagnitude(-1)));

        assert_eq!(ReimbursementService::delete_many(&mut ledger, &[flight, hotel, Uuid::new_v4()]), 2);
        assert!(matches!(
            ReimbursementService::delete(&mut ledger, flight),
            Err(BudgetError::ReimbursementNotFound(_))
        ));
        assert_eq!(ledger.reimbursements.len(), 2);
    }
}
