use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::common::*;

/// Tracked account. Balances are read from the history book through
/// `current_balance` or `balance_as_of`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackableAccount {
    pub id: Uuid,
    pub name: String,
    pub kind: AccountKind,
    /// Periodic target for reserves, optional goal for accumulators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_amount: Option<Money>,
    /// Amount set aside from every paycheck while the account is active.
    #[serde(default)]
    pub per_period_deduction: Money,
    /// Share of the gross paycheck set aside on top of `per_period_deduction`,
    /// in basis points.
    #[serde(default)]
    pub deduction_basis_points: u32,
    #[serde(default)]
    pub is_default_rollover: bool,
    #[serde(default)]
    pub activation_periods: Vec<ActivationPeriod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_frequency: Option<PaymentFrequency>,
    /// Bills whose amount changes from one payment to the next.
    #[serde(default)]
    pub is_variable: bool,
    /// Latest reserve payout, kept in step with the payout mutations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_payment: Option<LastPayment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TrackableAccount {
    /// Creates a bill-style reserve judged against `target_amount` each period.
    pub fn reserve(name: impl Into<String>, target_amount: Money) -> Self {
        Self::new(name, AccountKind::Reserve, Some(target_amount))
    }

    /// Creates a goal-style accumulator.
    pub fn accumulator(name: impl Into<String>, goal: Option<Money>) -> Self {
        Self::new(name, AccountKind::Accumulator, goal)
    }

    fn new(name: impl Into<String>, kind: AccountKind, target_amount: Option<Money>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
            target_amount,
            per_period_deduction: Money::ZERO,
            deduction_basis_points: 0,
            is_default_rollover: false,
            activation_periods: Vec::new(),
            payment_frequency: None,
            is_variable: false,
            last_payment: None,
            notes: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_deduction(mut self, amount: Money) -> Self {
        self.per_period_deduction = amount;
        self
    }

    pub fn with_percentage_deduction(mut self, basis_points: u32) -> Self {
        self.deduction_basis_points = basis_points;
        self
    }

    pub fn paid(mut self, frequency: PaymentFrequency) -> Self {
        self.payment_frequency = Some(frequency);
        self
    }

    pub fn variable(mut self) -> Self {
        self.is_variable = true;
        self
    }

    pub fn with_default_rollover(mut self) -> Self {
        self.is_default_rollover = true;
        self
    }

    pub fn active_from(mut self, start: NaiveDate) -> Self {
        self.activation_periods.push(ActivationPeriod { start, end: None });
        self
    }

    /// An account with no recorded activation periods is always active.
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.activation_periods.is_empty()
            || self
                .activation_periods
                .iter()
                .any(|period| period.contains(date))
    }

    /// Whether a paycheck dated `date` should set money aside for this account.
    pub fn has_active_deduction(&self, date: NaiveDate) -> bool {
        (self.per_period_deduction > Money::ZERO || self.deduction_basis_points > 0)
            && self.is_active_on(date)
    }

    /// Fixed plus percentage deduction taken from a paycheck of `gross`.
    pub fn deduction_for(&self, gross: Money) -> Money {
        self.per_period_deduction + gross.percent(self.deduction_basis_points)
    }
}

impl Identifiable for TrackableAccount {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl NamedEntity for TrackableAccount {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Displayable for TrackableAccount {
    fn display_label(&self) -> String {
        format!("{} ({:?})", self.name, self.kind)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    /// Bill-style account with a periodic target amount.
    Reserve,
    /// Goal-style savings account.
    Accumulator,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentFrequency {
    Weekly,
    Monthly,
    Semester,
    Yearly,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LastPayment {
    pub date: NaiveDate,
    pub amount: Money,
}

/// Inclusive date range during which an account takes part in paycheck splits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivationPeriod {
    pub start: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDate>,
}

impl ActivationPeriod {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && self.end.map_or(true, |end| date <= end)
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn accounts_without_periods_are_always_active() {
        let account = TrackableAccount::reserve("Rent", Money::from_cents(120_000));
        assert!(account.is_active_on(day(1999, 1, 1)));
        assert!(!account.has_active_deduction(day(2025, 1, 1)));
    }

    #[test]
    fn closed_periods_bound_deductions() {
        let mut account = TrackableAccount::accumulator("Vacation", None)
            .with_deduction(Money::from_cents(5_000));
        account.activation_periods.push(ActivationPeriod {
            start: day(2025, 4, 1),
            end: Some(day(2025, 8, 31)),
        });
        assert!(account.has_active_deduction(day(2025, 8, 31)));
        assert!(!account.has_active_deduction(day(2025, 9, 1)));
        assert!(!account.has_active_deduction(day(2025, 3, 31)));
    }

    #[test]
    fn percentage_deduction_scales_with_gross() {
        let tuition = TrackableAccount::reserve("Tuition", Money::from_cents(400_000))
            .with_deduction(Money::from_cents(2_000))
            .with_percentage_deduction(500)
            .paid(PaymentFrequency::Semester)
            .variable();
        assert!(tuition.has_active_deduction(day(2025, 1, 6)));
        assert_eq!(
            tuition.deduction_for(Money::from_cents(150_000)),
            Money::from_cents(9_500)
        );
        assert_eq!(tuition.payment_frequency, Some(PaymentFrequency::Semester));
    }
}
