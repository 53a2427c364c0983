use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    account::AccountKind,
    common::{Identifiable, Money},
};

/// Discriminates what a mutation does; the kind alone decides the ledger sign.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Spending,
    Income,
    ReserveContribution,
    ReservePayout,
    AccumulatorContribution,
    TransferIn,
    TransferOut,
    /// Unspent allocation carried into the owning week.
    PeriodTransferIn,
    /// Overspent allocation carried into the owning week as a deficit.
    PeriodTransferOut,
}

impl MutationKind {
    /// Signed ledger delta for a non-negative `magnitude`.
    pub fn signed(self, magnitude: Money) -> Money {
        match self {
            MutationKind::ReservePayout
            | MutationKind::TransferOut
            | MutationKind::PeriodTransferOut => -magnitude,
            _ => magnitude,
        }
    }

    pub fn is_transfer(self) -> bool {
        matches!(
            self,
            MutationKind::TransferIn
                | MutationKind::TransferOut
                | MutationKind::PeriodTransferIn
                | MutationKind::PeriodTransferOut
        )
    }

    pub fn is_period_transfer(self) -> bool {
        matches!(
            self,
            MutationKind::PeriodTransferIn | MutationKind::PeriodTransferOut
        )
    }

    /// Kinds whose changes can move a period's rollover figures.
    pub fn affects_rollover(self) -> bool {
        matches!(
            self,
            MutationKind::Spending | MutationKind::AccumulatorContribution
        )
    }

    /// Account kind this mutation may be posted against, `None` meaning any.
    pub fn required_account_kind(self) -> Option<AccountKind> {
        match self {
            MutationKind::ReserveContribution | MutationKind::ReservePayout => {
                Some(AccountKind::Reserve)
            }
            MutationKind::AccumulatorContribution => Some(AccountKind::Accumulator),
            _ => None,
        }
    }

    /// Week-level kinds never touch an account history.
    pub fn allows_account(self) -> bool {
        !matches!(self, MutationKind::Spending) && !self.is_period_transfer()
    }

    /// Kinds that cannot exist without an account.
    pub fn requires_account(self) -> bool {
        matches!(
            self,
            MutationKind::ReserveContribution
                | MutationKind::ReservePayout
                | MutationKind::AccumulatorContribution
                | MutationKind::TransferIn
                | MutationKind::TransferOut
        )
    }
}

/// Which leg of the rollover cascade generated a mutation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RolloverLeg {
    WeekToWeek,
    WeekToAccumulator,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "source", content = "leg", rename_all = "snake_case")]
pub enum MutationOrigin {
    #[default]
    Manual,
    Paycheck,
    Rollover(RolloverLeg),
}

impl MutationOrigin {
    pub fn is_rollover(self) -> bool {
        matches!(self, MutationOrigin::Rollover(_))
    }
}

/// A recorded money movement.
///
/// `owner_week` and `value_date` are independent: a week-to-week rollover is
/// owned by the receiving week but value-dated to the end of the sending one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mutation {
    pub id: Uuid,
    pub kind: MutationKind,
    pub magnitude: Money,
    pub value_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_week: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<Uuid>,
    #[serde(default)]
    pub origin: MutationOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_group: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Cleared for spending that should stay out of spending totals. The
    /// rollover still counts it.
    #[serde(default = "Mutation::include_in_analytics_default")]
    pub include_in_analytics: bool,
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
}

impl Mutation {
    pub fn signed_amount(&self) -> Money {
        self.kind.signed(self.magnitude)
    }

    pub fn is_rollover(&self) -> bool {
        self.origin.is_rollover()
    }

    pub fn include_in_analytics_default() -> bool {
        true
    }

    /// Transfers and generated rollovers never start a recalculation.
    pub fn can_trigger_recalculation(&self) -> bool {
        self.kind.affects_rollover()
            && !self.kind.is_transfer()
            && !self.is_rollover()
            && self.owner_week.is_some()
    }
}

impl Identifiable for Mutation {
    fn id(&self) -> Uuid {
        self.id
    }
}

/// Caller-side description of a mutation to record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMutation {
    pub kind: MutationKind,
    pub magnitude: Money,
    pub value_date: NaiveDate,
    pub owner_week: Option<u32>,
    pub account_id: Option<Uuid>,
    pub origin: MutationOrigin,
    pub transfer_group: Option<Uuid>,
    pub category: Option<String>,
    pub note: Option<String>,
    pub include_in_analytics: bool,
}

impl NewMutation {
    pub fn new(kind: MutationKind, magnitude: Money, value_date: NaiveDate) -> Self {
        Self {
            kind,
            magnitude,
            value_date,
            owner_week: None,
            account_id: None,
            origin: MutationOrigin::Manual,
            transfer_group: None,
            category: None,
            note: None,
            include_in_analytics: true,
        }
    }

    pub fn spending(week: u32, magnitude: Money, value_date: NaiveDate) -> Self {
        Self::new(MutationKind::Spending, magnitude, value_date).in_week(week)
    }

    pub fn income(week: u32, magnitude: Money, value_date: NaiveDate) -> Self {
        Self::new(MutationKind::Income, magnitude, value_date).in_week(week)
    }

    pub fn in_week(mut self, week: u32) -> Self {
        self.owner_week = Some(week);
        self
    }

    pub fn for_account(mut self, account_id: Uuid) -> Self {
        self.account_id = Some(account_id);
        self
    }

    pub fn with_origin(mut self, origin: MutationOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn excluded_from_analytics(mut self) -> Self {
        self.include_in_analytics = false;
        self
    }
}

/// Partial update for an existing mutation. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationPatch {
    pub magnitude: Option<Money>,
    pub value_date: Option<NaiveDate>,
    pub owner_week: Option<Option<u32>>,
    pub account_id: Option<Option<Uuid>>,
    pub category: Option<Option<String>>,
    pub note: Option<Option<String>>,
    pub include_in_analytics: Option<bool>,
}

impl MutationPatch {
    pub fn magnitude(amount: Money) -> Self {
        Self {
            magnitude: Some(amount),
            ..Self::default()
        }
    }

    pub fn has_effect(&self) -> bool {
        self.magnitude.is_some()
            || self.value_date.is_some()
            || self.owner_week.is_some()
            || self.account_id.is_some()
            || self.category.is_some()
            || self.note.is_some()
            || self.include_in_analytics.is_some()
    }
}
