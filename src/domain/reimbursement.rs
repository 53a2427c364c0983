use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::common::{Identifiable, Money};

/// Lifecycle of an expense waiting to be paid back.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReimbursementState {
    /// Paid out of pocket, not yet claimed.
    #[default]
    Pending,
    Submitted,
    Reimbursed,
    Partial,
    Denied,
}

impl ReimbursementState {
    /// Claimed but not (fully) paid back.
    pub fn is_outstanding(self) -> bool {
        matches!(
            self,
            ReimbursementState::Submitted | ReimbursementState::Partial
        )
    }

    pub fn is_complete(self) -> bool {
        matches!(
            self,
            ReimbursementState::Reimbursed | ReimbursementState::Denied
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            ReimbursementState::Pending => "Pending Submission",
            ReimbursementState::Submitted => "Awaiting Payment",
            ReimbursementState::Reimbursed => "Reimbursed",
            ReimbursementState::Partial => "Partially Reimbursed",
            ReimbursementState::Denied => "Denied",
        }
    }
}

/// Out-of-pocket expense tracked on the side. It never posts a ledger entry
/// and never changes a week's figures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reimbursement {
    pub id: Uuid,
    pub amount: Money,
    /// Purchase date.
    pub date: NaiveDate,
    #[serde(default)]
    pub state: ReimbursementState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Trip or place tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reimbursed_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reimbursement {
    pub fn from_draft(draft: NewReimbursement, today: NaiveDate) -> Self {
        let now = Utc::now();
        let mut reimbursement = Self {
            id: Uuid::new_v4(),
            amount: draft.amount,
            date: draft.date,
            state: ReimbursementState::Pending,
            notes: draft.notes,
            category: draft.category,
            location: draft.location,
            submitted_date: None,
            reimbursed_date: None,
            created_at: now,
            updated_at: now,
        };
        reimbursement.move_to(draft.state, today);
        reimbursement
    }

    /// Changes state and fills in lifecycle dates that are still blank.
    /// Dates already recorded are kept.
    pub fn move_to(&mut self, state: ReimbursementState, today: NaiveDate) {
        match state {
            ReimbursementState::Submitted => {
                self.submitted_date.get_or_insert(today);
            }
            ReimbursementState::Reimbursed | ReimbursementState::Partial => {
                self.submitted_date.get_or_insert(today);
                self.reimbursed_date.get_or_insert(today);
            }
            ReimbursementState::Pending | ReimbursementState::Denied => {}
        }
        self.state = state;
        self.updated_at = Utc::now();
    }
}

impl Identifiable for Reimbursement {
    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReimbursement {
    pub amount: Money,
    pub date: NaiveDate,
    pub state: ReimbursementState,
    pub notes: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
}

impl NewReimbursement {
    pub fn new(amount: Money, date: NaiveDate) -> Self {
        Self {
            amount,
            date,
            state: ReimbursementState::Pending,
            notes: None,
            category: None,
            location: None,
        }
    }

    pub fn in_state(mut self, state: ReimbursementState) -> Self {
        self.state = state;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Partial update for a reimbursement. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReimbursementPatch {
    pub amount: Option<Money>,
    pub date: Option<NaiveDate>,
    pub state: Option<ReimbursementState>,
    pub notes: Option<Option<String>>,
    pub category: Option<Option<String>>,
    pub location: Option<Option<String>>,
}
