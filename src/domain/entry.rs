use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    account::AccountKind,
    common::{Identifiable, Money},
};

/// One dated, signed balance change in an account's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeEntry {
    pub id: Uuid,
    pub account_id: Uuid,
    pub account_kind: AccountKind,
    pub amount: Money,
    pub date: NaiveDate,
    /// Mutation that produced this entry; absent for the opening entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_mutation: Option<Uuid>,
    /// Running balance after applying `amount`.
    pub balance: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Insertion order, used to break ties between entries on the same date.
    pub sequence: u64,
}

impl ChangeEntry {
    pub fn is_opening(&self) -> bool {
        self.source_mutation.is_none()
    }

    pub(crate) fn sort_key(&self) -> (NaiveDate, u64) {
        (self.date, self.sequence)
    }
}

impl Identifiable for ChangeEntry {
    fn id(&self) -> Uuid {
        self.id
    }
}
