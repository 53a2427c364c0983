use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{
    core::errors::{BudgetError, Result},
    domain::common::Money,
};

pub const DAYS_PER_WEEK: i64 = 7;

/// One calendar budget week.
///
/// `base_allocation` is the half of a paycheck assigned at split time and is
/// never adjusted for rollover; the displayed starting balance is derived from
/// the period transfers owned by the week when it is read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BudgetWeek {
    pub number: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub base_allocation: Money,
    #[serde(default)]
    pub period_processed: bool,
}

impl BudgetWeek {
    pub fn new(number: u32, start_date: NaiveDate, base_allocation: Money) -> Self {
        Self {
            number,
            start_date,
            end_date: start_date + Duration::days(DAYS_PER_WEEK - 1),
            base_allocation,
            period_processed: false,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }

    pub fn period(&self) -> Result<PayPeriod> {
        PayPeriod::containing(self.number)
    }
}

/// Two budget weeks `(2k - 1, 2k)` sharing one paycheck split.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PayPeriod {
    first: u32,
}

impl PayPeriod {
    /// Validates that the two week numbers form an `(odd, odd + 1)` pair.
    pub fn new(first: u32, second: u32) -> Result<Self> {
        if first == 0 || first % 2 == 0 || second != first + 1 {
            return Err(BudgetError::InvalidPeriod(format!(
                "weeks {} and {} do not form a pay period",
                first, second
            )));
        }
        Ok(Self { first })
    }

    /// Returns the period that week `number` belongs to.
    pub fn containing(number: u32) -> Result<Self> {
        match number {
            0 => Err(BudgetError::InvalidPeriod(
                "week numbers start at 1".into(),
            )),
            n if n % 2 == 1 => Ok(Self { first: n }),
            n => Ok(Self { first: n - 1 }),
        }
    }

    pub fn first(&self) -> u32 {
        self.first
    }

    pub fn second(&self) -> u32 {
        self.first + 1
    }

    pub fn weeks(&self) -> [u32; 2] {
        [self.first(), self.second()]
    }

    pub fn contains(&self, number: u32) -> bool {
        number == self.first() || number == self.second()
    }

    /// Week number of the other half of the period.
    pub fn sibling_of(&self, number: u32) -> Option<u32> {
        if number == self.first() {
            Some(self.second())
        } else if number == self.second() {
            Some(self.first())
        } else {
            None
        }
    }
}
