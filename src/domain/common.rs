use std::{
    fmt,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies entities that expose a stable unique identifier.
pub trait Identifiable {
    fn id(&self) -> Uuid;
}

/// Provides access to a human-friendly entity name.
pub trait NamedEntity {
    fn name(&self) -> &str;
}

/// Supplies a presentation-ready label for UI or logs.
pub trait Displayable {
    fn display_label(&self) -> String;
}

/// Signed amount of money in whole cents.
///
/// Every balance, allocation and transfer is integral so running balances and
/// regenerated rollovers compare exactly.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Builds an amount from dollars, rounding half away from zero to the cent.
    pub fn from_dollars(dollars: f64) -> Self {
        Self((dollars * 100.0).round() as i64)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub const fn abs(self) -> Self {
        Self(self.0.abs())
    }

    /// Share of the amount given in basis points (1/100 of a percent),
    /// rounded half away from zero to the cent.
    pub fn percent(self, basis_points: u32) -> Money {
        let scaled = i128::from(self.0) * i128::from(basis_points);
        let rounded = (scaled.abs() + 5_000) / 10_000;
        let cents = i64::try_from(rounded).unwrap_or(i64::MAX);
        Money(if scaled < 0 { -cents } else { cents })
    }

    /// Splits the amount in two, the first half rounded toward negative infinity.
    pub fn halves(self) -> (Money, Money) {
        let first = self.0.div_euclid(2);
        (Money(first), Money(self.0 - first))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}${}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.copied().sum()
    }
}

// Re-export common dependencies so consumers can rely on this module as a façade.
pub use chrono;
pub use serde;
pub use uuid;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halves_put_the_odd_cent_in_the_second_half() {
        let (first, second) = Money::from_cents(432_501).halves();
        assert_eq!(first, Money::from_cents(216_250));
        assert_eq!(second, Money::from_cents(216_251));

        let (first, second) = Money::from_cents(-3).halves();
        assert_eq!(first + second, Money::from_cents(-3));
        assert_eq!(first, Money::from_cents(-2));
    }

    #[test]
    fn percent_rounds_to_the_cent() {
        assert_eq!(Money::from_cents(150_000).percent(1_000), Money::from_cents(15_000));
        assert_eq!(Money::from_cents(333).percent(5_000), Money::from_cents(167));
        assert_eq!(Money::from_cents(-333).percent(5_000), Money::from_cents(-167));
        assert_eq!(Money::from_cents(1_234).percent(0), Money::ZERO);
    }

    #[test]
    fn display_formats_sign_and_cents() {
        assert_eq!(Money::from_cents(193_750).to_string(), "$1937.50");
        assert_eq!(Money::from_cents(-5).to_string(), "-$0.05");
        assert_eq!(Money::from_dollars(2162.5), Money::from_cents(216_250));
    }
}
