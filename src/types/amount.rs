//! Money in integer minor-currency units
//!
//! Every monetary value that flows through the engine (order totals, principals,
//! fees, adjustments) is an [`Amount`]. Floats never appear: amounts are parsed
//! from integer strings and all arithmetic is checked.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Integer amount of minor currency units (e.g. UGX has no subunit, so 1 == 1 UGX).
///
/// Signed so that administrative adjustments can carry negative deltas;
/// balances and principals are validated to be positive where it matters.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);
    pub const MAX: Amount = Amount(i64::MAX);

    pub const fn new(minor_units: i64) -> Self {
        Amount(minor_units)
    }

    pub const fn minor_units(self) -> i64 {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_sub(rhs.0).map(Amount)
    }

    /// `self - rhs`, floored at zero.
    pub fn saturating_sub_floor(self, rhs: Amount) -> Amount {
        Amount(self.0.saturating_sub(rhs.0).max(0))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(Amount)
    }
}

impl From<i64> for Amount {
    fn from(value: i64) -> Self {
        Amount(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn checked_add_detects_overflow() {
        assert_eq!(Amount::new(1).checked_add(Amount::new(2)), Some(Amount::new(3)));
        assert_eq!(Amount::MAX.checked_add(Amount::new(1)), None);
    }

    #[rstest]
    #[case::above(Amount::new(50_000), Amount::new(20_000), Amount::new(30_000))]
    #[case::equal(Amount::new(50_000), Amount::new(50_000), Amount::ZERO)]
    #[case::below(Amount::new(20_000), Amount::new(50_000), Amount::ZERO)]
    fn saturating_sub_never_goes_negative(
        #[case] total: Amount,
        #[case] paid: Amount,
        #[case] expected: Amount,
    ) {
        assert_eq!(total.saturating_sub_floor(paid), expected);
    }

    #[rstest]
    #[case::plain("50000", Some(Amount::new(50_000)))]
    #[case::padded("  1200 ", Some(Amount::new(1_200)))]
    #[case::negative("-500", Some(Amount::new(-500)))]
    #[case::decimal("10.5", None)]
    #[case::garbage("ten", None)]
    fn parses_integer_strings_only(#[case] input: &str, #[case] expected: Option<Amount>) {
        assert_eq!(input.parse::<Amount>().ok(), expected);
    }
}
