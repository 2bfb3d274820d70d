//! Currency amounts and percentages.
//!
//! Amounts are non-negative decimals with two fractional digits, bounded by the
//! `NUMERIC(10,2)` columns they are stored in. Intermediate arithmetic is exact;
//! rounding to cents happens once, at the end of each pricing rule. Arithmetic
//! that could leave the range is checked and reports a validation error.

use core::fmt;
use core::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Number of fractional digits kept for currency values.
pub const CURRENCY_SCALE: u32 = 2;

/// Largest amount a `NUMERIC(10,2)` column holds, in cents (99,999,999.99).
pub const MAX_AMOUNT_CENTS: i64 = 9_999_999_999;

fn max_amount() -> Decimal {
    Decimal::new(MAX_AMOUNT_CENTS, CURRENCY_SCALE)
}

/// Round a decimal to cents the way Postgres rounds `NUMERIC` (half away from zero).
pub fn round_currency(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// A non-negative currency amount with two decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Build an amount, rounding to cents. Negative amounts and amounts above
    /// [`Money::ceiling`] are rejected.
    pub fn new(amount: Decimal) -> DomainResult<Self> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(DomainError::validation(format!(
                "amount must be non-negative, got {amount}"
            )));
        }
        let rounded = round_currency(amount);
        if rounded > max_amount() {
            return Err(DomainError::validation(format!(
                "amount must not exceed {}, got {amount}",
                max_amount()
            )));
        }
        Ok(Self(rounded))
    }

    /// The largest storable amount.
    pub fn ceiling() -> Money {
        Money(max_amount())
    }

    /// Whole currency units (e.g. `Money::from_major(1000)` is 1000.00).
    pub fn from_major(units: u16) -> Self {
        Self(Decimal::from(units))
    }

    /// Amount expressed in cents (e.g. `Money::from_cents(1999)` is 19.99).
    ///
    /// `u32::MAX` cents is still below [`Money::ceiling`].
    pub fn from_cents(cents: u32) -> Self {
        Self(Decimal::new(i64::from(cents), CURRENCY_SCALE))
    }

    pub fn amount(self) -> Decimal {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    /// `self - other`, or `None` when the result would be negative.
    pub fn checked_sub(self, other: Money) -> Option<Money> {
        let diff = self.0 - other.0;
        if diff.is_sign_negative() && !diff.is_zero() {
            None
        } else {
            Some(Money(diff))
        }
    }

    /// `self - self * percent / 100`, rounded to cents.
    pub fn percent_off(self, percent: Percent) -> Money {
        if percent.is_zero() {
            return self;
        }
        let reduction = self.0 * Decimal::from(percent.get()) / Decimal::ONE_HUNDRED;
        Money(round_currency(self.0 - reduction))
    }

    /// `self * quantity`, or a validation error past [`Money::ceiling`].
    pub fn times(self, quantity: u32) -> DomainResult<Money> {
        let product = self
            .0
            .checked_mul(Decimal::from(quantity))
            .ok_or_else(|| DomainError::validation(format!("{self} x {quantity} is out of range")))?;
        Money::new(product)
    }

    /// `self + other`, or a validation error past [`Money::ceiling`].
    pub fn checked_add(self, other: Money) -> DomainResult<Money> {
        Money::new(self.0 + other.0)
    }

    /// Sum of `amounts`, failing as soon as the running total leaves the range.
    pub fn total(amounts: impl IntoIterator<Item = Money>) -> DomainResult<Money> {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |sum, amount| sum.checked_add(amount))
    }
}

impl ValueObject for Money {}

impl TryFrom<Decimal> for Money {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Money::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl FromStr for Money {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let amount = Decimal::from_str(s.trim())
            .map_err(|e| DomainError::validation(format!("invalid amount '{s}': {e}")))?;
        Money::new(amount)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// An integer percentage in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Percent(u8);

impl Percent {
    pub const ZERO: Percent = Percent(0);

    pub fn new(value: u8) -> DomainResult<Self> {
        if value > 100 {
            return Err(DomainError::validation(format!(
                "percentage must be within 0..=100, got {value}"
            )));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl ValueObject for Percent {}

impl TryFrom<u8> for Percent {
    type Error = DomainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Percent::new(value)
    }
}

impl From<Percent> for u8 {
    fn from(value: Percent) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_negative_amounts() {
        assert!(matches!(
            Money::new(Decimal::new(-1, 2)),
            Err(DomainError::Validation(_))
        ));
        assert_eq!(Money::new(Decimal::ZERO).unwrap(), Money::ZERO);
    }

    #[test]
    fn rounds_to_cents_half_away_from_zero() {
        let m = Money::new(Decimal::new(10005, 3)).unwrap();
        assert_eq!(m.amount(), Decimal::new(1001, 2));
    }

    #[test]
    fn percent_off_and_times() {
        let unit = Money::from_major(500);
        let discounted = unit.percent_off(Percent::new(20).unwrap());
        assert_eq!(discounted, Money::from_major(400));
        assert_eq!(discounted.times(3).unwrap(), Money::from_major(1200));
    }

    #[test]
    fn amounts_are_capped_at_the_column_maximum() {
        assert_eq!(Money::new(Decimal::new(MAX_AMOUNT_CENTS, 2)).unwrap(), Money::ceiling());
        assert!(matches!(
            Money::new(Decimal::new(MAX_AMOUNT_CENTS + 1, 2)),
            Err(DomainError::Validation(_))
        ));
        assert!(serde_json::from_str::<Money>("\"79228162514264337593543950335\"").is_err());
    }

    #[test]
    fn arithmetic_past_the_maximum_is_a_validation_error() {
        assert!(matches!(Money::ceiling().times(2), Err(DomainError::Validation(_))));
        assert_eq!(Money::ceiling().times(1).unwrap(), Money::ceiling());
        assert!(matches!(
            Money::ceiling().checked_add(Money::from_cents(1)),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            Money::total([Money::ceiling(), Money::from_cents(1), Money::ZERO]),
            Err(DomainError::Validation(_))
        ));
        assert_eq!(
            Money::total([Money::from_major(1), Money::from_cents(50)]).unwrap(),
            Money::from_cents(150)
        );
        assert_eq!(Money::total([]).unwrap(), Money::ZERO);
    }

    #[test]
    fn checked_sub_refuses_to_go_negative() {
        assert_eq!(
            Money::from_major(10).checked_sub(Money::from_major(4)),
            Some(Money::from_major(6))
        );
        assert_eq!(Money::from_major(4).checked_sub(Money::from_major(10)), None);
    }

    #[test]
    fn percent_rejects_values_over_100() {
        assert!(Percent::new(100).is_ok());
        assert!(matches!(Percent::new(101), Err(DomainError::Validation(_))));
    }

    #[test]
    fn money_serializes_as_decimal_string() {
        let json = serde_json::to_string(&Money::from_cents(1999)).unwrap();
        assert_eq!(json, "\"19.99\"");
        let back: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Money::from_cents(1999));
        assert!(serde_json::from_str::<Money>("\"-1.00\"").is_err());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: a discount never raises the price, and 0% leaves it untouched.
            #[test]
            fn percent_off_never_exceeds_original(cents in 0u32..100_000_000, pct in 0u8..=100) {
                let price = Money::from_cents(cents);
                let discounted = price.percent_off(Percent::new(pct).unwrap());
                prop_assert!(discounted <= price);
                if pct == 0 {
                    prop_assert_eq!(discounted, price);
                }
            }
        }
    }
}
