//! Human-facing order numbers: `ORD` + `YYMMDD` + 4-digit random suffix.

use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use storefront_core::{DomainError, DomainResult, ValueObject};

pub const ORDER_NUMBER_PREFIX: &str = "ORD";

/// A validated order number, unique per order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Generate a number for an order created at `at` (UTC calendar date).
    ///
    /// Ten thousand suffixes per day; collisions surface as `Duplicate` on insert
    /// and the caller regenerates.
    pub fn generate<R: Rng + ?Sized>(at: DateTime<Utc>, rng: &mut R) -> Self {
        let suffix: u16 = rng.gen_range(0..10_000);
        Self(format!(
            "{ORDER_NUMBER_PREFIX}{}{suffix:04}",
            at.format("%y%m%d")
        ))
    }

    /// Accept a caller-supplied number; it must have the generated shape.
    pub fn parse(value: impl Into<String>) -> DomainResult<Self> {
        let value = value.into();
        let well_formed = value
            .strip_prefix(ORDER_NUMBER_PREFIX)
            .is_some_and(|digits| digits.len() == 10 && digits.bytes().all(|b| b.is_ascii_digit()));
        if !well_formed {
            return Err(DomainError::validation(format!(
                "order number '{value}' must be {ORDER_NUMBER_PREFIX} followed by 10 digits"
            )));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for OrderNumber {}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OrderNumber {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderNumber::parse(s)
    }
}

impl TryFrom<String> for OrderNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        OrderNumber::parse(value)
    }
}

impl From<OrderNumber> for String {
    fn from(value: OrderNumber) -> Self {
        value.0
    }
}
