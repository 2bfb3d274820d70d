//! Postgres-backed stores.
//!
//! ## Column types
//!
//! | Domain | Column |
//! |--------|--------|
//! | `u32` counters, quantities | `INTEGER` (checked conversion both ways) |
//! | `Money` | `NUMERIC(10, 2)` |
//! | `Percent` | `INTEGER` in `0..=100` |
//! | enums | `TEXT` holding `as_str()` |
//! | images, specifications, shipping address | `JSONB` |
//!
//! Both stores are `Send + Sync` and share nothing but the pool.

use sqlx::postgres::PgRow;
use sqlx::{Decode, Postgres, Row, Type};

use rust_decimal::Decimal;
use storefront_core::{DomainError, Money, Percent};

use crate::error::{StoreError, StoreResult, map_sqlx_error};

mod orders;
mod products;

pub use orders::PostgresOrderStore;
pub use products::PostgresProductStore;

pub(crate) fn column<'r, T>(row: &'r PgRow, name: &str) -> StoreResult<T>
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| map_sqlx_error("decode row", e))
}

pub(crate) fn count_column(row: &PgRow, name: &str) -> StoreResult<u32> {
    let value: i32 = column(row, name)?;
    u32::try_from(value)
        .map_err(|_| StoreError::database(format!("{name} out of range: {value}")))
}

pub(crate) fn money_column(row: &PgRow, name: &str) -> StoreResult<Money> {
    Ok(Money::new(column::<Decimal>(row, name)?)?)
}

pub(crate) fn percent_column(row: &PgRow, name: &str) -> StoreResult<Percent> {
    let value: i32 = column(row, name)?;
    let value = u8::try_from(value)
        .map_err(|_| StoreError::database(format!("{name} out of range: {value}")))?;
    Ok(Percent::new(value)?)
}

/// `u32` to `INTEGER`; values past `i32::MAX` are rejected before reaching SQL.
pub(crate) fn to_sql_int(name: &str, value: u32) -> StoreResult<i32> {
    i32::try_from(value)
        .map_err(|_| DomainError::validation(format!("{name} too large: {value}")).into())
}

pub(crate) fn percent_to_sql(value: Percent) -> i32 {
    i32::from(value.get())
}

/// `%term%` for `ILIKE`, with the pattern metacharacters escaped.
pub(crate) fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("phone"), "%phone%");
        assert_eq!(contains_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(contains_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn oversized_counts_are_rejected() {
        assert_eq!(to_sql_int("stock", 7).unwrap(), 7);
        let err = to_sql_int("stock", u32::MAX).unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::Validation(_))));
    }
}
