//! Catalog listing filters and sort orders.
//!
//! Stores translate these into their own query language; [`ProductFilter::matches`]
//! and [`ProductSort::compare`] are the reference semantics the in-memory store
//! applies directly.

use core::cmp::Ordering;
use core::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{DomainError, Money};

use crate::product::{Category, Product};

/// Products created within this many days count as new arrivals.
pub const NEW_PRODUCT_WINDOW_DAYS: i64 = 30;

/// Default row cap for the category, featured and new-arrival helpers.
pub const DEFAULT_SHOWCASE_LIMIT: u32 = 10;

/// Default row cap for quick search.
pub const DEFAULT_SEARCH_LIMIT: u32 = 20;

/// Cutoff for [`NEW_PRODUCT_WINDOW_DAYS`].
pub fn new_arrivals_since(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(NEW_PRODUCT_WINDOW_DAYS)
}

/// Filter over active products. Every `None` field matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductFilter {
    pub category: Option<Category>,
    /// Case-insensitive substring of the brand.
    pub brand: Option<String>,
    pub min_price: Option<Money>,
    pub max_price: Option<Money>,
    /// Case-insensitive substring of name, description or brand.
    pub search: Option<String>,
}

impl ProductFilter {
    pub fn search(term: impl Into<String>) -> Self {
        Self {
            search: Some(term.into()),
            ..Self::default()
        }
    }

    pub fn category(category: Category) -> Self {
        Self {
            category: Some(category),
            ..Self::default()
        }
    }

    /// Whether an active product passes the filter. Inactive products never match.
    pub fn matches(&self, product: &Product) -> bool {
        let r = product.record();
        if !r.is_active {
            return false;
        }
        if self.category.is_some_and(|c| c != r.category) {
            return false;
        }
        if let Some(brand) = &self.brand {
            if !contains_ignore_case(&r.brand, brand) {
                return false;
            }
        }
        if self.min_price.is_some_and(|min| r.price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| r.price > max) {
            return false;
        }
        if let Some(term) = &self.search {
            let hit = contains_ignore_case(&r.name, term)
                || contains_ignore_case(&r.description, term)
                || contains_ignore_case(&r.brand, term);
            if !hit {
                return false;
            }
        }
        true
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Listing sort order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    PriceAsc,
    PriceDesc,
    NameAsc,
    NameDesc,
    RatingDesc,
    #[default]
    Newest,
}

impl ProductSort {
    /// Ordering between two products; ties fall back to id so pages are stable.
    pub fn compare(self, a: &Product, b: &Product) -> Ordering {
        let (ra, rb) = (a.record(), b.record());
        let primary = match self {
            ProductSort::PriceAsc => ra.price.cmp(&rb.price),
            ProductSort::PriceDesc => rb.price.cmp(&ra.price),
            ProductSort::NameAsc => ra.name.cmp(&rb.name),
            ProductSort::NameDesc => rb.name.cmp(&ra.name),
            ProductSort::RatingDesc => rb.rating_average.cmp(&ra.rating_average),
            ProductSort::Newest => rb.created_at.cmp(&ra.created_at),
        };
        primary.then_with(|| ra.id.cmp(&rb.id))
    }

    /// `ORDER BY` clause for SQL stores.
    pub fn order_by(self) -> &'static str {
        match self {
            ProductSort::PriceAsc => "price ASC, id ASC",
            ProductSort::PriceDesc => "price DESC, id ASC",
            ProductSort::NameAsc => "name ASC, id ASC",
            ProductSort::NameDesc => "name DESC, id ASC",
            ProductSort::RatingDesc => "rating_average DESC, id ASC",
            ProductSort::Newest => "created_at DESC, id ASC",
        }
    }
}

impl FromStr for ProductSort {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "price_asc" => Ok(ProductSort::PriceAsc),
            "price_desc" => Ok(ProductSort::PriceDesc),
            "name_asc" => Ok(ProductSort::NameAsc),
            "name_desc" => Ok(ProductSort::NameDesc),
            "rating_desc" => Ok(ProductSort::RatingDesc),
            "newest" => Ok(ProductSort::Newest),
            other => Err(DomainError::validation(format!("unknown sort '{other}'"))),
        }
    }
}
