//! Catalog domain: the product ledger.
//!
//! Pricing, stock and rating rules for catalog items, implemented as
//! deterministic domain logic (no IO, no storage). Stores in `storefront-infra`
//! apply the same rules as single atomic updates.

pub mod product;
pub mod query;
pub mod slug;

pub use product::{
    Category, NewProduct, Product, ProductDraft, ProductImage, ProductRecord, ProductSummary,
    next_rating_average, validate_rating,
};
pub use query::{
    DEFAULT_SEARCH_LIMIT, DEFAULT_SHOWCASE_LIMIT, ProductFilter, ProductSort, new_arrivals_since,
};
pub use slug::{slugify, validate_slug};
