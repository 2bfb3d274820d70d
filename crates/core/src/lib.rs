//! `storefront-core`: shared building blocks for the storefront domain.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the error taxonomy, money and the aggregate/entity traits.

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod pagination;
pub mod value_object;

pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{OrderId, OrderItemId, ProductId, UserId};
pub use money::{Money, Percent};
pub use pagination::{Page, PageRequest};
pub use value_object::ValueObject;
