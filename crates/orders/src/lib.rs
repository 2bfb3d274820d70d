//! Orders domain: the order aggregate and its line items.
//!
//! This crate contains the money and status rules for customer orders,
//! implemented purely as deterministic domain logic (no IO, no storage).
//! Callers pass the current time in; nothing here reads the clock.

pub mod item;
pub mod number;
pub mod order;
pub mod status;

pub use item::{LinePricing, NewOrderItem, OrderItem, OrderItemRecord, ProductSnapshot, line_total};
pub use number::OrderNumber;
pub use order::{
    DEFAULT_PRODUCT_ITEMS_LIMIT, DEFAULT_STATUS_ORDERS_LIMIT, DEFAULT_USER_ORDERS_LIMIT, NewOrder,
    Order, OrderAmounts, OrderQuery, OrderRecord, PaymentMethod, ShippingAddress, ShippingMethod,
};
pub use status::{OrderStatus, PaymentStatus};
