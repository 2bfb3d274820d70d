//! Application workflows composed from the store traits.
//!
//! Workflows hold no state of their own. They sequence store calls, keep
//! product stock consistent with order state, and log what they did.

pub mod checkout;
pub mod fulfilment;

pub use checkout::{Checkout, CheckoutLine, CheckoutRequest};
pub use fulfilment::Fulfilment;
