//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. To
/// "modify" one, build a new one (`Money::percent_off` returns a new amount
/// rather than mutating in place).
///
/// - **Value Object**: `Money`, `Percent`, `OrderNumber`, `Slug`
/// - **Entity**: `OrderItem` (has an id, lives inside an `Order`)
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
