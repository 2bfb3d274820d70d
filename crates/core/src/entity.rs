//! Entities: things with an identity that outlives their field values.

/// A child object identified by id rather than by value.
///
/// Line items are entities owned by an aggregate; they are only persisted
/// through their owner.
pub trait Entity {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;
}
