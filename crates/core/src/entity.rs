//! Entity trait: identity + continuity across state changes.
//!
//! An `Item` keeps its identity while its stock level changes; a
//! `Reservation` keeps its identity across status transitions.

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
