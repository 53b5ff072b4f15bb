//! Value object trait: equality by value, not identity.
//!
//! Value objects are domain objects that have **no identity** - they are defined entirely
//! by their attribute values. Two value objects with the same values are considered equal.

/// Marker trait for value objects.
///
/// Value objects are domain objects that are **immutable** and **compared by value**.
/// They represent concepts where identity doesn't matter - only the values matter.
///
/// ## Value Object vs Entity
///
/// - **Value Object**: No identity (two value objects with same values are equal)
/// - **Entity**: Has identity (two entities with same ID are the same entity)
///
/// Example:
/// - `StockLevel { total: 10, available: 3 }` is a value object
/// - `Item { id: ItemId(...), name: "..." }` is an entity
///
/// ## Design Constraints
///
/// The trait requires:
/// - **Clone**: Value objects should be cheap to copy (they're values, not references)
/// - **PartialEq**: Value objects are compared by their attribute values
/// - **Debug**: Value objects should be debuggable (helpful for logging, testing)
///
/// ## Usage Pattern
///
/// ```ignore
/// #[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// struct StockLevel {
///     total: u32,
///     available: u32,
/// }
///
/// impl ValueObject for StockLevel {}
///
/// // Two levels with the same counts are equal
/// assert_eq!(StockLevel::new(10)?, StockLevel::new(10)?);
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
