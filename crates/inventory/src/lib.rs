//! Drop catalog domain: items and their stock levels.
//!
//! This crate contains business rules for item stock, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod item;
pub mod stock;

pub use item::Item;
pub use stock::StockLevel;
