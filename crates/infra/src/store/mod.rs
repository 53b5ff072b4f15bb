//! Durable storage for items, reservations, and purchases.
//!
//! The [`ReservationStore`] trait defines the per-item exclusive-section
//! model the engine runs on. Two implementations are provided: an in-memory
//! store for tests and single-process deployments, and a Postgres store that
//! maps the section to a row-locking transaction.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryReservationStore;
pub use postgres::PostgresReservationStore;
pub use r#trait::{ItemSection, ReservationStore, StoreError};
