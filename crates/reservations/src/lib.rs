//! Reservation domain: short-lived leases on stock units and the purchases
//! that finalize them.
//!
//! This crate contains the reservation state machine and purchase records,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no
//! storage). The one-shot `active -> completed | expired` transition and the
//! ownership/lease checks live here so every caller gets them for free.

pub mod purchase;
pub mod reservation;

pub use purchase::Purchase;
pub use reservation::{Reservation, ReservationStatus};
