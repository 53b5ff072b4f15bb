//! Infrastructure layer: storage, the reservation engine, and the expiry sweep.
//!
//! The domain crates stay pure; everything that touches IO, locks, clocks, or
//! background tasks lives here.

pub mod manager;
pub mod reclaimer;
pub mod store;
