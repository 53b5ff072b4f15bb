//! Live-update events and the notifier abstraction.
//!
//! The reservation engine publishes [`DropEvent`]s after each storage commit;
//! subscribers (the SSE relay, tests) consume them through the transport-
//! agnostic [`EventBus`] capability.

pub mod bus;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use event::DropEvent;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
