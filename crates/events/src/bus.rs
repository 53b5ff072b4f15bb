//! Event publishing/subscription abstraction (mechanics only).
//!
//! This module provides the **notifier capability** - a pub/sub mechanism for
//! distributing live updates to consumers (the SSE relay, dashboards, tests).
//!
//! ## Design Philosophy
//!
//! The bus is intentionally **lightweight** and makes minimal assumptions:
//!
//! - **Transport-agnostic**: works with in-memory channels today; a broker
//!   later would implement the same trait
//! - **Best-effort delivery**: a slow or dead subscriber loses messages; the
//!   engine never retries or blocks on delivery
//! - **No persistence**: the bus distributes, it does not store; the
//!   reservation store is the source of truth
//!
//! ## Why Best-Effort?
//!
//! Publication always happens *after* the storage commit, so a lost message
//! only costs a UI update, never consistency. Clients that miss an update
//! re-read the current state over HTTP. This is also why `publish` must stay
//! cheap and non-blocking: callers invoke it right after leaving an atomic
//! section and must never be suspended by a subscriber.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// A subscription to the live-update stream.
///
/// Each subscription gets a copy of every message published after it was
/// created (broadcast semantics).
///
/// ## Usage Pattern
///
/// ```ignore
/// let bus: Arc<dyn EventBus<DropEvent, Error = ...>> = ...;
/// let subscription = bus.subscribe();
///
/// loop {
///     match subscription.recv_timeout(Duration::from_secs(1)) {
///         Ok(event) => forward(event)?,
///         Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,  // Check for shutdown
///         Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,  // Bus closed
///     }
/// }
/// ```
///
/// ## Thread Safety
///
/// Subscriptions are designed for single-threaded consumption. Each
/// subscription should be used by one thread (the SSE relay runs one blocking
/// task per subscription).
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Domain-agnostic event bus (pub/sub abstraction).
///
/// The notifier capability handed to the reservation manager and the expiry
/// reclaimer at construction. Injecting it (instead of reaching for a global
/// transport handle) keeps init ordering explicit and lets tests subscribe to
/// exactly what the engine emits.
///
/// ## Architecture Role
///
/// ```text
/// Reserve / CompletePurchase / Reclaim → store commit → EventBus (publish)
///                                                           ├─ SSE relay
///                                                           └─ tests
/// ```
///
/// Events are **committed first**, published second. If publication fails the
/// operation still succeeded; callers log and move on.
///
/// ## Thread Safety
///
/// The trait requires `Send + Sync`; multiple request workers and the
/// reclaimer publish concurrently. Within one item, publications follow the
/// per-item commit order because each publisher emits right after its own
/// commit, still on the same call path.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
