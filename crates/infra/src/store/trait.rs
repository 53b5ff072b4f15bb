use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use dropshop_core::{HolderId, ItemId, ReservationId};
use dropshop_inventory::Item;
use dropshop_reservations::{Purchase, Reservation};

/// Errors surfaced by reservation stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Lost a race with another writer (lock contention, serialization
    /// failure, unique-index collision). Safe to retry the whole unit of
    /// work from the top.
    #[error("storage conflict: {0}")]
    Conflict(String),

    /// The addressed record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A storage-level backstop rejected the commit: stock bounds, the
    /// one-active-lease rule, or the one-purchase-per-reservation rule.
    /// Reaching this means a bug upstream; the commit applied nothing.
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// IO, pool, or row-decoding failure.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Storage boundary for items, reservations, and purchases.
///
/// Reads outside a section are unlocked snapshots. Every mutation goes
/// through [`enter_item`](Self::enter_item): the returned [`ItemSection`]
/// holds the item's exclusive lock, re-reads state authoritatively, and
/// commits staged writes atomically.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Exclusive per-item unit of work produced by
    /// [`enter_item`](Self::enter_item).
    type Section: ItemSection;

    async fn insert_item(&self, item: &Item) -> Result<(), StoreError>;

    async fn get_item(&self, item_id: ItemId) -> Result<Option<Item>, StoreError>;

    /// All items, newest first.
    async fn list_items(&self) -> Result<Vec<Item>, StoreError>;

    async fn get_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Option<Reservation>, StoreError>;

    /// The holder's active reservation on an item, if any.
    ///
    /// Unlocked read; the authoritative duplicate check happens again inside
    /// the item section.
    async fn find_active_reservation(
        &self,
        holder_id: HolderId,
        item_id: ItemId,
    ) -> Result<Option<Reservation>, StoreError>;

    /// Snapshot of active reservations whose lease deadline has passed at
    /// `now`, oldest deadline first.
    ///
    /// Candidates only: each one must be re-verified under its item section
    /// before being reclaimed, because a purchase may complete between the
    /// scan and the reclaim.
    async fn find_timed_out(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>, StoreError>;

    /// Purchases made by one holder, newest first.
    async fn list_purchases_by_holder(
        &self,
        holder_id: HolderId,
    ) -> Result<Vec<Purchase>, StoreError>;

    /// The most recent purchases of one item, newest first.
    async fn recent_purchases(
        &self,
        item_id: ItemId,
        limit: usize,
    ) -> Result<Vec<Purchase>, StoreError>;

    /// Enter the item's exclusive section, suspending until the per-item
    /// lock is held.
    ///
    /// Fails with [`StoreError::NotFound`] when the item does not exist.
    /// Sections on different items never block each other.
    async fn enter_item(&self, item_id: ItemId) -> Result<Self::Section, StoreError>;
}

/// Exclusive unit of work over a single item.
///
/// Reads through the section see current state under the item lock. Writes
/// are staged and applied all-or-nothing by [`commit`](Self::commit);
/// dropping the section without committing discards every staged write and
/// releases the lock.
#[async_trait]
pub trait ItemSection: Send {
    /// The item as of entering the section.
    fn item(&self) -> &Item;

    /// The holder's active reservation on this item, read under the lock.
    async fn active_reservation_for(
        &mut self,
        holder_id: HolderId,
    ) -> Result<Option<Reservation>, StoreError>;

    /// A reservation by id, read under the lock.
    async fn reservation(
        &mut self,
        reservation_id: ReservationId,
    ) -> Result<Option<Reservation>, StoreError>;

    /// Stage the item's new stock state.
    fn stage_item(&mut self, item: Item);

    /// Stage a reservation insert or status update.
    fn stage_reservation(&mut self, reservation: Reservation);

    /// Stage a purchase insert.
    fn stage_purchase(&mut self, purchase: Purchase);

    /// Apply all staged writes atomically and release the section.
    async fn commit(self) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> ReservationStore for Arc<S>
where
    S: ReservationStore + ?Sized,
{
    type Section = S::Section;

    async fn insert_item(&self, item: &Item) -> Result<(), StoreError> {
        (**self).insert_item(item).await
    }

    async fn get_item(&self, item_id: ItemId) -> Result<Option<Item>, StoreError> {
        (**self).get_item(item_id).await
    }

    async fn list_items(&self) -> Result<Vec<Item>, StoreError> {
        (**self).list_items().await
    }

    async fn get_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Option<Reservation>, StoreError> {
        (**self).get_reservation(reservation_id).await
    }

    async fn find_active_reservation(
        &self,
        holder_id: HolderId,
        item_id: ItemId,
    ) -> Result<Option<Reservation>, StoreError> {
        (**self).find_active_reservation(holder_id, item_id).await
    }

    async fn find_timed_out(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>, StoreError> {
        (**self).find_timed_out(now).await
    }

    async fn list_purchases_by_holder(
        &self,
        holder_id: HolderId,
    ) -> Result<Vec<Purchase>, StoreError> {
        (**self).list_purchases_by_holder(holder_id).await
    }

    async fn recent_purchases(
        &self,
        item_id: ItemId,
        limit: usize,
    ) -> Result<Vec<Purchase>, StoreError> {
        (**self).recent_purchases(item_id, limit).await
    }

    async fn enter_item(&self, item_id: ItemId) -> Result<Self::Section, StoreError> {
        (**self).enter_item(item_id).await
    }
}
