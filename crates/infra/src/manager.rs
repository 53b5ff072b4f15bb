//! Reservation engine: the reserve and purchase-completion paths.
//!
//! Every mutation runs inside the item's exclusive storage section, so the
//! checks and the writes they guard can never be separated by a concurrent
//! caller. Live updates are published only after a section commits.

use chrono::Utc;
use tracing::{debug, instrument, warn};

use dropshop_core::{DomainError, DomainResult, HolderId, ItemId, ReservationId};
use dropshop_events::{DropEvent, EventBus};
use dropshop_reservations::{Purchase, Reservation};

use crate::store::{ItemSection, ReservationStore, StoreError};

/// Tuning for the reservation engine.
#[derive(Debug, Clone)]
pub struct ReservationConfig {
    /// How long a lease stays active before the sweep may reclaim it.
    pub lease_duration: chrono::Duration,
    /// How many storage conflicts to absorb before giving up on a call.
    pub max_conflict_retries: u32,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            lease_duration: chrono::Duration::seconds(60),
            max_conflict_retries: 3,
        }
    }
}

impl ReservationConfig {
    pub fn with_lease_duration(mut self, lease: chrono::Duration) -> Self {
        self.lease_duration = lease;
        self
    }

    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }
}

/// Outcome of a successful reserve: the lease plus the post-decrement
/// availability clients render the countdown and stock badge from.
#[derive(Debug, Clone, PartialEq)]
pub struct ReserveReceipt {
    pub reservation: Reservation,
    pub available_stock: u32,
}

/// Coordinates stock, reservations, and purchases over a [`ReservationStore`]
/// and publishes live updates through an [`EventBus`].
pub struct ReservationManager<S, N> {
    store: S,
    notifier: N,
    config: ReservationConfig,
}

impl<S, N> ReservationManager<S, N>
where
    S: ReservationStore,
    N: EventBus<DropEvent>,
{
    pub fn new(store: S, notifier: N, config: ReservationConfig) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &ReservationConfig {
        &self.config
    }

    /// Reserve one unit of `item_id` for `holder_id`.
    ///
    /// The duplicate-lease check, the stock decrement, and the reservation
    /// insert all happen inside the item's exclusive section; two concurrent
    /// calls can never both pass a check. Storage conflicts are retried a
    /// bounded number of times before surfacing as
    /// [`DomainError::TransientConflict`].
    #[instrument(skip(self), fields(holder_id = %holder_id, item_id = %item_id), err)]
    pub async fn reserve(
        &self,
        holder_id: HolderId,
        item_id: ItemId,
    ) -> DomainResult<ReserveReceipt> {
        let mut attempt = 0;
        loop {
            match self.try_reserve(holder_id, item_id).await {
                Err(DomainError::TransientConflict(reason))
                    if attempt < self.config.max_conflict_retries =>
                {
                    attempt += 1;
                    debug!(attempt, %reason, "retrying reserve after storage conflict");
                }
                outcome => return outcome,
            }
        }
    }

    async fn try_reserve(
        &self,
        holder_id: HolderId,
        item_id: ItemId,
    ) -> DomainResult<ReserveReceipt> {
        let mut section = self
            .store
            .enter_item(item_id)
            .await
            .map_err(map_store_error)?;

        // The duplicate check shares the lock with the decrement; checked
        // outside it, two in-flight requests could both pass.
        if section
            .active_reservation_for(holder_id)
            .await
            .map_err(map_store_error)?
            .is_some()
        {
            return Err(DomainError::DuplicateReservation);
        }

        let mut item = section.item().clone();
        if !item.take_unit() {
            return Err(DomainError::OutOfStock);
        }
        let available_stock = item.available_stock();

        let reservation = Reservation::new(holder_id, item_id, self.config.lease_duration);
        section.stage_item(item);
        section.stage_reservation(reservation.clone());
        section.commit().await.map_err(map_store_error)?;

        self.publish(DropEvent::StockChanged {
            item_id,
            available_stock,
        });
        self.publish(DropEvent::ReservationChanged {
            reservation_id: reservation.id,
            item_id,
            holder_id,
            available_stock,
        });

        Ok(ReserveReceipt {
            reservation,
            available_stock,
        })
    }

    /// Turn an active reservation into a purchase.
    ///
    /// The check order is fixed: existence, then ownership, then status,
    /// then the lease clock. A timed-out lease is left exactly as found;
    /// the expiry sweep is the only writer allowed to reclaim it, so the
    /// unit can never be returned twice.
    #[instrument(skip(self), fields(holder_id = %holder_id, reservation_id = %reservation_id), err)]
    pub async fn complete_purchase(
        &self,
        holder_id: HolderId,
        reservation_id: ReservationId,
    ) -> DomainResult<Purchase> {
        let mut attempt = 0;
        loop {
            match self.try_complete(holder_id, reservation_id).await {
                Err(DomainError::TransientConflict(reason))
                    if attempt < self.config.max_conflict_retries =>
                {
                    attempt += 1;
                    debug!(attempt, %reason, "retrying completion after storage conflict");
                }
                outcome => return outcome,
            }
        }
    }

    async fn try_complete(
        &self,
        holder_id: HolderId,
        reservation_id: ReservationId,
    ) -> DomainResult<Purchase> {
        // Unlocked peek to learn which item section to enter.
        let peek = self
            .store
            .get_reservation(reservation_id)
            .await
            .map_err(map_store_error)?
            .ok_or_else(|| DomainError::not_found(format!("reservation {reservation_id}")))?;

        let mut section = self
            .store
            .enter_item(peek.item_id)
            .await
            .map_err(map_store_error)?;

        // Authoritative re-read under the item lock.
        let mut reservation = section
            .reservation(reservation_id)
            .await
            .map_err(map_store_error)?
            .ok_or_else(|| DomainError::not_found(format!("reservation {reservation_id}")))?;

        reservation.ensure_held_by(holder_id)?;
        let purchase = reservation.complete(Utc::now())?;

        // No stock change: the unit was debited at reserve time and a
        // completed lease keeps it debited.
        section.stage_reservation(reservation);
        section.stage_purchase(purchase.clone());
        section.commit().await.map_err(map_store_error)?;

        self.publish(DropEvent::PurchaseMade {
            item_id: purchase.item_id,
            holder_id: purchase.holder_id,
            purchased_at: purchase.purchased_at,
        });

        Ok(purchase)
    }

    fn publish(&self, event: DropEvent) {
        // Best-effort: the commit already happened, a lost update only costs
        // a client refresh.
        let kind = event.kind();
        if let Err(err) = self.notifier.publish(event) {
            warn!(kind, error = ?err, "failed to publish live update");
        }
    }
}

fn map_store_error(err: StoreError) -> DomainError {
    match err {
        StoreError::Conflict(message) => DomainError::transient_conflict(message),
        StoreError::NotFound(message) => DomainError::not_found(message),
        StoreError::Constraint(message) => {
            DomainError::storage(format!("commit rejected by storage backstop: {message}"))
        }
        StoreError::Storage(message) => DomainError::storage(message),
    }
}
