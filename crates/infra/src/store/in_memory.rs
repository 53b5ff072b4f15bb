//! In-memory reservation store.
//!
//! The store behind tests and single-process deployments. Per-item
//! exclusivity comes from a table of async mutexes, and commits re-validate
//! the stock accounting and lease rules before applying anything, mirroring
//! the constraints the Postgres schema enforces.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use dropshop_core::{HolderId, ItemId, ReservationId};
use dropshop_inventory::Item;
use dropshop_reservations::{Purchase, Reservation, ReservationStatus};

use super::r#trait::{ItemSection, ReservationStore, StoreError};

#[derive(Debug, Default)]
struct State {
    items: HashMap<ItemId, Item>,
    reservations: HashMap<ReservationId, Reservation>,
    purchases: Vec<Purchase>,
}

#[derive(Debug, Default)]
struct Inner {
    state: RwLock<State>,
    /// One async mutex per item. Holding an entry's lock is what
    /// [`enter_item`](ReservationStore::enter_item) means here.
    locks: StdMutex<HashMap<ItemId, Arc<Mutex<()>>>>,
}

/// In-memory [`ReservationStore`]. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReservationStore {
    inner: Arc<Inner>,
}

impl InMemoryReservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every reservation recorded for one item, for diagnostics
    /// and accounting audits.
    pub fn reservations_for_item(&self, item_id: ItemId) -> Result<Vec<Reservation>, StoreError> {
        let state = self.read_state()?;
        Ok(state
            .reservations
            .values()
            .filter(|r| r.item_id == item_id)
            .cloned()
            .collect())
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.inner
            .state
            .read()
            .map_err(|_| StoreError::Storage("state lock poisoned".to_string()))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.inner
            .state
            .write()
            .map_err(|_| StoreError::Storage("state lock poisoned".to_string()))
    }

    fn item_lock(&self, item_id: ItemId) -> Result<Arc<Mutex<()>>, StoreError> {
        let mut locks = self
            .inner
            .locks
            .lock()
            .map_err(|_| StoreError::Storage("lock table poisoned".to_string()))?;
        Ok(locks.entry(item_id).or_default().clone())
    }
}

#[async_trait]
impl ReservationStore for InMemoryReservationStore {
    type Section = InMemorySection;

    async fn insert_item(&self, item: &Item) -> Result<(), StoreError> {
        let mut state = self.write_state()?;
        if state.items.contains_key(&item.id) {
            return Err(StoreError::Constraint(format!(
                "item {} already exists",
                item.id
            )));
        }
        state.items.insert(item.id, item.clone());
        Ok(())
    }

    async fn get_item(&self, item_id: ItemId) -> Result<Option<Item>, StoreError> {
        Ok(self.read_state()?.items.get(&item_id).cloned())
    }

    async fn list_items(&self) -> Result<Vec<Item>, StoreError> {
        let state = self.read_state()?;
        let mut items: Vec<Item> = state.items.values().cloned().collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    async fn get_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Option<Reservation>, StoreError> {
        Ok(self.read_state()?.reservations.get(&reservation_id).cloned())
    }

    async fn find_active_reservation(
        &self,
        holder_id: HolderId,
        item_id: ItemId,
    ) -> Result<Option<Reservation>, StoreError> {
        let state = self.read_state()?;
        Ok(state
            .reservations
            .values()
            .find(|r| r.holder_id == holder_id && r.item_id == item_id && r.is_active())
            .cloned())
    }

    async fn find_timed_out(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>, StoreError> {
        let state = self.read_state()?;
        let mut overdue: Vec<Reservation> = state
            .reservations
            .values()
            .filter(|r| r.is_active() && r.is_timed_out(now))
            .cloned()
            .collect();
        overdue.sort_by(|a, b| a.expires_at.cmp(&b.expires_at));
        Ok(overdue)
    }

    async fn list_purchases_by_holder(
        &self,
        holder_id: HolderId,
    ) -> Result<Vec<Purchase>, StoreError> {
        let state = self.read_state()?;
        let mut purchases: Vec<Purchase> = state
            .purchases
            .iter()
            .filter(|p| p.holder_id == holder_id)
            .cloned()
            .collect();
        purchases.sort_by(|a, b| b.purchased_at.cmp(&a.purchased_at));
        Ok(purchases)
    }

    async fn recent_purchases(
        &self,
        item_id: ItemId,
        limit: usize,
    ) -> Result<Vec<Purchase>, StoreError> {
        let state = self.read_state()?;
        let mut purchases: Vec<Purchase> = state
            .purchases
            .iter()
            .filter(|p| p.item_id == item_id)
            .cloned()
            .collect();
        purchases.sort_by(|a, b| b.purchased_at.cmp(&a.purchased_at));
        purchases.truncate(limit);
        Ok(purchases)
    }

    async fn enter_item(&self, item_id: ItemId) -> Result<InMemorySection, StoreError> {
        let lock = self.item_lock(item_id)?;
        let guard = lock.lock_owned().await;

        // Authoritative snapshot: nothing can change this item while the
        // guard is held, because every writer goes through the same lock.
        let item = self
            .read_state()?
            .items
            .get(&item_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("item {item_id}")))?;

        Ok(InMemorySection {
            store: self.clone(),
            _guard: guard,
            item,
            staged_item: None,
            staged_reservations: Vec::new(),
            staged_purchases: Vec::new(),
        })
    }
}

/// Exclusive unit of work over one item in the in-memory store.
pub struct InMemorySection {
    store: InMemoryReservationStore,
    _guard: OwnedMutexGuard<()>,
    item: Item,
    staged_item: Option<Item>,
    staged_reservations: Vec<Reservation>,
    staged_purchases: Vec<Purchase>,
}

#[async_trait]
impl ItemSection for InMemorySection {
    fn item(&self) -> &Item {
        &self.item
    }

    async fn active_reservation_for(
        &mut self,
        holder_id: HolderId,
    ) -> Result<Option<Reservation>, StoreError> {
        self.store
            .find_active_reservation(holder_id, self.item.id)
            .await
    }

    async fn reservation(
        &mut self,
        reservation_id: ReservationId,
    ) -> Result<Option<Reservation>, StoreError> {
        self.store.get_reservation(reservation_id).await
    }

    fn stage_item(&mut self, item: Item) {
        self.staged_item = Some(item);
    }

    fn stage_reservation(&mut self, reservation: Reservation) {
        self.staged_reservations.push(reservation);
    }

    fn stage_purchase(&mut self, purchase: Purchase) {
        self.staged_purchases.push(purchase);
    }

    async fn commit(self) -> Result<(), StoreError> {
        let Self {
            store,
            _guard,
            item,
            staged_item,
            staged_reservations,
            staged_purchases,
        } = self;
        let item_id = item.id;

        let mut state = store.write_state()?;

        // Backstop checks before applying anything, the same rules the
        // Postgres schema enforces declaratively. Failing any of them leaves
        // the store untouched.
        for staged in &staged_reservations {
            if staged.item_id != item_id {
                return Err(StoreError::Constraint(format!(
                    "reservation {} targets item {}, section holds {item_id}",
                    staged.id, staged.item_id
                )));
            }
            if staged.is_active() {
                let clash = state.reservations.values().any(|existing| {
                    existing.id != staged.id
                        && existing.holder_id == staged.holder_id
                        && existing.item_id == staged.item_id
                        && existing.is_active()
                });
                if clash {
                    return Err(StoreError::Constraint(format!(
                        "holder {} already holds an active reservation on item {}",
                        staged.holder_id, staged.item_id
                    )));
                }
            }
        }

        for staged in &staged_purchases {
            if state
                .purchases
                .iter()
                .any(|p| p.reservation_id == staged.reservation_id)
            {
                return Err(StoreError::Constraint(format!(
                    "purchase for reservation {} already exists",
                    staged.reservation_id
                )));
            }
        }

        if let Some(staged) = &staged_item {
            if staged.id != item_id {
                return Err(StoreError::Constraint(format!(
                    "staged item {} does not match section item {item_id}",
                    staged.id
                )));
            }
        }

        // Accounting audit for this item, evaluated against the post-commit
        // reservation set: available must equal total minus active minus
        // completed leases.
        let effective_item = staged_item.as_ref().unwrap_or(&item);
        let mut active = 0u32;
        let mut completed = 0u32;
        for existing in state.reservations.values() {
            if existing.item_id != item_id {
                continue;
            }
            let status = staged_reservations
                .iter()
                .find(|s| s.id == existing.id)
                .map(|s| s.status)
                .unwrap_or(existing.status);
            match status {
                ReservationStatus::Active => active += 1,
                ReservationStatus::Completed => completed += 1,
                ReservationStatus::Expired => {}
            }
        }
        for staged in &staged_reservations {
            if !state.reservations.contains_key(&staged.id) {
                match staged.status {
                    ReservationStatus::Active => active += 1,
                    ReservationStatus::Completed => completed += 1,
                    ReservationStatus::Expired => {}
                }
            }
        }
        let held = active + completed;
        let balances = effective_item
            .total_stock()
            .checked_sub(held)
            .map(|expected| expected == effective_item.available_stock())
            .unwrap_or(false);
        if !balances {
            return Err(StoreError::Constraint(format!(
                "item {item_id} accounting mismatch: available {} != total {} - {active} active - {completed} completed",
                effective_item.available_stock(),
                effective_item.total_stock()
            )));
        }

        if let Some(staged) = staged_item {
            state.items.insert(staged.id, staged);
        }
        for staged in staged_reservations {
            state.reservations.insert(staged.id, staged);
        }
        for staged in staged_purchases {
            state.purchases.push(staged);
        }
        Ok(())
    }
}
