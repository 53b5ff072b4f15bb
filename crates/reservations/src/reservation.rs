//! Reservation lifecycle: a short-lived lease on one stock unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dropshop_core::{DomainError, DomainResult, Entity, HolderId, ItemId, ReservationId};

use crate::purchase::Purchase;

/// Reservation lifecycle status.
///
/// `active` transitions to exactly one of `completed` or `expired`, once.
/// Terminal states are immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Lease is held; the unit is debited from availability.
    Active,
    /// Purchase finalized; the unit stays debited.
    Completed,
    /// Lease timed out and was reclaimed; the unit was returned.
    Expired,
}

impl ReservationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReservationStatus::Completed | ReservationStatus::Expired)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "active",
            ReservationStatus::Completed => "completed",
            ReservationStatus::Expired => "expired",
        }
    }
}

/// A holder's lease on one unit of one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    /// Unique reservation ID
    pub id: ReservationId,
    /// Item the unit was taken from
    pub item_id: ItemId,
    /// The reserving user
    pub holder_id: HolderId,
    /// Current lifecycle status
    pub status: ReservationStatus,
    /// Absolute lease deadline, fixed at creation
    pub expires_at: DateTime<Utc>,
    /// When the reservation was created
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    /// Create an active reservation with a lease of `lease` from now.
    pub fn new(holder_id: HolderId, item_id: ItemId, lease: chrono::Duration) -> Self {
        let now = Utc::now();
        Self {
            id: ReservationId::new(),
            item_id,
            holder_id,
            status: ReservationStatus::Active,
            expires_at: now + lease,
            created_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }

    /// Whether the lease deadline has passed at `now` (strictly after).
    ///
    /// Status is not consulted; a completed reservation can also be past its
    /// lease.
    pub fn is_timed_out(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Ownership guard: only the reserving holder may act on the lease.
    pub fn ensure_held_by(&self, holder_id: HolderId) -> DomainResult<()> {
        if self.holder_id != holder_id {
            return Err(DomainError::Ownership);
        }
        Ok(())
    }

    /// Finalize the lease: flip to `completed` and produce the purchase
    /// record for it.
    ///
    /// Fails without mutating anything: `ReservationNotActive` when the
    /// status already left `active`, `ReservationExpired` when the lease
    /// timed out at `now`. A timed-out reservation stays `active` here;
    /// flipping it to `expired` (and crediting the ledger) belongs to the
    /// expiry sweep alone, so the unit is never returned twice.
    pub fn complete(&mut self, now: DateTime<Utc>) -> DomainResult<Purchase> {
        if !self.is_active() {
            return Err(DomainError::ReservationNotActive);
        }
        if self.is_timed_out(now) {
            return Err(DomainError::ReservationExpired);
        }
        self.status = ReservationStatus::Completed;
        Ok(Purchase {
            id: dropshop_core::PurchaseId::new(),
            holder_id: self.holder_id,
            item_id: self.item_id,
            reservation_id: self.id,
            purchased_at: now,
        })
    }

    /// Flip a lease to `expired`.
    ///
    /// Only legal from `active`; the caller (the expiry sweep) is responsible
    /// for verifying the lease actually timed out before reclaiming.
    pub fn expire(&mut self) -> DomainResult<()> {
        if !self.is_active() {
            return Err(DomainError::ReservationNotActive);
        }
        self.status = ReservationStatus::Expired;
        Ok(())
    }
}

impl Entity for Reservation {
    type Id = ReservationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_reservation(lease: chrono::Duration) -> Reservation {
        Reservation::new(HolderId::new(), ItemId::new(), lease)
    }

    #[test]
    fn new_reservation_is_active_with_lease_deadline() {
        let res = test_reservation(chrono::Duration::seconds(60));
        assert!(res.is_active());
        assert_eq!(res.expires_at - res.created_at, chrono::Duration::seconds(60));
    }

    #[test]
    fn deadline_itself_is_not_timed_out() {
        let res = test_reservation(chrono::Duration::seconds(60));
        assert!(!res.is_timed_out(res.expires_at));
        assert!(res.is_timed_out(res.expires_at + chrono::Duration::milliseconds(1)));
    }

    #[test]
    fn complete_before_deadline_yields_purchase() {
        let mut res = test_reservation(chrono::Duration::seconds(60));
        let now = Utc::now();
        let purchase = res.complete(now).unwrap();

        assert_eq!(res.status, ReservationStatus::Completed);
        assert_eq!(purchase.holder_id, res.holder_id);
        assert_eq!(purchase.item_id, res.item_id);
        assert_eq!(purchase.reservation_id, res.id);
        assert_eq!(purchase.purchased_at, now);
    }

    #[test]
    fn complete_is_one_shot() {
        let mut res = test_reservation(chrono::Duration::seconds(60));
        res.complete(Utc::now()).unwrap();

        let err = res.complete(Utc::now()).unwrap_err();
        match err {
            DomainError::ReservationNotActive => {}
            _ => panic!("Expected not-active on second complete"),
        }
    }

    #[test]
    fn late_complete_fails_and_leaves_reservation_active() {
        let mut res = test_reservation(chrono::Duration::seconds(60));
        let after_deadline = res.expires_at + chrono::Duration::seconds(1);

        let err = res.complete(after_deadline).unwrap_err();
        match err {
            DomainError::ReservationExpired => {}
            _ => panic!("Expected expired on late complete"),
        }
        // Left untouched for the expiry sweep.
        assert!(res.is_active());
    }

    #[test]
    fn expire_is_only_legal_from_active() {
        let mut res = test_reservation(chrono::Duration::seconds(60));
        res.expire().unwrap();
        assert_eq!(res.status, ReservationStatus::Expired);
        assert!(res.status.is_terminal());

        let err = res.expire().unwrap_err();
        match err {
            DomainError::ReservationNotActive => {}
            _ => panic!("Expected not-active on second expire"),
        }
    }

    #[test]
    fn completed_reservation_cannot_expire() {
        let mut res = test_reservation(chrono::Duration::seconds(60));
        res.complete(Utc::now()).unwrap();
        assert!(res.expire().is_err());
        assert_eq!(res.status, ReservationStatus::Completed);
    }

    #[test]
    fn ensure_held_by_rejects_other_holders() {
        let res = test_reservation(chrono::Duration::seconds(60));
        assert!(res.ensure_held_by(res.holder_id).is_ok());

        let err = res.ensure_held_by(HolderId::new()).unwrap_err();
        match err {
            DomainError::Ownership => {}
            _ => panic!("Expected ownership error"),
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: across any sequence of complete/expire attempts, at most
        /// one transition succeeds, and the reservation is active iff none
        /// did.
        #[test]
        fn status_transitions_are_one_shot(
            ops in prop::collection::vec(any::<bool>(), 1..20)
        ) {
            let mut res = test_reservation(chrono::Duration::minutes(5));
            let now = Utc::now();

            let mut successes = 0u32;
            for complete in ops {
                let ok = if complete {
                    res.complete(now).is_ok()
                } else {
                    res.expire().is_ok()
                };
                if ok {
                    successes += 1;
                }
            }

            prop_assert!(successes <= 1);
            prop_assert_eq!(successes == 0, res.is_active());
        }
    }
}
