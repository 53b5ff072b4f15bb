//! Purchase records: the durable outcome of a completed reservation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dropshop_core::{Entity, HolderId, ItemId, PurchaseId, ReservationId};

/// A finalized purchase.
///
/// Exactly one exists per reservation that ever reached `completed`, and none
/// for reservations that expired. Construction happens inside
/// [`Reservation::complete`](crate::Reservation::complete); storage enforces
/// the one-per-reservation side with a uniqueness constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: PurchaseId,
    pub holder_id: HolderId,
    pub item_id: ItemId,
    pub reservation_id: ReservationId,
    pub purchased_at: DateTime<Utc>,
}

impl Entity for Purchase {
    type Id = PurchaseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
