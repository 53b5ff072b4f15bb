//! Concrete live-update events emitted by the reservation engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dropshop_core::{HolderId, ItemId, ReservationId};

/// Notifications pushed to live subscribers after a commit.
///
/// Delivery is best-effort; nothing in the engine's consistency story depends
/// on a subscriber receiving these. Emission always happens after the storage
/// commit, never inside the atomic section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DropEvent {
    /// An item's available stock moved (reserve or reclaim).
    StockChanged {
        item_id: ItemId,
        available_stock: u32,
    },
    /// A reservation was created or reclaimed.
    ReservationChanged {
        reservation_id: ReservationId,
        item_id: ItemId,
        holder_id: HolderId,
        available_stock: u32,
    },
    /// A purchase was finalized.
    PurchaseMade {
        item_id: ItemId,
        holder_id: HolderId,
        purchased_at: DateTime<Utc>,
    },
}

impl DropEvent {
    /// Stable wire name; doubles as the SSE event name.
    pub fn kind(&self) -> &'static str {
        match self {
            DropEvent::StockChanged { .. } => "stock-changed",
            DropEvent::ReservationChanged { .. } => "reservation-changed",
            DropEvent::PurchaseMade { .. } => "purchase-made",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_is_tagged_with_kind() {
        let item_id = ItemId::new();
        let event = DropEvent::StockChanged {
            item_id,
            available_stock: 3,
        };

        assert_eq!(event.kind(), "stock-changed");

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "stock-changed");
        assert_eq!(json["available_stock"], 3);
        assert_eq!(json["item_id"], serde_json::to_value(item_id).unwrap());
    }

    #[test]
    fn kind_names_cover_all_variants() {
        let reservation = DropEvent::ReservationChanged {
            reservation_id: ReservationId::new(),
            item_id: ItemId::new(),
            holder_id: HolderId::new(),
            available_stock: 0,
        };
        let purchase = DropEvent::PurchaseMade {
            item_id: ItemId::new(),
            holder_id: HolderId::new(),
            purchased_at: Utc::now(),
        };

        assert_eq!(reservation.kind(), "reservation-changed");
        assert_eq!(purchase.kind(), "purchase-made");
    }
}
