use serde::Deserialize;
use serde_json::json;

use dropshop_infra::manager::ReserveReceipt;
use dropshop_inventory::Item;
use dropshop_reservations::{Purchase, Reservation};

// -------------------------
// Request DTOs
// -------------------------

// Identifier fields arrive as strings and are parsed in the handlers, so a
// malformed uuid yields the API's own `invalid_id` response instead of a
// generic body-rejection.

#[derive(Debug, Deserialize)]
pub struct CreateItemRequest {
    pub name: String,
    pub price_cents: u64,
    pub total_stock: u32,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub starts_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ReserveRequest {
    pub holder_id: String,
    pub item_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CompletePurchaseRequest {
    pub holder_id: String,
    pub reservation_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ActiveReservationQuery {
    pub holder_id: String,
    pub item_id: String,
}

#[derive(Debug, Deserialize)]
pub struct HolderQuery {
    pub holder_id: String,
}

// -------------------------
// Response mapping
// -------------------------

pub fn item_to_json(item: &Item) -> serde_json::Value {
    json!({
        "id": item.id.to_string(),
        "name": item.name,
        "price_cents": item.price_cents,
        "image_url": item.image_url,
        "starts_at": item.starts_at,
        "total_stock": item.total_stock(),
        "available_stock": item.available_stock(),
        "created_at": item.created_at,
    })
}

/// Catalog shape: the item plus its most recent buyers.
pub fn item_with_buyers_to_json(item: &Item, recent_purchases: &[Purchase]) -> serde_json::Value {
    let mut value = item_to_json(item);
    value["recent_purchases"] =
        serde_json::Value::Array(recent_purchases.iter().map(purchase_to_json).collect());
    value
}

pub fn reservation_to_json(reservation: &Reservation) -> serde_json::Value {
    json!({
        "id": reservation.id.to_string(),
        "item_id": reservation.item_id.to_string(),
        "holder_id": reservation.holder_id.to_string(),
        "status": reservation.status.as_str(),
        "expires_at": reservation.expires_at,
        "created_at": reservation.created_at,
    })
}

pub fn receipt_to_json(receipt: &ReserveReceipt) -> serde_json::Value {
    json!({
        "reservation": reservation_to_json(&receipt.reservation),
        "available_stock": receipt.available_stock,
    })
}

pub fn purchase_to_json(purchase: &Purchase) -> serde_json::Value {
    json!({
        "id": purchase.id.to_string(),
        "holder_id": purchase.holder_id.to_string(),
        "item_id": purchase.item_id.to_string(),
        "reservation_id": purchase.reservation_id.to_string(),
        "purchased_at": purchase.purchased_at,
    })
}
