use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};

use dropshop_core::{HolderId, ItemId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route("/", post(create_reservation).get(get_active_reservation))
}

/// Reserve one unit. Success returns the lease plus the post-decrement
/// availability so the client can render the countdown and stock badge from
/// one response.
pub async fn create_reservation(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::ReserveRequest>,
) -> axum::response::Response {
    let holder_id: HolderId = match body.holder_id.parse() {
        Ok(v) => v,
        Err(err) => return errors::domain_error_to_response(err),
    };
    let item_id: ItemId = match body.item_id.parse() {
        Ok(v) => v,
        Err(err) => return errors::domain_error_to_response(err),
    };

    match services.reserve(holder_id, item_id).await {
        Ok(receipt) => {
            (StatusCode::CREATED, Json(dto::receipt_to_json(&receipt))).into_response()
        }
        Err(err) => errors::domain_error_to_response(err),
    }
}

/// The caller's active reservation for an item, 404 when there is none.
pub async fn get_active_reservation(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ActiveReservationQuery>,
) -> axum::response::Response {
    let holder_id: HolderId = match query.holder_id.parse() {
        Ok(v) => v,
        Err(err) => return errors::domain_error_to_response(err),
    };
    let item_id: ItemId = match query.item_id.parse() {
        Ok(v) => v,
        Err(err) => return errors::domain_error_to_response(err),
    };

    match services.active_reservation(holder_id, item_id).await {
        Ok(Some(reservation)) => {
            (StatusCode::OK, Json(dto::reservation_to_json(&reservation))).into_response()
        }
        Ok(None) => errors::json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            "no active reservation for this holder and item",
        ),
        Err(err) => errors::domain_error_to_response(err),
    }
}
