use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use dropshop_core::{HolderId, ReservationId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_purchase))
        .route("/mine", get(list_my_purchases))
}

/// Turn an active reservation into a purchase.
pub async fn create_purchase(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CompletePurchaseRequest>,
) -> axum::response::Response {
    let holder_id: HolderId = match body.holder_id.parse() {
        Ok(v) => v,
        Err(err) => return errors::domain_error_to_response(err),
    };
    let reservation_id: ReservationId = match body.reservation_id.parse() {
        Ok(v) => v,
        Err(err) => return errors::domain_error_to_response(err),
    };

    match services.complete_purchase(holder_id, reservation_id).await {
        Ok(purchase) => {
            (StatusCode::CREATED, Json(dto::purchase_to_json(&purchase))).into_response()
        }
        Err(err) => errors::domain_error_to_response(err),
    }
}

pub async fn list_my_purchases(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::HolderQuery>,
) -> axum::response::Response {
    let holder_id: HolderId = match query.holder_id.parse() {
        Ok(v) => v,
        Err(err) => return errors::domain_error_to_response(err),
    };

    let purchases = match services.purchases_for_holder(holder_id).await {
        Ok(purchases) => purchases,
        Err(err) => return errors::domain_error_to_response(err),
    };

    let items = purchases
        .iter()
        .map(dto::purchase_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}
