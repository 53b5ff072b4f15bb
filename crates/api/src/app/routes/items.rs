use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use dropshop_core::ItemId;
use dropshop_inventory::Item;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

/// How many recent buyers catalog responses embed.
const RECENT_PURCHASE_LIMIT: usize = 3;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_item).get(list_items))
        .route("/:id", get(get_item))
}

pub async fn create_item(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateItemRequest>,
) -> axum::response::Response {
    let item = match Item::new(
        body.name,
        body.price_cents,
        body.total_stock,
        body.image_url,
        body.starts_at,
    ) {
        Ok(item) => item,
        Err(err) => return errors::domain_error_to_response(err),
    };

    if let Err(err) = services.create_item(&item).await {
        return errors::domain_error_to_response(err);
    }

    (StatusCode::CREATED, Json(dto::item_to_json(&item))).into_response()
}

pub async fn list_items(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    let items = match services.items().await {
        Ok(items) => items,
        Err(err) => return errors::domain_error_to_response(err),
    };

    let mut out = Vec::with_capacity(items.len());
    for item in &items {
        let recent = match services
            .recent_purchases(item.id, RECENT_PURCHASE_LIMIT)
            .await
        {
            Ok(recent) => recent,
            Err(err) => return errors::domain_error_to_response(err),
        };
        out.push(dto::item_with_buyers_to_json(item, &recent));
    }

    (StatusCode::OK, Json(serde_json::json!({ "items": out }))).into_response()
}

pub async fn get_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let item_id: ItemId = match id.parse() {
        Ok(v) => v,
        Err(err) => return errors::domain_error_to_response(err),
    };

    let item = match services.item(item_id).await {
        Ok(item) => item,
        Err(err) => return errors::domain_error_to_response(err),
    };

    match item {
        Some(item) => {
            let recent = match services
                .recent_purchases(item.id, RECENT_PURCHASE_LIMIT)
                .await
            {
                Ok(recent) => recent,
                Err(err) => return errors::domain_error_to_response(err),
            };
            (
                StatusCode::OK,
                Json(dto::item_with_buyers_to_json(&item, &recent)),
            )
                .into_response()
        }
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "item not found"),
    }
}
