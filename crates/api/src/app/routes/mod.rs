use axum::{Router, routing::get};

pub mod items;
pub mod purchases;
pub mod reservations;
pub mod system;

/// Router for all domain endpoints. `/health` is mounted by `build_app`.
pub fn router() -> Router {
    Router::new()
        .route("/stream", get(system::stream))
        .nest("/items", items::router())
        .nest("/reservations", reservations::router())
        .nest("/purchases", purchases::router())
}
