use std::sync::Arc;

use axum::{Json, extract::Extension, response::sse::Event as SseEvent};

use crate::app::services::{self, AppServices};

/// Liveness plus a glance at the background sweep.
pub async fn health(Extension(services): Extension<Arc<AppServices>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "uptime_secs": services.uptime_secs(),
        "reclaimer": services.reclaimer_stats(),
    }))
}

/// Live updates over SSE: stock, reservation, and purchase changes.
pub async fn stream(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Sse<impl tokio_stream::Stream<Item = Result<SseEvent, std::convert::Infallible>>>
{
    services::live_event_stream(services)
}
