#[tokio::main]
async fn main() {
    dropshop_observability::init();

    let addr = std::env::var("DROPSHOP_ADDR").unwrap_or_else(|_| {
        tracing::warn!("DROPSHOP_ADDR not set; defaulting to 0.0.0.0:8080");
        "0.0.0.0:8080".to_string()
    });

    let app = dropshop_api::app::build_app().await;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind listen address");

    tracing::info!("listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}
