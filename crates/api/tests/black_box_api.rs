use reqwest::StatusCode;
use serde_json::json;
use uuid::Uuid;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Build app (same router as prod), but bind to an ephemeral port.
        let app = dropshop_api::app::build_app().await;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn holder() -> String {
    Uuid::now_v7().to_string()
}

async fn create_item(
    client: &reqwest::Client,
    base_url: &str,
    name: &str,
    total_stock: u32,
) -> serde_json::Value {
    let res = client
        .post(format!("{}/items", base_url))
        .json(&json!({
            "name": name,
            "price_cents": 2500,
            "total_stock": total_stock,
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CREATED);
    res.json().await.unwrap()
}

async fn reserve(
    client: &reqwest::Client,
    base_url: &str,
    holder_id: &str,
    item_id: &str,
) -> reqwest::Response {
    client
        .post(format!("{}/reservations", base_url))
        .json(&json!({ "holder_id": holder_id, "item_id": item_id }))
        .send()
        .await
        .unwrap()
}

async fn complete(
    client: &reqwest::Client,
    base_url: &str,
    holder_id: &str,
    reservation_id: &str,
) -> reqwest::Response {
    client
        .post(format!("{}/purchases", base_url))
        .json(&json!({ "holder_id": holder_id, "reservation_id": reservation_id }))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn creating_and_fetching_an_item() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let created = create_item(&client, &srv.base_url, "limited tee", 5).await;
    assert_eq!(created["name"], "limited tee");
    assert_eq!(created["price_cents"], 2500);
    assert_eq!(created["total_stock"], 5);
    assert_eq!(created["available_stock"], 5);
    let id = created["id"].as_str().unwrap();

    let res = client
        .get(format!("{}/items/{}", srv.base_url, id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let fetched: serde_json::Value = res.json().await.unwrap();
    assert_eq!(fetched["id"], id);
    assert_eq!(fetched["recent_purchases"].as_array().unwrap().len(), 0);

    let res = client
        .get(format!("{}/items", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let listing: serde_json::Value = res.json().await.unwrap();
    assert_eq!(listing["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn missing_and_malformed_item_ids() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/items/{}", srv.base_url, Uuid::now_v7()))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not_found");

    let res = client
        .get(format!("{}/items/not-a-uuid", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_id");
}

#[tokio::test]
async fn item_validation_failures_are_bad_requests() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    for body in [
        json!({ "name": "  ", "price_cents": 2500, "total_stock": 5 }),
        json!({ "name": "tee", "price_cents": 0, "total_stock": 5 }),
        json!({ "name": "tee", "price_cents": 2500, "total_stock": 0 }),
    ] {
        let res = client
            .post(format!("{}/items", srv.base_url))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = res.json().await.unwrap();
        assert_eq!(body["error"], "validation");
    }
}

#[tokio::test]
async fn reserving_debits_stock_and_exposes_the_lease() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let item = create_item(&client, &srv.base_url, "drop hoodie", 2).await;
    let item_id = item["id"].as_str().unwrap();
    let holder_id = holder();

    let res = reserve(&client, &srv.base_url, &holder_id, item_id).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let receipt: serde_json::Value = res.json().await.unwrap();
    assert_eq!(receipt["available_stock"], 1);
    assert_eq!(receipt["reservation"]["status"], "active");
    assert_eq!(receipt["reservation"]["holder_id"], holder_id);
    let reservation_id = receipt["reservation"]["id"].as_str().unwrap();

    let res = client
        .get(format!("{}/reservations", srv.base_url))
        .query(&[("holder_id", holder_id.as_str()), ("item_id", item_id)])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let active: serde_json::Value = res.json().await.unwrap();
    assert_eq!(active["id"], reservation_id);

    let res = client
        .get(format!("{}/items/{}", srv.base_url, item_id))
        .send()
        .await
        .unwrap();
    let fetched: serde_json::Value = res.json().await.unwrap();
    assert_eq!(fetched["available_stock"], 1);
}

#[tokio::test]
async fn duplicate_and_sold_out_reservations_conflict() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let item = create_item(&client, &srv.base_url, "one left", 1).await;
    let item_id = item["id"].as_str().unwrap();
    let first = holder();

    let res = reserve(&client, &srv.base_url, &first, item_id).await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = reserve(&client, &srv.base_url, &first, item_id).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "duplicate_reservation");

    let res = reserve(&client, &srv.base_url, &holder(), item_id).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "out_of_stock");
}

#[tokio::test]
async fn purchase_lifecycle_over_http() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let item = create_item(&client, &srv.base_url, "grail", 3).await;
    let item_id = item["id"].as_str().unwrap();
    let holder_id = holder();

    let res = reserve(&client, &srv.base_url, &holder_id, item_id).await;
    let receipt: serde_json::Value = res.json().await.unwrap();
    let reservation_id = receipt["reservation"]["id"].as_str().unwrap().to_string();

    let res = complete(&client, &srv.base_url, &holder_id, &reservation_id).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let purchase: serde_json::Value = res.json().await.unwrap();
    assert_eq!(purchase["holder_id"], holder_id);
    assert_eq!(purchase["item_id"], item_id);
    assert_eq!(purchase["reservation_id"], reservation_id);

    // The unit stays debited and the buyer shows up on the item.
    let res = client
        .get(format!("{}/items/{}", srv.base_url, item_id))
        .send()
        .await
        .unwrap();
    let fetched: serde_json::Value = res.json().await.unwrap();
    assert_eq!(fetched["available_stock"], 2);
    assert_eq!(fetched["recent_purchases"].as_array().unwrap().len(), 1);

    let res = client
        .get(format!("{}/purchases/mine", srv.base_url))
        .query(&[("holder_id", holder_id.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let mine: serde_json::Value = res.json().await.unwrap();
    assert_eq!(mine["items"].as_array().unwrap().len(), 1);

    // The lease is spent: no longer active, and not completable again.
    let res = client
        .get(format!("{}/reservations", srv.base_url))
        .query(&[("holder_id", holder_id.as_str()), ("item_id", item_id)])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = complete(&client, &srv.base_url, &holder_id, &reservation_id).await;
    assert_eq!(res.status(), StatusCode::GONE);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "reservation_not_active");
}

#[tokio::test]
async fn completing_someone_elses_reservation_is_forbidden() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let item = create_item(&client, &srv.base_url, "grail", 1).await;
    let item_id = item["id"].as_str().unwrap();
    let owner = holder();

    let res = reserve(&client, &srv.base_url, &owner, item_id).await;
    let receipt: serde_json::Value = res.json().await.unwrap();
    let reservation_id = receipt["reservation"]["id"].as_str().unwrap();

    let res = complete(&client, &srv.base_url, &holder(), reservation_id).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "ownership");

    // Untouched for its holder.
    let res = complete(&client, &srv.base_url, &owner, reservation_id).await;
    assert_eq!(res.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn completing_unknown_or_malformed_reservations() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = complete(&client, &srv.base_url, &holder(), &Uuid::now_v7().to_string()).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not_found");

    let res = complete(&client, &srv.base_url, &holder(), "not-a-uuid").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_id");
}

#[tokio::test]
async fn health_reports_the_reclaimer() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/health", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["uptime_secs"].is_number());
    assert!(body["reclaimer"]["sweeps"].is_number());
    assert!(body["reclaimer"]["reclaimed"].is_number());
}

#[tokio::test]
async fn stream_speaks_server_sent_events() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/stream", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let content_type = res
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));
}
