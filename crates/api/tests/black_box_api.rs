use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

use settle_api::app::services::build_services;
use settle_infra::EngineConfig;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, bound to an ephemeral port. Jobs are run
        // explicitly through the admin route instead of a worker thread.
        let config = EngineConfig {
            job_base_delay: std::time::Duration::ZERO,
            job_max_delay: std::time::Duration::ZERO,
            ..EngineConfig::default()
        };
        let app = settle_api::app::build_app(Arc::new(build_services(config)));
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

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn crc(major: i64) -> Value {
    json!({ "amount": major * 100, "currency": "CRC" })
}

/// Seed a ¢10,000 product at 13% IVA and return its id.
async fn seed_product(client: &reqwest::Client, srv: &TestServer) -> String {
    let id = Uuid::now_v7().to_string();
    let res = client
        .post(srv.url("/admin/catalog/products"))
        .json(&json!({
            "product_id": id,
            "name": "Café molido 500g",
            "sku": "CAF-500",
            "unit_price": crc(10_000),
            "iva_rate": 1300,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    id
}

async fn place_two_units(client: &reqwest::Client, srv: &TestServer, product_id: &str) -> Value {
    let res = client
        .post(srv.url("/orders"))
        .json(&json!({ "lines": [{ "product_id": product_id, "quantity": 2 }] }))
        .send()
        .await
        .unwrap();
    if res.status() != StatusCode::CREATED {
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        panic!("expected 201 Created from order, got {status} body={body}");
    }
    res.json().await.unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn order_lifecycle_place_pay_return() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let product_id = seed_product(&client, &srv).await;

    let order = place_two_units(&client, &srv, &product_id).await;
    assert_eq!(order["status"], "pending_payment");
    assert_eq!(order["totals"]["total"], crc(22_600));
    let id = order["id"].as_str().unwrap().to_string();

    // Partial payment with the version just observed.
    let res = client
        .post(srv.url(&format!("/orders/{id}/payments")))
        .json(&json!({ "method": "cash", "amount": crc(10_000), "expected_version": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "partially_paid");
    assert_eq!(body["balance_due"], crc(12_600));

    let res = client
        .post(srv.url(&format!("/orders/{id}/payments")))
        .json(&json!({ "method": "card", "amount": crc(12_600), "reference": "AUTH-0042" }))
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "completed");

    let res = client
        .post(srv.url(&format!("/orders/{id}/returns")))
        .json(&json!({ "items": [{ "product_id": product_id, "quantity": 1 }] }))
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "partially_returned");

    let note: Value = client
        .get(srv.url(&format!("/orders/{id}/credit-note")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(note["total"], crc(10_000));

    let list: Value = client
        .get(srv.url("/orders?status=partially_returned"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn errors_map_to_status_codes() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let product_id = seed_product(&client, &srv).await;

    // Unknown product in the cart.
    let res = client
        .post(srv.url("/orders"))
        .json(&json!({ "lines": [{ "product_id": Uuid::now_v7(), "quantity": 1 }] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unknown_reference");

    // Malformed and unknown ids.
    let res = client.get(srv.url("/orders/not-a-uuid")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let res = client
        .get(srv.url(&format!("/orders/{}", Uuid::now_v7())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let order = place_two_units(&client, &srv, &product_id).await;
    let id = order["id"].as_str().unwrap().to_string();

    // Stale version.
    let res = client
        .post(srv.url(&format!("/orders/{id}/payments")))
        .json(&json!({ "method": "cash", "amount": crc(1_000), "expected_version": 7 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    // Illegal transition: voiding an unpaid order.
    let res = client
        .post(srv.url(&format!("/orders/{id}/void")))
        .json(&json!({ "reason": "prueba" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = res.json().await.unwrap();
    assert!(body["message"].as_str().is_some());
}

#[tokio::test]
async fn fiscal_identifiers_arrive_after_jobs_run() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let product_id = seed_product(&client, &srv).await;

    let order = place_two_units(&client, &srv, &product_id).await;
    let id = order["id"].as_str().unwrap().to_string();
    client
        .post(srv.url(&format!("/orders/{id}/payments")))
        .json(&json!({ "method": "cash", "amount": crc(22_600) }))
        .send()
        .await
        .unwrap();

    let res = client.post(srv.url("/admin/jobs/run")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report: Value = res.json().await.unwrap();
    assert_eq!(report["succeeded"], 1);

    let body: Value = client
        .get(srv.url(&format!("/orders/{id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "completed");
    assert_eq!(body["fiscal"]["clave"].as_str().unwrap().len(), 50);
}

#[tokio::test]
async fn reports_reflect_settled_orders() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let product_id = seed_product(&client, &srv).await;

    let paid = place_two_units(&client, &srv, &product_id).await;
    let paid_id = paid["id"].as_str().unwrap().to_string();
    client
        .post(srv.url(&format!("/orders/{paid_id}/payments")))
        .json(&json!({ "method": "sinpe", "amount": crc(22_600) }))
        .send()
        .await
        .unwrap();
    place_two_units(&client, &srv, &product_id).await;

    let sales: Value = client
        .get(srv.url("/reports/sales/daily"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(sales["orders_settled"], 1);
    assert_eq!(sales["gross_sales"], crc(22_600));

    let ar: Value = client
        .get(srv.url("/reports/receivables"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ar["order_count"], 1);
    assert_eq!(ar["total"], crc(22_600));

    let res = client
        .post(srv.url("/reports/closure"))
        .json(&json!({
            "year": 2025,
            "month": 3,
            "liquidations": [{
                "date": "2025-03-03",
                "initial_amount": crc(50_000),
                "total_expenses": crc(10_000),
                "final_balance": crc(39_500),
            }],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let closure: Value = res.json().await.unwrap();
    assert_eq!(closure["outcome"], "shortage");
    assert_eq!(closure["total_difference"], crc(-500));
}
