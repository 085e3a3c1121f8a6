use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;

use stockgate_admission::{AdmissionGate, CounterError, CounterStore, InMemoryCounterStore};
use stockgate_api::app::services::AppServices;
use stockgate_core::{ProductId, Quantity};
use stockgate_infra::ledger::InMemoryStockLedger;
use stockgate_inventory::{LedgerError, LedgerResult, Product, Replenished, StockLedger};

struct TestServer {
    base_url: String,
    services: Arc<AppServices>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(services: AppServices) -> Self {
        // Same router as prod, bound to an ephemeral port.
        let services = Arc::new(services);
        let app = stockgate_api::app::build_app(services.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            services,
            handle,
        }
    }

    async fn in_memory(limit: u32) -> Self {
        Self::spawn(AppServices::in_memory(limit, "rlk")).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn in_flight(&self) -> i64 {
        self.services.gate().in_flight().await.unwrap()
    }

    /// Permits released from `Drop` land asynchronously.
    async fn wait_for_idle_gate(&self) {
        for _ in 0..200 {
            if self.in_flight().await == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("admission counter stuck at {}", self.in_flight().await);
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn post(client: &reqwest::Client, url: String, body: serde_json::Value) -> reqwest::Response {
    client.post(url).json(&body).send().await.unwrap()
}

/// Ledger whose reserve holds its admission slot for a while.
struct SlowLedger {
    inner: InMemoryStockLedger,
    delay: Duration,
}

#[async_trait]
impl StockLedger for SlowLedger {
    async fn replenish(&self, id: ProductId, quantity: Quantity) -> LedgerResult<Replenished> {
        self.inner.replenish(id, quantity).await
    }

    async fn reserve(&self, id: ProductId, quantity: Quantity) -> LedgerResult<u64> {
        tokio::time::sleep(self.delay).await;
        self.inner.reserve(id, quantity).await
    }

    async fn find_by_id(&self, id: ProductId) -> LedgerResult<Product> {
        self.inner.find_by_id(id).await
    }
}

/// Ledger whose backing store is gone.
struct BrokenLedger;

#[async_trait]
impl StockLedger for BrokenLedger {
    async fn replenish(&self, _id: ProductId, _quantity: Quantity) -> LedgerResult<Replenished> {
        Err(LedgerError::Storage("password authentication failed for user \"postgres\"".into()))
    }

    async fn reserve(&self, _id: ProductId, _quantity: Quantity) -> LedgerResult<u64> {
        Err(LedgerError::Storage("password authentication failed for user \"postgres\"".into()))
    }

    async fn find_by_id(&self, _id: ProductId) -> LedgerResult<Product> {
        Err(LedgerError::Storage("password authentication failed for user \"postgres\"".into()))
    }
}

/// Counter store that cannot be reached.
struct UnreachableCounter;

#[async_trait]
impl CounterStore for UnreachableCounter {
    async fn incr(&self, _key: &str) -> Result<i64, CounterError> {
        Err(CounterError::Connection("redis-server:6379 connection refused".into()))
    }
    async fn decr(&self, _key: &str) -> Result<i64, CounterError> {
        Err(CounterError::Connection("redis-server:6379 connection refused".into()))
    }
    async fn get(&self, _key: &str) -> Result<i64, CounterError> {
        Err(CounterError::Connection("redis-server:6379 connection refused".into()))
    }
    async fn reset(&self, _key: &str) -> Result<(), CounterError> {
        Err(CounterError::Connection("redis-server:6379 connection refused".into()))
    }
}

#[tokio::test]
async fn health_is_ok() {
    let srv = TestServer::in_memory(3).await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn add_creates_then_accumulates_stock() {
    let srv = TestServer::in_memory(3).await;
    let client = reqwest::Client::new();

    let res = post(&client, srv.url("/store/add"), json!({ "product_id": 7, "quantity": 10 })).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "rows_affected": 1, "quantity": 10 }));

    let res = post(&client, srv.url("/store/add"), json!({ "product_id": 7, "quantity": 5 })).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["quantity"], 15);

    let res = client.get(srv.url("/store/7")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers()[reqwest::header::CONTENT_TYPE].to_str().unwrap(),
        "application/json"
    );
    let product: serde_json::Value = res.json().await.unwrap();
    assert_eq!(product, json!({ "id": 7, "quantity": 15 }));
}

#[tokio::test]
async fn order_takes_stock_and_rejects_when_short() {
    let srv = TestServer::in_memory(3).await;
    let client = reqwest::Client::new();

    post(&client, srv.url("/store/add"), json!({ "product_id": 1, "quantity": 5 })).await;

    let res = post(&client, srv.url("/store/order"), json!({ "product_id": 1, "quantity": 3 })).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "rows_affected": 1 }));

    let res = post(&client, srv.url("/store/order"), json!({ "product_id": 1, "quantity": 3 })).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "insufficient_stock");

    let product: serde_json::Value = client
        .get(srv.url("/store/1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(product["quantity"], 2);
    assert_eq!(srv.in_flight().await, 0);
}

#[tokio::test]
async fn order_for_unknown_product_is_insufficient_stock() {
    let srv = TestServer::in_memory(3).await;
    let client = reqwest::Client::new();

    let res = post(&client, srv.url("/store/order"), json!({ "product_id": 404, "quantity": 1 })).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "insufficient_stock");
}

#[tokio::test]
async fn malformed_bodies_are_client_errors() {
    let srv = TestServer::in_memory(3).await;
    let client = reqwest::Client::new();

    for path in ["/store/add", "/store/order"] {
        let res = client
            .post(srv.url(path))
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{path}");
        let body: serde_json::Value = res.json().await.unwrap();
        assert_eq!(body["error"], "malformed_input");

        for bad in [
            json!({ "product_id": 1 }),
            json!({ "product_id": 1, "quantity": 0 }),
            json!({ "product_id": 1, "quantity": -5 }),
            json!({ "product_id": 0, "quantity": 1 }),
        ] {
            let res = post(&client, srv.url(path), bad.clone()).await;
            assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{path} {bad}");
        }
    }

    // Malformed orders were admitted first; their slots must be back.
    assert_eq!(srv.in_flight().await, 0);
}

#[tokio::test]
async fn lookup_distinguishes_missing_from_invalid_ids() {
    let srv = TestServer::in_memory(3).await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/store/12345")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not_found");

    for bad in ["abc", "0", "-3", "1.5"] {
        let res = client.get(srv.url(&format!("/store/{bad}"))).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND, "{bad}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fourth_concurrent_order_is_turned_away_at_limit_three() {
    let ledger = SlowLedger {
        inner: InMemoryStockLedger::new(),
        delay: Duration::from_millis(300),
    };
    let gate = AdmissionGate::new(Arc::new(InMemoryCounterStore::new()), "rlk", 3);
    let srv = TestServer::spawn(AppServices::new(Arc::new(ledger), gate)).await;
    let client = reqwest::Client::new();

    post(&client, srv.url("/store/add"), json!({ "product_id": 1, "quantity": 100 })).await;

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let client = client.clone();
        let url = srv.url("/store/order");
        tasks.push(tokio::spawn(async move {
            post(&client, url, json!({ "product_id": 1, "quantity": 1 }))
                .await
                .status()
        }));
    }

    let mut ok = 0;
    let mut rejected = 0;
    for t in tasks {
        match t.await.unwrap() {
            StatusCode::OK => ok += 1,
            StatusCode::TOO_MANY_REQUESTS => rejected += 1,
            other => panic!("unexpected status {other}"),
        }
    }

    // Every reserve holds its slot for 300ms, so all four overlap.
    assert_eq!(ok, 3, "the first three orders fit under the limit");
    assert_eq!(rejected, 1, "exactly the fourth order is turned away");
    srv.wait_for_idle_gate().await;

    let product: serde_json::Value = client
        .get(srv.url("/store/1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(product["quantity"], 97);
}

#[tokio::test]
async fn add_and_lookup_are_not_gated() {
    // Limit 1 and one slot held: only /store/order is affected.
    let srv = TestServer::in_memory(1).await;
    let client = reqwest::Client::new();
    let held = srv.services.gate().admit().await.unwrap();

    let res = post(&client, srv.url("/store/add"), json!({ "product_id": 2, "quantity": 1 })).await;
    assert_eq!(res.status(), StatusCode::OK);
    let res = client.get(srv.url("/store/2")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = post(&client, srv.url("/store/order"), json!({ "product_id": 2, "quantity": 1 })).await;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "too_many_requests");

    held.release().await;
    let res = post(&client, srv.url("/store/order"), json!({ "product_id": 2, "quantity": 1 })).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn unreachable_counter_fails_closed_without_touching_stock() {
    let ledger = Arc::new(InMemoryStockLedger::new());
    ledger
        .replenish(ProductId::new(1).unwrap(), Quantity::new(5).unwrap())
        .await
        .unwrap();
    let gate = AdmissionGate::new(Arc::new(UnreachableCounter), "rlk", 3);
    let srv = TestServer::spawn(AppServices::new(ledger.clone(), gate)).await;
    let client = reqwest::Client::new();

    let res = post(&client, srv.url("/store/order"), json!({ "product_id": 1, "quantity": 1 })).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let text = res.text().await.unwrap();
    assert!(text.contains("internal_error"));
    assert!(!text.contains("connection refused"), "internal detail leaked: {text}");

    let product = ledger.find_by_id(ProductId::new(1).unwrap()).await.unwrap();
    assert_eq!(product.quantity, 5);
}

#[tokio::test]
async fn storage_failures_are_generic_server_errors() {
    let gate = AdmissionGate::new(Arc::new(InMemoryCounterStore::new()), "rlk", 3);
    let srv = TestServer::spawn(AppServices::new(Arc::new(BrokenLedger), gate)).await;
    let client = reqwest::Client::new();

    let add = post(&client, srv.url("/store/add"), json!({ "product_id": 1, "quantity": 1 })).await;
    let order = post(&client, srv.url("/store/order"), json!({ "product_id": 1, "quantity": 1 })).await;
    let get = client.get(srv.url("/store/1")).send().await.unwrap();

    for res in [add, order, get] {
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let text = res.text().await.unwrap();
        assert!(!text.contains("password"), "internal detail leaked: {text}");
    }

    // The failed order still gave its slot back.
    assert_eq!(srv.in_flight().await, 0);
}
