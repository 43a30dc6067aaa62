//! HTTP surface end-to-end through `build_router`.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use rust_decimal_macros::dec;
use secrecy::SecretString;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower::ServiceExt;

use pricewatch::api::{build_router, AppContext, AppState};
use pricewatch::config::{ClusteringConfig, RetentionConfig};
use pricewatch::engine::CleanupHistory;
use pricewatch::storage::PriceStore;
use pricewatch::types::{ProductInfo, ReceiptItem};

use crate::mock_store::{MockStore, StubAnalyzer, StubLookup};

const SECRET: &str = "integration-secret";

fn app_state(store: Arc<MockStore>) -> AppState {
    Arc::new(AppContext {
        store,
        analyzer: Arc::new(StubAnalyzer {
            items: vec![
                ReceiptItem { name: "Egg 12 stk".into(), price: dec!(54.90), quantity: 1 },
                ReceiptItem { name: "Banan".into(), price: dec!(4.50), quantity: 6 },
            ],
        }),
        lookup: Arc::new(StubLookup {
            barcode: "7038010009457".into(),
            product: ProductInfo {
                name: "Tine Lettmelk 1L".into(),
                brand: Some("Tine".into()),
                category: Some("Meieri".into()),
                image_url: None,
            },
        }),
        clustering: ClusteringConfig::default(),
        retention: RetentionConfig::default(),
        admin_secret: SecretString::new(SECRET.to_string()),
        storage_limit_mb: 500.0,
        max_image_bytes: 4096,
        history: RwLock::new(CleanupHistory::new(10)),
    })
}

async fn body_json(resp: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(resp.into_body(), 1_000_000).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_submit_then_read_grouped() {
    let store = Arc::new(MockStore::new());
    let state = app_state(store.clone());

    for price in [21.90, 22.10, 29.90] {
        let resp = build_router(state.clone())
            .oneshot(post_json(
                "/api/prices/submit",
                serde_json::json!({
                    "barcode": "7038010009457",
                    "product_name": "Tine Lettmelk 1L",
                    "price": price,
                    "currency": "nok",
                    "store_name": "Coop Extra",
                    "location": "  "
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
    }
    assert_eq!(store.count_all().await.unwrap(), 3);

    let resp = build_router(state).oneshot(get("/api/prices/grouped?limit=10")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    let prices = json["prices"].as_array().unwrap();
    let total: u64 = prices
        .iter()
        .map(|p| p["submission_count"].as_u64().unwrap())
        .sum();
    assert_eq!(total, 3);
    assert!(prices.iter().all(|p| p["currency"] == "NOK"));
    assert!(prices.iter().all(|p| p["locations"].as_array().unwrap().is_empty()));
    assert_eq!(prices[0]["stores"][0], "Coop Extra");
}

#[tokio::test]
async fn test_grouped_junk_limit_uses_default() {
    let state = app_state(Arc::new(MockStore::new()));
    let resp = build_router(state).oneshot(get("/api/prices/grouped?limit=lots")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_grouped_store_failure_is_500() {
    let store = Arc::new(MockStore::new());
    store.set_error("unreachable");
    let state = app_state(store);

    let resp = build_router(state).oneshot(get("/api/prices/grouped")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(resp).await;
    assert_eq!(json["error"], "Failed to get grouped prices");
}

#[tokio::test]
async fn test_product_lookup_known_and_unknown() {
    let state = app_state(Arc::new(MockStore::new()));

    let resp = build_router(state.clone())
        .oneshot(get("/api/products/7038010009457"))
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["name"], "Tine Lettmelk 1L");
    assert_eq!(json["category"], "Meieri");

    let resp = build_router(state).oneshot(get("/api/products/0000")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["name"], "Ukjent produkt");
}

#[tokio::test]
async fn test_scan_text_totals() {
    let state = app_state(Arc::new(MockStore::new()));
    let resp = build_router(state)
        .oneshot(post_json(
            "/api/receipt/scan-text",
            serde_json::json!({ "receiptText": "EGG 54,90\nBANAN 6x4,50" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["itemCount"], 2);
    assert_eq!(json["total"].as_f64(), Some(81.9));
}

#[tokio::test]
async fn test_admin_cleanup_flow() {
    let store = Arc::new(MockStore::new());
    let state = app_state(store.clone());

    let unauthorized = build_router(state.clone())
        .oneshot(get("/api/admin/dashboard"))
        .await
        .unwrap();
    assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);

    let resp = build_router(state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/admin/cleanup")
                .header("Authorization", format!("Bearer {SECRET}"))
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"retention_days":30}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["deleted_count"], 0);
    assert_eq!(json["retention_days"], 30);

    let resp = build_router(state)
        .oneshot(
            Request::builder()
                .uri("/api/admin/cleanup/history")
                .header("Authorization", format!("Bearer {SECRET}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["history"][0]["type"], "manual");
    assert_eq!(json["history"][0]["retention_days"], 30);
}
