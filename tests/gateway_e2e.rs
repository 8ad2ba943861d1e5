//! End-to-end tests for the HTTP gateway
//!
//! Exercises the full request path through the router: per-IP and per-user
//! admission control, credential storage and resolution, and signed-request
//! construction, all against an in-memory database. No network calls to the
//! exchange are made.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use foliovault::application::handlers::{router, AppState};
use foliovault::crypto::SecretCipher;
use foliovault::exchange::binance_client::BinanceClient;
use foliovault::persistence::{init_database, repository::ApiKeyRepository};
use foliovault::rate_limit::RateLimitStore;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn test_app() -> Router {
    let pool = init_database("sqlite::memory:").await.unwrap();
    router(AppState {
        rate_limits: Arc::new(RateLimitStore::new()),
        keys: Arc::new(ApiKeyRepository::new(pool)),
        cipher: Arc::new(SecretCipher::new(&[5u8; 32]).unwrap()),
        binance: Arc::new(BinanceClient::new_testnet()),
    })
}

fn request(method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("X-Forwarded-For", "203.0.113.7");
    if let Some(user) = user {
        builder = builder.header("X-User-Id", user);
    }
    match body {
        Some(value) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_is_open() {
    let app = test_app().await;
    let response = app
        .oneshot(request("GET", "/health", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_user_header_is_rejected() {
    let app = test_app().await;
    let response = app
        .oneshot(request("GET", "/account", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_account_without_keys_asks_for_configuration() {
    let app = test_app().await;
    let response = app
        .oneshot(request("GET", "/account", Some("u1"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("Add your API keys in settings"));
}

#[tokio::test]
async fn test_order_endpoint_enforces_per_user_budget() {
    let app = test_app().await;
    let order = json!({
        "symbol": "BTCUSDT",
        "side": "BUY",
        "type": "MARKET",
        "quantity": "0.01",
    });

    // Budget is 10/min. Without stored keys each admitted request fails
    // credential resolution with a 400, but still consumes budget.
    for _ in 0..10 {
        let response = app
            .clone()
            .oneshot(request("POST", "/orders", Some("u1"), Some(order.clone())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    let response = app
        .clone()
        .oneshot(request("POST", "/orders", Some("u1"), Some(order.clone())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: i64 = response
        .headers()
        .get("Retry-After")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after >= 1 && retry_after <= 60);

    // Another user is unaffected.
    let response = app
        .oneshot(request("POST", "/orders", Some("u2"), Some(order)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_order_is_rejected_before_signing() {
    let app = test_app().await;
    let order = json!({
        "symbol": "BTCUSDT",
        "side": "BUY",
        "type": "LIMIT",
        "quantity": "0.01",
    });
    let response = app
        .oneshot(request("POST", "/orders", Some("u1"), Some(order)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("price"));
}

#[tokio::test]
async fn test_store_key_then_sign_round_trip() {
    let app = test_app().await;

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/keys",
            Some("u1"),
            Some(json!({
                "label": "Trading Key",
                "apiKey": "live-api-key",
                "secretKey": "live-secret-key",
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert_eq!(created["label"], "Trading Key");

    let response = app
        .oneshot(request(
            "POST",
            "/sign",
            Some("u1"),
            Some(json!({ "params": [["symbol", "BTCUSDT"]] })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let signed = body_json(response).await;
    assert_eq!(signed["apiKey"], "live-api-key");
    let signature = signed["signature"].as_str().unwrap();
    assert_eq!(signature.len(), 64);
    assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
    let query = signed["queryString"].as_str().unwrap();
    assert!(query.starts_with("symbol=BTCUSDT&timestamp="));
    assert!(query.ends_with("&recvWindow=5000"));
}

#[tokio::test]
async fn test_public_ip_budget_covers_all_routes() {
    let app = test_app().await;

    // Public budget is 60/min per IP.
    for _ in 0..60 {
        let response = app
            .clone()
            .oneshot(request("GET", "/health", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(request("GET", "/health", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("Retry-After"));
    assert!(response.headers().contains_key("X-RateLimit-Reset"));

    // A different IP still gets through.
    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .header("X-Forwarded-For", "198.51.100.9")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
