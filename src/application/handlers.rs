//! HTTP handlers
//!
//! Request flow for exchange endpoints: rate limit first (429 with
//! `Retry-After` when over budget), then resolve and decrypt the caller's
//! credentials, then sign and forward to the exchange. All failures are
//! mapped to status codes with generic messages; key material and
//! internals never reach the client.
//!
//! User identity arrives in the `X-User-Id` header, set by the upstream
//! authentication proxy; session management is outside this service.

use crate::credentials::{self, CredentialError};
use crate::crypto::SecretCipher;
use crate::exchange::binance_client::{BinanceClient, ExchangeError, NewOrder};
use crate::persistence::models::CreateApiKey;
use crate::persistence::repository::ApiKeyRepository;
use crate::rate_limit::{self, RateLimitResult, RateLimitStore};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub rate_limits: Arc<RateLimitStore>,
    pub keys: Arc<ApiKeyRepository>,
    pub cipher: Arc<SecretCipher>,
    pub binance: Arc<BinanceClient>,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/account", get(get_account))
        .route("/orders", post(place_order))
        .route("/sign", post(sign_params))
        .route("/keys", post(create_api_key))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            public_rate_limit,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Errors surfaced by handlers, mapped to HTTP responses
#[derive(Debug)]
pub enum ApiError {
    RateLimited(RateLimitResult),
    Validation(String),
    Credentials(CredentialError),
    Exchange(ExchangeError),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::RateLimited(result) => {
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({
                        "error": "Rate limit exceeded. Please try again later.",
                        "retryAfterMs": result.retry_after_ms,
                    })),
                )
                    .into_response();
                let headers = response.headers_mut();
                if let Ok(value) =
                    rate_limit::retry_after_secs(result.retry_after_ms).to_string().parse()
                {
                    headers.insert("Retry-After", value);
                }
                if let Ok(value) = result.reset_at.to_string().parse() {
                    headers.insert("X-RateLimit-Reset", value);
                }
                response
            }
            ApiError::Validation(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            ApiError::Credentials(CredentialError::NoCredentialsConfigured) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "No API keys configured. Add your API keys in settings."
                })),
            )
                .into_response(),
            ApiError::Credentials(e) => {
                error!("credential resolution failed: {}", e);
                internal_error()
            }
            ApiError::Exchange(ExchangeError::Rejected { status, body }) => {
                error!("exchange rejected request ({}): {}", status, body);
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({ "error": "Exchange request failed" })),
                )
                    .into_response()
            }
            ApiError::Exchange(e) => {
                error!("exchange call failed: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({ "error": "Exchange request failed" })),
                )
                    .into_response()
            }
            ApiError::Internal(message) => {
                error!("internal error: {}", message);
                internal_error()
            }
        }
    }
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal server error" })),
    )
        .into_response()
}

impl From<CredentialError> for ApiError {
    fn from(e: CredentialError) -> Self {
        ApiError::Credentials(e)
    }
}

impl From<ExchangeError> for ApiError {
    fn from(e: ExchangeError) -> Self {
        ApiError::Exchange(e)
    }
}

/// Per-IP admission control applied to every route.
async fn public_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_ip(request.headers(), &request);
    let result = rate_limit::PUBLIC.check(&state.rate_limits, &ip);
    if !result.allowed {
        return ApiError::RateLimited(result).into_response();
    }
    next.run(request).await
}

/// Best-effort client IP: proxy header first, then the socket address.
fn client_ip(headers: &HeaderMap, request: &Request) -> String {
    if let Some(forwarded) = headers.get("X-Forwarded-For").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn user_id(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("X-User-Id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .ok_or_else(|| ApiError::Validation("missing X-User-Id header".to_string()))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Signed account snapshot, proxied server-side with the user's read key.
async fn get_account(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = user_id(&headers)?;

    let result = rate_limit::AUTHENTICATED.check(&state.rate_limits, &user);
    if !result.allowed {
        return Err(ApiError::RateLimited(result));
    }

    let signer = credentials::resolve_read_keys(&*state.keys, &state.cipher, &user).await?;
    let account = state.binance.get_account(&signer).await?;
    Ok(Json(account))
}

/// Place an order with the user's trading key.
async fn place_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(order): Json<NewOrder>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = user_id(&headers)?;

    let result = rate_limit::ORDERS.check(&state.rate_limits, &user);
    if !result.allowed {
        return Err(ApiError::RateLimited(result));
    }

    order.validate().map_err(ApiError::Validation)?;

    let signer = credentials::resolve_trading_keys(&*state.keys, &state.cipher, &user).await?;
    let ack = state.binance.place_order(&signer, &order).await?;
    Ok(Json(json!({
        "orderId": ack.order_id,
        "symbol": ack.symbol,
        "status": ack.status,
    })))
}

/// Parameters to sign for a client-side exchange call.
///
/// Params are a list of pairs, not a JSON object, because signature bytes
/// depend on parameter order.
#[derive(Debug, Deserialize)]
pub struct SignRequest {
    pub params: Vec<(String, String)>,
}

#[derive(Debug, Serialize)]
pub struct SignResponse {
    #[serde(rename = "apiKey")]
    pub api_key: String,
    pub signature: String,
    pub timestamp: i64,
    #[serde(rename = "queryString")]
    pub query_string: String,
}

/// Hand signed parameters back to the client for a direct exchange call.
async fn sign_params(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SignRequest>,
) -> Result<Json<SignResponse>, ApiError> {
    let user = user_id(&headers)?;

    let result = rate_limit::AUTHENTICATED.check(&state.rate_limits, &user);
    if !result.allowed {
        return Err(ApiError::RateLimited(result));
    }

    let signer = credentials::resolve_read_keys(&*state.keys, &state.cipher, &user).await?;
    let params: Vec<(&str, &str)> = body
        .params
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    let signed = signer
        .sign(&params)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(SignResponse {
        api_key: signed.api_key,
        signature: signed.signature,
        timestamp: signed.timestamp,
        query_string: signed.query_string,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    pub label: String,
    #[serde(rename = "apiKey")]
    pub api_key: String,
    #[serde(rename = "secretKey")]
    pub secret_key: String,
}

/// Store an encrypted credential pair for the caller.
async fn create_api_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateKeyRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let user = user_id(&headers)?;

    let result = rate_limit::AUTHENTICATED.check(&state.rate_limits, &user);
    if !result.allowed {
        return Err(ApiError::RateLimited(result));
    }

    if body.api_key.is_empty() || body.secret_key.is_empty() {
        return Err(ApiError::Validation(
            "apiKey and secretKey are required".to_string(),
        ));
    }

    let encrypted_api_key = state
        .cipher
        .encrypt(&body.api_key)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let encrypted_secret = state
        .cipher
        .encrypt(&body.secret_key)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let row = state
        .keys
        .create(CreateApiKey {
            id: new_key_id(),
            user_id: user,
            label: body.label,
            encrypted_api_key,
            encrypted_secret,
        })
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": row.id,
            "label": row.label,
            "createdAt": row.created_at,
        })),
    ))
}

/// Random 128-bit hex identifier for new key records
fn new_key_id() -> String {
    let bytes: [u8; 16] = rand::random();
    hex::encode(bytes)
}
