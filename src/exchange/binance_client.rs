//! Thin client for the Binance REST API
//!
//! Forwards signed calls built by [`crate::exchange::signer`] and maps
//! HTTP failures to structured errors. No retry or order-book logic lives
//! here; this is glue between a user's credentials and the exchange.

use crate::exchange::signer::{RequestSigner, SignedRequest, SignerError};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Binance API endpoints
const BINANCE_API_BASE: &str = "https://api.binance.com";
const BINANCE_TESTNET_BASE: &str = "https://testnet.binance.vision";

/// Header carrying the API key on signed requests
const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// Common result type for exchange calls
pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// Errors that can occur talking to the exchange
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("request signing failed: {0}")]
    Signing(#[from] SignerError),

    #[error("network error: {0}")]
    Network(String),

    /// Non-2xx answer from the exchange, with its status and body
    #[error("exchange rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("failed to parse exchange response: {0}")]
    InvalidResponse(String),
}

/// Order parameters accepted by the order endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub symbol: String,
    /// "BUY" or "SELL"
    pub side: String,
    /// "MARKET" or "LIMIT"
    #[serde(rename = "type")]
    pub order_type: String,
    pub quantity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
}

impl NewOrder {
    /// Flatten into query parameters, preserving a fixed field order so
    /// signatures are stable. Limit orders carry price + GTC time in force.
    pub fn to_params(&self) -> Vec<(&'static str, &str)> {
        let mut params = vec![
            ("symbol", self.symbol.as_str()),
            ("side", self.side.as_str()),
            ("type", self.order_type.as_str()),
            ("quantity", self.quantity.as_str()),
        ];
        if let Some(price) = &self.price {
            params.push(("price", price.as_str()));
            params.push(("timeInForce", "GTC"));
        }
        params
    }

    /// Reject obviously malformed orders before signing anything.
    pub fn validate(&self) -> Result<(), String> {
        if !matches!(self.side.as_str(), "BUY" | "SELL") {
            return Err(format!("invalid side: {}", self.side));
        }
        match self.order_type.as_str() {
            "MARKET" => {
                if self.price.is_some() {
                    return Err("market orders must not carry a price".to_string());
                }
            }
            "LIMIT" => {
                if self.price.is_none() {
                    return Err("limit orders must have a price".to_string());
                }
            }
            other => return Err(format!("invalid order type: {}", other)),
        }
        if self.symbol.is_empty() {
            return Err("symbol is required".to_string());
        }
        if self.quantity.parse::<f64>().map(|q| q <= 0.0).unwrap_or(true) {
            return Err(format!("invalid quantity: {}", self.quantity));
        }
        Ok(())
    }
}

/// Order acknowledgement from the exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    #[serde(rename = "orderId")]
    pub order_id: i64,
    pub symbol: String,
    pub status: String,
}

/// Binance client for API interactions
pub struct BinanceClient {
    client: Client,
    api_base: String,
}

impl BinanceClient {
    /// Production client
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            api_base: BINANCE_API_BASE.to_string(),
        }
    }

    /// Testnet client
    pub fn new_testnet() -> Self {
        Self {
            client: Client::new(),
            api_base: BINANCE_TESTNET_BASE.to_string(),
        }
    }

    /// Client against an arbitrary base URL (used by config and tests)
    pub fn with_base(api_base: &str) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Unsigned connectivity check against `/api/v3/ping`.
    pub async fn ping(&self) -> ExchangeResult<()> {
        let url = format!("{}/api/v3/ping", self.api_base);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;
        check_status(response).await.map(|_| ())
    }

    /// Signed account snapshot from `/api/v3/account`.
    pub async fn get_account(&self, signer: &RequestSigner) -> ExchangeResult<serde_json::Value> {
        let signed = signer.sign(&[])?;
        let url = format!("{}/api/v3/account?{}", self.api_base, signed.signed_query());

        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &signed.api_key)
            .send()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        let body = check_status(response).await?;
        serde_json::from_str(&body).map_err(|e| ExchangeError::InvalidResponse(e.to_string()))
    }

    /// Place a signed order via `/api/v3/order`.
    pub async fn place_order(
        &self,
        signer: &RequestSigner,
        order: &NewOrder,
    ) -> ExchangeResult<OrderAck> {
        let signed = signer.sign(&order.to_params())?;
        let url = format!("{}/api/v3/order?{}", self.api_base, signed.signed_query());

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &signed.api_key)
            .send()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        let body = check_status(response).await?;
        let ack: OrderAck = serde_json::from_str(&body)
            .map_err(|e| ExchangeError::InvalidResponse(e.to_string()))?;

        info!("Order placed successfully: {}", ack.order_id);
        Ok(ack)
    }

    /// Build a signed request without forwarding it, for clients that call
    /// the exchange directly.
    pub fn sign_for_client(
        &self,
        signer: &RequestSigner,
        params: &[(&str, &str)],
    ) -> ExchangeResult<SignedRequest> {
        Ok(signer.sign(params)?)
    }
}

impl Default for BinanceClient {
    fn default() -> Self {
        Self::new()
    }
}

async fn check_status(response: reqwest::Response) -> ExchangeResult<String> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(ExchangeError::Rejected {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use zeroize::Zeroizing;

    fn signer() -> RequestSigner {
        RequestSigner::new(
            Zeroizing::new("key".to_string()),
            Zeroizing::new("secret".to_string()),
        )
    }

    fn market_order() -> NewOrder {
        NewOrder {
            symbol: "BTCUSDT".to_string(),
            side: "BUY".to_string(),
            order_type: "MARKET".to_string(),
            quantity: "0.01".to_string(),
            price: None,
        }
    }

    #[test]
    fn test_market_order_params() {
        let order = market_order();
        let params = order.to_params();
        assert_eq!(
            params,
            vec![
                ("symbol", "BTCUSDT"),
                ("side", "BUY"),
                ("type", "MARKET"),
                ("quantity", "0.01"),
            ]
        );
    }

    #[test]
    fn test_limit_order_params_include_price_and_tif() {
        let order = NewOrder {
            symbol: "ETHUSDT".to_string(),
            side: "SELL".to_string(),
            order_type: "LIMIT".to_string(),
            quantity: "0.5".to_string(),
            price: Some("3000".to_string()),
        };
        let params = order.to_params();
        assert_eq!(params[4], ("price", "3000"));
        assert_eq!(params[5], ("timeInForce", "GTC"));
    }

    #[test]
    fn test_order_validation() {
        assert!(market_order().validate().is_ok());

        let mut bad_side = market_order();
        bad_side.side = "HOLD".to_string();
        assert!(bad_side.validate().is_err());

        let mut limit_without_price = market_order();
        limit_without_price.order_type = "LIMIT".to_string();
        assert!(limit_without_price.validate().is_err());

        let mut market_with_price = market_order();
        market_with_price.price = Some("100".to_string());
        assert!(market_with_price.validate().is_err());

        let mut zero_qty = market_order();
        zero_qty.quantity = "0".to_string();
        assert!(zero_qty.validate().is_err());

        let mut bad_qty = market_order();
        bad_qty.quantity = "lots".to_string();
        assert!(bad_qty.validate().is_err());
    }

    #[test]
    fn test_order_ack_deserialization() {
        let json = r#"{"orderId": 12345, "symbol": "BTCUSDT", "status": "FILLED"}"#;
        let ack: OrderAck = serde_json::from_str(json).unwrap();
        assert_eq!(ack.order_id, 12345);
        assert_eq!(ack.symbol, "BTCUSDT");
        assert_eq!(ack.status, "FILLED");
    }

    #[test]
    fn test_with_base_trims_trailing_slash() {
        let client = BinanceClient::with_base("http://localhost:9000/");
        assert_eq!(client.api_base, "http://localhost:9000");
    }

    #[test]
    fn test_sign_for_client_returns_signed_params() {
        let client = BinanceClient::new_testnet();
        let signed = client
            .sign_for_client(&signer(), &[("symbol", "BTCUSDT")])
            .unwrap();
        assert!(signed.query_string.contains("symbol=BTCUSDT"));
        assert!(signed.query_string.contains("recvWindow=5000"));
        assert_eq!(signed.api_key, "key");
    }

    #[tokio::test]
    async fn test_get_account_against_unreachable_host_is_network_error() {
        let client = BinanceClient::with_base("http://127.0.0.1:1");
        let result = client.get_account(&signer()).await;
        assert!(matches!(result, Err(ExchangeError::Network(_))));
    }

    #[tokio::test]
    async fn test_place_order_against_unreachable_host_is_network_error() {
        let client = BinanceClient::with_base("http://127.0.0.1:1");
        let result = client.place_order(&signer(), &market_order()).await;
        assert!(matches!(result, Err(ExchangeError::Network(_))));
    }
}
