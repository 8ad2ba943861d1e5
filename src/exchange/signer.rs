//! Signed-request construction for the Binance REST API
//!
//! Binance authenticates private endpoints with an HMAC-SHA256 signature
//! over the exact bytes of the request's query string. The serialization
//! here must therefore stay byte-for-byte stable: parameters keep their
//! insertion order, `timestamp` and `recvWindow` are appended last, and the
//! signature is lowercase hex appended by the caller as a trailing
//! `&signature=` parameter.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::form_urlencoded;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// Tolerance (ms) granted to the exchange's server-side clock-skew check
pub const RECV_WINDOW_MS: i64 = 5_000;

/// Errors from signed-request construction
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("invalid secret key material: {0}")]
    InvalidSecret(String),
}

/// A signed set of request parameters, built fresh per call and never
/// persisted. The caller appends `&signature=<signature>` to `query_string`
/// to produce the final request.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub api_key: String,
    /// Lowercase hex HMAC-SHA256 over `query_string`
    pub signature: String,
    /// Epoch millis embedded in the query string
    pub timestamp: i64,
    pub query_string: String,
}

impl SignedRequest {
    /// Full query string with the trailing signature parameter attached
    pub fn signed_query(&self) -> String {
        format!("{}&signature={}", self.query_string, self.signature)
    }
}

/// Signs query parameters with a user's exchange credentials.
///
/// Holds the decrypted secret only for the lifetime of the signer, wrapped
/// in [`Zeroizing`] so it is wiped from memory on drop.
pub struct RequestSigner {
    api_key: Zeroizing<String>,
    secret_key: Zeroizing<String>,
}

impl RequestSigner {
    pub fn new(api_key: Zeroizing<String>, secret_key: Zeroizing<String>) -> Self {
        Self {
            api_key,
            secret_key,
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Sign `params` with the current wall-clock timestamp.
    pub fn sign(&self, params: &[(&str, &str)]) -> Result<SignedRequest, SignerError> {
        self.sign_at(params, crate::rate_limit::now_millis())
    }

    /// Sign `params` at an explicit timestamp.
    ///
    /// Deterministic: identical params, secret, and timestamp always produce
    /// the same query string and signature.
    pub fn sign_at(
        &self,
        params: &[(&str, &str)],
        timestamp_ms: i64,
    ) -> Result<SignedRequest, SignerError> {
        let timestamp = timestamp_ms.to_string();
        let recv_window = RECV_WINDOW_MS.to_string();

        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in params {
            serializer.append_pair(key, value);
        }
        serializer.append_pair("timestamp", &timestamp);
        serializer.append_pair("recvWindow", &recv_window);
        let query_string = serializer.finish();

        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| SignerError::InvalidSecret(e.to_string()))?;
        mac.update(query_string.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(SignedRequest {
            api_key: self.api_key.to_string(),
            signature,
            timestamp: timestamp_ms,
            query_string,
        })
    }
}
