//! Exchange API credential resolution
//!
//! Users may register several Binance API key pairs, stored encrypted at
//! rest. Which pair a request uses depends on what it is for:
//!
//! - read-only queries use the most recently created active key
//! - trading uses the oldest active key whose label does not contain
//!   "read" (case-insensitive)
//!
//! The trading rule infers capability from free-text labels. That is
//! fragile, but it is the documented convention users already rely on, so
//! it is preserved exactly rather than replaced with an explicit
//! capability flag.
//!
//! Every selection stamps `last_used_at` on the chosen record through
//! [`CredentialStore::mark_used`]; selecting the same key twice updates
//! the timestamp twice.

use crate::crypto::{CryptoError, SecretCipher};
use crate::exchange::signer::RequestSigner;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Errors from credential resolution
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// No active key matches the selection rule. Surfaced to the user as a
    /// 400-class "add your API keys in settings" error, not a server fault.
    #[error("no API credentials configured")]
    NoCredentialsConfigured,

    /// Wrong key material or corrupt ciphertext. Fatal for the current
    /// call; never silently swallowed.
    #[error("failed to decrypt stored credential: {0}")]
    Decryption(#[from] CryptoError),

    #[error("credential storage error: {0}")]
    Storage(String),
}

/// An encrypted credential record as returned by the store
#[derive(Debug, Clone)]
pub struct ApiKeyRecord {
    pub id: String,
    pub user_id: String,
    /// Free-text label chosen by the user (e.g. "Trading Key")
    pub label: String,
    pub encrypted_api_key: String,
    pub encrypted_secret: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiKeyRecord {
    /// Whether this key may be used for trading, per the label convention.
    pub fn is_trading_capable(&self) -> bool {
        !self.label.to_lowercase().contains("read")
    }
}

/// Storage seam for credential records.
///
/// Implemented by the SQLite repository in production and by in-memory
/// fakes in tests.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// All active key records for a user, oldest first.
    async fn find_active_keys_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<ApiKeyRecord>, CredentialError>;

    /// Stamp `last_used_at = now` on a record.
    async fn mark_used(&self, id: &str) -> Result<(), CredentialError>;
}

/// Resolve the read key for a user: the most recently created active key.
///
/// Returns a ready-to-use [`RequestSigner`] holding the decrypted pair;
/// plaintext is zeroized when the signer is dropped.
pub async fn resolve_read_keys(
    store: &dyn CredentialStore,
    cipher: &SecretCipher,
    user_id: &str,
) -> Result<RequestSigner, CredentialError> {
    let keys = store.find_active_keys_for_user(user_id).await?;
    let chosen = keys
        .iter()
        .max_by_key(|k| k.created_at)
        .ok_or(CredentialError::NoCredentialsConfigured)?;

    debug!(user_id, key_id = %chosen.id, "selected read key");
    decrypt_and_mark(store, cipher, chosen).await
}

/// Resolve the trading key for a user: the oldest active key whose label
/// does not case-insensitively contain "read".
pub async fn resolve_trading_keys(
    store: &dyn CredentialStore,
    cipher: &SecretCipher,
    user_id: &str,
) -> Result<RequestSigner, CredentialError> {
    let keys = store.find_active_keys_for_user(user_id).await?;
    let chosen = keys
        .iter()
        .filter(|k| k.is_trading_capable())
        .min_by_key(|k| k.created_at)
        .ok_or(CredentialError::NoCredentialsConfigured)?;

    debug!(user_id, key_id = %chosen.id, "selected trading key");
    decrypt_and_mark(store, cipher, chosen).await
}

async fn decrypt_and_mark(
    store: &dyn CredentialStore,
    cipher: &SecretCipher,
    record: &ApiKeyRecord,
) -> Result<RequestSigner, CredentialError> {
    store.mark_used(&record.id).await?;
    let api_key = cipher.decrypt(&record.encrypted_api_key)?;
    let secret_key = cipher.decrypt(&record.encrypted_secret)?;
    Ok(RequestSigner::new(api_key, secret_key))
}
