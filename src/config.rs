//! Service configuration
//!
//! Loaded from environment variables at startup. The encryption key is
//! required; everything else has development defaults.

use std::net::SocketAddr;

/// Configuration error raised at startup
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("FOLIOVAULT_ENCRYPTION_KEY is not set; generate one with: openssl rand -base64 32")]
    MissingEncryptionKey,

    #[error("invalid bind address: {0}")]
    InvalidBindAddr(String),
}

/// Top-level application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    /// base64-encoded 32-byte AES key for credentials at rest
    pub encryption_key_b64: String,
    /// Use the Binance testnet instead of production
    pub use_testnet: bool,
    /// Seconds between rate-limit garbage-collection sweeps
    pub sweep_interval_secs: u64,
}

impl AppConfig {
    /// Load from environment variables.
    ///
    /// Fails fast when the encryption key is absent rather than starting a
    /// server that cannot decrypt any stored credential.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr = std::env::var("FOLIOVAULT_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
            .parse()
            .map_err(|e| ConfigError::InvalidBindAddr(format!("{}", e)))?;

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://data/foliovault.db".to_string());

        let encryption_key_b64 = std::env::var("FOLIOVAULT_ENCRYPTION_KEY")
            .map_err(|_| ConfigError::MissingEncryptionKey)?;

        let use_testnet = std::env::var("BINANCE_USE_TESTNET")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(false);

        let sweep_interval_secs = std::env::var("RATE_LIMIT_SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(crate::rate_limit::SWEEP_INTERVAL.as_secs());

        Ok(Self {
            bind_addr,
            database_url,
            encryption_key_b64,
            use_testnet,
            sweep_interval_secs,
        })
    }
}
