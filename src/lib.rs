//! FolioVault Exchange Gateway Library
//!
//! Rate-limited, signed access to the Binance API for portfolio users:
//! a fixed-window rate limiter guards every request, and per-user
//! encrypted credentials are resolved and used to HMAC-sign exchange
//! calls.

pub mod application;
pub mod config;
pub mod credentials;
pub mod crypto;
pub mod exchange;
pub mod persistence;
pub mod rate_limit;
