//! Exchange integration layer
//!
//! Signed-request construction and the thin HTTP client that forwards
//! signed calls to the Binance REST API.

pub mod binance_client;
pub mod signer;
