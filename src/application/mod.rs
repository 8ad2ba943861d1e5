//! HTTP application layer

pub mod handlers;
