//! Outbound HTTP adapters.

pub mod retry_client;

pub use retry_client::HttpRetryInvoker;
