//! Infrastructure layer for flho.
//!
//! Contains implementations of the ports defined in `flho-core`: SQLite
//! storage, the HTTP retry invoker, the in-process topic broker, and the
//! TOML configuration loader.

pub mod broker;
pub mod config;
pub mod http;
pub mod sqlite;
