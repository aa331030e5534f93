//! Shared domain types for flho.
//!
//! Workflows, runs, breaker status, lifecycle events, paging, configuration
//! and the error taxonomy used across the service.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod breaker;
pub mod config;
pub mod duration;
pub mod error;
pub mod event;
pub mod identity;
pub mod page;
pub mod run;
pub mod workflow;
