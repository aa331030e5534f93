//! Business logic and port definitions for flho.
//!
//! This crate defines the "ports" (repository, broker and retry invoker
//! traits) that the infrastructure layer implements. It depends only on
//! `flho-types` -- never on `flho-infra` or any database/IO crate.

pub mod breaker;
pub mod event;
pub mod identity;
pub mod repository;
pub mod run;
pub mod worker;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;
