//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (flho-infra) implements. The core crate never depends on any specific
//! storage technology.

pub mod identity;
pub mod run;
pub mod workflow;
