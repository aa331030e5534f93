//! Identity mirror maintenance from identity-service lifecycle events and
//! operator commands.

pub mod handler;
pub mod operator;

pub use handler::IdentityEventHandler;
pub use operator::upsert_identity;
