//! Inter-service event bus: topology, publishing, dispatch and dedupe.

pub mod broker;
pub mod bus;
pub mod dedupe;
pub mod dispatcher;
pub mod topology;

pub use broker::{BoxBroker, Broker, BrokerError};
pub use bus::EventBus;
pub use dedupe::Deduplicator;
pub use dispatcher::{DeliveryHandler, DispatchOutcome, EventDispatcher};
pub use topology::Topology;
