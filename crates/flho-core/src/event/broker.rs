//! Message broker port.
//!
//! Models the subset of a topic-exchange broker the service needs:
//! exchanges, one private queue, pattern bindings, publish and consume.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use flho_types::event::Delivery;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("exchange not declared: {0}")]
    UnknownExchange(String),

    #[error("queue not declared: {0}")]
    UnknownQueue(String),

    #[error("queue {0} is already being consumed")]
    AlreadyConsumed(String),

    #[error("queue {0} is full")]
    QueueFull(String),

    #[error("broker connection closed")]
    Closed,

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Topic-exchange broker.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait Broker: Send + Sync {
    /// Declare a topic exchange. Idempotent.
    fn declare_exchange(&self, name: &str) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Declare a queue. Idempotent.
    fn declare_queue(&self, name: &str) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Route messages published to `exchange` whose routing key matches
    /// `pattern` (`*` = one segment, `#` = zero or more) into `queue`.
    fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        pattern: &str,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Publish to `delivery.exchange`. Messages matching no binding are dropped.
    fn publish(&self, delivery: Delivery) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Take the receiving end of a queue. A queue has at most one consumer.
    fn consume(
        &self,
        queue: &str,
    ) -> impl Future<Output = Result<mpsc::Receiver<Delivery>, BrokerError>> + Send;
}

type BoxFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, BrokerError>> + Send + 'a>>;

/// Object-safe version of [`Broker`] with boxed futures.
pub trait BrokerDyn: Send + Sync {
    fn declare_exchange_boxed<'a>(&'a self, name: &'a str) -> BoxFut<'a, ()>;
    fn declare_queue_boxed<'a>(&'a self, name: &'a str) -> BoxFut<'a, ()>;
    fn bind_queue_boxed<'a>(
        &'a self,
        queue: &'a str,
        exchange: &'a str,
        pattern: &'a str,
    ) -> BoxFut<'a, ()>;
    fn publish_boxed(&self, delivery: Delivery) -> BoxFut<'_, ()>;
    fn consume_boxed<'a>(&'a self, queue: &'a str) -> BoxFut<'a, mpsc::Receiver<Delivery>>;
}

impl<T: Broker> BrokerDyn for T {
    fn declare_exchange_boxed<'a>(&'a self, name: &'a str) -> BoxFut<'a, ()> {
        Box::pin(self.declare_exchange(name))
    }

    fn declare_queue_boxed<'a>(&'a self, name: &'a str) -> BoxFut<'a, ()> {
        Box::pin(self.declare_queue(name))
    }

    fn bind_queue_boxed<'a>(
        &'a self,
        queue: &'a str,
        exchange: &'a str,
        pattern: &'a str,
    ) -> BoxFut<'a, ()> {
        Box::pin(self.bind_queue(queue, exchange, pattern))
    }

    fn publish_boxed(&self, delivery: Delivery) -> BoxFut<'_, ()> {
        Box::pin(self.publish(delivery))
    }

    fn consume_boxed<'a>(&'a self, queue: &'a str) -> BoxFut<'a, mpsc::Receiver<Delivery>> {
        Box::pin(self.consume(queue))
    }
}

/// Type-erased, cheaply cloneable broker handle.
#[derive(Clone)]
pub struct BoxBroker {
    inner: Arc<dyn BrokerDyn>,
}

impl BoxBroker {
    pub fn new<T: Broker + 'static>(broker: T) -> Self {
        Self {
            inner: Arc::new(broker),
        }
    }

    pub async fn declare_exchange(&self, name: &str) -> Result<(), BrokerError> {
        self.inner.declare_exchange_boxed(name).await
    }

    pub async fn declare_queue(&self, name: &str) -> Result<(), BrokerError> {
        self.inner.declare_queue_boxed(name).await
    }

    pub async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        pattern: &str,
    ) -> Result<(), BrokerError> {
        self.inner.bind_queue_boxed(queue, exchange, pattern).await
    }

    pub async fn publish(&self, delivery: Delivery) -> Result<(), BrokerError> {
        self.inner.publish_boxed(delivery).await
    }

    pub async fn consume(&self, queue: &str) -> Result<mpsc::Receiver<Delivery>, BrokerError> {
        self.inner.consume_boxed(queue).await
    }
}

impl std::fmt::Debug for BoxBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxBroker").finish_non_exhaustive()
    }
}
