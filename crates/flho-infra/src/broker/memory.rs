//! In-process topic-exchange broker.
//!
//! Implements the `Broker` port with AMQP topic semantics inside one
//! process: exchanges hold pattern bindings, queues are bounded `mpsc`
//! channels with a single consumer. A delivery reaches each matching queue
//! once, however many of its bindings match. Publishing never blocks: a
//! full queue drops the message and reports `QueueFull`.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use flho_core::event::{Broker, BrokerError};
use flho_types::event::Delivery;

/// Default buffered deliveries per queue.
const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
struct Binding {
    queue: String,
    pattern: String,
}

#[derive(Debug)]
struct Queue {
    sender: mpsc::Sender<Delivery>,
    /// Taken by the first consumer.
    receiver: Option<mpsc::Receiver<Delivery>>,
}

#[derive(Debug, Default)]
struct Inner {
    exchanges: DashMap<String, Vec<Binding>>,
    queues: DashMap<String, Queue>,
}

#[derive(Debug, Clone)]
pub struct InProcessBroker {
    inner: Arc<Inner>,
    capacity: usize,
}

impl Default for InProcessBroker {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl InProcessBroker {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner::default()),
            capacity: capacity.max(1),
        }
    }

    /// Queues whose bindings on `exchange` match `routing_key`.
    fn route(&self, exchange: &str, routing_key: &str) -> Result<BTreeSet<String>, BrokerError> {
        let bindings = self
            .inner
            .exchanges
            .get(exchange)
            .ok_or_else(|| BrokerError::UnknownExchange(exchange.to_string()))?;
        Ok(bindings
            .iter()
            .filter(|b| topic_matches(&b.pattern, routing_key))
            .map(|b| b.queue.clone())
            .collect())
    }
}

impl Broker for InProcessBroker {
    async fn declare_exchange(&self, name: &str) -> Result<(), BrokerError> {
        self.inner.exchanges.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn declare_queue(&self, name: &str) -> Result<(), BrokerError> {
        self.inner.queues.entry(name.to_string()).or_insert_with(|| {
            let (sender, receiver) = mpsc::channel(self.capacity);
            Queue {
                sender,
                receiver: Some(receiver),
            }
        });
        Ok(())
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, pattern: &str) -> Result<(), BrokerError> {
        if !self.inner.queues.contains_key(queue) {
            return Err(BrokerError::UnknownQueue(queue.to_string()));
        }
        let mut bindings = self
            .inner
            .exchanges
            .get_mut(exchange)
            .ok_or_else(|| BrokerError::UnknownExchange(exchange.to_string()))?;
        if !bindings.iter().any(|b| b.queue == queue && b.pattern == pattern) {
            bindings.push(Binding {
                queue: queue.to_string(),
                pattern: pattern.to_string(),
            });
        }
        Ok(())
    }

    async fn publish(&self, delivery: Delivery) -> Result<(), BrokerError> {
        let targets = self.route(&delivery.exchange, &delivery.routing_key)?;
        if targets.is_empty() {
            tracing::trace!(routing_key = %delivery.routing_key, "no binding matched, message dropped");
            return Ok(());
        }

        let mut full = None;
        for name in targets {
            let Some(sender) = self.inner.queues.get(&name).map(|q| q.sender.clone()) else {
                continue;
            };
            match sender.try_send(delivery.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(queue = %name, routing_key = %delivery.routing_key, "queue full, message dropped");
                    full = Some(name);
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(queue = %name, "queue consumer gone, message dropped");
                }
            }
        }

        match full {
            Some(queue) => Err(BrokerError::QueueFull(queue)),
            None => Ok(()),
        }
    }

    async fn consume(&self, queue: &str) -> Result<mpsc::Receiver<Delivery>, BrokerError> {
        let mut slot = self
            .inner
            .queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::UnknownQueue(queue.to_string()))?;
        slot.receiver
            .take()
            .ok_or_else(|| BrokerError::AlreadyConsumed(queue.to_string()))
    }
}

/// AMQP topic matching: `*` matches exactly one segment, `#` zero or more.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    segments_match(&pattern, &key)
}

fn segments_match(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| segments_match(rest, &key[skip..])),
        Some((&"*", rest)) => !key.is_empty() && segments_match(rest, &key[1..]),
        Some((word, rest)) => key.first() == Some(word) && segments_match(rest, &key[1..]),
    }
}
