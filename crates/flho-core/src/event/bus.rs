//! Lifecycle event publisher.
//!
//! Publishes `<exchange>.<entity>.<action>` messages with the
//! `source_exchange` header. Events are side effects: a publish that fails
//! or exceeds the timeout is logged and dropped, never returned to the
//! operation that triggered it.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use flho_types::event::{Delivery, EventAction, SOURCE_EXCHANGE_HEADER, routing_key};

use super::broker::BoxBroker;

#[derive(Debug, Clone)]
pub struct EventBus {
    broker: BoxBroker,
    exchange: String,
    timeout: Duration,
}

impl EventBus {
    pub fn new(broker: BoxBroker, exchange: impl Into<String>, timeout: Duration) -> Self {
        Self {
            broker,
            exchange: exchange.into(),
            timeout,
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Serialize `payload` and publish it. Returns whether the broker
    /// accepted the message in time.
    pub async fn publish<T: Serialize>(&self, entity: &str, action: EventAction, payload: &T) -> bool {
        let key = routing_key(&self.exchange, entity, action);

        let body = match serde_json::to_vec(payload) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(routing_key = %key, error = %e, "failed to serialize event");
                return false;
            }
        };

        let mut headers = BTreeMap::new();
        headers.insert(SOURCE_EXCHANGE_HEADER.to_string(), self.exchange.clone());
        let delivery = Delivery {
            exchange: self.exchange.clone(),
            routing_key: key.clone(),
            headers,
            body,
        };

        match tokio::time::timeout(self.timeout, self.broker.publish(delivery)).await {
            Ok(Ok(())) => {
                tracing::debug!(routing_key = %key, "event published");
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(routing_key = %key, error = %e, "failed to publish event");
                false
            }
            Err(_) => {
                tracing::warn!(
                    routing_key = %key,
                    timeout_secs = self.timeout.as_secs(),
                    "event publish timed out"
                );
                false
            }
        }
    }
}
