//! Exchange and queue layout for one service instance.

use flho_types::config::{PartnerBinding, ServiceConfig};

use super::broker::{BoxBroker, BrokerError};

/// Own exchange, private queue and partner bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub exchange: String,
    pub queue: String,
    pub partners: Vec<PartnerBinding>,
}

impl Topology {
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            exchange: config.exchange_name(),
            queue: config.queue_name(),
            partners: config.bus.partners.clone(),
        }
    }

    /// `<partnerExchange>.<entity>.*` for every bound partner entity.
    pub fn binding_patterns(&self) -> Vec<(String, String)> {
        self.partners
            .iter()
            .flat_map(|p| {
                p.entities
                    .iter()
                    .map(move |entity| (p.exchange.clone(), format!("{}.{entity}.*", p.exchange)))
            })
            .collect()
    }

    /// Declare the own exchange, the private queue, every partner exchange
    /// and the queue bindings.
    pub async fn declare(&self, broker: &BoxBroker) -> Result<(), BrokerError> {
        broker.declare_exchange(&self.exchange).await?;
        broker.declare_queue(&self.queue).await?;

        for partner in &self.partners {
            broker.declare_exchange(&partner.exchange).await?;
        }
        for (exchange, pattern) in self.binding_patterns() {
            broker.bind_queue(&self.queue, &exchange, &pattern).await?;
            tracing::debug!(queue = %self.queue, exchange = %exchange, pattern = %pattern, "queue bound");
        }

        tracing::info!(
            exchange = %self.exchange,
            queue = %self.queue,
            partners = self.partners.len(),
            "event topology declared"
        );
        Ok(())
    }
}
