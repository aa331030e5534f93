//! Inbound event dispatch.
//!
//! Deliveries are routed solely on the `source_exchange` header to the
//! handler registered for that partner. Unknown or missing sources are
//! logged and dropped. Delivery is at-most-once: a failing handler is
//! logged, the message is not retried.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use flho_types::error::FlowError;
use flho_types::event::Delivery;

/// Handles deliveries from one partner exchange. Must be idempotent.
pub trait DeliveryHandler: Send + Sync {
    fn handle<'a>(
        &'a self,
        delivery: &'a Delivery,
    ) -> Pin<Box<dyn Future<Output = Result<(), FlowError>> + Send + 'a>>;
}

/// What happened to one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled,
    MissingSource,
    UnknownSource(String),
    Failed(String),
}

#[derive(Clone, Default)]
pub struct EventDispatcher {
    handlers: HashMap<String, Arc<dyn DeliveryHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for deliveries whose `source_exchange` is `source`.
    pub fn register(&mut self, source: impl Into<String>, handler: Arc<dyn DeliveryHandler>) {
        self.handlers.insert(source.into(), handler);
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub async fn dispatch(&self, delivery: &Delivery) -> DispatchOutcome {
        let Some(source) = delivery.source_exchange() else {
            tracing::warn!(routing_key = %delivery.routing_key, "delivery without source_exchange header, dropping");
            return DispatchOutcome::MissingSource;
        };

        let Some(handler) = self.handlers.get(source) else {
            tracing::warn!(
                source = %source,
                routing_key = %delivery.routing_key,
                "no handler for event source, dropping"
            );
            return DispatchOutcome::UnknownSource(source.to_string());
        };

        match handler.handle(delivery).await {
            Ok(()) => {
                tracing::debug!(source = %source, routing_key = %delivery.routing_key, "event handled");
                DispatchOutcome::Handled
            }
            Err(e) => {
                tracing::error!(
                    source = %source,
                    routing_key = %delivery.routing_key,
                    error = %e,
                    "event handler failed"
                );
                DispatchOutcome::Failed(e.to_string())
            }
        }
    }

    /// Consume until `cancel` fires or the queue closes.
    pub async fn run(self, mut deliveries: mpsc::Receiver<Delivery>, cancel: CancellationToken) {
        tracing::info!("event dispatcher started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = deliveries.recv() => match next {
                    Some(delivery) => {
                        self.dispatch(&delivery).await;
                    }
                    None => {
                        tracing::warn!("event queue closed");
                        break;
                    }
                },
            }
        }
        tracing::info!("event dispatcher stopped");
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("sources", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collecting {
        keys: Mutex<Vec<String>>,
        fail: bool,
    }

    impl DeliveryHandler for Collecting {
        fn handle<'a>(
            &'a self,
            delivery: &'a Delivery,
        ) -> Pin<Box<dyn Future<Output = Result<(), FlowError>> + Send + 'a>> {
            Box::pin(async move {
                if self.fail {
                    return Err(FlowError::InvalidArgument("bad body".into()));
                }
                self.keys.lock().unwrap().push(delivery.routing_key.clone());
                Ok(())
            })
        }
    }

    fn delivery(source: Option<&str>, key: &str) -> Delivery {
        let mut headers = BTreeMap::new();
        if let Some(source) = source {
            headers.insert("source_exchange".to_string(), source.to_string());
        }
        Delivery {
            exchange: source.unwrap_or("unknown").to_string(),
            routing_key: key.to_string(),
            headers,
            body: b"{}".to_vec(),
        }
    }

    #[tokio::test]
    async fn routes_on_source_header_not_routing_key() {
        let handler = Arc::new(Collecting::default());
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register("identity_service_exchange", handler.clone());

        // Routing key names another exchange; the header decides.
        let outcome = dispatcher
            .dispatch(&delivery(Some("identity_service_exchange"), "other.identity.create"))
            .await;

        assert_eq!(outcome, DispatchOutcome::Handled);
        assert_eq!(handler.keys.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_and_missing_sources_are_dropped() {
        let handler = Arc::new(Collecting::default());
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register("identity_service_exchange", handler.clone());

        assert_eq!(
            dispatcher
                .dispatch(&delivery(Some("mailer_service_exchange"), "mailer_service_exchange.mail.create"))
                .await,
            DispatchOutcome::UnknownSource("mailer_service_exchange".into())
        );
        assert_eq!(
            dispatcher.dispatch(&delivery(None, "x.identity.create")).await,
            DispatchOutcome::MissingSource
        );
        assert!(handler.keys.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn handler_failure_is_reported_not_raised() {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(
            "identity_service_exchange",
            Arc::new(Collecting {
                fail: true,
                ..Default::default()
            }),
        );

        let outcome = dispatcher
            .dispatch(&delivery(Some("identity_service_exchange"), "identity_service_exchange.identity.create"))
            .await;
        assert!(matches!(outcome, DispatchOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn run_loop_stops_on_cancel() {
        let handler = Arc::new(Collecting::default());
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register("a_exchange", handler.clone());

        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(dispatcher.run(rx, cancel.clone()));

        tx.send(delivery(Some("a_exchange"), "a_exchange.x.create")).await.unwrap();
        tx.send(delivery(Some("a_exchange"), "a_exchange.x.update")).await.unwrap();
        // Let the loop drain before cancelling.
        while handler.keys.lock().unwrap().len() < 2 {
            tokio::task::yield_now().await;
        }

        cancel.cancel();
        task.await.unwrap();
        assert_eq!(
            *handler.keys.lock().unwrap(),
            vec!["a_exchange.x.create", "a_exchange.x.update"]
        );
    }
}
