//! Applies `identity.create`, `identity.update` and `identity.delete`
//! deliveries to the local identity mirror.
//!
//! Writes are conditional on the incoming version being newer than the
//! stored one, so out-of-order and repeated deliveries are harmless. The
//! [`Deduplicator`] keeps the highest version seen per identity and
//! short-circuits repeats before they reach storage.

use std::future::Future;
use std::pin::Pin;

use chrono::Utc;

use flho_types::error::FlowError;
use flho_types::event::{Delivery, EventAction, IdentityEvent, entity};
use flho_types::identity::IdentityRecord;

use crate::event::{Deduplicator, DeliveryHandler};
use crate::repository::identity::IdentityRepository;

pub struct IdentityEventHandler<I: IdentityRepository> {
    identities: I,
    dedupe: Deduplicator,
}

impl<I: IdentityRepository> IdentityEventHandler<I> {
    pub fn new(identities: I) -> Self {
        Self {
            identities,
            dedupe: Deduplicator::new(),
        }
    }

    /// Apply one delivery. Deliveries for other entities or actions are
    /// ignored.
    pub async fn apply(&self, delivery: &Delivery) -> Result<(), FlowError> {
        let Some((entity, action)) = delivery.entity_action() else {
            tracing::debug!(routing_key = %delivery.routing_key, "unroutable identity delivery ignored");
            return Ok(());
        };
        if entity != entity::IDENTITY {
            return Ok(());
        }
        let action: EventAction = match action.parse() {
            Ok(action @ (EventAction::Create | EventAction::Update | EventAction::Delete)) => action,
            _ => {
                tracing::debug!(routing_key = %delivery.routing_key, "identity action ignored");
                return Ok(());
            }
        };

        let event: IdentityEvent = serde_json::from_slice(&delivery.body)
            .map_err(|e| FlowError::InvalidArgument(format!("malformed identity event: {e}")))?;

        if !self.dedupe.first_sighting(&event.uuid, event.version) {
            return Ok(());
        }

        let record = IdentityRecord {
            uuid: event.uuid.clone(),
            version: event.version,
            active: action != EventAction::Delete && event.activated,
            updated_at: Utc::now(),
        };
        let applied = match self.identities.apply_if_newer(&record).await {
            Ok(applied) => applied,
            Err(e) => {
                self.dedupe.forget(&event.uuid);
                return Err(FlowError::from_repository("identity", e));
            }
        };

        if applied {
            tracing::info!(
                identity = %record.uuid,
                version = record.version,
                active = record.active,
                action = action.as_str(),
                "identity mirror updated"
            );
        } else {
            tracing::debug!(identity = %record.uuid, version = record.version, "stale identity event skipped");
        }
        Ok(())
    }
}

impl<I: IdentityRepository> DeliveryHandler for IdentityEventHandler<I> {
    fn handle<'a>(
        &'a self,
        delivery: &'a Delivery,
    ) -> Pin<Box<dyn Future<Output = Result<(), FlowError>> + Send + 'a>> {
        Box::pin(self.apply(delivery))
    }
}
