//! Lifecycle event types exchanged over the topic bus.
//!
//! Routing keys follow `<exchange>.<entity>.<action>`; every delivery carries
//! a `source_exchange` header naming the publisher.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::breaker::CircuitStatus;

/// Header naming the exchange that published a delivery.
pub const SOURCE_EXCHANGE_HEADER: &str = "source_exchange";

/// Entity names used in routing keys.
pub mod entity {
    pub const RUN: &str = "run";
    pub const WORKFLOW: &str = "workflow";
    pub const IDENTITY: &str = "identity";
}

/// Action segment of a routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventAction {
    Create,
    Update,
    Delete,
    RetryAttempted,
    RetrySuppressed,
    CircuitTransition,
}

impl EventAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::Create => "create",
            EventAction::Update => "update",
            EventAction::Delete => "delete",
            EventAction::RetryAttempted => "retry-attempted",
            EventAction::RetrySuppressed => "retry-suppressed",
            EventAction::CircuitTransition => "circuit-transition",
        }
    }
}

impl std::str::FromStr for EventAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(EventAction::Create),
            "update" => Ok(EventAction::Update),
            "delete" => Ok(EventAction::Delete),
            "retry-attempted" => Ok(EventAction::RetryAttempted),
            "retry-suppressed" => Ok(EventAction::RetrySuppressed),
            "circuit-transition" => Ok(EventAction::CircuitTransition),
            other => Err(format!("unknown event action: {other}")),
        }
    }
}

/// Build `<exchange>.<entity>.<action>`.
pub fn routing_key(exchange: &str, entity: &str, action: EventAction) -> String {
    format!("{exchange}.{entity}.{}", action.as_str())
}

/// A message as published to, or received from, a topic exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub exchange: String,
    pub routing_key: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl Delivery {
    pub fn source_exchange(&self) -> Option<&str> {
        self.headers.get(SOURCE_EXCHANGE_HEADER).map(String::as_str)
    }

    /// `(entity, action)` parsed from the routing key's last two segments.
    pub fn entity_action(&self) -> Option<(&str, &str)> {
        let mut segments = self.routing_key.rsplitn(3, '.');
        let action = segments.next()?;
        let entity = segments.next()?;
        segments.next()?;
        Some((entity, action))
    }
}

/// Body of `run.create` and `run.update`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEvent {
    pub run_unique_id: Uuid,
    pub workflow_id: Uuid,
    pub step: u32,
    pub version: i64,
}

/// Body of `run.retry-attempted` and `run.retry-suppressed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryEvent {
    pub run_unique_id: Uuid,
    pub workflow_id: Uuid,
    pub step: u32,
    pub version: i64,
    pub breaker_status: CircuitStatus,
}

/// Body of `workflow.circuit-transition`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitTransitionEvent {
    pub workflow_id: Uuid,
    pub from: CircuitStatus,
    pub to: CircuitStatus,
}

/// Identity lifecycle body received from the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityEvent {
    pub uuid: String,
    pub version: i64,
    #[serde(default = "default_activated")]
    pub activated: bool,
}

fn default_activated() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_key_has_three_segments() {
        assert_eq!(
            routing_key("workflow_service_exchange", entity::RUN, EventAction::RetrySuppressed),
            "workflow_service_exchange.run.retry-suppressed"
        );
    }

    #[test]
    fn delivery_splits_entity_and_action() {
        let delivery = Delivery {
            exchange: "identity_service_exchange".into(),
            routing_key: "identity_service_exchange.identity.update".into(),
            headers: BTreeMap::new(),
            body: Vec::new(),
        };
        assert_eq!(delivery.entity_action(), Some(("identity", "update")));
        assert_eq!(delivery.source_exchange(), None);

        let short = Delivery {
            routing_key: "identity.update".into(),
            ..delivery
        };
        assert_eq!(short.entity_action(), None);
    }

    #[test]
    fn action_text_matches_serde() {
        let json = serde_json::to_string(&EventAction::CircuitTransition).unwrap();
        assert_eq!(json, "\"circuit-transition\"");
        assert_eq!(
            "retry-attempted".parse::<EventAction>().unwrap(),
            EventAction::RetryAttempted
        );
    }

    #[test]
    fn retry_event_wire_shape() {
        let event = RetryEvent {
            run_unique_id: Uuid::nil(),
            workflow_id: Uuid::nil(),
            step: 0,
            version: 2,
            breaker_status: CircuitStatus::Open,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["breakerStatus"], "OPEN");
        assert_eq!(json["version"], 2);
    }
}
