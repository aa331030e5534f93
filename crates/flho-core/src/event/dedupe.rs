//! Idempotent-consumer guard.
//!
//! The bus delivers at most once but partners may re-publish. Consumers
//! remember the highest version applied per entity id and skip anything at
//! or below it.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

#[derive(Debug, Clone, Default)]
pub struct Deduplicator {
    applied: Arc<DashMap<String, i64>>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `(entity_id, version)` and return `true` if it is newer than
    /// anything seen for that entity.
    pub fn first_sighting(&self, entity_id: &str, version: i64) -> bool {
        match self.applied.entry(entity_id.to_string()) {
            Entry::Occupied(mut seen) => {
                if version <= *seen.get() {
                    tracing::debug!(entity_id = %entity_id, version, "duplicate or stale event skipped");
                    return false;
                }
                seen.insert(version);
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(version);
                true
            }
        }
    }

    /// Forget an entity, e.g. after the consumer failed to apply it.
    pub fn forget(&self, entity_id: &str) {
        self.applied.remove(entity_id);
    }

    pub fn len(&self) -> usize {
        self.applied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use flho_types::event::{Delivery, RunEvent};
    use uuid::Uuid;

    /// A consumer that keeps each run's latest step and counts applications.
    #[derive(Default)]
    struct RunProjection {
        dedupe: Deduplicator,
        steps: Mutex<BTreeMap<Uuid, u32>>,
        applied: Mutex<usize>,
    }

    impl RunProjection {
        fn consume(&self, delivery: &Delivery) {
            let event: RunEvent = serde_json::from_slice(&delivery.body).unwrap();
            if !self
                .dedupe
                .first_sighting(&event.run_unique_id.to_string(), event.version)
            {
                return;
            }
            self.steps.lock().unwrap().insert(event.run_unique_id, event.step);
            *self.applied.lock().unwrap() += 1;
        }
    }

    fn run_update(run: Uuid, step: u32, version: i64) -> Delivery {
        let body = serde_json::to_vec(&RunEvent {
            run_unique_id: run,
            workflow_id: Uuid::nil(),
            step,
            version,
        })
        .unwrap();
        Delivery {
            exchange: "workflow_service_exchange".into(),
            routing_key: "workflow_service_exchange.run.update".into(),
            headers: BTreeMap::new(),
            body,
        }
    }

    #[test]
    fn same_run_update_twice_applies_once() {
        let consumer = RunProjection::default();
        let run = Uuid::now_v7();
        let event = run_update(run, 1, 1);

        consumer.consume(&event);
        consumer.consume(&event);

        assert_eq!(*consumer.applied.lock().unwrap(), 1);
        assert_eq!(consumer.steps.lock().unwrap().get(&run), Some(&1));
    }

    #[test]
    fn stale_version_after_newer_is_skipped() {
        let consumer = RunProjection::default();
        let run = Uuid::now_v7();

        consumer.consume(&run_update(run, 2, 2));
        consumer.consume(&run_update(run, 1, 1));

        assert_eq!(consumer.steps.lock().unwrap().get(&run), Some(&2));
        assert_eq!(*consumer.applied.lock().unwrap(), 1);
    }

    #[test]
    fn entities_are_tracked_independently() {
        let dedupe = Deduplicator::new();
        assert!(dedupe.first_sighting("a", 1));
        assert!(dedupe.first_sighting("b", 1));
        assert!(!dedupe.first_sighting("a", 1));
        assert!(dedupe.first_sighting("a", 2));

        dedupe.forget("a");
        assert!(dedupe.first_sighting("a", 1));
        assert_eq!(dedupe.len(), 2);
    }
}
