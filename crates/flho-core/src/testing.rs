//! In-memory test doubles for the core ports.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use flho_types::error::{FlowError, RepositoryError};
use flho_types::event::Delivery;
use flho_types::identity::IdentityRecord;
use flho_types::page::{Filters, SortDirection};
use flho_types::run::{Run, RunTransition, TransitionCause};
use flho_types::workflow::Workflow;

use crate::event::{BoxBroker, Broker, BrokerError, EventBus};
use crate::repository::identity::IdentityRepository;
use crate::repository::run::RunRepository;
use crate::repository::workflow::WorkflowRepository;
use crate::run::retry::{RetryInvoker, RetryRequest};

pub const TEST_EXCHANGE: &str = "workflow_service_exchange";

pub fn test_bus(broker: &RecordingBroker) -> EventBus {
    EventBus::new(
        BoxBroker::new(broker.clone()),
        TEST_EXCHANGE,
        Duration::from_secs(5),
    )
}

// ---------------------------------------------------------------------------
// Workflows
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MockWorkflows {
    rows: Arc<Mutex<Vec<Workflow>>>,
}

impl MockWorkflows {
    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    /// Store `workflow` as-is, assigning a storage id.
    pub fn put(&self, mut workflow: Workflow) -> Workflow {
        let mut rows = self.rows.lock().unwrap();
        workflow.id = rows.len() as i64 + 1;
        rows.push(workflow.clone());
        workflow
    }
}

impl WorkflowRepository for MockWorkflows {
    async fn insert(&self, workflow: &Workflow) -> Result<Workflow, RepositoryError> {
        Ok(self.put(workflow.clone()))
    }

    async fn get(&self, unique_id: &Uuid) -> Result<Option<Workflow>, RepositoryError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().find(|w| w.unique_id == *unique_id).cloned())
    }

    async fn update(&self, workflow: &Workflow) -> Result<Workflow, RepositoryError> {
        let mut rows = self.rows.lock().unwrap();
        let stored = rows
            .iter_mut()
            .find(|w| w.unique_id == workflow.unique_id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.version != workflow.version {
            return Err(RepositoryError::Conflict(format!(
                "workflow {} is at version {}",
                stored.unique_id, stored.version
            )));
        }
        stored.name = workflow.name.clone();
        stored.active = workflow.active;
        stored.version += 1;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn delete(&self, unique_id: &Uuid) -> Result<bool, RepositoryError> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|w| w.unique_id != *unique_id);
        Ok(rows.len() != before)
    }

    async fn list_by_owner(
        &self,
        owner: &str,
        filters: &Filters,
    ) -> Result<(Vec<Workflow>, u64), RepositoryError> {
        let rows = self.rows.lock().unwrap();
        let mut owned: Vec<Workflow> = rows.iter().filter(|w| w.owner == owner).cloned().collect();
        match filters.sort_column() {
            "name" => owned.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id))),
            _ => owned.sort_by_key(|w| w.id),
        }
        if filters.sort_direction() == SortDirection::Desc {
            owned.reverse();
        }
        let total = owned.len() as u64;
        let page = owned
            .into_iter()
            .skip(filters.offset() as usize)
            .take(filters.limit() as usize)
            .collect();
        Ok((page, total))
    }
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RunRows {
    runs: Vec<Run>,
    transitions: Vec<RunTransition>,
}

#[derive(Clone, Default)]
pub struct MockRuns {
    rows: Arc<Mutex<RunRows>>,
}

impl MockRuns {
    /// Store a run directly, bypassing the start transition.
    pub fn put(&self, mut run: Run) -> Run {
        let mut rows = self.rows.lock().unwrap();
        run.id = rows.runs.len() as i64 + 1;
        rows.runs.push(run.clone());
        run
    }

    pub fn stored(&self, unique_id: &Uuid) -> Option<Run> {
        let rows = self.rows.lock().unwrap();
        rows.runs.iter().find(|r| r.unique_id == *unique_id).cloned()
    }
}

impl RunRepository for MockRuns {
    async fn create(&self, run: &Run) -> Result<Run, RepositoryError> {
        let run = self.put(run.clone());
        self.rows.lock().unwrap().transitions.push(RunTransition {
            run_id: run.id,
            from_step: None,
            to_step: run.step,
            cause: TransitionCause::Start,
            created_at: run.created_at,
        });
        Ok(run)
    }

    async fn get(&self, unique_id: &Uuid) -> Result<Option<Run>, RepositoryError> {
        Ok(self.stored(unique_id))
    }

    async fn update_step(
        &self,
        unique_id: &Uuid,
        expected_version: i64,
        step: u32,
    ) -> Result<Run, RepositoryError> {
        let mut rows = self.rows.lock().unwrap();
        let run = rows
            .runs
            .iter_mut()
            .find(|r| r.unique_id == *unique_id)
            .ok_or(RepositoryError::NotFound)?;
        if run.version != expected_version {
            return Err(RepositoryError::Conflict(format!(
                "run {} is at version {}",
                run.unique_id, run.version
            )));
        }
        let from = run.step;
        run.step = step;
        run.version += 1;
        run.updated_at = Utc::now();
        let updated = run.clone();
        rows.transitions.push(RunTransition {
            run_id: updated.id,
            from_step: Some(from),
            to_step: step,
            cause: TransitionCause::Advance,
            created_at: updated.updated_at,
        });
        Ok(updated)
    }

    async fn list(&self) -> Result<Vec<Run>, RepositoryError> {
        Ok(self.rows.lock().unwrap().runs.clone())
    }

    async fn history(&self, unique_id: &Uuid) -> Result<Vec<RunTransition>, RepositoryError> {
        let rows = self.rows.lock().unwrap();
        let Some(run) = rows.runs.iter().find(|r| r.unique_id == *unique_id) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .transitions
            .iter()
            .filter(|t| t.run_id == run.id)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MockIdentities {
    rows: Arc<Mutex<HashMap<String, IdentityRecord>>>,
}

impl MockIdentities {
    pub fn seed(&self, uuid: &str, active: bool) {
        self.rows.lock().unwrap().insert(
            uuid.to_string(),
            IdentityRecord {
                uuid: uuid.to_string(),
                version: 1,
                active,
                updated_at: Utc::now(),
            },
        );
    }

    pub fn stored(&self, uuid: &str) -> Option<IdentityRecord> {
        self.rows.lock().unwrap().get(uuid).cloned()
    }
}

impl IdentityRepository for MockIdentities {
    async fn get(&self, uuid: &str) -> Result<Option<IdentityRecord>, RepositoryError> {
        Ok(self.stored(uuid))
    }

    async fn apply_if_newer(&self, record: &IdentityRecord) -> Result<bool, RepositoryError> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get(&record.uuid) {
            Some(existing) if existing.version >= record.version => Ok(false),
            _ => {
                rows.insert(record.uuid.clone(), record.clone());
                Ok(true)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Broker
// ---------------------------------------------------------------------------

/// Records every published delivery. Does not route.
#[derive(Clone, Default)]
pub struct RecordingBroker {
    published: Arc<Mutex<Vec<Delivery>>>,
    fail: Arc<AtomicBool>,
    delay: Arc<Mutex<Option<Duration>>>,
}

impl RecordingBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_publishes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn delay_publishes(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn published(&self) -> Vec<Delivery> {
        self.published.lock().unwrap().clone()
    }

    pub fn routing_keys(&self) -> Vec<String> {
        self.published().into_iter().map(|d| d.routing_key).collect()
    }

    /// Bodies of deliveries whose routing key ends with `.<entity>.<action>`.
    pub fn bodies<T: serde::de::DeserializeOwned>(&self, entity_action: &str) -> Vec<T> {
        let suffix = format!(".{entity_action}");
        self.published()
            .into_iter()
            .filter(|d| d.routing_key.ends_with(&suffix))
            .map(|d| serde_json::from_slice(&d.body).unwrap())
            .collect()
    }
}

impl Broker for RecordingBroker {
    async fn declare_exchange(&self, _name: &str) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn declare_queue(&self, _name: &str) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn bind_queue(
        &self,
        _queue: &str,
        _exchange: &str,
        _pattern: &str,
    ) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn publish(&self, delivery: Delivery) -> Result<(), BrokerError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(BrokerError::Closed);
        }
        self.published.lock().unwrap().push(delivery);
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<mpsc::Receiver<Delivery>, BrokerError> {
        Err(BrokerError::UnknownQueue(queue.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Retry invoker
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct RecordingInvoker {
    calls: Arc<Mutex<Vec<RetryRequest>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let invoker = Self::default();
        invoker.fail.store(true, Ordering::SeqCst);
        invoker
    }

    pub fn calls(&self) -> Vec<RetryRequest> {
        self.calls.lock().unwrap().clone()
    }
}

impl RetryInvoker for RecordingInvoker {
    async fn invoke(&self, request: &RetryRequest) -> Result<(), FlowError> {
        self.calls.lock().unwrap().push(request.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(FlowError::TransportFailure(format!(
                "{} answered 503",
                request.url
            )));
        }
        Ok(())
    }
}
