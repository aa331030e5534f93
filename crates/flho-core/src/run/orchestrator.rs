//! Run orchestration engine.
//!
//! Starts runs, advances them step by step and owns the per-run countdowns.
//! A state with `retry = true` arms a countdown of `retry_after` whenever a
//! run enters it. Exactly one of two things then happens:
//!
//! - the run is advanced before the countdown elapses: the countdown is
//!   cancelled and the workflow's breaker records a success;
//! - the countdown elapses first: the retry handler consults the breaker,
//!   calls the state's retry target if admitted, records the missed window
//!   as a failure and re-arms.
//!
//! Persisted run updates are serialized by version compare-and-swap in the
//! run store, never by an in-process lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use flho_types::breaker::CircuitStatus;
use flho_types::error::FlowError;
use flho_types::event::{
    CircuitTransitionEvent, EventAction, RetryEvent, RunEvent, entity,
};
use flho_types::run::{AdvanceRequest, Run, RunPhase, RunTransition, RunView};
use flho_types::workflow::{State, Workflow};

use crate::breaker::{BreakerRegistry, Transition};
use crate::event::EventBus;
use crate::repository::run::RunRepository;
use crate::repository::workflow::WorkflowRepository;
use crate::worker::WorkerPool;

use super::countdown::{CountdownRegistry, Expired};
use super::retry::{BoxRetryInvoker, RetryPayload, RetryRequest};

struct Shared<W, R> {
    workflows: W,
    runs: R,
    countdowns: CountdownRegistry,
    breakers: BreakerRegistry,
    invoker: BoxRetryInvoker,
    pool: WorkerPool,
    bus: EventBus,
}

/// Cheaply cloneable handle to the orchestration engine.
pub struct RunOrchestrator<W, R> {
    shared: Arc<Shared<W, R>>,
}

impl<W, R> Clone for RunOrchestrator<W, R> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<W, R> RunOrchestrator<W, R>
where
    W: WorkflowRepository + 'static,
    R: RunRepository + 'static,
{
    pub fn new(
        workflows: W,
        runs: R,
        breakers: BreakerRegistry,
        invoker: BoxRetryInvoker,
        pool: WorkerPool,
        bus: EventBus,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                workflows,
                runs,
                countdowns: CountdownRegistry::new(),
                breakers,
                invoker,
                pool,
                bus,
            }),
        }
    }

    pub fn countdowns(&self) -> &CountdownRegistry {
        &self.shared.countdowns
    }

    pub fn breakers(&self) -> &BreakerRegistry {
        &self.shared.breakers
    }

    /// Start a run of an active workflow at `start_step`.
    pub async fn start_run(&self, workflow_id: &Uuid, start_step: u32) -> Result<Uuid, FlowError> {
        let workflow = self.load_workflow(workflow_id).await?;
        if !workflow.active {
            return Err(FlowError::NotFound("workflow"));
        }
        let state = step_state(&workflow, start_step)?;

        let now = Utc::now();
        let run = Run {
            id: 0,
            unique_id: Uuid::now_v7(),
            workflow_id: workflow.id,
            workflow_unique_id: workflow.unique_id,
            step: start_step,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        let run = self
            .shared
            .runs
            .create(&run)
            .await
            .map_err(|e| FlowError::from_repository("run", e))?;

        if let Some((_, after)) = state.countdown() {
            self.arm(run.unique_id, run.version, after);
        }

        tracing::info!(run_id = %run.unique_id, workflow_id = %workflow.unique_id, step = run.step, "run started");
        self.publish_run(EventAction::Create, &run).await;
        Ok(run.unique_id)
    }

    /// Move a run to `request.step`.
    ///
    /// The version-checked write happens first. Only when it succeeds is
    /// the old countdown cancelled, the breaker credited and the next
    /// countdown armed, so a conflicting call leaves everything untouched.
    pub async fn advance_run(&self, request: &AdvanceRequest) -> Result<Run, FlowError> {
        let workflow = self.load_workflow(&request.workflow_id).await?;
        let run = self.load_run(&request.run_id).await?;
        if run.workflow_unique_id != workflow.unique_id {
            return Err(FlowError::NotFound("run"));
        }
        let state = step_state(&workflow, request.step)?;

        let expected = request.expected_version.unwrap_or(run.version);
        if expected != run.version {
            tracing::debug!(run_id = %run.unique_id, expected, stored = run.version, "advance rejected on stale version");
            return Err(FlowError::EditConflict);
        }

        let updated = self
            .shared
            .runs
            .update_step(&run.unique_id, expected, request.step)
            .await
            .map_err(|e| FlowError::from_repository("run", e))?;

        // The callback arrived in time.
        if self
            .shared
            .countdowns
            .cancel_before(&updated.unique_id, updated.version)
        {
            let recorded = self
                .shared
                .breakers
                .record_success(workflow.unique_id, workflow.circuit_breaker.as_ref());
            if let Some(transition) = recorded.transition {
                self.publish_transition(workflow.unique_id, transition).await;
            }
        }

        if let Some((_, after)) = state.countdown() {
            self.arm(updated.unique_id, updated.version, after);
        }

        tracing::info!(
            run_id = %updated.unique_id,
            from = run.step,
            to = updated.step,
            version = updated.version,
            "run advanced"
        );
        self.publish_run(EventAction::Update, &updated).await;
        Ok(updated)
    }

    /// A run with its observable phase.
    pub async fn get_run(&self, run_id: &Uuid) -> Result<RunView, FlowError> {
        let run = self.load_run(run_id).await?;
        let workflow = self.load_workflow(&run.workflow_unique_id).await?;
        let phase = RunPhase::of(run.step, workflow.last_step());
        Ok(RunView { run, phase })
    }

    pub async fn run_history(&self, run_id: &Uuid) -> Result<Vec<RunTransition>, FlowError> {
        self.load_run(run_id).await?;
        self.shared
            .runs
            .history(run_id)
            .await
            .map_err(|e| FlowError::from_repository("run", e))
    }

    /// Re-arm countdowns for persisted runs sitting in a retry state.
    ///
    /// Covers runs this process has no countdown for, including runs that
    /// another process started or advanced. The remaining time is
    /// `retry_after` minus the time since the run last moved, clamped at
    /// zero. Returns how many countdowns were armed.
    pub async fn recover_stalled_runs(&self) -> Result<usize, FlowError> {
        let runs = self
            .shared
            .runs
            .list()
            .await
            .map_err(|e| FlowError::from_repository("run", e))?;

        let mut workflows: HashMap<Uuid, Option<Workflow>> = HashMap::new();
        let mut armed = 0;

        for run in runs {
            if !workflows.contains_key(&run.workflow_unique_id) {
                let workflow = self
                    .shared
                    .workflows
                    .get(&run.workflow_unique_id)
                    .await
                    .map_err(|e| FlowError::from_repository("workflow", e))?;
                workflows.insert(run.workflow_unique_id, workflow);
            }
            let Some(Some(workflow)) = workflows.get(&run.workflow_unique_id) else {
                continue;
            };
            if self.resume(&run, workflow) {
                armed += 1;
            }
        }

        if armed > 0 {
            tracing::info!(recovered = armed, "stalled runs recovered");
        } else {
            tracing::debug!("no stalled runs");
        }
        Ok(armed)
    }

    /// Call [`recover_stalled_runs`](Self::recover_stalled_runs) every
    /// `interval` until `cancel` fires. Errors are logged and the next
    /// sweep runs as usual.
    pub async fn sweep(self, interval: Duration, cancel: CancellationToken) {
        tracing::info!(interval_secs = interval.as_secs(), "run sweep started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.recover_stalled_runs().await {
                        tracing::warn!(error = %e, "run sweep failed");
                    }
                }
            }
        }
        tracing::info!("run sweep stopped");
    }

    /// Cancel all countdowns, then drain in-flight retry invocations.
    pub async fn shutdown(&self) {
        self.shared.countdowns.shutdown().await;
        self.shared.pool.shutdown().await;
    }

    /// Arm the countdown of the run's current state for whatever is left of
    /// it, unless a countdown for this run version (or a newer one) is
    /// already tracked.
    fn resume(&self, run: &Run, workflow: &Workflow) -> bool {
        let Some((_, after)) = workflow.state(run.step).and_then(State::countdown) else {
            return false;
        };
        if self
            .shared
            .countdowns
            .armed_version(&run.unique_id)
            .is_some_and(|armed| armed >= run.version)
        {
            return false;
        }

        let elapsed = (Utc::now() - run.updated_at).to_std().unwrap_or(Duration::ZERO);
        let remaining = after.saturating_sub(elapsed);
        let armed = self.arm(run.unique_id, run.version, remaining);
        if armed {
            tracing::debug!(
                run_id = %run.unique_id,
                version = run.version,
                remaining_secs = remaining.as_secs(),
                "countdown resumed from stored run"
            );
        }
        armed
    }

    fn arm(&self, run_id: Uuid, version: i64, after: Duration) -> bool {
        let this = self.clone();
        self.shared
            .countdowns
            .arm(run_id, version, after, move |expired| async move {
                this.handle_expiry(expired).await;
            })
    }

    /// Retry handler: runs when a countdown elapses without an advance.
    async fn handle_expiry(&self, expired: Expired) {
        let run = match self.shared.runs.get(&expired.run_id).await {
            Ok(Some(run)) => run,
            Ok(None) => {
                tracing::debug!(run_id = %expired.run_id, "run no longer exists, countdown dropped");
                return;
            }
            Err(e) => {
                tracing::error!(run_id = %expired.run_id, error = %e, "failed to load run for expired countdown");
                return;
            }
        };
        let workflow = match self.shared.workflows.get(&run.workflow_unique_id).await {
            Ok(Some(workflow)) => workflow,
            Ok(None) => {
                tracing::debug!(run_id = %run.unique_id, "workflow no longer exists, countdown dropped");
                return;
            }
            Err(e) => {
                tracing::error!(run_id = %run.unique_id, error = %e, "failed to load workflow for expired countdown");
                return;
            }
        };
        if run.version != expired.armed_version {
            // The run moved on while this countdown was pending. If another
            // process moved it, nothing here has timed its new state yet.
            tracing::debug!(
                run_id = %run.unique_id,
                armed_version = expired.armed_version,
                version = run.version,
                "countdown outlived its run version"
            );
            if run.version > expired.armed_version {
                self.resume(&run, &workflow);
            }
            return;
        }

        let Some((url, after)) = workflow.state(run.step).and_then(State::countdown) else {
            return;
        };
        let policy = workflow.circuit_breaker.as_ref();

        let admission = self.shared.breakers.allow(workflow.unique_id, policy);
        if let Some(transition) = admission.transition {
            self.publish_transition(workflow.unique_id, transition).await;
        }

        if !admission.allowed {
            tracing::info!(run_id = %run.unique_id, workflow_id = %workflow.unique_id, step = run.step, "retry suppressed by open circuit");
            self.arm(run.unique_id, run.version, after);
            self.publish_retry(EventAction::RetrySuppressed, &run, CircuitStatus::Open)
                .await;
            return;
        }

        self.dispatch_retry(url, &run);

        // A probe's verdict is the next window; any other admitted expiry is
        // a missed callback.
        let (status, next) = if admission.is_probe() {
            (CircuitStatus::HalfOpen, after)
        } else {
            let recorded = self.shared.breakers.record_failure(workflow.unique_id, policy);
            if let Some(transition) = recorded.transition {
                self.publish_transition(workflow.unique_id, transition).await;
            }
            let next = match (recorded.status, policy) {
                (CircuitStatus::Open, Some(policy)) => policy.open_timeout,
                _ => after,
            };
            (recorded.status, next)
        };

        self.arm(run.unique_id, run.version, next);
        tracing::info!(
            run_id = %run.unique_id,
            step = run.step,
            breaker = %status,
            next_check_secs = next.as_secs(),
            "retry attempted"
        );
        self.publish_retry(EventAction::RetryAttempted, &run, status).await;
    }

    /// Queue the retry target call on the worker pool. Its outcome is only
    /// logged.
    fn dispatch_retry(&self, url: &str, run: &Run) {
        let request = RetryRequest {
            url: url.to_string(),
            payload: RetryPayload {
                run_unique_id: run.unique_id,
                step: run.step,
                workflow_id: run.workflow_unique_id,
            },
        };
        let invoker = self.shared.invoker.clone();
        let run_id = run.unique_id;

        let queued = self.shared.pool.submit(async move {
            match invoker.invoke(&request).await {
                Ok(()) => tracing::debug!(run_id = %run_id, url = %request.url, "retry target invoked"),
                Err(e) => tracing::warn!(run_id = %run_id, url = %request.url, error = %e, "retry target invocation failed"),
            }
        });
        if let Err(e) = queued {
            tracing::warn!(run_id = %run_id, error = %e, "retry invocation not queued");
        }
    }

    async fn load_workflow(&self, id: &Uuid) -> Result<Workflow, FlowError> {
        self.shared
            .workflows
            .get(id)
            .await
            .map_err(|e| FlowError::from_repository("workflow", e))?
            .ok_or(FlowError::NotFound("workflow"))
    }

    async fn load_run(&self, id: &Uuid) -> Result<Run, FlowError> {
        self.shared
            .runs
            .get(id)
            .await
            .map_err(|e| FlowError::from_repository("run", e))?
            .ok_or(FlowError::NotFound("run"))
    }

    async fn publish_run(&self, action: EventAction, run: &Run) {
        let event = RunEvent {
            run_unique_id: run.unique_id,
            workflow_id: run.workflow_unique_id,
            step: run.step,
            version: run.version,
        };
        self.shared.bus.publish(entity::RUN, action, &event).await;
    }

    async fn publish_retry(&self, action: EventAction, run: &Run, status: CircuitStatus) {
        let event = RetryEvent {
            run_unique_id: run.unique_id,
            workflow_id: run.workflow_unique_id,
            step: run.step,
            version: run.version,
            breaker_status: status,
        };
        self.shared.bus.publish(entity::RUN, action, &event).await;
    }

    async fn publish_transition(&self, workflow_id: Uuid, transition: Transition) {
        let event = CircuitTransitionEvent {
            workflow_id,
            from: transition.from,
            to: transition.to,
        };
        self.shared
            .bus
            .publish(entity::WORKFLOW, EventAction::CircuitTransition, &event)
            .await;
    }
}

fn step_state(workflow: &Workflow, step: u32) -> Result<&State, FlowError> {
    workflow.state(step).ok_or_else(|| {
        FlowError::InvalidArgument(format!(
            "step {step} is out of range for a workflow with {} states",
            workflow.states.len()
        ))
    })
}
