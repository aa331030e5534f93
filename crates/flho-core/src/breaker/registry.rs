//! Breakers for all workflows, keyed by workflow external id.
//!
//! Entries are created lazily from the workflow's current policy the first
//! time a run of that workflow touches the breaker. Workflows without a
//! policy always admit attempts and never change status.

use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use flho_types::breaker::{BreakerSnapshot, CircuitStatus};
use flho_types::workflow::CircuitBreakerPolicy;

use super::circuit::{Admission, CircuitBreaker, Transition};

/// Outcome of recording a result against a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recorded {
    pub status: CircuitStatus,
    pub transition: Option<Transition>,
}

#[derive(Debug, Clone, Default)]
pub struct BreakerRegistry {
    breakers: Arc<DashMap<Uuid, CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(&self, workflow_id: Uuid, policy: Option<&CircuitBreakerPolicy>) -> Admission {
        let Some(policy) = policy else {
            return Admission {
                allowed: true,
                transition: None,
            };
        };
        let admission = self.with_breaker(workflow_id, policy, CircuitBreaker::allow);
        if let Some(t) = admission.transition {
            tracing::info!(workflow_id = %workflow_id, from = %t.from, to = %t.to, "circuit breaker transition");
        }
        admission
    }

    pub fn record_failure(
        &self,
        workflow_id: Uuid,
        policy: Option<&CircuitBreakerPolicy>,
    ) -> Recorded {
        self.record(workflow_id, policy, CircuitBreaker::record_failure)
    }

    pub fn record_success(
        &self,
        workflow_id: Uuid,
        policy: Option<&CircuitBreakerPolicy>,
    ) -> Recorded {
        self.record(workflow_id, policy, CircuitBreaker::record_success)
    }

    /// Current counters, or a closed snapshot when no breaker exists yet.
    pub fn snapshot(&self, workflow_id: &Uuid) -> BreakerSnapshot {
        self.breakers
            .get(workflow_id)
            .map(|b| b.snapshot())
            .unwrap_or_else(BreakerSnapshot::closed)
    }

    pub fn status(&self, workflow_id: &Uuid) -> CircuitStatus {
        self.snapshot(workflow_id).status
    }

    /// Drop the breaker of a deleted workflow.
    pub fn forget(&self, workflow_id: &Uuid) {
        self.breakers.remove(workflow_id);
    }

    fn record(
        &self,
        workflow_id: Uuid,
        policy: Option<&CircuitBreakerPolicy>,
        op: fn(&mut CircuitBreaker) -> Option<Transition>,
    ) -> Recorded {
        let Some(policy) = policy else {
            return Recorded {
                status: CircuitStatus::Closed,
                transition: None,
            };
        };
        let (status, transition) = self.with_breaker(workflow_id, policy, |breaker| {
            let transition = op(breaker);
            (breaker.status(), transition)
        });
        if let Some(t) = transition {
            tracing::info!(workflow_id = %workflow_id, from = %t.from, to = %t.to, "circuit breaker transition");
        }
        Recorded { status, transition }
    }

    fn with_breaker<T>(
        &self,
        workflow_id: Uuid,
        policy: &CircuitBreakerPolicy,
        f: impl FnOnce(&mut CircuitBreaker) -> T,
    ) -> T {
        let mut entry = self
            .breakers
            .entry(workflow_id)
            .or_insert_with(|| CircuitBreaker::new(*policy));
        if entry.policy() != policy {
            entry.set_policy(*policy);
        }
        f(entry.value_mut())
    }
}
