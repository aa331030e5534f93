//! Workflow definition types.
//!
//! A `Workflow` is an ordered list of named `State`s owned by one identity.
//! The position of a state in `states` is its step index. The state list is
//! fixed at creation; later updates only touch metadata such as `name`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::duration::{option_seconds_text, seconds_text};

/// A workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    /// Internal storage identifier. Never leaves the service.
    #[serde(skip)]
    pub id: i64,
    /// Externally visible identifier.
    pub unique_id: Uuid,
    /// Owning identity (opaque, resolved through the identity mirror).
    pub owner: String,
    pub name: String,
    pub states: Vec<State>,
    /// Breaker protecting this workflow's retry targets. `None` disables it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<CircuitBreakerPolicy>,
    pub active: bool,
    /// Optimistic concurrency counter, starts at 1.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// State at the given step index, if in range.
    pub fn state(&self, step: u32) -> Option<&State> {
        self.states.get(step as usize)
    }

    /// Index of the final state.
    pub fn last_step(&self) -> u32 {
        self.states.len().saturating_sub(1) as u32
    }
}

/// One step of a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    pub name: String,
    /// Whether the state expects a timed external callback.
    #[serde(default)]
    pub retry: bool,
    /// Target invoked when the countdown for this state elapses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_url: Option<String>,
    /// Deadline for the advancing call, encoded as `"N seconds"`.
    #[serde(
        default,
        with = "option_seconds_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub retry_after: Option<Duration>,
}

impl State {
    /// A state with no timed callback.
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            retry: false,
            retry_url: None,
            retry_after: None,
        }
    }

    /// A state that expects a callback within `retry_after`.
    pub fn timed(name: impl Into<String>, retry_url: impl Into<String>, retry_after: Duration) -> Self {
        Self {
            name: name.into(),
            retry: true,
            retry_url: Some(retry_url.into()),
            retry_after: Some(retry_after),
        }
    }

    /// Target and deadline when this state arms a countdown.
    pub fn countdown(&self) -> Option<(&str, Duration)> {
        if !self.retry {
            return None;
        }
        match (&self.retry_url, self.retry_after) {
            (Some(url), Some(after)) if !after.is_zero() => Some((url.as_str(), after)),
            _ => None,
        }
    }
}

/// Circuit breaker parameters for a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerPolicy {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// Cool-down before an open breaker admits a trial.
    #[serde(with = "seconds_text")]
    pub open_timeout: Duration,
    /// Successes required in half-open to close again.
    pub half_open_trial_count: u32,
}

/// Input for creating a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkflowRequest {
    pub name: String,
    pub states: Vec<State>,
    #[serde(default)]
    pub circuit_breaker: Option<CircuitBreakerPolicy>,
}

/// Partial metadata update guarded by the caller's view of `version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWorkflowRequest {
    #[serde(default)]
    pub name: Option<String>,
    pub version: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn state_deserializes_from_wire_shape() {
        let state: State = serde_json::from_value(json!({
            "name": "submitted",
            "retry": true,
            "retryUrl": "http://x/retry",
            "retryAfter": "2 seconds"
        }))
        .unwrap();

        assert_eq!(
            state.countdown(),
            Some(("http://x/retry", Duration::from_secs(2)))
        );
    }

    #[test]
    fn plain_state_has_no_countdown() {
        let state: State = serde_json::from_value(json!({ "name": "done" })).unwrap();
        assert!(!state.retry);
        assert!(state.countdown().is_none());

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json, json!({ "name": "done", "retry": false }));
    }

    #[test]
    fn malformed_retry_after_is_rejected() {
        let result: Result<State, _> = serde_json::from_value(json!({
            "name": "submitted",
            "retry": true,
            "retryUrl": "http://x/retry",
            "retryAfter": "2s"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn breaker_policy_uses_seconds_text() {
        let policy = CircuitBreakerPolicy {
            failure_threshold: 3,
            open_timeout: Duration::from_secs(30),
            half_open_trial_count: 1,
        };
        let json = serde_json::to_value(policy).unwrap();
        assert_eq!(json["openTimeout"], "30 seconds");
        assert_eq!(json["failureThreshold"], 3);
    }

    #[test]
    fn workflow_hides_storage_id() {
        let wf = Workflow {
            id: 42,
            unique_id: Uuid::now_v7(),
            owner: "owner-1".to_string(),
            name: "onboarding".to_string(),
            states: vec![State::plain("a"), State::plain("b")],
            circuit_breaker: None,
            active: true,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_value(&wf).unwrap();
        assert!(json.get("id").is_none());
        assert!(json.get("uniqueId").is_some());
        assert_eq!(wf.last_step(), 1);
        assert!(wf.state(2).is_none());
    }
}
