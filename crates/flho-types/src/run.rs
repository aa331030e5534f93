//! Run domain types.
//!
//! A `Run` is one execution of a workflow. It only records the current step;
//! the workflow is looked up again on every transition so the latest policy
//! applies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One execution instance of a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    #[serde(skip)]
    pub id: i64,
    pub unique_id: Uuid,
    /// Storage id of the owning workflow.
    #[serde(skip)]
    pub workflow_id: i64,
    /// External id of the owning workflow.
    pub workflow_unique_id: Uuid,
    /// Index into the workflow's states.
    pub step: u32,
    /// Optimistic concurrency counter, starts at 0.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Why a run moved to a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionCause {
    Start,
    Advance,
}

impl TransitionCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionCause::Start => "start",
            TransitionCause::Advance => "advance",
        }
    }
}

impl std::str::FromStr for TransitionCause {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(TransitionCause::Start),
            "advance" => Ok(TransitionCause::Advance),
            other => Err(format!("unknown transition cause: {other}")),
        }
    }
}

/// History entry appended on every start and advance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunTransition {
    pub run_id: i64,
    /// `None` for the transition that created the run.
    pub from_step: Option<u32>,
    pub to_step: u32,
    pub cause: TransitionCause,
    pub created_at: DateTime<Utc>,
}

/// Observable lifecycle phase of a run. Not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    Active,
    Completed,
}

impl RunPhase {
    /// Phase of a run at `step` in a workflow whose final index is `last_step`.
    pub fn of(step: u32, last_step: u32) -> Self {
        if step >= last_step {
            RunPhase::Completed
        } else {
            RunPhase::Active
        }
    }
}

/// A run together with its derived phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunView {
    #[serde(flatten)]
    pub run: Run,
    pub phase: RunPhase,
}

/// Request to move a run to another step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceRequest {
    pub workflow_id: Uuid,
    pub run_id: Uuid,
    pub step: u32,
    /// Caller's view of the run version. Omitted means "current".
    #[serde(default)]
    pub expected_version: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_is_completed_on_last_step() {
        assert_eq!(RunPhase::of(0, 1), RunPhase::Active);
        assert_eq!(RunPhase::of(1, 1), RunPhase::Completed);
    }

    #[test]
    fn transition_cause_round_trips_text() {
        for cause in [TransitionCause::Start, TransitionCause::Advance] {
            assert_eq!(cause.as_str().parse::<TransitionCause>().unwrap(), cause);
        }
        assert!("retry".parse::<TransitionCause>().is_err());
    }

    #[test]
    fn advance_request_version_is_optional() {
        let req: AdvanceRequest = serde_json::from_value(serde_json::json!({
            "workflowId": Uuid::nil(),
            "runId": Uuid::nil(),
            "step": 1
        }))
        .unwrap();
        assert_eq!(req.expected_version, None);
    }
}
