//! Circuit breaker status types shared between core and event payloads.

use serde::{Deserialize, Serialize};

/// Status of a workflow's circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CircuitStatus {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CircuitStatus::Closed => "CLOSED",
            CircuitStatus::Open => "OPEN",
            CircuitStatus::HalfOpen => "HALFOPEN",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of a breaker's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSnapshot {
    pub status: CircuitStatus,
    pub consecutive_failures: u32,
    pub half_open_successes: u32,
}

impl BreakerSnapshot {
    pub fn closed() -> Self {
        Self {
            status: CircuitStatus::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_without_separator() {
        assert_eq!(
            serde_json::to_string(&CircuitStatus::HalfOpen).unwrap(),
            "\"HALFOPEN\""
        );
        assert_eq!(CircuitStatus::HalfOpen.to_string(), "HALFOPEN");
    }
}
