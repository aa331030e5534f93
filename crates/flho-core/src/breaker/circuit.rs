//! Per-workflow circuit breaker.
//!
//! Tracks consecutive retry failures for one workflow and decides whether a
//! countdown expiry may call the retry target. Uses `tokio::time::Instant`
//! so paused-clock tests drive the open timeout deterministically.

use tokio::time::Instant;

use flho_types::breaker::{BreakerSnapshot, CircuitStatus};
use flho_types::workflow::CircuitBreakerPolicy;

/// Internal state. Status changes only through the methods below.
#[derive(Debug, Clone)]
enum CircuitState {
    Closed,
    /// Rejecting attempts until `policy.open_timeout` has passed.
    Open { opened_at: Instant },
    /// Trial in progress; counts successes toward closing.
    HalfOpen { successes: u32 },
}

/// A status change caused by one breaker call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: CircuitStatus,
    pub to: CircuitStatus,
}

/// Result of [`CircuitBreaker::allow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    /// Set when this call moved the breaker from OPEN to HALFOPEN.
    pub transition: Option<Transition>,
}

impl Admission {
    /// The call that admitted the first half-open trial.
    pub fn is_probe(&self) -> bool {
        matches!(
            self.transition,
            Some(Transition {
                to: CircuitStatus::HalfOpen,
                ..
            })
        )
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    policy: CircuitBreakerPolicy,
    state: CircuitState,
    consecutive_failures: u32,
}

impl CircuitBreaker {
    pub fn new(policy: CircuitBreakerPolicy) -> Self {
        Self {
            policy,
            state: CircuitState::Closed,
            consecutive_failures: 0,
        }
    }

    pub fn policy(&self) -> &CircuitBreakerPolicy {
        &self.policy
    }

    /// Replace the parameters without touching the current state.
    pub fn set_policy(&mut self, policy: CircuitBreakerPolicy) {
        self.policy = policy;
    }

    pub fn status(&self) -> CircuitStatus {
        match self.state {
            CircuitState::Closed => CircuitStatus::Closed,
            CircuitState::Open { .. } => CircuitStatus::Open,
            CircuitState::HalfOpen { .. } => CircuitStatus::HalfOpen,
        }
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            status: self.status(),
            consecutive_failures: self.consecutive_failures,
            half_open_successes: match self.state {
                CircuitState::HalfOpen { successes } => successes,
                _ => 0,
            },
        }
    }

    /// Whether an attempt may proceed.
    ///
    /// An open breaker whose timeout has elapsed moves to half-open and
    /// admits the attempt.
    pub fn allow(&mut self) -> Admission {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen { .. } => Admission {
                allowed: true,
                transition: None,
            },
            CircuitState::Open { opened_at } => {
                if opened_at.elapsed() < self.policy.open_timeout {
                    return Admission {
                        allowed: false,
                        transition: None,
                    };
                }
                self.state = CircuitState::HalfOpen { successes: 0 };
                self.consecutive_failures = 0;
                Admission {
                    allowed: true,
                    transition: Some(Transition {
                        from: CircuitStatus::Open,
                        to: CircuitStatus::HalfOpen,
                    }),
                }
            }
        }
    }

    pub fn record_failure(&mut self) -> Option<Transition> {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        match self.state {
            CircuitState::Closed => {
                if self.consecutive_failures >= self.policy.failure_threshold {
                    self.state = CircuitState::Open {
                        opened_at: Instant::now(),
                    };
                    return Some(Transition {
                        from: CircuitStatus::Closed,
                        to: CircuitStatus::Open,
                    });
                }
                None
            }
            // One strike during a trial reopens.
            CircuitState::HalfOpen { .. } => {
                self.state = CircuitState::Open {
                    opened_at: Instant::now(),
                };
                Some(Transition {
                    from: CircuitStatus::HalfOpen,
                    to: CircuitStatus::Open,
                })
            }
            CircuitState::Open { .. } => None,
        }
    }

    pub fn record_success(&mut self) -> Option<Transition> {
        self.consecutive_failures = 0;

        if let CircuitState::HalfOpen { successes } = self.state {
            let successes = successes + 1;
            if successes >= self.policy.half_open_trial_count {
                self.state = CircuitState::Closed;
                return Some(Transition {
                    from: CircuitStatus::HalfOpen,
                    to: CircuitStatus::Closed,
                });
            }
            self.state = CircuitState::HalfOpen { successes };
        }
        None
    }
}
