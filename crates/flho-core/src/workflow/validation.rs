//! Workflow definition validation.
//!
//! Collects every problem into a field map rather than stopping at the
//! first, so callers can report all of them at once.

use std::collections::HashSet;

use url::Url;

use flho_types::error::{FieldErrors, FlowError};
use flho_types::workflow::{CircuitBreakerPolicy, State};

pub const MAX_NAME_BYTES: usize = 500;
pub const MIN_STATES: usize = 2;

pub fn validate_name(name: &str, errors: &mut FieldErrors) {
    if name.trim().is_empty() {
        errors.insert("name".into(), "must be provided".into());
    } else if name.len() > MAX_NAME_BYTES {
        errors.insert("name".into(), "must not be more than 500 bytes long".into());
    }
}

pub fn validate_states(states: &[State], errors: &mut FieldErrors) {
    if states.len() < MIN_STATES {
        errors.insert("states".into(), "must have at least 2 values".into());
    }

    let mut seen = HashSet::new();
    for (i, state) in states.iter().enumerate() {
        let name = state.name.trim();
        if name.is_empty() {
            errors.insert(format!("states[{i}].name"), "must be provided".into());
        } else if !seen.insert(name) {
            errors.insert(format!("states[{i}].name"), "must be unique".into());
        }

        if !state.retry {
            continue;
        }
        match state.retry_url.as_deref() {
            None | Some("") => {
                errors.insert(
                    format!("states[{i}].retryUrl"),
                    "must be provided when retry is enabled".into(),
                );
            }
            Some(url) if !is_http_url(url) => {
                errors.insert(format!("states[{i}].retryUrl"), "must be an http(s) url".into());
            }
            Some(_) => {}
        }
        match state.retry_after {
            Some(after) if !after.is_zero() => {}
            _ => {
                errors.insert(
                    format!("states[{i}].retryAfter"),
                    "must be a positive duration when retry is enabled".into(),
                );
            }
        }
    }
}

pub fn validate_breaker(policy: &CircuitBreakerPolicy, errors: &mut FieldErrors) {
    if policy.failure_threshold == 0 {
        errors.insert(
            "circuitBreaker.failureThreshold".into(),
            "must be greater than zero".into(),
        );
    }
    if policy.open_timeout.is_zero() {
        errors.insert(
            "circuitBreaker.openTimeout".into(),
            "must be a positive duration".into(),
        );
    }
    if policy.half_open_trial_count == 0 {
        errors.insert(
            "circuitBreaker.halfOpenTrialCount".into(),
            "must be greater than zero".into(),
        );
    }
}

/// Validate a full definition.
pub fn validate_definition(
    name: &str,
    states: &[State],
    breaker: Option<&CircuitBreakerPolicy>,
) -> Result<(), FlowError> {
    let mut errors = FieldErrors::new();
    validate_name(name, &mut errors);
    validate_states(states, &mut errors);
    if let Some(policy) = breaker {
        validate_breaker(policy, &mut errors);
    }
    into_result(errors)
}

pub fn into_result(errors: FieldErrors) -> Result<(), FlowError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(FlowError::validation(errors))
    }
}

/// Parses as an absolute URL with an `http` or `https` scheme and a host.
fn is_http_url(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use flho_types::error::ErrorKind;

    fn two_states() -> Vec<State> {
        vec![
            State::timed("submitted", "http://x/retry", Duration::from_secs(2)),
            State::plain("done"),
        ]
    }

    fn fields(result: Result<(), FlowError>) -> FieldErrors {
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
        err.fields().cloned().unwrap_or_default()
    }

    #[test]
    fn accepts_valid_definition() {
        assert!(validate_definition("onboarding", &two_states(), None).is_ok());
    }

    #[test]
    fn requires_two_states() {
        let errors = fields(validate_definition("x", &[State::plain("only")], None));
        assert_eq!(errors.get("states").map(String::as_str), Some("must have at least 2 values"));
    }

    #[test]
    fn rejects_duplicate_and_empty_state_names() {
        let states = vec![State::plain("a"), State::plain("a"), State::plain(" ")];
        let errors = fields(validate_definition("x", &states, None));
        assert_eq!(errors.get("states[1].name").map(String::as_str), Some("must be unique"));
        assert_eq!(errors.get("states[2].name").map(String::as_str), Some("must be provided"));
        assert!(!errors.contains_key("states[0].name"));
    }

    #[test]
    fn retry_state_needs_url_and_positive_delay() {
        let states = vec![
            State {
                name: "a".into(),
                retry: true,
                retry_url: None,
                retry_after: Some(Duration::ZERO),
            },
            State {
                name: "b".into(),
                retry: true,
                retry_url: Some("ftp://x".into()),
                retry_after: None,
            },
        ];
        let errors = fields(validate_definition("x", &states, None));
        assert!(errors.contains_key("states[0].retryUrl"));
        assert!(errors.contains_key("states[0].retryAfter"));
        assert_eq!(
            errors.get("states[1].retryUrl").map(String::as_str),
            Some("must be an http(s) url")
        );
        assert!(errors.contains_key("states[1].retryAfter"));
    }

    #[test]
    fn name_limits() {
        let errors = fields(validate_definition("", &two_states(), None));
        assert!(errors.contains_key("name"));

        let long = "n".repeat(501);
        let errors = fields(validate_definition(&long, &two_states(), None));
        assert_eq!(
            errors.get("name").map(String::as_str),
            Some("must not be more than 500 bytes long")
        );
    }

    #[test]
    fn breaker_values_must_be_positive() {
        let policy = CircuitBreakerPolicy {
            failure_threshold: 0,
            open_timeout: Duration::ZERO,
            half_open_trial_count: 0,
        };
        let errors = fields(validate_definition("x", &two_states(), Some(&policy)));
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn http_url_check() {
        assert!(is_http_url("https://example.com/hook"));
        assert!(is_http_url("http://x/retry"));
        assert!(!is_http_url("http://"));
        assert!(!is_http_url("example.com"));
        assert!(!is_http_url("http://exa mple.com"));
        assert!(!is_http_url("mailto:ops@example.com"));
    }

    #[test]
    fn rejects_urls_the_http_client_cannot_call() {
        for url in [
            "http://exa%mple/x",
            "http://host:99999/retry",
            "http://[::1/retry",
        ] {
            let states = vec![
                State::timed("a", url, Duration::from_secs(2)),
                State::plain("b"),
            ];
            let errors = fields(validate_definition("wf", &states, None));
            assert_eq!(
                errors.get("states[0].retryUrl").map(String::as_str),
                Some("must be an http(s) url"),
                "{url}"
            );
        }
    }
}
