use enum_map::Enum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// `Outcome` classifies what happened to one attempt, or to a whole logical
/// request. Attempt-level outcomes are `Success`, `Transient`, `Permanent`,
/// `Timeout`, `Rejected` and `CircuitOpen`; `Exhausted` and `Cancelled` only
/// appear as the final outcome of a logical request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Enum, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    Transient,
    Permanent,
    Timeout,
    Rejected,
    CircuitOpen,
    Exhausted,
    Cancelled,
}

impl Default for Outcome {
    fn default() -> Outcome {
        Outcome::Success
    }
}

impl Outcome {
    /// Whether the retry policy may re-attempt after this outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Outcome::Transient | Outcome::Timeout)
    }

    /// Whether this outcome counts toward the circuit breaker failure streak.
    /// Permanent client errors indicate a bad request, not endpoint
    /// unhealthiness, so they are excluded.
    pub fn is_breaker_failure(&self) -> bool {
        matches!(self, Outcome::Transient | Outcome::Timeout)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Outcome::Success => "success",
            Outcome::Transient => "transient_error",
            Outcome::Permanent => "permanent_error",
            Outcome::Timeout => "timeout",
            Outcome::Rejected => "rejected",
            Outcome::CircuitOpen => "circuit_open",
            Outcome::Exhausted => "exhausted",
            Outcome::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}

/// Classifies an HTTP status code. 2xx/3xx are successes; 5xx and 429 are
/// transient; remaining 4xx are permanent. `extra_retryable` extends the
/// transient set with endpoint-configured status codes.
pub fn classify_status(status: u16, extra_retryable: &[u16]) -> Outcome {
    if (200..400).contains(&status) {
        Outcome::Success
    } else if status >= 500 || status == 429 || extra_retryable.contains(&status) {
        Outcome::Transient
    } else {
        Outcome::Permanent
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_classes() {
        let cases = vec![
            (200, Outcome::Success),
            (204, Outcome::Success),
            (301, Outcome::Success),
            (404, Outcome::Permanent),
            (400, Outcome::Permanent),
            (429, Outcome::Transient),
            (500, Outcome::Transient),
            (502, Outcome::Transient),
            (503, Outcome::Transient),
        ];
        for (status, expected) in cases {
            assert_eq!(classify_status(status, &[]), expected);
        }
    }

    #[test]
    fn extra_retryable_statuses() {
        assert_eq!(classify_status(404, &[]), Outcome::Permanent);
        assert_eq!(classify_status(404, &[404]), Outcome::Transient);
    }

    #[test]
    fn breaker_failure_classes() {
        assert!(Outcome::Transient.is_breaker_failure());
        assert!(Outcome::Timeout.is_breaker_failure());
        assert!(!Outcome::Permanent.is_breaker_failure());
        assert!(!Outcome::Success.is_breaker_failure());
    }
}
