use super::Outcome;
use std::fmt;

/// Failures surfaced by the transport boundary. Anything below HTTP —
/// connection establishment, TLS, DNS — collapses into this taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The attempt did not complete within its timeout.
    Timeout,
    /// The connection was reset or dropped mid-flight.
    ConnectionReset,
    Other(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Timeout => write!(f, "transport timeout"),
            TransportError::ConnectionReset => write!(f, "connection reset"),
            TransportError::Other(msg) => write!(f, "transport error: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

impl TransportError {
    /// Attempt-level classification: a timed-out attempt is `Timeout`,
    /// everything else at the transport level is presumed transient.
    pub fn outcome(&self) -> Outcome {
        match self {
            TransportError::Timeout => Outcome::Timeout,
            _ => Outcome::Transient,
        }
    }
}

/// Terminal failure of one logical request. Exactly one of these (or a
/// response) is returned per dispatch, and exactly one summary metric sample
/// is recorded alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Refused by the rate limiter before any attempt was made.
    Rejected { endpoint: String },
    /// Refused by the circuit breaker before any attempt was made.
    CircuitOpen { endpoint: String },
    /// Non-retryable response (4xx other than 429).
    Permanent { status: u16 },
    /// Retries exhausted without success.
    Exhausted { attempts: u32, last_error: String },
    /// The overall deadline elapsed, possibly mid-retry.
    Timeout { elapsed_ms: u64 },
    /// Explicitly cancelled by the caller.
    Cancelled,
    /// A transport failure that was not eligible for retry.
    Transport(TransportError),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Rejected { endpoint } => {
                write!(f, "rejected by rate limiter, endpoint: {}", endpoint)
            }
            DispatchError::CircuitOpen { endpoint } => {
                write!(f, "circuit breaker open, endpoint: {}", endpoint)
            }
            DispatchError::Permanent { status } => {
                write!(f, "permanent error, status: {}", status)
            }
            DispatchError::Exhausted {
                attempts,
                last_error,
            } => write!(
                f,
                "retries exhausted after {} attempts, last error: {}",
                attempts, last_error
            ),
            DispatchError::Timeout { elapsed_ms } => {
                write!(f, "request deadline exceeded after {} ms", elapsed_ms)
            }
            DispatchError::Cancelled => write!(f, "request cancelled"),
            DispatchError::Transport(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for DispatchError {}

impl DispatchError {
    /// The final outcome recorded in the request summary sample.
    pub fn outcome(&self) -> Outcome {
        match self {
            DispatchError::Rejected { .. } => Outcome::Rejected,
            DispatchError::CircuitOpen { .. } => Outcome::CircuitOpen,
            DispatchError::Permanent { .. } => Outcome::Permanent,
            DispatchError::Exhausted { .. } => Outcome::Exhausted,
            DispatchError::Timeout { .. } => Outcome::Timeout,
            DispatchError::Cancelled => Outcome::Cancelled,
            DispatchError::Transport(err) => err.outcome(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn error_outcomes() {
        let cases = vec![
            (
                DispatchError::Rejected {
                    endpoint: "ep".into(),
                },
                Outcome::Rejected,
            ),
            (
                DispatchError::CircuitOpen {
                    endpoint: "ep".into(),
                },
                Outcome::CircuitOpen,
            ),
            (DispatchError::Permanent { status: 404 }, Outcome::Permanent),
            (
                DispatchError::Exhausted {
                    attempts: 3,
                    last_error: "status 503".into(),
                },
                Outcome::Exhausted,
            ),
            (DispatchError::Timeout { elapsed_ms: 600 }, Outcome::Timeout),
            (DispatchError::Cancelled, Outcome::Cancelled),
            (
                DispatchError::Transport(TransportError::ConnectionReset),
                Outcome::Transient,
            ),
            (
                DispatchError::Transport(TransportError::Timeout),
                Outcome::Timeout,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.outcome(), expected);
        }
    }

    #[test]
    fn display_contains_context() {
        let err = DispatchError::Exhausted {
            attempts: 3,
            last_error: "status 502".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("status 502"));
    }
}
