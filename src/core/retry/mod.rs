//! Retry/backoff policy. Pure decision logic: given the attempt ordinal, the
//! error class and the elapsed budget, decide whether to re-attempt and how
//! long to wait. The dispatcher owns the actual sleeping.

use crate::base::Outcome;
use crate::config::EndpointConfig;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// `BackoffStrategy` shapes the pre-jitter delay bound for attempt N:
/// `Fixed` uses `base`, `Linear` uses `base * N`, `Exponential` uses
/// `base * 2^(N-1)`. All are clamped to the configured cap.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum BackoffStrategy {
    Fixed,
    Linear,
    Exponential,
}

impl Default for BackoffStrategy {
    fn default() -> BackoffStrategy {
        BackoffStrategy::Exponential
    }
}

/// The verdict for one failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Re-attempt after waiting for the given delay.
    Retry(Duration),
    /// Attempt cap reached.
    AttemptsExhausted,
    /// The next attempt (or its backoff wait) would overrun the deadline.
    DeadlineExceeded,
    /// The error class does not permit retrying.
    NotRetryable,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    cap_delay: Duration,
    strategy: BackoffStrategy,
    jitter: bool,
}

impl RetryPolicy {
    pub fn new(config: &EndpointConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            cap_delay: Duration::from_millis(config.cap_delay_ms),
            strategy: config.backoff_strategy,
            jitter: config.jitter,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The pre-jitter delay bound after `attempt` (1-based) has failed,
    /// clamped to the cap. Strictly non-decreasing in `attempt`.
    pub fn backoff_bound(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let bound_ms = match self.strategy {
            BackoffStrategy::Fixed => base_ms,
            BackoffStrategy::Linear => base_ms.saturating_mul(attempt as u64),
            BackoffStrategy::Exponential => {
                // 2^(attempt-1), saturating well past any sane cap
                let shift = (attempt - 1).min(63);
                base_ms.saturating_mul(1u64 << shift)
            }
        };
        Duration::from_millis(bound_ms.min(self.cap_delay.as_millis() as u64))
    }

    /// `decide` is called after attempt `attempt` failed with `error_class`.
    /// `retry_after` carries the remote hint from a 429 response and, when
    /// present, overrides the computed backoff.
    pub fn decide(
        &self,
        attempt: u32,
        error_class: Outcome,
        elapsed: Duration,
        deadline: Duration,
        retry_after: Option<Duration>,
    ) -> Decision {
        if !error_class.is_retryable() {
            return Decision::NotRetryable;
        }
        if attempt >= self.max_attempts {
            return Decision::AttemptsExhausted;
        }
        if elapsed >= deadline {
            return Decision::DeadlineExceeded;
        }
        let delay = match retry_after {
            Some(hint) => hint,
            None => {
                let bound = self.backoff_bound(attempt);
                if self.jitter && !bound.is_zero() {
                    // full jitter: uniform over [0, bound]
                    let bound_ms = bound.as_millis() as u64;
                    Duration::from_millis(rand::thread_rng().gen_range(0..=bound_ms))
                } else {
                    bound
                }
            }
        };
        if elapsed + delay >= deadline {
            return Decision::DeadlineExceeded;
        }
        Decision::Retry(delay)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn policy(strategy: BackoffStrategy, jitter: bool) -> RetryPolicy {
        RetryPolicy::new(&EndpointConfig {
            max_attempts: 5,
            base_delay_ms: 100,
            cap_delay_ms: 2000,
            backoff_strategy: strategy,
            jitter,
            ..Default::default()
        })
    }

    #[test]
    fn exponential_bound_attempt_five() {
        // min(2000, 100 * 2^4) = 1600
        let p = policy(BackoffStrategy::Exponential, false);
        assert_eq!(p.backoff_bound(5), Duration::from_millis(1600));
    }

    #[test]
    fn bound_monotone_and_capped() {
        let p = policy(BackoffStrategy::Exponential, false);
        let mut prev = Duration::from_millis(0);
        for attempt in 1..=20 {
            let bound = p.backoff_bound(attempt);
            assert!(bound >= prev);
            assert!(bound <= Duration::from_millis(2000));
            prev = bound;
        }
        // far past the cap crossover, still clamped
        assert_eq!(p.backoff_bound(64), Duration::from_millis(2000));
    }

    #[test]
    fn linear_and_fixed_bounds() {
        let p = policy(BackoffStrategy::Linear, false);
        assert_eq!(p.backoff_bound(1), Duration::from_millis(100));
        assert_eq!(p.backoff_bound(3), Duration::from_millis(300));

        let p = policy(BackoffStrategy::Fixed, false);
        assert_eq!(p.backoff_bound(1), Duration::from_millis(100));
        assert_eq!(p.backoff_bound(4), Duration::from_millis(100));
    }

    #[test]
    fn jittered_delay_within_bound() {
        let p = policy(BackoffStrategy::Exponential, true);
        for _ in 0..100 {
            match p.decide(
                2,
                Outcome::Transient,
                Duration::from_millis(0),
                Duration::from_secs(60),
                None,
            ) {
                Decision::Retry(delay) => assert!(delay <= p.backoff_bound(2)),
                other => panic!("expected retry, got {:?}", other),
            }
        }
    }

    #[test]
    fn refuses_on_attempt_cap() {
        let p = policy(BackoffStrategy::Exponential, false);
        let d = p.decide(
            5,
            Outcome::Transient,
            Duration::from_millis(10),
            Duration::from_secs(60),
            None,
        );
        assert_eq!(d, Decision::AttemptsExhausted);
    }

    #[test]
    fn refuses_permanent_errors() {
        let p = policy(BackoffStrategy::Exponential, false);
        let d = p.decide(
            1,
            Outcome::Permanent,
            Duration::from_millis(10),
            Duration::from_secs(60),
            None,
        );
        assert_eq!(d, Decision::NotRetryable);
    }

    #[test]
    fn refuses_when_delay_overruns_deadline() {
        let p = policy(BackoffStrategy::Fixed, false);
        // elapsed 450ms + fixed 100ms delay > 500ms deadline
        let d = p.decide(
            1,
            Outcome::Transient,
            Duration::from_millis(450),
            Duration::from_millis(500),
            None,
        );
        assert_eq!(d, Decision::DeadlineExceeded);
        // elapsed already past the deadline
        let d = p.decide(
            1,
            Outcome::Timeout,
            Duration::from_millis(600),
            Duration::from_millis(500),
            None,
        );
        assert_eq!(d, Decision::DeadlineExceeded);
    }

    #[test]
    fn retry_after_overrides_backoff() {
        let p = policy(BackoffStrategy::Exponential, true);
        let d = p.decide(
            1,
            Outcome::Transient,
            Duration::from_millis(0),
            Duration::from_secs(60),
            Some(Duration::from_secs(7)),
        );
        assert_eq!(d, Decision::Retry(Duration::from_secs(7)));
    }

    #[test]
    fn retry_after_still_bounded_by_deadline() {
        let p = policy(BackoffStrategy::Exponential, true);
        let d = p.decide(
            1,
            Outcome::Transient,
            Duration::from_millis(0),
            Duration::from_secs(5),
            Some(Duration::from_secs(30)),
        );
        assert_eq!(d, Decision::DeadlineExceeded);
    }
}
