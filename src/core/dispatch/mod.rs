//! Request dispatch. One `execute` call runs the full resilience pipeline for
//! a logical request: rate limiter, circuit breaker, bounded attempts with
//! backoff, classification and metrics. The pipeline order is fixed: the
//! limiter is consulted before the breaker, so rejected traffic never
//! influences breaker health.

use crate::base::{classify_status, DispatchError, Outcome, Request, Response, TransportError};
use crate::breaker::Permission;
use crate::endpoint::{EndpointState, Registry};
use crate::logging;
use crate::metrics::{MetricSample, MetricsCollector, MetricsSnapshot};
use crate::retry::Decision;
use crate::utils;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Granularity of the backoff sleep, so cancellation is observed promptly.
const SLEEP_SLICE_MS: u64 = 10;

/// The transport boundary. Implementations perform one HTTP exchange and must
/// honor `timeout`; everything above this trait is transport-agnostic.
pub trait Transport: Send + Sync {
    fn send(&self, request: &Request, timeout: Duration)
        -> std::result::Result<Response, TransportError>;
}

/// Cooperative cancellation handle. Cloneable; any clone may cancel.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// `Dispatcher` owns the endpoint registry and the metrics collector and
/// drives requests through the shared per-endpoint state.
pub struct Dispatcher {
    registry: Arc<Registry>,
    collector: Arc<MetricsCollector>,
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, transport: Arc<dyn Transport>) -> Self {
        Dispatcher {
            registry,
            collector: Arc::new(MetricsCollector::new()),
            transport,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.collector.snapshot()
    }

    /// Dispatches `request`, driving attempts until a terminal outcome.
    pub fn execute(&self, request: &Request) -> std::result::Result<Response, DispatchError> {
        self.execute_cancellable(request, &CancelToken::new())
    }

    /// Like [`execute`](Self::execute), but aborts between attempts and
    /// during backoff waits once `token` is cancelled. An attempt already
    /// handed to the transport is not interrupted.
    pub fn execute_cancellable(
        &self,
        request: &Request,
        token: &CancelToken,
    ) -> std::result::Result<Response, DispatchError> {
        let state = self.registry.get_or_create(request.endpoint());
        let deadline = request
            .deadline()
            .unwrap_or_else(|| state.config().per_request_deadline());
        let start = Instant::now();
        let result = self.run_attempts(request, &state, deadline, start, token);

        let summary_outcome = match &result {
            Ok(_) => Outcome::Success,
            Err(err) => err.outcome(),
        };
        self.collector.record_request(&MetricSample::new(
            request.endpoint(),
            summary_outcome,
            start.elapsed(),
        ));
        result
    }

    fn run_attempts(
        &self,
        request: &Request,
        state: &EndpointState,
        deadline: Duration,
        start: Instant,
        token: &CancelToken,
    ) -> std::result::Result<Response, DispatchError> {
        // attempts is bounded by the policy, so the loop bound is a guard
        // rail rather than the usual exit path
        for attempt in 1..=state.policy().max_attempts() {
            if token.is_cancelled() {
                return Err(DispatchError::Cancelled);
            }
            let elapsed = start.elapsed();
            if elapsed >= deadline {
                return Err(DispatchError::Timeout {
                    elapsed_ms: elapsed.as_millis() as u64,
                });
            }

            if !state.bucket().admit() {
                self.record_attempt(request, attempt, Outcome::Rejected, Duration::from_millis(0));
                return Err(DispatchError::Rejected {
                    endpoint: request.endpoint().into(),
                });
            }

            let probe = match state.breaker().try_pass() {
                Permission::Pass => false,
                Permission::Probe => true,
                Permission::Block => {
                    self.record_attempt(
                        request,
                        attempt,
                        Outcome::CircuitOpen,
                        Duration::from_millis(0),
                    );
                    return Err(DispatchError::CircuitOpen {
                        endpoint: request.endpoint().into(),
                    });
                }
            };

            // a single attempt may not outlive the overall deadline
            let attempt_timeout = state.config().attempt_timeout().min(deadline - elapsed);
            let attempt_start = Instant::now();
            let sent = self.transport.send(request, attempt_timeout);
            let attempt_elapsed = attempt_start.elapsed();

            let outcome = match &sent {
                Ok(response) => {
                    classify_status(response.status, &state.config().retryable_statuses)
                }
                Err(err) => err.outcome(),
            };
            state
                .breaker()
                .on_attempt_complete(!outcome.is_breaker_failure(), probe);
            self.record_attempt(request, attempt, outcome, attempt_elapsed);

            match outcome {
                Outcome::Success => {
                    let mut response = sent.unwrap();
                    response.elapsed = attempt_elapsed;
                    return Ok(response);
                }
                Outcome::Permanent => {
                    let status = sent.unwrap().status;
                    return Err(DispatchError::Permanent { status });
                }
                _ => {}
            }

            let retry_after = sent.as_ref().ok().and_then(|r| r.retry_after());
            let decision = if request.is_idempotent() {
                state
                    .policy()
                    .decide(attempt, outcome, start.elapsed(), deadline, retry_after)
            } else {
                Decision::NotRetryable
            };
            match decision {
                Decision::Retry(delay) => {
                    logging::debug!(
                        "[Dispatch] Retrying, endpoint: {}, attempt: {}, delay: {:?}",
                        request.endpoint(),
                        attempt,
                        delay
                    );
                    if !self.wait(delay, token) {
                        return Err(DispatchError::Cancelled);
                    }
                }
                Decision::DeadlineExceeded => {
                    return Err(DispatchError::Timeout {
                        elapsed_ms: start.elapsed().as_millis() as u64,
                    });
                }
                Decision::AttemptsExhausted | Decision::NotRetryable => {
                    return Err(Self::terminal_failure(attempt, sent));
                }
            }
        }
        // unreachable in practice: `decide` exhausts before the loop does
        Err(DispatchError::Exhausted {
            attempts: state.policy().max_attempts(),
            last_error: "attempt cap reached".into(),
        })
    }

    /// Maps the last failed attempt to the terminal error. Non-retryable
    /// transport failures keep their identity; everything else reports the
    /// attempt tally.
    fn terminal_failure(
        attempts: u32,
        sent: std::result::Result<Response, TransportError>,
    ) -> DispatchError {
        match sent {
            Err(err) if attempts == 1 => DispatchError::Transport(err),
            Err(err) => DispatchError::Exhausted {
                attempts,
                last_error: err.to_string(),
            },
            Ok(response) => DispatchError::Exhausted {
                attempts,
                last_error: format!("status {}", response.status),
            },
        }
    }

    fn record_attempt(&self, request: &Request, ordinal: u32, outcome: Outcome, elapsed: Duration) {
        logging::trace!(
            "[Dispatch] Attempt finished, endpoint: {}, attempt: {}, outcome: {}",
            request.endpoint(),
            ordinal,
            outcome
        );
        self.collector
            .record_attempt(&MetricSample::new(request.endpoint(), outcome, elapsed));
    }

    /// Sleeps for `delay` in small slices, returning false if cancelled.
    fn wait(&self, delay: Duration, token: &CancelToken) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            if token.is_cancelled() {
                return false;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return true;
            }
            utils::sleep_for_ms((remaining.as_millis() as u64).min(SLEEP_SLICE_MS));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::breaker::State;
    use crate::config::EndpointConfig;
    use mockall::*;

    mock! {
        pub(crate) TestTransport {}
        impl Transport for TestTransport {
            fn send(&self, request: &Request, timeout: Duration)
                -> std::result::Result<Response, TransportError>;
        }
    }

    fn fast_config() -> EndpointConfig {
        EndpointConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            cap_delay_ms: 5,
            jitter: false,
            failure_threshold: 3,
            cool_down_base_ms: 60_000,
            ..Default::default()
        }
    }

    fn dispatcher(config: EndpointConfig, transport: MockTestTransport) -> Dispatcher {
        let registry = Arc::new(Registry::new(EndpointConfig::default()));
        registry.register("abc", config).unwrap();
        Dispatcher::new(registry, Arc::new(transport))
    }

    fn get_request() -> Request {
        Request::new("abc", crate::base::Method::Get, "http://upstream/x")
    }

    #[test]
    fn success_first_attempt() {
        let mut transport = MockTestTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_, _| Ok(Response::new(200)));
        let d = dispatcher(fast_config(), transport);
        let response = d.execute(&get_request()).unwrap();
        assert_eq!(response.status, 200);

        let snap = d.metrics();
        let abc = snap.endpoint("abc").unwrap();
        assert_eq!(abc.attempts.get("success"), Some(&1));
        assert_eq!(abc.requests.get("success"), Some(&1));
    }

    #[test]
    fn retries_transient_then_succeeds() {
        let mut transport = MockTestTransport::new();
        let mut calls = 0u32;
        transport.expect_send().times(3).returning(move |_, _| {
            calls += 1;
            if calls < 3 {
                Ok(Response::new(503))
            } else {
                Ok(Response::new(200))
            }
        });
        let d = dispatcher(fast_config(), transport);
        let response = d.execute(&get_request()).unwrap();
        assert_eq!(response.status, 200);

        let abc = d.metrics();
        let abc = abc.endpoint("abc").unwrap();
        assert_eq!(abc.attempts.get("transient_error"), Some(&2));
        assert_eq!(abc.attempts.get("success"), Some(&1));
        // one summary regardless of attempt count
        assert_eq!(abc.requests.values().sum::<u64>(), 1);
    }

    #[test]
    fn permanent_status_fails_fast() {
        let mut transport = MockTestTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_, _| Ok(Response::new(404)));
        let d = dispatcher(fast_config(), transport);
        let err = d.execute(&get_request()).unwrap_err();
        assert_eq!(err, DispatchError::Permanent { status: 404 });
        // a client error leaves the breaker untouched
        assert_eq!(d.registry().breaker_state("abc"), Some(State::Closed));
    }

    #[test]
    fn exhaustion_reports_attempts_and_last_error() {
        let mut transport = MockTestTransport::new();
        transport
            .expect_send()
            .times(3)
            .returning(|_, _| Ok(Response::new(502)));
        let d = dispatcher(fast_config(), transport);
        let err = d.execute(&get_request()).unwrap_err();
        assert_eq!(
            err,
            DispatchError::Exhausted {
                attempts: 3,
                last_error: "status 502".into()
            }
        );
    }

    #[test]
    fn non_idempotent_never_retried() {
        let mut transport = MockTestTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_, _| Err(TransportError::ConnectionReset));
        let d = dispatcher(fast_config(), transport);
        let request = Request::new("abc", crate::base::Method::Post, "http://upstream/x");
        let err = d.execute(&request).unwrap_err();
        assert_eq!(
            err,
            DispatchError::Transport(TransportError::ConnectionReset)
        );
    }

    #[test]
    fn post_marked_idempotent_is_retried() {
        let mut transport = MockTestTransport::new();
        let mut calls = 0u32;
        transport.expect_send().times(2).returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Err(TransportError::ConnectionReset)
            } else {
                Ok(Response::new(201))
            }
        });
        let d = dispatcher(fast_config(), transport);
        let request = Request::new("abc", crate::base::Method::Post, "http://upstream/x")
            .with_idempotent(true);
        assert_eq!(d.execute(&request).unwrap().status, 201);
    }

    #[test]
    fn breaker_opens_and_short_circuits() {
        let mut transport = MockTestTransport::new();
        // 3 requests of 1 attempt each (max_attempts 1), then none
        transport
            .expect_send()
            .times(3)
            .returning(|_, _| Err(TransportError::ConnectionReset));
        let config = EndpointConfig {
            max_attempts: 1,
            failure_threshold: 3,
            cool_down_base_ms: 60_000,
            ..fast_config()
        };
        let d = dispatcher(config, transport);
        let request = get_request();
        for _ in 0..3 {
            d.execute(&request).unwrap_err();
        }
        assert_eq!(d.registry().breaker_state("abc"), Some(State::Open));
        // the fourth never reaches the transport
        let err = d.execute(&request).unwrap_err();
        assert_eq!(
            err,
            DispatchError::CircuitOpen {
                endpoint: "abc".into()
            }
        );
    }

    #[test]
    fn rate_limit_rejection_before_breaker() {
        let mut transport = MockTestTransport::new();
        transport
            .expect_send()
            .times(2)
            .returning(|_, _| Ok(Response::new(200)));
        let config = EndpointConfig {
            bucket_capacity: 2.0,
            refill_rate: 0.001,
            ..fast_config()
        };
        let d = dispatcher(config, transport);
        let request = get_request();
        assert!(d.execute(&request).is_ok());
        assert!(d.execute(&request).is_ok());
        let err = d.execute(&request).unwrap_err();
        assert_eq!(
            err,
            DispatchError::Rejected {
                endpoint: "abc".into()
            }
        );
    }

    #[test]
    fn deadline_produces_timeout_not_exhausted() {
        let mut transport = MockTestTransport::new();
        transport.expect_send().times(1).returning(|_, _| {
            utils::sleep_for_ms(60);
            Err(TransportError::Timeout)
        });
        let config = EndpointConfig {
            max_attempts: 5,
            ..fast_config()
        };
        let d = dispatcher(config, transport);
        let request = get_request().with_deadline(Duration::from_millis(50));
        match d.execute(&request).unwrap_err() {
            DispatchError::Timeout { elapsed_ms } => assert!(elapsed_ms >= 50),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn attempt_timeout_clamped_to_remaining_deadline() {
        let mut transport = MockTestTransport::new();
        transport
            .expect_send()
            .withf(|_, timeout| *timeout <= Duration::from_millis(200))
            .times(1)
            .returning(|_, _| Ok(Response::new(200)));
        let d = dispatcher(fast_config(), transport);
        let request = get_request().with_deadline(Duration::from_millis(200));
        d.execute(&request).unwrap();
    }

    #[test]
    fn cancelled_token_aborts_before_attempt() {
        let transport = MockTestTransport::new();
        let d = dispatcher(fast_config(), transport);
        let token = CancelToken::new();
        token.cancel();
        let err = d.execute_cancellable(&get_request(), &token).unwrap_err();
        assert_eq!(err, DispatchError::Cancelled);
        let abc = d.metrics();
        assert_eq!(
            abc.endpoint("abc").unwrap().requests.get("cancelled"),
            Some(&1)
        );
    }

    #[test]
    fn cancellation_interrupts_backoff() {
        let mut transport = MockTestTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_, _| Ok(Response::new(503)));
        let config = EndpointConfig {
            base_delay_ms: 5000,
            cap_delay_ms: 5000,
            jitter: false,
            failure_threshold: 100,
            ..fast_config()
        };
        let d = dispatcher(config, transport);
        let token = CancelToken::new();
        let canceller = token.clone();
        let handle = std::thread::spawn(move || {
            utils::sleep_for_ms(30);
            canceller.cancel();
        });
        let started = Instant::now();
        let err = d.execute_cancellable(&get_request(), &token).unwrap_err();
        handle.join().unwrap();
        assert_eq!(err, DispatchError::Cancelled);
        // returned long before the 5s backoff would have elapsed
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn retry_after_hint_overrides_backoff() {
        let mut transport = MockTestTransport::new();
        let mut calls = 0u32;
        transport.expect_send().times(2).returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                let mut response = Response::new(429);
                response.headers.push(("Retry-After".into(), "0".into()));
                Ok(response)
            } else {
                Ok(Response::new(200))
            }
        });
        let d = dispatcher(fast_config(), transport);
        assert_eq!(d.execute(&get_request()).unwrap().status, 200);
    }

    #[test]
    fn half_open_probe_success_closes_breaker() {
        let mut transport = MockTestTransport::new();
        let mut calls = 0u32;
        transport.expect_send().returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Err(TransportError::ConnectionReset)
            } else {
                Ok(Response::new(200))
            }
        });
        let config = EndpointConfig {
            max_attempts: 1,
            failure_threshold: 1,
            cool_down_base_ms: 20,
            cool_down_cap_ms: 160,
            ..fast_config()
        };
        let d = dispatcher(config, transport);
        let request = get_request();
        d.execute(&request).unwrap_err();
        assert_eq!(d.registry().breaker_state("abc"), Some(State::Open));
        utils::sleep_for_ms(40);
        // the probe passes and closes the circuit
        assert_eq!(d.execute(&request).unwrap().status, 200);
        assert_eq!(d.registry().breaker_state("abc"), Some(State::Closed));
    }
}
