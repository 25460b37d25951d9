//!  Circuit Breaker State Machine:
//!
//!                             failure streak reaches threshold
//!
//!             +-----------------------------------------------------------------------+
//!             |                                                                       |
//!             |                                                                       v
//!     +----------------+                   +----------------+      Probe      +----------------+
//!     |                |                   |                |<----------------|                |
//!     |                |   Probe succeed   |                |                 |                |
//!     |     Closed     |<------------------|    HalfOpen    |                 |      Open      |
//!     |                |                   |                |   Probe failed  |                |
//!     |                |                   |                +---------------->|                |
//!     +----------------+                   +----------------+                 +----------------+
//!
//! The Open -> HalfOpen transition is checked lazily on the next `try_pass`
//! call once the cool-down deadline passes; there is no background timer.
//! HalfOpen admits a single in-flight probe at a time via a compare-and-swap
//! permit, so concurrent callers cannot stampede a recovering endpoint.

use crate::config::EndpointConfig;
use crate::utils;
use lazy_static::lazy_static;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// States of the circuit breaker state machine.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum State {
    Closed,
    HalfOpen,
    Open,
}

impl Default for State {
    fn default() -> State {
        State::Closed
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Closed => write!(f, "Closed"),
            State::HalfOpen => write!(f, "HalfOpen"),
            State::Open => write!(f, "Open"),
        }
    }
}

/// The breaker's verdict for one call.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Permission {
    /// The breaker is closed; the call passes through.
    Pass,
    /// The caller holds the half-open trial permit. It must report the
    /// outcome via `on_attempt_complete` (or `release_probe` if the call is
    /// abandoned), otherwise the breaker stays half-open with no prober.
    Probe,
    /// The breaker is open (or another probe is in flight).
    Block,
}

/// `StateChangeListener` listens on the circuit breaker state change event.
pub trait StateChangeListener: Sync + Send {
    /// Triggered when the breaker transforms to Closed.
    fn on_transform_to_closed(&self, prev: State, endpoint: &str);

    /// Triggered when the breaker transforms to Open. `failure_streak` is the
    /// consecutive-failure count that tripped it (0 for probe failures).
    fn on_transform_to_open(&self, prev: State, endpoint: &str, failure_streak: u32);

    /// Triggered when the breaker transforms to HalfOpen.
    fn on_transform_to_half_open(&self, prev: State, endpoint: &str);
}

lazy_static! {
    static ref STATE_CHANGE_LISTENERS: Mutex<Vec<Arc<dyn StateChangeListener>>> =
        Mutex::new(Vec::new());
}

pub fn register_state_change_listeners(listeners: Vec<Arc<dyn StateChangeListener>>) {
    STATE_CHANGE_LISTENERS.lock().unwrap().extend(listeners);
}

pub fn clear_state_change_listeners() {
    STATE_CHANGE_LISTENERS.lock().unwrap().clear();
}

/// Per-endpoint circuit breaker. The state is mutated only through the
/// `from_*_to_*` transition functions; each returns true only for the caller
/// that actually accomplished the transformation.
#[derive(Debug)]
pub struct CircuitBreaker {
    endpoint: String,
    failure_threshold: u32,
    success_threshold: u32,
    cool_down_base_ms: u64,
    cool_down_cap_ms: u64,
    state: Mutex<State>,
    /// Consecutive breaker failures while Closed; successes reset it.
    consecutive_failures: AtomicU32,
    /// Consecutive probe successes while HalfOpen.
    probe_successes: AtomicU32,
    /// Current cool-down; doubles on each re-open up to the cap.
    cool_down_ms: AtomicU64,
    /// Timestamp (ms) after which an Open breaker may probe.
    reopen_at_ms: AtomicU64,
    /// The single half-open trial slot.
    probe_permit: AtomicBool,
}

impl CircuitBreaker {
    pub fn new<S: Into<String>>(endpoint: S, config: &EndpointConfig) -> Self {
        CircuitBreaker {
            endpoint: endpoint.into(),
            failure_threshold: config.failure_threshold,
            success_threshold: config.success_threshold,
            cool_down_base_ms: config.cool_down_base_ms,
            cool_down_cap_ms: config.cool_down_cap_ms,
            state: Mutex::new(State::default()),
            consecutive_failures: AtomicU32::new(0),
            probe_successes: AtomicU32::new(0),
            cool_down_ms: AtomicU64::new(config.cool_down_base_ms),
            reopen_at_ms: AtomicU64::new(0),
            probe_permit: AtomicBool::new(false),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn current_state(&self) -> State {
        *self.state.lock().unwrap()
    }

    #[inline]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn cool_down_ms(&self) -> u64 {
        self.cool_down_ms.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn reopen_at_ms(&self) -> u64 {
        self.reopen_at_ms.load(Ordering::SeqCst)
    }

    fn cool_down_arrived(&self) -> bool {
        utils::curr_time_millis() >= self.reopen_at_ms.load(Ordering::SeqCst)
    }

    fn update_reopen_timestamp(&self) {
        self.reopen_at_ms.store(
            utils::curr_time_millis() + self.cool_down_ms.load(Ordering::SeqCst),
            Ordering::SeqCst,
        );
    }

    /// `try_pass` acquires permission for an invocation based on the state
    /// machine. It never blocks; an Open breaker past its cool-down deadline
    /// transforms to HalfOpen here, lazily.
    pub fn try_pass(&self) -> Permission {
        match self.current_state() {
            State::Closed => Permission::Pass,
            State::Open => {
                if self.cool_down_arrived() {
                    self.from_open_to_half_open();
                    self.try_acquire_probe()
                } else {
                    Permission::Block
                }
            }
            State::HalfOpen => self.try_acquire_probe(),
        }
    }

    fn try_acquire_probe(&self) -> Permission {
        if self.current_state() == State::HalfOpen
            && self
                .probe_permit
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            Permission::Probe
        } else {
            Permission::Block
        }
    }

    /// Returns the half-open trial slot without reporting an outcome. Used
    /// when a granted probe is abandoned (e.g. the request was cancelled
    /// before the transport call), so the breaker cannot wedge in HalfOpen.
    pub fn release_probe(&self) {
        self.probe_permit.store(false, Ordering::SeqCst);
    }

    /// Records the outcome of a passed invocation and drives the state
    /// machine. `success` reflects breaker classification: permanent client
    /// errors are reported as successes since they say nothing about endpoint
    /// health. `probe` must be true iff `try_pass` granted `Permission::Probe`.
    pub fn on_attempt_complete(&self, success: bool, probe: bool) {
        if probe {
            self.on_probe_complete(success);
            return;
        }
        if success {
            self.consecutive_failures.store(0, Ordering::SeqCst);
        } else {
            let streak = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
            if streak >= self.failure_threshold {
                self.from_closed_to_open(streak);
            }
        }
    }

    fn on_probe_complete(&self, success: bool) {
        if success {
            let n = self.probe_successes.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.success_threshold {
                self.from_half_open_to_closed();
            }
        } else {
            self.from_half_open_to_open();
        }
        self.release_probe();
    }

    /// Updates the state machine from Closed to Open. Returns true only if
    /// the current caller accomplished the transformation.
    pub fn from_closed_to_open(&self, failure_streak: u32) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state == State::Closed {
            *state = State::Open;
            drop(state);
            self.update_reopen_timestamp();
            let listeners = STATE_CHANGE_LISTENERS.lock().unwrap();
            for listener in &*listeners {
                listener.on_transform_to_open(State::Closed, &self.endpoint, failure_streak);
            }
            #[cfg(feature = "exporter")]
            crate::exporter::add_state_change_counter(&self.endpoint, "Closed", "Open");
            true
        } else {
            false
        }
    }

    /// Updates the state machine from Open to HalfOpen once the cool-down
    /// deadline has passed.
    pub fn from_open_to_half_open(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state == State::Open {
            *state = State::HalfOpen;
            drop(state);
            self.probe_successes.store(0, Ordering::SeqCst);
            let listeners = STATE_CHANGE_LISTENERS.lock().unwrap();
            for listener in &*listeners {
                listener.on_transform_to_half_open(State::Open, &self.endpoint);
            }
            #[cfg(feature = "exporter")]
            crate::exporter::add_state_change_counter(&self.endpoint, "Open", "HalfOpen");
            true
        } else {
            false
        }
    }

    /// Updates the state machine from HalfOpen back to Open after a failed
    /// probe. Each re-open doubles the cool-down up to the configured cap.
    pub fn from_half_open_to_open(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state == State::HalfOpen {
            *state = State::Open;
            drop(state);
            let doubled = self
                .cool_down_ms
                .load(Ordering::SeqCst)
                .saturating_mul(2)
                .min(self.cool_down_cap_ms);
            self.cool_down_ms.store(doubled, Ordering::SeqCst);
            self.update_reopen_timestamp();
            let listeners = STATE_CHANGE_LISTENERS.lock().unwrap();
            for listener in &*listeners {
                listener.on_transform_to_open(State::HalfOpen, &self.endpoint, 0);
            }
            #[cfg(feature = "exporter")]
            crate::exporter::add_state_change_counter(&self.endpoint, "HalfOpen", "Open");
            true
        } else {
            false
        }
    }

    /// Updates the state machine from HalfOpen to Closed after a successful
    /// probe. Resets the failure streak and the cool-down.
    pub fn from_half_open_to_closed(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state == State::HalfOpen {
            *state = State::Closed;
            drop(state);
            self.consecutive_failures.store(0, Ordering::SeqCst);
            self.cool_down_ms
                .store(self.cool_down_base_ms, Ordering::SeqCst);
            let listeners = STATE_CHANGE_LISTENERS.lock().unwrap();
            for listener in &*listeners {
                listener.on_transform_to_closed(State::HalfOpen, &self.endpoint);
            }
            #[cfg(feature = "exporter")]
            crate::exporter::add_state_change_counter(&self.endpoint, "HalfOpen", "Closed");
            true
        } else {
            false
        }
    }
}
