//! Per-endpoint token bucket. Refills lazily on each admission check from the
//! elapsed wall-clock time, so there is no background refill thread. Token
//! count stays inside [0, capacity] at all times.

use crate::config::EndpointConfig;
use crate::utils;
use std::sync::Mutex;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill_ms: u64,
}

#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    /// Tokens added per second.
    refill_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(config: &EndpointConfig) -> Self {
        TokenBucket {
            capacity: config.bucket_capacity,
            refill_rate: config.refill_rate,
            state: Mutex::new(BucketState {
                // starts full
                tokens: config.bucket_capacity,
                last_refill_ms: utils::curr_time_millis(),
            }),
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Tries to take one token. Refills first, then spends; never waits and
    /// never goes into debt.
    pub fn admit(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Current token count after a refresh. Diagnostic only; the value may be
    /// stale by the time the caller looks at it.
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock().unwrap();
        self.refill(&mut state);
        state.tokens
    }

    fn refill(&self, state: &mut BucketState) {
        let now = utils::curr_time_millis();
        if now <= state.last_refill_ms {
            return;
        }
        let elapsed_s = (now - state.last_refill_ms) as f64 / 1000.0;
        state.tokens = (state.tokens + elapsed_s * self.refill_rate).min(self.capacity);
        state.last_refill_ms = now;
    }
}
