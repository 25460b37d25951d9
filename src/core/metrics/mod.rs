//! In-process metrics. Counters and latency histograms are kept per endpoint
//! and keyed by [`Outcome`]; recording is lock-free after the first sample for
//! an endpoint. Snapshots are point-in-time copies, safe to serialize.

use crate::base::Outcome;
use enum_map::EnumMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Upper bounds (in ms) of the latency histogram buckets. A final +Inf bucket
/// is implied.
pub const LATENCY_BUCKETS_MS: [u64; 11] = [5, 10, 25, 50, 100, 250, 500, 1000, 2500, 5000, 10000];

/// Fixed-bucket latency histogram. All cells are atomics, so concurrent
/// recording needs no lock.
#[derive(Debug, Default)]
pub struct Histogram {
    buckets: [AtomicU64; LATENCY_BUCKETS_MS.len() + 1],
    count: AtomicU64,
    sum_ms: AtomicU64,
}

impl Histogram {
    pub fn record(&self, duration: Duration) {
        let ms = duration.as_millis() as u64;
        let idx = LATENCY_BUCKETS_MS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(LATENCY_BUCKETS_MS.len());
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_ms.fetch_add(ms, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum_ms(&self) -> u64 {
        self.sum_ms.load(Ordering::Relaxed)
    }

    fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            buckets: self
                .buckets
                .iter()
                .map(|b| b.load(Ordering::Relaxed))
                .collect(),
            count: self.count(),
            sum_ms: self.sum_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HistogramSnapshot {
    /// Per-bucket counts, the trailing entry being the +Inf bucket.
    pub buckets: Vec<u64>,
    pub count: u64,
    pub sum_ms: u64,
}

impl HistogramSnapshot {
    pub fn avg_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum_ms as f64 / self.count as f64
        }
    }
}

/// One recorded sample, either a single attempt or a whole logical request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSample {
    pub endpoint: String,
    pub outcome: Outcome,
    pub duration: Duration,
}

impl MetricSample {
    pub fn new<S: Into<String>>(endpoint: S, outcome: Outcome, duration: Duration) -> Self {
        MetricSample {
            endpoint: endpoint.into(),
            outcome,
            duration,
        }
    }
}

/// Live counters for one endpoint.
#[derive(Debug, Default)]
pub struct EndpointMetrics {
    /// Attempt counts keyed by attempt outcome.
    attempts: EnumMap<Outcome, AtomicU64>,
    /// Logical-request counts keyed by final outcome.
    requests: EnumMap<Outcome, AtomicU64>,
    /// Latency of individual attempts.
    attempt_latency: Histogram,
    /// End-to-end latency of logical requests, waits included.
    request_latency: Histogram,
}

impl EndpointMetrics {
    pub fn attempt_count(&self, outcome: Outcome) -> u64 {
        self.attempts[outcome].load(Ordering::Relaxed)
    }

    pub fn request_count(&self, outcome: Outcome) -> u64 {
        self.requests[outcome].load(Ordering::Relaxed)
    }
}

/// Point-in-time copy of one endpoint's counters.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointSnapshot {
    pub endpoint: String,
    pub attempts: HashMap<String, u64>,
    pub requests: HashMap<String, u64>,
    pub attempt_latency: HistogramSnapshot,
    pub request_latency: HistogramSnapshot,
}

impl EndpointSnapshot {
    /// Fraction of logical requests that ended in success, in [0, 1].
    pub fn success_ratio(&self) -> f64 {
        let total: u64 = self.requests.values().sum();
        if total == 0 {
            return 0.0;
        }
        let success = self
            .requests
            .get(&Outcome::Success.to_string())
            .copied()
            .unwrap_or(0);
        success as f64 / total as f64
    }
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct MetricsSnapshot {
    pub endpoints: Vec<EndpointSnapshot>,
}

impl MetricsSnapshot {
    pub fn endpoint(&self, name: &str) -> Option<&EndpointSnapshot> {
        self.endpoints.iter().find(|e| e.endpoint == name)
    }

    pub fn total_requests(&self) -> u64 {
        self.endpoints
            .iter()
            .map(|e| e.requests.values().sum::<u64>())
            .sum()
    }

    pub fn total_attempts(&self) -> u64 {
        self.endpoints
            .iter()
            .map(|e| e.attempts.values().sum::<u64>())
            .sum()
    }
}

/// `MetricsCollector` aggregates samples across endpoints. Shards are created
/// on first use and never dropped while the collector lives.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    shards: RwLock<HashMap<String, Arc<EndpointMetrics>>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        MetricsCollector::default()
    }

    fn shard(&self, endpoint: &str) -> Arc<EndpointMetrics> {
        let shards = self.shards.read().unwrap();
        if let Some(shard) = shards.get(endpoint) {
            return Arc::clone(shard);
        }
        drop(shards);
        let mut shards = self.shards.write().unwrap();
        Arc::clone(
            shards
                .entry(endpoint.into())
                .or_insert_with(|| Arc::new(EndpointMetrics::default())),
        )
    }

    /// Records one attempt sample.
    pub fn record_attempt(&self, sample: &MetricSample) {
        let shard = self.shard(&sample.endpoint);
        shard.attempts[sample.outcome].fetch_add(1, Ordering::Relaxed);
        shard.attempt_latency.record(sample.duration);
        #[cfg(feature = "exporter")]
        crate::exporter::add_attempt_counter(&sample.endpoint, sample.outcome, sample.duration);
    }

    /// Records the summary sample of one logical request. Exactly one of
    /// these is recorded per dispatch.
    pub fn record_request(&self, sample: &MetricSample) {
        let shard = self.shard(&sample.endpoint);
        shard.requests[sample.outcome].fetch_add(1, Ordering::Relaxed);
        shard.request_latency.record(sample.duration);
        #[cfg(feature = "exporter")]
        crate::exporter::add_request_counter(&sample.endpoint, sample.outcome, sample.duration);
    }

    pub fn endpoint_metrics(&self, endpoint: &str) -> Option<Arc<EndpointMetrics>> {
        self.shards.read().unwrap().get(endpoint).cloned()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let shards = self.shards.read().unwrap();
        let mut endpoints: Vec<EndpointSnapshot> = shards
            .iter()
            .map(|(name, shard)| {
                let mut attempts = HashMap::new();
                let mut requests = HashMap::new();
                for (outcome, counter) in &shard.attempts {
                    let n = counter.load(Ordering::Relaxed);
                    if n > 0 {
                        attempts.insert(outcome.to_string(), n);
                    }
                }
                for (outcome, counter) in &shard.requests {
                    let n = counter.load(Ordering::Relaxed);
                    if n > 0 {
                        requests.insert(outcome.to_string(), n);
                    }
                }
                EndpointSnapshot {
                    endpoint: name.clone(),
                    attempts,
                    requests,
                    attempt_latency: shard.attempt_latency.snapshot(),
                    request_latency: shard.request_latency.snapshot(),
                }
            })
            .collect();
        endpoints.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        MetricsSnapshot { endpoints }
    }
}
