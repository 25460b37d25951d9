///! exporter for the dispatch metrics of HTTPWrapper
use crate::{base::Outcome, config, metrics::LATENCY_BUCKETS_MS};
use lazy_static::lazy_static;
use prometheus_exporter::{
    prometheus::{default_registry, histogram_opts, opts, CounterVec, HistogramVec, Registry},
    Builder,
};
use std::sync::Once;
use std::time::Duration;

lazy_static! {
    static ref HOST_NAME: String =
        std::env::var("HOSTNAME").unwrap_or_else(|_| "<unknown>".to_owned());
    static ref PROCESS_NAME: String = std::env::args().collect::<Vec<String>>()[0].clone();
    static ref PID_STRING: String = format!("{}", std::process::id());
    // crate::core::metrics
    static ref ATTEMPT_COUNTER: CounterVec = CounterVec::new(
        opts!(
            "httpwrapper_attempts_total",
            "Total attempt count by endpoint and outcome"
        ),
        &["host", "process", "pid", "endpoint", "outcome"]
    )
    .unwrap();
    static ref REQUEST_COUNTER: CounterVec = CounterVec::new(
        opts!(
            "httpwrapper_requests_total",
            "Total logical request count by endpoint and final outcome"
        ),
        &["host", "process", "pid", "endpoint", "outcome"]
    )
    .unwrap();
    static ref ATTEMPT_LATENCY: HistogramVec = HistogramVec::new(
        histogram_opts!(
            "httpwrapper_attempt_latency_ms",
            "Attempt latency in milliseconds",
            LATENCY_BUCKETS_MS.iter().map(|&b| b as f64).collect()
        ),
        &["host", "process", "pid", "endpoint"]
    )
    .unwrap();
    static ref REQUEST_LATENCY: HistogramVec = HistogramVec::new(
        histogram_opts!(
            "httpwrapper_request_latency_ms",
            "End-to-end logical request latency in milliseconds",
            LATENCY_BUCKETS_MS.iter().map(|&b| b as f64).collect()
        ),
        &["host", "process", "pid", "endpoint"]
    )
    .unwrap();
    // crate::core::breaker
    static ref STATE_CHANGE_COUNTER: CounterVec = CounterVec::new(
        opts!(
            "circuit_breaker_state_changed_total",
            "Circuit breaker total state change count"
        ),
        &["host", "process", "pid", "endpoint", "from_state", "to_state"]
    )
    .unwrap();
    static ref COUNTER_METRICS: Vec<CounterVec> = {
        vec![
            ATTEMPT_COUNTER.clone(),
            REQUEST_COUNTER.clone(),
            STATE_CHANGE_COUNTER.clone(),
        ]
    };
    static ref HISTOGRAM_METRICS: Vec<HistogramVec> =
        { vec![ATTEMPT_LATENCY.clone(), REQUEST_LATENCY.clone()] };
    static ref INIT_ONCE: Once = Once::new();
}

pub fn add_attempt_counter(endpoint: &str, outcome: Outcome, duration: Duration) {
    ATTEMPT_COUNTER
        .with_label_values(&[
            &HOST_NAME,
            &PROCESS_NAME,
            &PID_STRING,
            endpoint,
            &outcome.to_string(),
        ])
        .inc_by(1.0);
    ATTEMPT_LATENCY
        .with_label_values(&[&HOST_NAME, &PROCESS_NAME, &PID_STRING, endpoint])
        .observe(duration.as_millis() as f64);
}

pub fn add_request_counter(endpoint: &str, outcome: Outcome, duration: Duration) {
    REQUEST_COUNTER
        .with_label_values(&[
            &HOST_NAME,
            &PROCESS_NAME,
            &PID_STRING,
            endpoint,
            &outcome.to_string(),
        ])
        .inc_by(1.0);
    REQUEST_LATENCY
        .with_label_values(&[&HOST_NAME, &PROCESS_NAME, &PID_STRING, endpoint])
        .observe(duration.as_millis() as f64);
}

pub fn add_state_change_counter(endpoint: &str, from: &str, to: &str) {
    STATE_CHANGE_COUNTER
        .with_label_values(&[&HOST_NAME, &PROCESS_NAME, &PID_STRING, endpoint, from, to])
        .inc_by(1.0);
}

fn register_wrapper_metrics(registry: Option<Box<Registry>>) {
    let r = match registry {
        Some(ref r) => r,
        None => default_registry(),
    };
    for item in &*COUNTER_METRICS {
        r.register(Box::new(item.clone())).unwrap();
    }
    for item in &*HISTOGRAM_METRICS {
        r.register(Box::new(item.clone())).unwrap();
    }
}

pub fn reset_wrapper_metrics() {
    for item in &*COUNTER_METRICS {
        item.reset();
    }
    for item in &*HISTOGRAM_METRICS {
        item.reset();
    }
}

pub fn init() {
    INIT_ONCE.call_once(move || {
        // currently, `prometheus_exporter` crate only support global registry
        register_wrapper_metrics(None);
        let binding = config::exporter_addr().parse().unwrap();
        let metrics_path = config::exporter_metrics_path();
        let mut builder = Builder::new(binding);
        builder.with_endpoint(&metrics_path).unwrap();
        builder.start().unwrap();
    });
}
