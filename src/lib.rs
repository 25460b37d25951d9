#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, allow(unused_attributes))]

//! # HTTPWrapper
//!
//! HTTPWrapper is a resilient outbound-HTTP dispatch layer. It sits between
//! application code and remote HTTP endpoints and applies **retry with
//! backoff**, **circuit breaking**, **token-bucket rate limiting** and
//! **timeout enforcement** to every call, while recording per-endpoint
//! latency/outcome metrics. Call sites no longer need ad-hoc retry loops.
//!
//! Generally, there are a few steps when using HTTPWrapper:
//! 1. Initialize the global configuration (defaults, from a YAML file, or
//!    from a hand-crafted `ConfigEntity`).
//! 2. Build a `Client` around a `Transport` implementation and register
//!    per-endpoint configuration.
//! 3. Dispatch requests through `Client::execute` or the verb helpers.
//!
//! ## Add Dependency
//!
//! ```toml
//! [dependencies]
//! httpwrapper = { version = "0.1.0", features = ["full"] }
//! ```
//!
//! Optional features:
//! - exporter: Export metric statistics to Prometheus on a dedicated port.
//! - logger_env: Use `env_logger` to initialize logging.
//! - logger_log4rs: Use `log4rs` to initialize logging.
//!
//! ## Dispatching a request
//!
//! ```rust
//! use httpwrapper::api::ClientBuilder;
//! use httpwrapper::base::{Method, Request};
//! use httpwrapper::config::EndpointConfig;
//!
//! let client = ClientBuilder::new(transport)
//!     .with_endpoint(
//!         "orders-api",
//!         EndpointConfig {
//!             max_attempts: 3,
//!             failure_threshold: 5,
//!             ..Default::default()
//!         },
//!     )
//!     .build()
//!     .unwrap();
//!
//! let request = Request::new("orders-api", Method::Get, "https://orders.internal/v1/orders");
//! match client.execute(&request) {
//!     Ok(response) => { /* 2xx/3xx response */ }
//!     Err(err) => { /* rejected, circuit open, exhausted, ... */ }
//! }
//! ```
//!
//! Every attempt and every logical request is recorded by the
//! `MetricsCollector`; a point-in-time snapshot is available through the
//! client, and the `exporter` feature serves the same counters/histograms on a
//! Prometheus pull endpoint distinct from application traffic.
//!
// This module is not intended to be part of the public API. In general, any
// `doc(hidden)` code is not part of HTTPWrapper's public and stable API.
#[macro_use]
#[doc(hidden)]
pub mod macros;

/// HTTPWrapper client API
pub mod api;
/// Core implementations of HTTPWrapper: the request dispatcher, the
/// per-endpoint circuit breaker state machine, the retry/backoff policy,
/// the token-bucket rate limiter and the metrics aggregation path.
pub mod core;
/// Adapters for different logging crates.
pub mod logging;
cfg_exporter! {
    /// Metric exporter implementation. Currently, only Prometheus is supported.
    pub mod exporter;
}
// Utility functions for HTTPWrapper.
pub mod utils;

// re-export preludes
pub use crate::core::*;
pub use api::*;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
