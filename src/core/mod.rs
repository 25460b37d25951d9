pub mod base;
// circuit breaker state machine
pub mod breaker;
pub mod config;
// request orchestration: limiter -> breaker -> transport -> retry
pub mod dispatch;
// per-endpoint state registry
pub mod endpoint;
// token bucket admission
pub mod limiter;
// statistic shards and snapshots
pub mod metrics;
// retry/backoff decisions
pub mod retry;
