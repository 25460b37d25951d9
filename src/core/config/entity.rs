use super::constant::*;
use crate::retry::BackoffStrategy;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json;
use std::fmt;
use std::time::Duration;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AppConfig {
    // app_name represents the name of current running service.
    pub app_name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            app_name: DEFAULT_APP_NAME.into(),
        }
    }
}

// ExporterConfig represents metrics pull endpoint settings
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ExporterConfig {
    pub addr: String,
    pub metrics_path: String,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        ExporterConfig {
            addr: EXPORTER_ADDR.into(),
            metrics_path: EXPORTER_METRICS_PATH.into(),
        }
    }
}

// LogConfig represents the configuration of logging in HTTPWrapper.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LogConfig {
    pub exporter: ExporterConfig,
    pub config_file: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            exporter: ExporterConfig::default(),
            config_file: LOG_CONFIG_FILE.into(),
        }
    }
}

/// `EndpointConfig` encompasses the resilience settings of one endpoint.
/// Supplied at endpoint-registration time; unregistered endpoints use the
/// configured defaults.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EndpointConfig {
    /// Attempt cap per logical request, first try included.
    pub max_attempts: u32,
    /// Base backoff delay (in ms) for the first retry.
    pub base_delay_ms: u64,
    /// Upper bound (in ms) on any single backoff delay.
    pub cap_delay_ms: u64,
    pub backoff_strategy: BackoffStrategy,
    /// Whether backoff delays are drawn uniformly from [0, bound] (full
    /// jitter) instead of using the bound directly.
    pub jitter: bool,
    /// Consecutive breaker failures that trip the circuit Closed -> Open.
    pub failure_threshold: u32,
    /// Consecutive half-open probe successes required to close the circuit.
    pub success_threshold: u32,
    /// Cool-down (in ms) after the circuit opens. Doubles on each re-open
    /// up to `cool_down_cap_ms` and resets on close.
    pub cool_down_base_ms: u64,
    pub cool_down_cap_ms: u64,
    /// Token bucket capacity.
    pub bucket_capacity: f64,
    /// Token bucket refill rate, in tokens per second.
    pub refill_rate: f64,
    /// Overall deadline (in ms) across all attempts of one logical request.
    pub per_request_deadline_ms: u64,
    /// Timeout (in ms) for a single transport attempt.
    pub attempt_timeout_ms: u64,
    /// Extra status codes treated as transient in addition to 5xx and 429.
    pub retryable_statuses: Vec<u16>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        EndpointConfig {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            cap_delay_ms: DEFAULT_CAP_DELAY_MS,
            backoff_strategy: BackoffStrategy::default(),
            jitter: true,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
            cool_down_base_ms: DEFAULT_COOL_DOWN_BASE_MS,
            cool_down_cap_ms: DEFAULT_COOL_DOWN_CAP_MS,
            bucket_capacity: DEFAULT_BUCKET_CAPACITY,
            refill_rate: DEFAULT_REFILL_RATE,
            per_request_deadline_ms: DEFAULT_PER_REQUEST_DEADLINE_MS,
            attempt_timeout_ms: DEFAULT_ATTEMPT_TIMEOUT_MS,
            retryable_statuses: Vec::new(),
        }
    }
}

impl EndpointConfig {
    pub fn is_valid(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::msg("invalid max_attempts"));
        }
        if self.cap_delay_ms < self.base_delay_ms {
            return Err(Error::msg("cap_delay_ms must be >= base_delay_ms"));
        }
        if self.failure_threshold == 0 {
            return Err(Error::msg("invalid failure_threshold"));
        }
        if self.success_threshold == 0 {
            return Err(Error::msg("invalid success_threshold"));
        }
        if self.cool_down_base_ms == 0 {
            return Err(Error::msg("invalid cool_down_base_ms"));
        }
        if self.cool_down_cap_ms < self.cool_down_base_ms {
            return Err(Error::msg("cool_down_cap_ms must be >= cool_down_base_ms"));
        }
        if self.bucket_capacity < 1.0 {
            return Err(Error::msg("invalid bucket_capacity"));
        }
        if self.refill_rate <= 0.0 {
            return Err(Error::msg("invalid refill_rate"));
        }
        if self.per_request_deadline_ms == 0 {
            return Err(Error::msg("invalid per_request_deadline_ms"));
        }
        if self.attempt_timeout_ms == 0 {
            return Err(Error::msg("invalid attempt_timeout_ms"));
        }
        Ok(())
    }

    pub fn per_request_deadline(&self) -> Duration {
        Duration::from_millis(self.per_request_deadline_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

impl fmt::Display for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmtted = serde_json::to_string_pretty(self).unwrap();
        write!(f, "{}", fmtted)
    }
}

// WrapperConfig represents the general configuration of HTTPWrapper.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct WrapperConfig {
    pub app: AppConfig,
    pub log: LogConfig,
    // defaults applied to endpoints without explicit registration
    pub defaults: EndpointConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ConfigEntity {
    pub version: String,
    pub config: WrapperConfig,
}

impl Default for ConfigEntity {
    fn default() -> Self {
        ConfigEntity {
            version: HTTPWRAPPER_VERSION.into(),
            config: WrapperConfig::default(),
        }
    }
}

impl ConfigEntity {
    pub fn new() -> Self {
        ConfigEntity::default()
    }

    pub fn check(&self) -> Result<()> {
        if self.version.is_empty() {
            return Err(Error::msg("empty version"));
        }
        if self.config.app.app_name.is_empty() {
            return Err(Error::msg("empty app name"));
        }
        self.config.defaults.is_valid()?;
        Ok(())
    }
}

impl fmt::Display for ConfigEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmtted = serde_json::to_string_pretty(self).unwrap();
        write!(f, "{}", fmtted)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_entity_checks() {
        let entity = ConfigEntity::new();
        assert!(entity.check().is_ok());
        assert_eq!(entity.config.defaults.max_attempts, 3);
        assert!(entity.config.defaults.jitter);
    }

    #[test]
    #[should_panic(expected = "invalid max_attempts")]
    fn illegal_max_attempts() {
        let config = EndpointConfig {
            max_attempts: 0,
            ..Default::default()
        };
        config.is_valid().unwrap();
    }

    #[test]
    #[should_panic(expected = "cap_delay_ms must be >= base_delay_ms")]
    fn illegal_delay_bounds() {
        let config = EndpointConfig {
            base_delay_ms: 500,
            cap_delay_ms: 100,
            ..Default::default()
        };
        config.is_valid().unwrap();
    }

    #[test]
    #[should_panic(expected = "invalid refill_rate")]
    fn illegal_refill_rate() {
        let config = EndpointConfig {
            refill_rate: 0.0,
            ..Default::default()
        };
        config.is_valid().unwrap();
    }

    #[test]
    fn yaml_round_trip_defaults() {
        let yaml = "max_attempts: 5\nbase_delay_ms: 50\n";
        let config: EndpointConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.base_delay_ms, 50);
        // unspecified fields fall back to defaults
        assert_eq!(config.cap_delay_ms, DEFAULT_CAP_DELAY_MS);
        assert_eq!(config.failure_threshold, DEFAULT_FAILURE_THRESHOLD);
    }
}
