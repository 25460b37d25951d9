// default app settings
pub const HTTPWRAPPER_VERSION: &str = "v1";
pub const DEFAULT_APP_NAME: &str = "unknown_service";
pub const APP_NAME_ENV_KEY: &str = "HTTPWRAPPER_APP_NAME";
pub const CONF_FILE_PATH_ENV_KEY: &str = "HTTPWRAPPER_CONFIG_FILE_PATH";
pub const CONFIG_FILENAME: &str = "USE_DEFAULT_CONFIGURATION";

// default exporter settings
pub const EXPORTER_ADDR: &str = "127.0.0.1:9091";
pub const EXPORTER_METRICS_PATH: &str = "/metrics";

// default retry settings
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY_MS: u64 = 100;
pub const DEFAULT_CAP_DELAY_MS: u64 = 2000;

// default circuit breaker settings
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_SUCCESS_THRESHOLD: u32 = 1;
pub const DEFAULT_COOL_DOWN_BASE_MS: u64 = 5000;
pub const DEFAULT_COOL_DOWN_CAP_MS: u64 = 60_000;

// default rate limiter settings
pub const DEFAULT_BUCKET_CAPACITY: f64 = 100.0;
pub const DEFAULT_REFILL_RATE: f64 = 50.0;

// default timeout settings
pub const DEFAULT_PER_REQUEST_DEADLINE_MS: u64 = 10_000;
pub const DEFAULT_ATTEMPT_TIMEOUT_MS: u64 = 5000;

// default log settings
pub const DEFAULT_LOG_LEVEL: &str = "warn";
pub const LOG_CONFIG_FILE: &str = "testdata/config/log4rs.yaml";

// registry guard rail
pub const DEFAULT_MAX_ENDPOINT_AMOUNT: usize = 10_000;
