//! Endpoint registry. Each named endpoint owns one circuit breaker, one token
//! bucket and one retry policy, shared by every dispatch that targets it.

use crate::breaker::{self, CircuitBreaker};
use crate::config::{EndpointConfig, DEFAULT_MAX_ENDPOINT_AMOUNT};
use crate::limiter::TokenBucket;
use crate::logging;
use crate::retry::RetryPolicy;
use crate::Result;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// The resilience state of one endpoint. Constructed once at registration (or
/// first use) and shared across dispatches.
#[derive(Debug)]
pub struct EndpointState {
    name: String,
    config: EndpointConfig,
    breaker: CircuitBreaker,
    bucket: TokenBucket,
    policy: RetryPolicy,
}

impl EndpointState {
    fn new<S: Into<String>>(name: S, config: EndpointConfig) -> Self {
        let name = name.into();
        EndpointState {
            breaker: CircuitBreaker::new(name.clone(), &config),
            bucket: TokenBucket::new(&config),
            policy: RetryPolicy::new(&config),
            name,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn bucket(&self) -> &TokenBucket {
        &self.bucket
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

/// Maps endpoint names to their shared state. Unregistered endpoints are
/// created on first dispatch from the default configuration.
#[derive(Debug)]
pub struct Registry {
    endpoints: RwLock<HashMap<String, Arc<EndpointState>>>,
    defaults: EndpointConfig,
}

impl Registry {
    pub fn new(defaults: EndpointConfig) -> Self {
        Registry {
            endpoints: RwLock::new(HashMap::new()),
            defaults,
        }
    }

    pub fn defaults(&self) -> &EndpointConfig {
        &self.defaults
    }

    /// Registers `endpoint` with an explicit configuration, replacing any
    /// state created earlier for that name. Validation failures leave the
    /// registry untouched.
    pub fn register<S: Into<String>>(&self, endpoint: S, config: EndpointConfig) -> Result<()> {
        config.is_valid()?;
        let endpoint = endpoint.into();
        let state = Arc::new(EndpointState::new(endpoint.clone(), config));
        self.endpoints.write().unwrap().insert(endpoint, state);
        Ok(())
    }

    pub fn get(&self, endpoint: &str) -> Option<Arc<EndpointState>> {
        self.endpoints.read().unwrap().get(endpoint).cloned()
    }

    /// Looks up `endpoint`, creating it from the defaults on first use.
    pub fn get_or_create(&self, endpoint: &str) -> Arc<EndpointState> {
        if let Some(state) = self.get(endpoint) {
            return state;
        }
        let mut endpoints = self.endpoints.write().unwrap();
        if endpoints.len() >= DEFAULT_MAX_ENDPOINT_AMOUNT {
            // The state is still created so dispatch proceeds, but an
            // unbounded set of endpoint names is almost always a naming bug.
            logging::warn!(
                "[Registry] Size exceeds the max amount, amount: {}, endpoint: {}",
                endpoints.len(),
                endpoint
            );
        }
        Arc::clone(
            endpoints
                .entry(endpoint.into())
                .or_insert_with(|| Arc::new(EndpointState::new(endpoint, self.defaults.clone()))),
        )
    }

    /// Current breaker state of `endpoint`, if it exists.
    pub fn breaker_state(&self, endpoint: &str) -> Option<breaker::State> {
        self.get(endpoint).map(|s| s.breaker().current_state())
    }

    pub fn len(&self) -> usize {
        self.endpoints.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.read().unwrap().is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new(crate::config::default_endpoint_config())
    }
}
