use crate::base::{DispatchError, Method, Request, Response};
use crate::breaker;
use crate::config::{self, EndpointConfig};
use crate::dispatch::{CancelToken, Dispatcher, Transport};
use crate::endpoint::Registry;
use crate::metrics::MetricsSnapshot;
use crate::Result;
use std::sync::Arc;

/// Builder for [`Client`]. Endpoint configurations supplied here are
/// validated at `build` time.
pub struct ClientBuilder {
    transport: Arc<dyn Transport>,
    defaults: EndpointConfig,
    endpoints: Vec<(String, EndpointConfig)>,
}

impl ClientBuilder {
    pub fn new<T: Transport + 'static>(transport: T) -> Self {
        ClientBuilder {
            transport: Arc::new(transport),
            defaults: config::default_endpoint_config(),
            endpoints: Vec::new(),
        }
    }

    /// Overrides the defaults applied to endpoints without an explicit
    /// registration.
    pub fn with_defaults(mut self, defaults: EndpointConfig) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S, config: EndpointConfig) -> Self {
        self.endpoints.push((endpoint.into(), config));
        self
    }

    pub fn build(self) -> Result<Client> {
        self.defaults.is_valid()?;
        let registry = Arc::new(Registry::new(self.defaults));
        for (endpoint, config) in self.endpoints {
            registry.register(endpoint, config)?;
        }
        Ok(Client {
            dispatcher: Dispatcher::new(registry, self.transport),
        })
    }
}

/// A resilient HTTP client facade. Cheap to share behind an `Arc`; all state
/// lives in the per-endpoint registry and the metrics collector.
pub struct Client {
    dispatcher: Dispatcher,
}

impl Client {
    /// Registers (or replaces) the configuration of one endpoint at runtime.
    pub fn register_endpoint<S: Into<String>>(
        &self,
        endpoint: S,
        config: EndpointConfig,
    ) -> Result<()> {
        self.dispatcher.registry().register(endpoint, config)
    }

    pub fn execute(&self, request: &Request) -> std::result::Result<Response, DispatchError> {
        self.dispatcher.execute(request)
    }

    pub fn execute_cancellable(
        &self,
        request: &Request,
        token: &CancelToken,
    ) -> std::result::Result<Response, DispatchError> {
        self.dispatcher.execute_cancellable(request, token)
    }

    pub fn get(&self, endpoint: &str, url: &str) -> std::result::Result<Response, DispatchError> {
        self.execute(&Request::new(endpoint, Method::Get, url))
    }

    pub fn head(&self, endpoint: &str, url: &str) -> std::result::Result<Response, DispatchError> {
        self.execute(&Request::new(endpoint, Method::Head, url))
    }

    pub fn delete(
        &self,
        endpoint: &str,
        url: &str,
    ) -> std::result::Result<Response, DispatchError> {
        self.execute(&Request::new(endpoint, Method::Delete, url))
    }

    pub fn post(
        &self,
        endpoint: &str,
        url: &str,
        body: Vec<u8>,
    ) -> std::result::Result<Response, DispatchError> {
        self.execute(&Request::new(endpoint, Method::Post, url).with_body(body))
    }

    pub fn put(
        &self,
        endpoint: &str,
        url: &str,
        body: Vec<u8>,
    ) -> std::result::Result<Response, DispatchError> {
        self.execute(&Request::new(endpoint, Method::Put, url).with_body(body))
    }

    pub fn patch(
        &self,
        endpoint: &str,
        url: &str,
        body: Vec<u8>,
    ) -> std::result::Result<Response, DispatchError> {
        self.execute(&Request::new(endpoint, Method::Patch, url).with_body(body))
    }

    /// Current circuit breaker state of `endpoint`, `None` until its first
    /// registration or dispatch.
    pub fn breaker_state(&self, endpoint: &str) -> Option<breaker::State> {
        self.dispatcher.registry().breaker_state(endpoint)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.dispatcher.metrics()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::TransportError;
    use std::time::Duration;

    struct StaticTransport(u16);

    impl Transport for StaticTransport {
        fn send(
            &self,
            _request: &Request,
            _timeout: Duration,
        ) -> std::result::Result<Response, TransportError> {
            Ok(Response::new(self.0))
        }
    }

    #[test]
    fn builder_validates_endpoint_configs() {
        let result = ClientBuilder::new(StaticTransport(200))
            .with_endpoint(
                "bad",
                EndpointConfig {
                    failure_threshold: 0,
                    ..Default::default()
                },
            )
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn verb_helpers_dispatch() {
        let client = ClientBuilder::new(StaticTransport(200)).build().unwrap();
        assert_eq!(client.get("abc", "http://upstream/x").unwrap().status, 200);
        assert_eq!(
            client
                .post("abc", "http://upstream/x", b"{}".to_vec())
                .unwrap()
                .status,
            200
        );
        let snap = client.metrics();
        assert_eq!(snap.total_requests(), 2);
    }

    #[test]
    fn breaker_state_visible_through_client() {
        let client = ClientBuilder::new(StaticTransport(200))
            .with_endpoint("abc", EndpointConfig::default())
            .build()
            .unwrap();
        assert_eq!(
            client.breaker_state("abc"),
            Some(crate::breaker::State::Closed)
        );
        assert_eq!(client.breaker_state("unknown"), None);
    }
}
