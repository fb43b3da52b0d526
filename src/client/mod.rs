//! Guarded HTTP client.
//!
//! [`GuardedClient`] decorates a [`reqwest::Client`] with the circuit
//! breaker's allow/record protocol. Short-circuited calls surface as
//! [`FuseError::CircuitOpen`] rather than a network error, so callers can
//! tell "dependency refused" apart from "breaker protecting you".

use crate::breaker::CircuitBreaker;
use crate::clock::{Clock, SystemClock};
use crate::config::BreakerSettings;
use crate::error::{FuseError, Result};
use crate::resolver::{DefaultServiceNameResolver, ServiceNameResolver};
use crate::storage::{memory::MemoryStorage, Storage};
use http::Method;
use std::sync::Arc;
use tracing::debug;

/// HTTP client decorated with a circuit breaker
#[derive(Clone)]
pub struct GuardedClient {
    client: reqwest::Client,
    breaker: CircuitBreaker,
    resolver: Arc<dyn ServiceNameResolver>,
}

impl std::fmt::Debug for GuardedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedClient").finish_non_exhaustive()
    }
}

impl GuardedClient {
    pub fn builder(service: impl Into<String>) -> GuardedClientBuilder {
        GuardedClientBuilder::new(service)
    }

    /// Execute a prepared request under the breaker.
    ///
    /// Transport errors and 5xx responses count as failures; any response
    /// the dependency produced itself (including 4xx) counts as a success.
    /// A denied call never reaches the network and never records an
    /// outcome.
    pub async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        let service = self
            .resolver
            .extract(request.method(), request.url().as_str());

        if !self.breaker.allow(&service).await {
            debug!(service = %service, "short-circuiting call");
            return Err(FuseError::CircuitOpen { service });
        }

        match self.client.execute(request).await {
            Ok(response) => {
                if response.status().is_server_error() {
                    self.breaker.record_failure(&service).await;
                } else {
                    self.breaker.record_success(&service).await;
                }
                Ok(response)
            }
            Err(e) => {
                self.breaker.record_failure(&service).await;
                Err(FuseError::Http(e))
            }
        }
    }

    pub async fn request(&self, method: Method, url: &str) -> Result<reqwest::Response> {
        let request = self.client.request(method, url).build()?;
        self.execute(request).await
    }

    pub async fn get(&self, url: &str) -> Result<reqwest::Response> {
        self.request(Method::GET, url).await
    }

    pub async fn post(&self, url: &str) -> Result<reqwest::Response> {
        self.request(Method::POST, url).await
    }

    pub async fn put(&self, url: &str) -> Result<reqwest::Response> {
        self.request(Method::PUT, url).await
    }

    pub async fn delete(&self, url: &str) -> Result<reqwest::Response> {
        self.request(Method::DELETE, url).await
    }

    /// The breaker backing this client, for inspection
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

/// Composition-time factory binding one client to one breaker declaration.
///
/// The declaration is resolved exactly once at `build()` into an immutable
/// config + strategy + storage binding; configuration problems abort setup
/// before any traffic flows.
pub struct GuardedClientBuilder {
    service: String,
    client: Option<reqwest::Client>,
    settings: Option<BreakerSettings>,
    duplicate: bool,
    storage: Option<Arc<dyn Storage>>,
    resolver: Option<Arc<dyn ServiceNameResolver>>,
    clock: Option<Arc<dyn Clock>>,
}

impl GuardedClientBuilder {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            client: None,
            settings: None,
            duplicate: false,
            storage: None,
            resolver: None,
            clock: None,
        }
    }

    /// Declare the breaker for this client. Exactly one declaration is
    /// expected; a second one fails `build()`.
    pub fn breaker(mut self, settings: BreakerSettings) -> Self {
        if self.settings.is_some() {
            self.duplicate = true;
        }
        self.settings = Some(settings);
        self
    }

    /// Decorate an existing client instead of a fresh one
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Share a storage backend across clients or processes
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Override how service names are derived from calls
    pub fn resolver(mut self, resolver: Arc<dyn ServiceNameResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Override the time source (tests)
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<GuardedClient> {
        if self.duplicate {
            return Err(FuseError::DuplicateDecoration(self.service));
        }

        let settings = self.settings.ok_or_else(|| {
            FuseError::Config(format!(
                "no circuit breaker declared for client '{}'",
                self.service
            ))
        })?;
        let config = settings.validate()?;

        let storage = self.storage.unwrap_or_else(|| match config.window_secs() {
            Some(window) => Arc::new(MemoryStorage::windowed(window)),
            None => Arc::new(MemoryStorage::new()),
        });
        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(DefaultServiceNameResolver::new(self.service.clone())));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        Ok(GuardedClient {
            client: self.client.unwrap_or_default(),
            breaker: CircuitBreaker::new(config, storage, clock),
            resolver,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_with_defaults() {
        let client = GuardedClient::builder("payments")
            .breaker(BreakerSettings::count())
            .build();

        assert!(client.is_ok());
    }

    #[test]
    fn test_missing_declaration_fails_setup() {
        let err = GuardedClient::builder("payments").build().unwrap_err();

        assert!(matches!(err, FuseError::Config(_)), "got {:?}", err);
    }

    #[test]
    fn test_duplicate_declaration_fails_setup() {
        let err = GuardedClient::builder("payments")
            .breaker(BreakerSettings::count())
            .breaker(BreakerSettings::rate())
            .build()
            .unwrap_err();

        assert!(
            matches!(err, FuseError::DuplicateDecoration(ref service) if service == "payments"),
            "got {:?}",
            err
        );
    }

    #[test]
    fn test_invalid_settings_fail_setup() {
        let mut settings = BreakerSettings::count();
        settings.minimum_requests = Some(10);

        let err = GuardedClient::builder("payments")
            .breaker(settings)
            .build()
            .unwrap_err();

        assert!(matches!(err, FuseError::Config(_)), "got {:?}", err);
    }

    #[test]
    fn test_custom_resolver_is_used() {
        struct HostOnly;

        impl ServiceNameResolver for HostOnly {
            fn extract(&self, _method: &Method, _url: &str) -> String {
                "everything".to_string()
            }
        }

        let client = GuardedClient::builder("payments")
            .breaker(BreakerSettings::count())
            .resolver(Arc::new(HostOnly))
            .build()
            .unwrap();

        assert_eq!(
            client.resolver.extract(&Method::GET, "https://a.example"),
            "everything"
        );
    }
}
