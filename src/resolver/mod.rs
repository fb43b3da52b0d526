use http::Method;

/// Derives the isolation key (service name) from call metadata.
///
/// The service name is the unit of fault isolation: calls sharing a name
/// share one breaker decision. Implementations must be deterministic and
/// distinct enough that unrelated endpoints reached through one physical
/// client are not aggregated into one circuit.
pub trait ServiceNameResolver: Send + Sync {
    fn extract(&self, method: &Method, url: &str) -> String;
}

/// Default resolver: one circuit per endpoint and method.
///
/// A single client instance used against many endpoints (a scoped client)
/// is decomposed into independent circuits, so a failing endpoint does not
/// trip the breaker for the rest of the service.
#[derive(Debug, Clone)]
pub struct DefaultServiceNameResolver {
    service: String,
}

impl DefaultServiceNameResolver {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }
}

impl ServiceNameResolver for DefaultServiceNameResolver {
    fn extract(&self, method: &Method, url: &str) -> String {
        format!("{}.{}_{}", self.service, url, method)
    }
}
