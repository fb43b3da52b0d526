use http::Method;
use httpfuse::{
    BreakerSettings, Clock, DefaultServiceNameResolver, FuseError, GuardedClient, ManualClock,
    ServiceNameResolver,
};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn trip_on_first_failure() -> BreakerSettings {
    let mut settings = BreakerSettings::count();
    settings.failure_count_threshold = Some(1);
    settings
}

#[tokio::test]
async fn test_denied_call_never_reaches_dependency() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let client = GuardedClient::builder("test")
        .breaker(trip_on_first_failure())
        .build()
        .expect("client builds");
    let url = format!("{}/flaky", server.uri());

    // first call reaches the dependency and records the failure
    let response = client.get(&url).await.expect("response returned");
    assert_eq!(response.status(), 500);

    // second call is short-circuited; the mock's expect(1) verifies the
    // dependency saw exactly one request
    let err = client.get(&url).await.unwrap_err();
    assert!(err.is_circuit_open(), "got {:?}", err);

    // a denied call records no outcome
    let service = DefaultServiceNameResolver::new("test").extract(&Method::GET, &url);
    let metrics = client.breaker().metrics(&service).expect("metrics exist");
    assert_eq!(metrics.failed_requests, 1);
    assert_eq!(metrics.rejected_requests, 1);
}

#[tokio::test]
async fn test_circuit_open_is_distinct_from_transport_error() {
    // nothing listens on port 1: the first call is a transport error
    let client = GuardedClient::builder("test")
        .breaker(trip_on_first_failure())
        .build()
        .expect("client builds");
    let url = "http://127.0.0.1:1/unreachable";

    let first = client.get(url).await.unwrap_err();
    assert!(matches!(first, FuseError::Http(_)), "got {:?}", first);

    let second = client.get(url).await.unwrap_err();
    assert!(
        matches!(second, FuseError::CircuitOpen { .. }),
        "got {:?}",
        second
    );
}

#[tokio::test]
async fn test_endpoints_on_one_client_are_isolated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = GuardedClient::builder("test")
        .breaker(trip_on_first_failure())
        .build()
        .expect("client builds");

    // trip the circuit for /a
    let response = client.get(&format!("{}/a", server.uri())).await.unwrap();
    assert_eq!(response.status(), 500);
    let err = client.get(&format!("{}/a", server.uri())).await.unwrap_err();
    assert!(err.is_circuit_open());

    // /b is a different service name and still flows
    let response = client.get(&format!("{}/b", server.uri())).await.unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_client_errors_do_not_trip_the_breaker() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(3)
        .mount(&server)
        .await;

    let client = GuardedClient::builder("test")
        .breaker(trip_on_first_failure())
        .build()
        .expect("client builds");
    let url = format!("{}/missing", server.uri());

    // the dependency answered: 4xx is the caller's problem, not an outage
    for _ in 0..3 {
        let response = client.get(&url).await.expect("response returned");
        assert_eq!(response.status(), 404);
    }
}

#[tokio::test]
async fn test_probe_recovery_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/recovering"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/recovering"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new(100));
    let client = GuardedClient::builder("test")
        .breaker(trip_on_first_failure())
        .clock(Arc::clone(&clock) as Arc<dyn Clock>)
        .build()
        .expect("client builds");
    let url = format!("{}/recovering", server.uri());

    // dependency down: circuit opens
    let response = client.get(&url).await.unwrap();
    assert_eq!(response.status(), 500);
    assert!(client.get(&url).await.unwrap_err().is_circuit_open());

    // cooldown elapses, the probe goes through and the dependency recovered
    clock.advance(5);
    let response = client.get(&url).await.expect("probe admitted");
    assert_eq!(response.status(), 200);

    // circuit closed again, traffic flows
    let response = client.get(&url).await.expect("traffic restored");
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_post_uses_its_own_circuit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = GuardedClient::builder("test")
        .breaker(trip_on_first_failure())
        .build()
        .expect("client builds");
    let url = format!("{}/orders", server.uri());

    let response = client.post(&url).await.unwrap();
    assert_eq!(response.status(), 500);
    assert!(client.post(&url).await.unwrap_err().is_circuit_open());

    // same path, different method, different circuit
    let response = client.get(&url).await.unwrap();
    assert_eq!(response.status(), 200);
}
