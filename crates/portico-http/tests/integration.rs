//! End-to-end provider/consumer tests against a live portal server.

use portico_core::{Address, CallContext, Portal, PortalError};
use portico_http::{
    HandlerError, HttpHandler, HttpPortal, HttpPortalConfig, RequireAuthMiddleware, http_handler,
};
use portico_schema::{FunctionSchema, ValueSchema};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

fn add_schema() -> FunctionSchema {
    FunctionSchema::builder("add")
        .description("sum of two numbers")
        .required_input("a", ValueSchema::Number)
        .required_input("b", ValueSchema::Number)
        .output(ValueSchema::Number)
        .build()
}

fn add_handler() -> HttpHandler {
    http_handler(|params: Value| async move {
        let a = params["a"].as_f64().ok_or_else(|| HandlerError::new("a must be a number"))?;
        let b = params["b"].as_f64().ok_or_else(|| HandlerError::new("b must be a number"))?;
        Ok(json!(a + b))
    })
}

fn test_config() -> HttpPortalConfig {
    HttpPortalConfig {
        host: "127.0.0.1".to_owned(),
        port: 0,
        base_path: "/api".to_owned(),
        default_timeout: Duration::from_secs(5),
        max_retries: 0,
        retry_delay: Duration::from_millis(20),
        ..Default::default()
    }
}

async fn started(config: HttpPortalConfig) -> Arc<HttpPortal> {
    let portal = Arc::new(HttpPortal::new(config).unwrap());
    portal.start_server().await.unwrap();
    portal
}

#[tokio::test]
async fn add_over_the_wire() {
    let portal = started(test_config()).await;
    let address = portal.generate_address("add", &add_handler()).unwrap();
    let port = portal.bound_addr().unwrap().port();
    assert!(
        address
            .as_str()
            .starts_with(&format!("http://127.0.0.1:{port}/api/add/"))
    );

    portal
        .apply(&address, add_schema(), add_handler())
        .await
        .unwrap();
    let function = portal.resolve_function(&address).await.unwrap();

    let result = function
        .call(&CallContext::background(), json!({"a": 2, "b": 3}))
        .await
        .unwrap();
    assert_eq!(result.as_f64(), Some(5.0));

    portal.stop_server(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn validation_rejects_before_the_handler_runs() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let counter = invocations.clone();
    let handler = http_handler(move |params: Value| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(params)
        }
    });

    let portal = started(test_config()).await;
    let address = portal.generate_address("add", &handler).unwrap();
    let function = portal.apply(&address, add_schema(), handler).await.unwrap();

    let error = function
        .call(&CallContext::background(), json!({"a": 2, "b": "x"}))
        .await
        .unwrap_err();
    assert!(matches!(error, PortalError::Validation { .. }));
    assert_eq!(invocations.load(Ordering::SeqCst), 0);

    portal.stop_server(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn handler_status_is_reflected() {
    let handler =
        http_handler(|_params: Value| async move {
            Err::<Value, _>(HandlerError::with_status(404, "no such record"))
        });

    let portal = started(test_config()).await;
    let address = portal.generate_address("lookup", &handler).unwrap();
    let schema = FunctionSchema::builder("lookup")
        .input("key", ValueSchema::String)
        .build();
    let function = portal.apply(&address, schema, handler).await.unwrap();

    let error = function
        .call(&CallContext::background(), json!({"key": "k"}))
        .await
        .unwrap_err();
    assert_eq!(error.status(), Some(404));
    assert!(error.to_string().contains("no such record"));

    portal.stop_server(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn retries_until_the_handler_recovers() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let handler = http_handler(move |_params: Value| {
        let counter = counter.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(HandlerError::with_status(503, "warming up"))
            } else {
                Ok(json!("ready"))
            }
        }
    });

    let mut config = test_config();
    config.max_retries = 2;
    let portal = started(config).await;
    let address = portal.generate_address("flaky", &handler).unwrap();
    let schema = FunctionSchema::builder("flaky").build();
    let function = portal.apply(&address, schema, handler).await.unwrap();

    let result = function
        .call(&CallContext::background(), json!({}))
        .await
        .unwrap();
    assert_eq!(result, json!("ready"));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);

    portal.stop_server(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn caller_timeout_bounds_a_blocking_handler() {
    let handler = http_handler(|_params: Value| async move {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(json!("too late"))
    });

    let portal = started(test_config()).await;
    let address = portal.generate_address("slow", &handler).unwrap();
    let schema = FunctionSchema::builder("slow").build();
    let function = portal.apply(&address, schema, handler).await.unwrap();

    let started_at = Instant::now();
    let error = function
        .call(
            &CallContext::with_timeout(Duration::from_millis(200)),
            json!({}),
        )
        .await
        .unwrap_err();
    assert!(error.is_timeout(), "expected timeout, got {error}");
    assert!(
        started_at.elapsed() < Duration::from_secs(2),
        "timeout did not bound the call"
    );

    portal.stop_server(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn remote_portal_resolves_via_served_schema() {
    let provider = started(test_config()).await;
    let address = provider.generate_address("add", &add_handler()).unwrap();
    provider
        .apply(&address, add_schema(), add_handler())
        .await
        .unwrap();

    // A separate portal with no local registration: schema comes off the
    // wire, and validation still gates client-side.
    let remote = HttpPortal::new(test_config()).unwrap();
    let function = remote.resolve_function(&address).await.unwrap();
    assert_eq!(function.schema().name(), "add");

    let result = function
        .call(&CallContext::background(), json!({"a": 2, "b": 3}))
        .await
        .unwrap();
    assert_eq!(result.as_f64(), Some(5.0));

    let error = function
        .call(&CallContext::background(), json!({"a": 2, "b": "x"}))
        .await
        .unwrap_err();
    assert!(matches!(error, PortalError::Validation { .. }));

    provider.stop_server(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn non_post_is_rejected() {
    let portal = started(test_config()).await;
    let address = portal.generate_address("add", &add_handler()).unwrap();
    portal
        .apply(&address, add_schema(), add_handler())
        .await
        .unwrap();

    let response = reqwest::get(address.as_str()).await.unwrap();
    assert_eq!(response.status().as_u16(), 405);

    portal.stop_server(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn direct_post_with_bad_body_gets_400() {
    let portal = started(test_config()).await;
    let address = portal.generate_address("add", &add_handler()).unwrap();
    portal
        .apply(&address, add_schema(), add_handler())
        .await
        .unwrap();

    let client = reqwest::Client::new();
    let not_json = client
        .post(address.as_str())
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(not_json.status().as_u16(), 400);

    let not_object = client
        .post(address.as_str())
        .json(&json!([1, 2]))
        .send()
        .await
        .unwrap();
    assert_eq!(not_object.status().as_u16(), 400);

    let bad_params = client
        .post(address.as_str())
        .json(&json!({"a": 1, "b": "x"}))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_params.status().as_u16(), 400);
    let body: Value = bad_params.json().await.unwrap();
    assert!(body["details"].is_array());

    portal.stop_server(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn request_middleware_short_circuits_server_side() {
    let config = test_config();
    let portal = Arc::new(
        HttpPortal::with_middleware(config, vec![Arc::new(RequireAuthMiddleware)]).unwrap(),
    );
    portal.start_server().await.unwrap();

    let address = portal.generate_address("add", &add_handler()).unwrap();
    portal
        .apply(&address, add_schema(), add_handler())
        .await
        .unwrap();

    let client = reqwest::Client::new();
    let bare = client
        .post(address.as_str())
        .json(&json!({"a": 1, "b": 2}))
        .send()
        .await
        .unwrap();
    assert_eq!(bare.status().as_u16(), 400);

    let authed = client
        .post(address.as_str())
        .bearer_auth("token")
        .json(&json!({"a": 1, "b": 2}))
        .send()
        .await
        .unwrap();
    assert_eq!(authed.status().as_u16(), 200);

    portal.stop_server(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn shutdown_drains_in_flight_requests_and_is_idempotent() {
    let handler = http_handler(|_params: Value| async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(json!("done"))
    });

    let portal = started(test_config()).await;
    let address = portal.generate_address("slowish", &handler).unwrap();
    let schema = FunctionSchema::builder("slowish").build();
    let function = portal.apply(&address, schema, handler).await.unwrap();

    let in_flight =
        tokio::spawn(async move { function.call(&CallContext::background(), json!({})).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    portal.stop_server(Duration::from_secs(2)).await;
    let result = in_flight.await.unwrap().unwrap();
    assert_eq!(result, json!("done"));

    // second stop is a no-op
    portal.stop_server(Duration::from_secs(2)).await;

    // and the listener is really gone
    let resolved = portal.resolve_function(&address).await.unwrap();
    let error = resolved
        .call(&CallContext::background(), json!({}))
        .await
        .unwrap_err();
    assert!(matches!(error, PortalError::Transport { .. }));
}

#[tokio::test]
async fn tls_flag_changes_the_address_scheme_only() {
    let mut config = test_config();
    config.tls = true;

    // Still starts (with a warning): the plain listener is what a
    // terminating proxy would forward to.
    let portal = started(config).await;
    let port = portal.bound_addr().unwrap().port();
    let address = portal.generate_address("add", &add_handler()).unwrap();
    assert!(
        address
            .as_str()
            .starts_with(&format!("https://127.0.0.1:{port}/api/add/"))
    );
    assert_eq!(address.scheme(), "https");

    portal.stop_server(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn foreign_address_resolution_fails_cleanly() {
    let portal = HttpPortal::new(test_config()).unwrap();
    let address = Address::parse("script://rhai/add/1").unwrap();
    let error = portal.resolve_function(&address).await.err().unwrap();
    assert!(matches!(error, PortalError::Address { .. }));
}
