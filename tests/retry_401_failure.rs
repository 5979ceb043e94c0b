mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use restfetch::{ClientOptions, Hooks, Registry};

#[tokio::test]
async fn rejected_refresh_calls_hook_and_returns_none() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/me"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "session over"})))
        .expect(1)
        .mount(&server)
        .await;

    let refresh_failures = Arc::new(AtomicUsize::new(0));
    let response_errors = Arc::new(AtomicUsize::new(0));
    let hooks = {
        let refresh_failures = refresh_failures.clone();
        let response_errors = response_errors.clone();
        Hooks::default()
            .on_error_refresh(move || {
                refresh_failures.fetch_add(1, Ordering::SeqCst);
            })
            .on_error_response(move |_| {
                response_errors.fetch_add(1, Ordering::SeqCst);
            })
    };

    let registry = Registry::new();
    let client = registry.get_or_create(
        "api",
        Some(
            ClientOptions::from_values(
                server.uri(),
                format!("{}/auth/refresh", server.uri()),
                Some("t0".into()),
            )
            .with_hooks(hooks),
        ),
    );

    let (lines, guard) = common::capture_logs();
    let me: Option<Value> = client.get("me", None, None).await;
    drop(guard);

    assert_eq!(me, None);
    assert_eq!(refresh_failures.load(Ordering::SeqCst), 1);
    assert_eq!(response_errors.load(Ordering::SeqCst), 0);
    assert_eq!(client.token().as_deref(), Some("t0"));

    let logs = lines.lock().unwrap().clone();
    assert!(
        logs.iter()
            .any(|line| line.contains("ERROR") && line.contains("refresh.failure")),
        "expected refresh failure log, got: {:?}",
        logs
    );
}

#[tokio::test]
async fn unreachable_refresh_endpoint_is_reported_as_response_error() {
    common::init_logging();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/me"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let faults = Arc::new(AtomicUsize::new(0));
    let hooks = {
        let faults = faults.clone();
        Hooks::default().on_error_response(move |err| {
            assert!(err.status().is_none(), "unexpected status error: {err}");
            faults.fetch_add(1, Ordering::SeqCst);
        })
    };

    let registry = Registry::new();
    let client = registry.get_or_create(
        "api",
        Some(
            ClientOptions::from_values(server.uri(), "http://127.0.0.1:9/refresh", Some("t0".into()))
                .with_hooks(hooks),
        ),
    );

    let me: Option<Value> = client.get("me", None, None).await;

    assert_eq!(me, None);
    assert_eq!(faults.load(Ordering::SeqCst), 1);
}
