mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use restfetch::{ClientOptions, Hooks, Registry};

#[tokio::test]
async fn concurrent_401s_trigger_a_single_refresh() {
    common::init_logging();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(header("Authorization", "Bearer t0"))
        .respond_with(ResponseTemplate::new(401))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(header("Authorization", "Bearer t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"payload": "ok"})))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"payload": {"token": "t1"}}))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let registry = Registry::new();
    let client = registry.get_or_create(
        "api",
        Some(ClientOptions::from_values(
            server.uri(),
            format!("{}/auth/refresh", server.uri()),
            Some("t0".into()),
        )),
    );
    let mut events = client.subscribe_refresh();

    let (a, b, c) = tokio::join!(
        client.get::<String>("a", None, None),
        client.get::<String>("b", None, None),
        client.get::<String>("c", None, None),
    );

    assert_eq!(a.as_deref(), Some("ok"));
    assert_eq!(b.as_deref(), Some("ok"));
    assert_eq!(c.as_deref(), Some("ok"));
    assert_eq!(client.token().as_deref(), Some("t1"));
    assert!(!client.refresh_in_flight());

    let event = events.recv().await.expect("refresh event");
    assert!(event.success);
    assert_eq!(event.key, "api");
    assert!(events.try_recv().is_err(), "expected exactly one refresh event");
}

#[tokio::test]
async fn instances_refresh_independently() {
    common::init_logging();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(header("Authorization", "Bearer old"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(header("Authorization", "Bearer new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"payload": 1})))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"payload": {"token": "new"}})))
        .expect(2)
        .mount(&server)
        .await;

    let registry = Registry::new();
    let options = || {
        ClientOptions::from_values(
            server.uri(),
            format!("{}/auth/refresh", server.uri()),
            Some("old".into()),
        )
    };
    let first = registry.get_or_create("first", Some(options()));
    let second = registry.get_or_create("second", Some(options()));

    let (a, b) = tokio::join!(
        first.get::<u32>("a", None, None),
        second.get::<u32>("b", None, None),
    );

    assert_eq!((a, b), (Some(1), Some(1)));
}

#[tokio::test]
async fn concurrent_401s_fail_together_when_refresh_is_rejected() {
    common::init_logging();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(header("Authorization", "Bearer t0"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"message": "session over"}))
                .set_delay(Duration::from_millis(300)),
        )
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

    let (a, b) = tokio::join!(
        client.get::<String>("a", None, None),
        client.get::<String>("b", None, None),
    );

    assert_eq!((a, b), (None, None));
    assert_eq!(refresh_failures.load(Ordering::SeqCst), 1);
    assert_eq!(response_errors.load(Ordering::SeqCst), 0);
    assert_eq!(client.token().as_deref(), Some("t0"));
}
