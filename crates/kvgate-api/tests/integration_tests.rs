//! End-to-end tests through the full router: login, batch write, batch read.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;

use common::{
    create_storage, create_test_app, create_test_app_with, login, post_json_with_token,
    write_body, ScriptedStore, CONCURRENT_CLIENT_COUNT,
};

#[tokio::test]
async fn test_login_write_read_flow() {
    let storage = create_storage();
    let token = login(create_test_app(&storage)).await;

    let (status, body) = post_json_with_token(
        create_test_app(&storage),
        "/api/write",
        Some(&token),
        write_body(&[
            ("user:1", json!({"name": "Ada"})),
            ("user:2", json!({"name": "Grace"})),
            ("counter", json!(42)),
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(storage.len(), 3);

    let (status, body) = post_json_with_token(
        create_test_app(&storage),
        "/api/read",
        Some(&token),
        json!({"keys": ["user:1", "user:2", "counter", "user:3"]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user:1"]["name"], "Ada");
    assert_eq!(body["data"]["user:2"]["name"], "Grace");
    assert_eq!(body["data"]["counter"], 42);
    assert!(body["data"]["user:3"].is_null());
}

#[tokio::test]
async fn test_overwrite_replaces_value() {
    let storage = create_storage();
    let token = login(create_test_app(&storage)).await;

    for value in [json!("first"), json!("second")] {
        let (status, _) = post_json_with_token(
            create_test_app(&storage),
            "/api/write",
            Some(&token),
            write_body(&[("k", value)]),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, body) = post_json_with_token(
        create_test_app(&storage),
        "/api/read",
        Some(&token),
        json!({"keys": ["k"]}),
    )
    .await;
    assert_eq!(body["data"]["k"], "second");
}

#[tokio::test]
async fn test_duplicate_read_keys_collapse_in_response() {
    let storage = Arc::new(ScriptedStore::new());
    let token = login(create_test_app(&storage)).await;

    let (status, body) = post_json_with_token(
        create_test_app(&storage),
        "/api/read",
        Some(&token),
        json!({"keys": ["a", "a", "b", "a"]}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_object().unwrap().len(), 2);
    assert_eq!(storage.calls(), 4);
}

#[tokio::test]
async fn test_large_batch_round_trip() {
    let storage = create_storage();
    let token = login(create_test_app(&storage)).await;

    let data: serde_json::Map<String, serde_json::Value> =
        (0..500).map(|i| (format!("key-{i}"), json!(i))).collect();
    let (status, _) = post_json_with_token(
        create_test_app(&storage),
        "/api/write",
        Some(&token),
        json!({"data": data}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let keys: Vec<String> = (0..500).map(|i| format!("key-{i}")).collect();
    let (status, body) = post_json_with_token(
        create_test_app(&storage),
        "/api/read",
        Some(&token),
        json!({"keys": keys}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let data = body["data"].as_object().unwrap();
    assert_eq!(data.len(), 500);
    for i in 0..500 {
        assert_eq!(data[&format!("key-{i}")], json!(i));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_clients() {
    let storage = create_storage();
    let token = login(create_test_app(&storage)).await;

    let mut handles = Vec::with_capacity(CONCURRENT_CLIENT_COUNT);
    for client in 0..CONCURRENT_CLIENT_COUNT {
        let storage = Arc::clone(&storage);
        let token = token.clone();
        handles.push(tokio::spawn(async move {
            let key = format!("client-{client}");
            let (status, _) = post_json_with_token(
                create_test_app(&storage),
                "/api/write",
                Some(&token),
                write_body(&[(key.as_str(), json!(client))]),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);

            let (status, body) = post_json_with_token(
                create_test_app(&storage),
                "/api/read",
                Some(&token),
                json!({"keys": [key]}),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["data"][&key], json!(client));
        }));
    }

    for handle in futures::future::join_all(handles).await {
        handle.unwrap();
    }
    assert_eq!(storage.len(), CONCURRENT_CLIENT_COUNT);
}

#[tokio::test]
async fn test_slow_store_hits_request_deadline() {
    let storage = Arc::new(ScriptedStore::new().with_delay(Duration::from_secs(30)));
    let token = login(create_test_app(&storage)).await;
    let app = create_test_app_with(&storage, Duration::from_millis(50), 4);

    let started = std::time::Instant::now();
    let (status, body) =
        post_json_with_token(app, "/api/read", Some(&token), json!({"keys": ["a", "b"]})).await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["code"], "timeout");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_token_from_another_deployment_is_rejected() {
    let storage = create_storage();
    let foreign = kvgate_api::http::AppState::new(Arc::clone(&storage), "some-other-secret");
    let token = foreign.auth.issue_token(common::TEST_USER).unwrap();

    let (status, _) = post_json_with_token(
        create_test_app(&storage),
        "/api/read",
        Some(&token),
        json!({"keys": ["a"]}),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_request_id_round_trips_through_api() {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    let storage = create_storage();
    let response = create_test_app(&storage)
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "trace-me-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "trace-me-123"
    );
}
