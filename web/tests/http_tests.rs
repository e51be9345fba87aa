//! HTTP tests for the message routes, backed by in-memory collaborators.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use axum::http::StatusCode;
use axum_test::TestServer;
use msgflow_core::environment::Clock;
use msgflow_core::store::MessageStore;
use msgflow_core::{Message, MessageId, MessageUpdate};
use msgflow_runtime::MessageService;
use msgflow_testing::{InMemoryMessageStore, RecordingPublisher, test_clock};
use msgflow_web::handlers::messages::CreateMessageResponse;
use msgflow_web::{router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;

struct Harness {
    server: TestServer,
    store: InMemoryMessageStore,
    publisher: RecordingPublisher,
}

fn harness() -> Harness {
    msgflow_testing::init_test_tracing();

    let store = InMemoryMessageStore::with_clock(test_clock());
    let publisher = RecordingPublisher::new();
    let service = MessageService::new(Arc::new(store.clone()), Arc::new(publisher.clone()));
    let server = TestServer::new(router(AppState::new(Arc::new(service)))).unwrap();

    Harness {
        server,
        store,
        publisher,
    }
}

#[tokio::test]
async fn test_create_returns_id_and_publishes() {
    let h = harness();

    let response = h
        .server
        .post("/v1/messages")
        .json(&json!({"content": "hello"}))
        .await;

    response.assert_status_ok();
    let body: CreateMessageResponse = response.json();
    assert_eq!(body.id, MessageId::new(1));
    assert_eq!(h.publisher.published().len(), 1);
    assert_eq!(h.publisher.published()[0].content, "hello");
}

#[tokio::test]
async fn test_create_rejects_missing_content() {
    let h = harness();

    let response = h.server.post("/v1/messages").json(&json!({})).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "BAD_REQUEST");
    assert_eq!(h.store.insert_calls(), 0);
}

#[tokio::test]
async fn test_create_rejects_malformed_json() {
    let h = harness();

    let response = h
        .server
        .post("/v1/messages")
        .content_type("application/json")
        .bytes("{not json".into())
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_rejects_long_content() {
    let h = harness();

    let response = h
        .server
        .post("/v1/messages")
        .json(&json!({"content": "x".repeat(257)}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(h.publisher.published().is_empty());
}

#[tokio::test]
async fn test_create_accepts_content_at_limit() {
    let h = harness();

    let response = h
        .server
        .post("/v1/messages")
        .json(&json!({"content": "é".repeat(256)}))
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_create_publish_failure_is_500_and_leaves_row() {
    let h = harness();
    h.publisher.fail_publishes(true);

    let response = h
        .server
        .post("/v1/messages")
        .json(&json!({"content": "hello"}))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["code"], "INTERNAL_SERVER_ERROR");
    assert_eq!(h.store.len(), 1);
}

#[tokio::test]
async fn test_list_defaults_to_first_page_of_all() {
    let h = harness();
    for i in 0..12 {
        h.server
            .post("/v1/messages")
            .json(&json!({"content": format!("m{i}")}))
            .await
            .assert_status_ok();
    }

    let first: Vec<Message> = h.server.get("/v1/messages").await.json();
    let second: Vec<Message> = h
        .server
        .get("/v1/messages")
        .add_query_param("page", 1)
        .await
        .json();

    assert_eq!(first.len(), 10);
    assert_eq!(second.len(), 2);
    assert_eq!(second[0].id, MessageId::new(11));
}

#[tokio::test]
async fn test_list_filters_by_processed() {
    let h = harness();
    for content in ["a", "b", "c"] {
        h.server
            .post("/v1/messages")
            .json(&json!({"content": content}))
            .await
            .assert_status_ok();
    }
    h.store
        .update_by_id(MessageUpdate::processed(MessageId::new(2), test_clock().now()))
        .await
        .unwrap();

    let processed: Vec<Message> = h
        .server
        .get("/v1/messages")
        .add_query_param("processed", true)
        .await
        .json();
    let unprocessed: Vec<Message> = h
        .server
        .get("/v1/messages")
        .add_query_param("processed", false)
        .await
        .json();

    assert_eq!(processed.len(), 1);
    assert_eq!(processed[0].id, MessageId::new(2));
    assert_eq!(processed[0].processed_at, Some(test_clock().now()));
    assert_eq!(unprocessed.len(), 2);
}

#[tokio::test]
async fn test_list_serializes_message_fields() {
    let h = harness();
    h.server
        .post("/v1/messages")
        .json(&json!({"content": "hello"}))
        .await
        .assert_status_ok();

    let body: Value = h.server.get("/v1/messages").await.json();

    assert_eq!(
        body,
        json!([{
            "id": 1,
            "content": "hello",
            "created_at": "2025-01-01T00:00:00Z",
            "processed_at": null,
        }])
    );
}

#[tokio::test]
async fn test_list_rejects_bad_query() {
    let h = harness();

    h.server
        .get("/v1/messages")
        .add_query_param("page", "first")
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    h.server
        .get("/v1/messages")
        .add_query_param("processed", "maybe")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_storage_failure_is_500() {
    let h = harness();
    h.store.fail_reads(true);

    h.server
        .get("/v1/messages")
        .await
        .assert_status(StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_page_beyond_data_is_empty() {
    let h = harness();

    let body: Vec<Message> = h
        .server
        .get("/v1/messages")
        .add_query_param("page", 1_000_000)
        .await
        .json();

    assert!(body.is_empty());
}

#[tokio::test]
async fn test_health() {
    let h = harness();

    let response = h.server.get("/health").await;

    response.assert_status_ok();
    response.assert_text("ok");
}
