//! Common test utilities for in-process API testing with mocks.
//!
//! This module builds the real router on top of an in-memory tracker, an
//! in-memory automation store and a fixed clock, so every endpoint can be
//! driven without GitHub.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use issuetree_core::testing::{FixedClock, MockTicketGateway};
use issuetree_core::SqliteAutomationStore;
use issuetree_server::state::AppState;

/// Re-export fixtures for test convenience
pub use issuetree_core::testing::fixtures;

/// Test fixture for in-process API testing.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_ticket_creation() {
///     let fixture = TestFixture::new();
///
///     let response = fixture.post("/api/v1/tickets", json!({
///         "title": "Ship it"
///     })).await;
///
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock tracker - seed tickets, inject failures, inspect bodies
    pub gateway: Arc<MockTicketGateway>,
    /// Clock used to stamp automation records
    pub clock: Arc<FixedClock>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a fixture with an empty tracker and the clock at
    /// 2024-06-01T09:00:00Z.
    pub fn new() -> Self {
        let gateway = Arc::new(MockTicketGateway::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
        ));
        let store =
            Arc::new(SqliteAutomationStore::in_memory().expect("Failed to create store"));

        let state = Arc::new(AppState::new(
            fixtures::config(),
            gateway.clone(),
            store,
            clock.clone(),
        ));
        let router = issuetree_server::api::create_router(state);

        Self {
            router,
            gateway,
            clock,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a PUT request with JSON body.
    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// GET a path and return the raw text body.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Poll the mock tracker until `number`'s body satisfies `check`.
    ///
    /// Fan-out after ticket creation runs on a background task.
    pub async fn wait_for_body<F>(&self, number: u64, check: F) -> String
    where
        F: Fn(&str) -> bool,
    {
        for _ in 0..100 {
            if let Some(body) = self.gateway.body(number).await {
                if check(&body) {
                    return body;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "body of #{} never reached the expected state: {:?}",
            number,
            self.gateway.body(number).await
        );
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}
