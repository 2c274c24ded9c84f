// crates/trust-gate-authorizer/tests/http_endpoint.rs
// ============================================================================
// Module: Authorizer HTTP Endpoint Tests
// Description: Invocation of the authorizer over HTTP.
// Purpose: Validate status codes, body limits, and opaque deny responses.
// Dependencies: trust-gate-authorizer, axum, reqwest, tokio
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use std::net::SocketAddr;
use std::sync::Arc;

use common::CUSTOMER_SECRET;
use common::STAFF_SECRET;
use common::customer_claims;
use common::fixture;
use common::sign;
use common::staff_claims;
use serde_json::Value;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use trust_gate_authorizer::AuthorizerSettings;
use trust_gate_authorizer::authorizer_router;
use trust_gate_authorizer::serve_on;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Running endpoint handle.
struct Endpoint {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

async fn start_endpoint(max_body_bytes: usize) -> Endpoint {
    let fx = fixture(AuthorizerSettings::default());
    let router = authorizer_router(Arc::new(fx.authorizer), max_body_bytes);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        serve_on(listener, router, async move {
            let _ = rx.await;
        })
        .await
        .unwrap();
    });
    Endpoint {
        addr,
        shutdown: Some(tx),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[tokio::test]
async fn authorize_returns_context_on_allow() {
    let endpoint = start_endpoint(64 * 1024).await;
    let token = sign(&customer_claims(600), CUSTOMER_SECRET);
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{}/v1/authorize", endpoint.addr))
        .json(&json!({"path": "/api/orders/17", "bearer_token": format!("Bearer {token}")}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["effect"], "allow");
    assert_eq!(body["context"]["domain_id"], "customer");
    assert_eq!(body["context"]["subject_id"], "cust-42");
    assert!(body["cache_ttl_secs"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn authorize_reads_token_from_header_and_hides_reason() {
    let endpoint = start_endpoint(64 * 1024).await;
    let token = sign(&staff_claims(600), STAFF_SECRET);
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{}/v1/authorize", endpoint.addr))
        .header("Authorization", format!("Bearer {token}"))
        .json(&json!({"path": "/api/customer/profile"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"effect": "deny", "cache_ttl_secs": 0}));
}

#[tokio::test]
async fn oversized_and_invalid_bodies_are_rejected() {
    let endpoint = start_endpoint(128).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{}/v1/authorize", endpoint.addr))
        .body("x".repeat(512))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 413);

    let response = client
        .post(format!("http://{}/v1/authorize", endpoint.addr))
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn gateway_event_renders_policy() {
    let endpoint = start_endpoint(64 * 1024).await;
    let token = sign(&staff_claims(600), STAFF_SECRET);
    let arn = "arn:aws:execute-api:us-east-1:123456789012:abc123/prod/GET/api/staff/reports";
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{}/v1/gateway", endpoint.addr))
        .json(&json!({"type": "TOKEN", "authorizationToken": format!("Bearer {token}"), "methodArn": arn}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["principalId"], "emp-7");
    assert_eq!(body["policyDocument"]["Statement"][0]["Effect"], "Allow");
    assert_eq!(body["context"]["domainId"], "staff");

    let response = client
        .post(format!("http://{}/v1/gateway", endpoint.addr))
        .json(&json!({"authorizationToken": "Bearer nope", "methodArn": arn}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"message": "Unauthorized"}));
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let endpoint = start_endpoint(1024).await;
    let response = reqwest::get(format!("http://{}/healthz", endpoint.addr)).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
}
