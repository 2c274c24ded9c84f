// crates/trust-gate-authorizer/src/http.rs
// ============================================================================
// Module: Authorizer HTTP Endpoint
// Description: HTTP invocation surface for the token authorizer.
// Purpose: Expose allow/deny decisions to edges and API gateways.
// Dependencies: axum, tokio
// ============================================================================

//! ## Overview
//! Routes:
//! - `POST /v1/authorize`: JSON [`AuthorizationRequest`]; 200 with the
//!   response on allow, 401 with a bare deny body otherwise.
//! - `POST /v1/gateway`: gateway token authorizer event; 200 with an
//!   IAM-style allow policy, or 401 `Unauthorized`.
//! - `GET /healthz`: liveness.
//!
//! Security posture: request bodies are size-limited before parsing and
//! deny responses never include a reason.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::ConnectInfo;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::authorizer::AuthorizationRequest;
use crate::authorizer::TokenAuthorizer;
use crate::gateway::GatewayAuthorizerResponse;
use crate::gateway::GatewayTokenEvent;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Header carrying a caller correlation id.
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Endpoint errors.
#[derive(Debug, Error)]
pub enum AuthorizerServerError {
    /// Bind address invalid or unavailable.
    #[error("authorizer bind failed: {0}")]
    Bind(String),
    /// Server loop failed.
    #[error("authorizer server failed: {0}")]
    Serve(String),
}

/// Shared handler state.
#[derive(Clone)]
struct EndpointState {
    /// Authorizer.
    authorizer: Arc<TokenAuthorizer>,
    /// Maximum request body size.
    max_body_bytes: usize,
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the authorizer router.
#[must_use]
pub fn authorizer_router(authorizer: Arc<TokenAuthorizer>, max_body_bytes: usize) -> Router {
    let state = Arc::new(EndpointState {
        authorizer,
        max_body_bytes,
    });
    Router::new()
        .route("/v1/authorize", post(handle_authorize))
        .route("/v1/gateway", post(handle_gateway))
        .route("/healthz", get(handle_health))
        .with_state(state)
}

/// Binds `bind` and serves the router until `shutdown` resolves.
///
/// # Errors
///
/// Returns [`AuthorizerServerError`] when binding or serving fails.
pub async fn serve_authorizer<F>(bind: &str, router: Router, shutdown: F) -> Result<(), AuthorizerServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr =
        bind.parse().map_err(|_| AuthorizerServerError::Bind(format!("invalid bind address {bind}")))?;
    let listener = TcpListener::bind(addr).await.map_err(|err| AuthorizerServerError::Bind(err.to_string()))?;
    serve_on(listener, router, shutdown).await
}

/// Serves the router on an already bound listener.
///
/// # Errors
///
/// Returns [`AuthorizerServerError::Serve`] when the server loop fails.
pub async fn serve_on<F>(listener: TcpListener, router: Router, shutdown: F) -> Result<(), AuthorizerServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|err| AuthorizerServerError::Serve(err.to_string()))
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Handles `POST /v1/authorize`.
async fn handle_authorize(
    State(state): State<Arc<EndpointState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Response {
    if bytes.len() > state.max_body_bytes {
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    }
    let Ok(mut request) = serde_json::from_slice::<AuthorizationRequest>(&bytes) else {
        return (StatusCode::BAD_REQUEST, Json(json!({"message": "invalid request"}))).into_response();
    };
    if request.bearer_token.is_none() {
        request.bearer_token = header_value(&headers, AUTHORIZATION.as_str());
    }
    if request.source_attributes.request_id.is_none() {
        request.source_attributes.request_id = header_value(&headers, REQUEST_ID_HEADER);
    }
    if request.source_attributes.peer_ip.is_none() {
        request.source_attributes.peer_ip = Some(peer.ip().to_string());
    }
    let response = state.authorizer.authorize(&request).await;
    let status = if response.is_allowed() { StatusCode::OK } else { StatusCode::UNAUTHORIZED };
    (status, Json(response)).into_response()
}

/// Handles `POST /v1/gateway`.
async fn handle_gateway(
    State(state): State<Arc<EndpointState>>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Response {
    if bytes.len() > state.max_body_bytes {
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    }
    let Ok(event) = serde_json::from_slice::<GatewayTokenEvent>(&bytes) else {
        return (StatusCode::BAD_REQUEST, Json(json!({"message": "invalid request"}))).into_response();
    };
    let method_arn = event.method_arn.clone();
    let request = event.into_request(header_value(&headers, REQUEST_ID_HEADER));
    let response = state.authorizer.authorize(&request).await;
    if !response.is_allowed() {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "Unauthorized"}))).into_response();
    }
    (StatusCode::OK, Json(GatewayAuthorizerResponse::from_decision(&response, &method_arn))).into_response()
}

/// Handles `GET /healthz`.
async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Reads a header as UTF-8.
fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|value| value.to_str().ok()).map(ToString::to_string)
}
