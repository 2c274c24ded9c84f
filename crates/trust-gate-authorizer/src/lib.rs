// crates/trust-gate-authorizer/src/lib.rs
// ============================================================================
// Module: Trust Gate Authorizer Library
// Description: Dual-domain bearer token authorizer.
// Purpose: Decide allow/deny for API requests against isolated identity domains.
// Dependencies: trust-gate-core, trust-gate-config, jsonwebtoken, axum
// ============================================================================

//! ## Overview
//! The authorizer resolves the identity domain a request path belongs to,
//! verifies the bearer token against that domain's keys only, and returns an
//! allow decision carrying an [`trust_gate_core::AuthorizationContext`] or a
//! typed deny reason. Callers only ever see allow or a generic deny; reasons
//! are recorded through the audit and metrics sinks.
//!
//! Security posture: tokens are untrusted until verified; the domain of a
//! context always comes from the path, never from a token claim.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod authorizer;
pub mod builder;
pub mod cache;
pub mod claims;
pub mod gateway;
pub mod http;
pub mod keys;
pub mod registry;
pub mod revocation;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AUTHZ_LATENCY_BUCKETS_MS;
pub use audit::AuthzAuditEvent;
pub use audit::AuthzAuditSink;
pub use audit::AuthzMetricEvent;
pub use audit::AuthzMetrics;
pub use audit::NoopMetrics;
pub use authorizer::AuthorizationRequest;
pub use authorizer::AuthorizationResponse;
pub use authorizer::AuthorizerSettings;
pub use authorizer::DenyReason;
pub use authorizer::Effect;
pub use authorizer::SourceAttributes;
pub use authorizer::TokenAuthorizer;
pub use authorizer::Verified;
pub use builder::AuthorizerBuildError;
pub use builder::build_authorizer;
pub use cache::CachedDecision;
pub use cache::DecisionCache;
pub use claims::ClaimRule;
pub use claims::ClaimSchema;
pub use gateway::GatewayAuthorizerResponse;
pub use gateway::GatewayTokenEvent;
pub use http::AuthorizerServerError;
pub use http::authorizer_router;
pub use http::serve_authorizer;
pub use http::serve_on;
pub use keys::KeyError;
pub use keys::KeySet;
pub use keys::KeySource;
pub use keys::RemoteJwksConfig;
pub use keys::RemoteJwksSource;
pub use keys::SharedSecretSource;
pub use keys::StaticJwksSource;
pub use registry::DomainRegistry;
pub use registry::IdentityDomain;
pub use registry::RegistryError;
pub use registry::extract_resource_path;
pub use revocation::RevocationSource;
pub use revocation::StaticRevocationList;
