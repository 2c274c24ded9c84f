// crates/trust-gate-authorizer/src/audit.rs
// ============================================================================
// Module: Authorizer Audit and Telemetry
// Description: Decision audit events and metrics hooks.
// Purpose: Record internal deny reasons without exposing them to callers.
// Dependencies: trust-gate-core, serde
// ============================================================================

//! ## Overview
//! Every decision produces one [`AuthzAuditEvent`] and one metrics
//! observation. Events carry the token fingerprint, never the token.
//! Security posture: paths and request ids are caller-supplied and must be
//! treated as untrusted labels downstream.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde::Serialize;
use trust_gate_core::DomainId;
use trust_gate_core::JsonLinesAuditSink;

use crate::authorizer::DenyReason;
use crate::authorizer::Effect;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default latency buckets in milliseconds for decision histograms.
pub const AUTHZ_LATENCY_BUCKETS_MS: &[u64] = &[1, 2, 5, 10, 25, 50, 100, 250, 500, 1_000];

// ============================================================================
// SECTION: Audit Events
// ============================================================================

/// Authorization decision audit event.
#[derive(Debug, Clone, Serialize)]
pub struct AuthzAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u64,
    /// Request identifier when provided.
    pub request_id: Option<String>,
    /// Peer IP address when provided.
    pub peer_ip: Option<String>,
    /// Request path after method ARN extraction.
    pub path: String,
    /// Domain resolved from the path.
    pub domain: Option<DomainId>,
    /// Decision.
    pub effect: Effect,
    /// Internal deny reason code.
    pub reason: Option<&'static str>,
    /// Token fingerprint when a token was presented.
    pub token_fingerprint: Option<String>,
    /// True when served from the decision cache.
    pub cache_hit: bool,
    /// Decision latency in microseconds.
    pub latency_us: u64,
}

/// Audit sink for authorization decisions.
pub trait AuthzAuditSink: Send + Sync {
    /// Records a decision.
    fn record(&self, event: &AuthzAuditEvent);
}

impl AuthzAuditSink for JsonLinesAuditSink {
    fn record(&self, event: &AuthzAuditEvent) {
        self.emit(event);
    }
}

// ============================================================================
// SECTION: Metrics
// ============================================================================

/// Decision metric event payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthzMetricEvent {
    /// Domain resolved from the path.
    pub domain: Option<DomainId>,
    /// Decision.
    pub effect: Effect,
    /// Deny reason when denied.
    pub reason: Option<DenyReason>,
    /// True when served from the decision cache.
    pub cache_hit: bool,
}

/// Metrics sink for authorization decisions.
pub trait AuthzMetrics: Send + Sync {
    /// Records a decision counter event.
    fn record_decision(&self, event: AuthzMetricEvent);
    /// Records decision latency.
    fn record_latency(&self, event: AuthzMetricEvent, latency: Duration);
}

/// No-op metrics sink.
pub struct NoopMetrics;

impl AuthzMetrics for NoopMetrics {
    fn record_decision(&self, _event: AuthzMetricEvent) {}

    fn record_latency(&self, _event: AuthzMetricEvent, _latency: Duration) {}
}
