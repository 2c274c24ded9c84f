// crates/trust-gate-sync/src/audit.rs
// ============================================================================
// Module: Synchronizer Audit and Telemetry
// Description: Sync state transitions, origin applies, and alerts.
// Purpose: Make every synchronizer step observable without exposing secrets.
// Dependencies: trust-gate-core, serde
// ============================================================================

//! ## Overview
//! Each run emits [`SyncAuditEvent`] records for state changes, per-origin
//! applies, commits, and alerts. Secret values never appear; events carry
//! secret versions only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use trust_gate_core::JsonLinesAuditSink;

// ============================================================================
// SECTION: Audit Events
// ============================================================================

/// Synchronizer audit event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEventKind {
    /// State machine transition.
    State,
    /// Policy applied to an origin.
    OriginApplied,
    /// Policy apply failed on an origin.
    OriginFailed,
    /// Active secret committed.
    SecretCommitted,
    /// Range set committed.
    RangesCommitted,
    /// Run finished with nothing to do.
    Unchanged,
    /// Fetch failed.
    FetchFailed,
    /// Consecutive failures reached the alert threshold.
    Alert,
    /// Run aborted (lease or conflict).
    Aborted,
    /// Lease could not be released after a run.
    LeaseReleaseFailed,
}

/// Synchronizer audit event.
#[derive(Debug, Clone, Serialize)]
pub struct SyncAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event kind.
    pub kind: SyncEventKind,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u64,
    /// Lease holder running the synchronizer.
    pub holder: String,
    /// State machine state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<&'static str>,
    /// Origin key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// Committed range version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_version: Option<u64>,
    /// Target range version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_version: Option<u64>,
    /// Secret version involved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_version: Option<u64>,
    /// Error message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Consecutive fetch failures.
    pub consecutive_failures: u32,
}

impl SyncAuditEvent {
    /// Creates an event with every optional field empty.
    #[must_use]
    pub fn new(kind: SyncEventKind, timestamp_ms: u64, holder: &str, consecutive_failures: u32) -> Self {
        Self {
            event: "sync",
            kind,
            timestamp_ms,
            holder: holder.to_string(),
            state: None,
            origin: None,
            base_version: None,
            target_version: None,
            secret_version: None,
            error: None,
            consecutive_failures,
        }
    }
}

/// Audit sink for synchronizer events.
pub trait SyncAuditSink: Send + Sync {
    /// Records an event.
    fn record(&self, event: &SyncAuditEvent);
}

impl SyncAuditSink for JsonLinesAuditSink {
    fn record(&self, event: &SyncAuditEvent) {
        self.emit(event);
    }
}

// ============================================================================
// SECTION: Metrics
// ============================================================================

/// Metrics sink for synchronizer runs.
pub trait SyncMetrics: Send + Sync {
    /// Counts a finished run by outcome label.
    fn record_run(&self, outcome: &'static str);
    /// Counts one origin apply.
    fn record_apply(&self, origin: &str, success: bool);
    /// Sets the consecutive failure gauge.
    fn set_consecutive_failures(&self, failures: u32);
}

/// No-op metrics sink.
pub struct NoopSyncMetrics;

impl SyncMetrics for NoopSyncMetrics {
    fn record_run(&self, _outcome: &'static str) {}

    fn record_apply(&self, _origin: &str, _success: bool) {}

    fn set_consecutive_failures(&self, _failures: u32) {}
}
