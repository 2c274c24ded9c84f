// crates/trust-gate-cli/src/wiring.rs
// ============================================================================
// Module: CLI Runtime Wiring
// Description: Store and audit construction plus JSON output views.
// Purpose: Turn validated configuration into runtime components.
// Dependencies: trust-gate-config, trust-gate-core, trust-gate-store-sqlite,
//               trust-gate-sync, serde
// ============================================================================

//! ## Overview
//! Helpers shared by the `trust-gate` subcommands. Output views are plain
//! serializable structs so the CLI prints stable JSON; none of them carry a
//! secret value except [`SecretProvisioning`], which exists to print it once.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use trust_gate_config::AuditConfig;
use trust_gate_config::AuditSinkKind;
use trust_gate_config::StoreConfig;
use trust_gate_config::StoreType;
use trust_gate_config::TrustGateConfig;
use trust_gate_core::EdgeSecret;
use trust_gate_core::InMemoryTrustStore;
use trust_gate_core::JsonLinesAuditSink;
use trust_gate_core::OriginPhase;
use trust_gate_core::TrustStore;
use trust_gate_core::Versioned;
use trust_gate_store_sqlite::SqliteTrustStore;
use trust_gate_sync::SyncOutcome;
use trust_gate_sync::SyncPlan;
use trust_gate_sync::SyncReport;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Failures while building runtime components from configuration.
#[derive(Debug, Error)]
pub enum WiringError {
    /// Store could not be opened.
    #[error("{0}")]
    Store(String),
    /// Audit file could not be opened.
    #[error("{path}: {error}")]
    Audit {
        /// Audit file path.
        path: PathBuf,
        /// Underlying error.
        error: String,
    },
}

// ============================================================================
// SECTION: Components
// ============================================================================

/// Opens the configured trust store.
///
/// # Errors
///
/// Returns [`WiringError::Store`] when the sqlite backend cannot be opened.
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn TrustStore>, WiringError> {
    match config.store_type {
        StoreType::Memory => Ok(Arc::new(InMemoryTrustStore::new())),
        StoreType::Sqlite => {
            let sqlite = config
                .sqlite_config()
                .ok_or_else(|| WiringError::Store("sqlite store requires store.path".to_string()))?;
            let store = SqliteTrustStore::new(sqlite).map_err(|err| WiringError::Store(err.to_string()))?;
            Ok(Arc::new(store))
        }
    }
}

/// Opens the configured audit sink.
///
/// # Errors
///
/// Returns [`WiringError::Audit`] when a file sink cannot be opened.
pub fn audit_sink(config: &AuditConfig) -> Result<Arc<JsonLinesAuditSink>, WiringError> {
    match (config.sink, &config.path) {
        (AuditSinkKind::Stderr, _) => Ok(Arc::new(JsonLinesAuditSink::stderr())),
        (AuditSinkKind::None, _) => Ok(Arc::new(JsonLinesAuditSink::noop())),
        (AuditSinkKind::File, Some(path)) => JsonLinesAuditSink::file(path).map(Arc::new).map_err(|err| {
            WiringError::Audit {
                path: path.clone(),
                error: err.to_string(),
            }
        }),
        (AuditSinkKind::File, None) => Err(WiringError::Audit {
            path: PathBuf::new(),
            error: "file sink requires audit.path".to_string(),
        }),
    }
}

/// Reads an environment variable; used for authorizer secret references.
#[must_use]
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

// ============================================================================
// SECTION: Output Views
// ============================================================================

/// One-time provisioning output for the edge secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecretProvisioning {
    /// Active secret value.
    pub secret: String,
    /// Secret version.
    pub version: u64,
    /// Creation time in unix milliseconds.
    pub created_at_ms: u64,
    /// Store the secret was read from.
    pub store: String,
}

impl SecretProvisioning {
    /// Builds the provisioning output from the committed secret record.
    #[must_use]
    pub fn new(record: &Versioned<EdgeSecret>, store: &dyn TrustStore) -> Self {
        Self {
            secret: record.value.value.expose().to_string(),
            version: record.value.version,
            created_at_ms: record.value.created_at.as_millis(),
            store: store.location(),
        }
    }
}

/// Printable sync run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReportView {
    /// Trigger label.
    pub trigger: &'static str,
    /// Outcome label.
    pub outcome: &'static str,
    /// Narrowing deadline when awaiting grace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrow_at_ms: Option<u64>,
    /// Committed range version when completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_version: Option<u64>,
    /// Active secret version when completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_version: Option<u64>,
    /// Per-origin phase keyed by origin.
    pub origins: Vec<OriginPhaseView>,
}

/// Origin and its phase at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OriginPhaseView {
    /// Origin key.
    pub origin: String,
    /// Phase label.
    pub phase: OriginPhase,
}

impl From<&SyncReport> for SyncReportView {
    fn from(report: &SyncReport) -> Self {
        let (narrow_at_ms, range_version, secret_version) = match &report.outcome {
            SyncOutcome::Unchanged => (None, None, None),
            SyncOutcome::AwaitingGrace {
                narrow_at,
            } => (Some(narrow_at.as_millis()), None, None),
            SyncOutcome::Completed {
                range_version,
                secret_version,
            } => (None, Some(*range_version), Some(*secret_version)),
        };
        Self {
            trigger: report.trigger.as_str(),
            outcome: report.outcome.as_str(),
            narrow_at_ms,
            range_version,
            secret_version,
            origins: report
                .origins
                .iter()
                .map(|(origin, phase)| OriginPhaseView {
                    origin: origin.key(),
                    phase: *phase,
                })
                .collect(),
        }
    }
}

/// Printable dry-run plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncPlanView {
    /// True when a run would change anything.
    pub changes: bool,
    /// Committed range version.
    pub base_version: u64,
    /// Range version after the change.
    pub target_version: u64,
    /// True when a new secret would be issued.
    pub secret_rotation: bool,
    /// True when a persisted transition would be resumed.
    pub resuming: bool,
    /// Ranges the change adds.
    pub added: Vec<String>,
    /// Ranges the change removes.
    pub removed: Vec<String>,
}

impl From<Option<&SyncPlan>> for SyncPlanView {
    fn from(plan: Option<&SyncPlan>) -> Self {
        plan.map_or(
            Self {
                changes: false,
                base_version: 0,
                target_version: 0,
                secret_rotation: false,
                resuming: false,
                added: Vec::new(),
                removed: Vec::new(),
            },
            |plan| Self {
                changes: true,
                base_version: plan.base_version,
                target_version: plan.target_version,
                secret_rotation: plan.secret_rotation,
                resuming: plan.resuming,
                added: plan.added.iter().map(ToString::to_string).collect(),
                removed: plan.removed.iter().map(ToString::to_string).collect(),
            },
        )
    }
}

/// Summary printed by `config validate`.
#[must_use]
pub fn config_summary(config: &TrustGateConfig) -> (usize, usize, &'static str) {
    let origins = config.sync.as_ref().map_or(0, |sync| sync.origins.len());
    let store = match config.store.store_type {
        StoreType::Memory => "memory",
        StoreType::Sqlite => "sqlite",
    };
    (config.authorizer.domains.len(), origins, store)
}
