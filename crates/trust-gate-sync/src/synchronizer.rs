// crates/trust-gate-sync/src/synchronizer.rs
// ============================================================================
// Module: Origin Trust Synchronizer
// Description: Lease-guarded widen-then-narrow state machine.
// Purpose: Keep every origin's policy aligned with the edge's published ranges
//          and the active edge secret without a blackout window.
// Dependencies: trust-gate-core, tokio
// ============================================================================

//! ## Overview
//! A run moves through `Idle -> Fetching -> Diffing -> PublishingGrace ->
//! Narrowing -> Idle`. The plan for a change is persisted as a
//! [`PendingTransition`] before any origin is touched, and per-origin
//! progress is saved after every confirmed apply, so a restarted process
//! resumes where the previous one stopped.
//!
//! Ordering rules:
//! - every origin confirms the grace (union) policy before any origin is
//!   narrowed;
//! - a new secret is committed once every origin accepts it;
//! - the range version advances only after every origin confirms the
//!   narrowed policy;
//! - origins already narrowed are never widened again.
//!
//! A run returns [`SyncOutcome::AwaitingGrace`] instead of sleeping through
//! the grace window, so the lease is never held across it.
//!
//! Security posture: fetch and apply failures leave the previously applied
//! policy in effect.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::time::Duration;

use thiserror::Error;
use trust_gate_config::SyncConfig;
use trust_gate_core::Clock;
use trust_gate_core::EdgeSecret;
use trust_gate_core::IpRange;
use trust_gate_core::JsonLinesAuditSink;
use trust_gate_core::Lease;
use trust_gate_core::LeaseRequest;
use trust_gate_core::OriginAccessPolicy;
use trust_gate_core::OriginPhase;
use trust_gate_core::OriginProgress;
use trust_gate_core::OriginRef;
use trust_gate_core::PendingTransition;
use trust_gate_core::PublishedRanges;
use trust_gate_core::StoreError;
use trust_gate_core::Timestamp;
use trust_gate_core::TrustState;
use trust_gate_core::TrustedRangeSet;
use trust_gate_core::Versioned;

use crate::audit::NoopSyncMetrics;
use crate::audit::SyncAuditEvent;
use crate::audit::SyncAuditSink;
use crate::audit::SyncEventKind;
use crate::audit::SyncMetrics;
use crate::publisher::ApplyOutcome;
use crate::publisher::PolicyPublisher;
use crate::publisher::PublishError;
use crate::secret::OsSecretGenerator;
use crate::secret::SecretGenerator;
use crate::source::RangeSource;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Store lease guarding the singleton synchronizer.
pub const SYNC_LEASE_NAME: &str = "trust-gate-sync";

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Runtime synchronizer settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Lease holder identity.
    pub holder_id: String,
    /// Grace window between widening and narrowing.
    pub grace: Duration,
    /// Timeout for one fetch or one origin apply.
    pub step_timeout: Duration,
    /// Lease lifetime.
    pub lease_ttl: Duration,
    /// Automatic secret rotation interval.
    pub secret_rotation_interval: Option<Duration>,
    /// Consecutive fetch failures before an alert.
    pub alert_after_failures: u32,
}

impl SyncSettings {
    /// Builds settings from validated configuration.
    #[must_use]
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            holder_id: config.effective_holder_id(),
            grace: Duration::from_secs(config.grace_secs),
            step_timeout: Duration::from_millis(config.step_timeout_ms),
            lease_ttl: Duration::from_secs(config.lease_ttl_secs),
            secret_rotation_interval: config.secret_rotation_interval_secs.map(Duration::from_secs),
            alert_after_failures: config.alert_after_failures,
        }
    }
}

// ============================================================================
// SECTION: Run Types
// ============================================================================

/// Reason a run was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// Schedule tick.
    Scheduled,
    /// First run after start-up.
    Bootstrap,
    /// Operator request.
    Operator,
    /// Operator-requested secret rotation.
    RotateSecret,
}

impl SyncTrigger {
    /// Returns the trigger label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Bootstrap => "bootstrap",
            Self::Operator => "operator",
            Self::RotateSecret => "rotate_secret",
        }
    }
}

/// State machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Waiting for a trigger.
    Idle,
    /// Retrieving published ranges.
    Fetching,
    /// Comparing against committed state.
    Diffing,
    /// Applying the union policy.
    PublishingGrace,
    /// Applying the target-only policy.
    Narrowing,
}

impl SyncState {
    /// Returns the state label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Diffing => "diffing",
            Self::PublishingGrace => "publishing_grace",
            Self::Narrowing => "narrowing",
        }
    }
}

/// Computed change, reported by dry runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    /// Committed range version.
    pub base_version: u64,
    /// Range version after the change.
    pub target_version: u64,
    /// True when ranges differ from the committed set.
    pub ranges_changed: bool,
    /// True when a new secret will be issued.
    pub secret_rotation: bool,
    /// Ranges the change adds.
    pub added: BTreeSet<IpRange>,
    /// Ranges the change removes.
    pub removed: BTreeSet<IpRange>,
    /// True when the plan resumes a persisted transition.
    pub resuming: bool,
}

/// Result of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing to do; no policy was touched.
    Unchanged,
    /// Every origin is widened; narrowing is due at `narrow_at`.
    AwaitingGrace {
        /// Earliest narrowing time.
        narrow_at: Timestamp,
    },
    /// Transition completed and committed.
    Completed {
        /// Committed range version.
        range_version: u64,
        /// Active secret version.
        secret_version: u64,
    },
}

impl SyncOutcome {
    /// Returns the outcome label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::AwaitingGrace {
                ..
            } => "awaiting_grace",
            Self::Completed {
                ..
            } => "completed",
        }
    }
}

/// Report for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Trigger that started the run.
    pub trigger: SyncTrigger,
    /// Run outcome.
    pub outcome: SyncOutcome,
    /// Per-origin phase at the end of the run.
    pub origins: Vec<(OriginRef, OriginPhase)>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Synchronizer errors.
///
/// # Invariants
/// - Every variant leaves previously applied policies in effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Range fetch failed.
    #[error("range fetch failed: {0}")]
    FetchFailed(String),
    /// One or more origins did not confirm a policy.
    #[error("policy apply failed on {origins:?}: {reason}")]
    PolicyApplyFailed {
        /// Failing origin keys.
        origins: Vec<String>,
        /// First failure reason.
        reason: String,
    },
    /// Lease unavailable or expired.
    #[error("sync lease lost: {0}")]
    LeaseLost(String),
    /// Another writer advanced state.
    #[error("version conflict: {0}")]
    VersionConflict(String),
    /// Store failure.
    #[error(transparent)]
    Store(StoreError),
    /// Step exceeded its timeout.
    #[error("sync step timed out: {0}")]
    Timeout(String),
    /// Secret generation failed.
    #[error("secret generation failed: {0}")]
    Secret(String),
}

impl SyncError {
    /// Returns a stable label for audit and metrics.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::FetchFailed(_) => "fetch_failed",
            Self::PolicyApplyFailed {
                ..
            } => "policy_apply_failed",
            Self::LeaseLost(_) => "lease_lost",
            Self::VersionConflict(_) => "version_conflict",
            Self::Store(_) => "store",
            Self::Timeout(_) => "timeout",
            Self::Secret(_) => "secret",
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict {
                ..
            } => Self::VersionConflict(err.to_string()),
            StoreError::LeaseHeld {
                ..
            } => Self::LeaseLost(err.to_string()),
            other => Self::Store(other),
        }
    }
}

// ============================================================================
// SECTION: Synchronizer
// ============================================================================

/// Origin trust synchronizer.
pub struct Synchronizer {
    /// Settings.
    settings: SyncSettings,
    /// Typed store access.
    state: TrustState,
    /// Authoritative range source.
    source: Arc<dyn RangeSource>,
    /// One publisher per protected origin.
    publishers: Vec<Arc<dyn PolicyPublisher>>,
    /// Secret generator.
    secrets: Arc<dyn SecretGenerator>,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Audit sink.
    audit: Arc<dyn SyncAuditSink>,
    /// Metrics sink.
    metrics: Arc<dyn SyncMetrics>,
    /// Consecutive fetch failures in this process.
    consecutive_failures: AtomicU32,
}

/// Committed records loaded at the start of a run.
struct Committed {
    /// Committed range set.
    ranges: Option<Versioned<TrustedRangeSet>>,
    /// Active secret.
    secret: Option<Versioned<EdgeSecret>>,
}

impl Committed {
    /// Returns the committed range version (0 when none).
    fn range_version(&self) -> u64 {
        self.ranges.as_ref().map_or(0, |record| record.value.version)
    }

    /// Returns the committed ranges.
    fn range_set(&self) -> BTreeSet<IpRange> {
        self.ranges.as_ref().map(|record| record.value.ranges()).unwrap_or_default()
    }
}

/// Result of comparing published ranges against committed state.
struct Diff {
    /// Fetched document.
    published: PublishedRanges,
    /// Ranges the origins should end up with.
    target_ranges: BTreeSet<IpRange>,
    /// True when ranges differ from the committed set.
    ranges_changed: bool,
    /// True when a new secret is due.
    rotate_secret: bool,
}

impl Synchronizer {
    /// Creates a synchronizer with OS secrets, stderr audit, and no metrics.
    #[must_use]
    pub fn new(
        settings: SyncSettings,
        state: TrustState,
        source: Arc<dyn RangeSource>,
        publishers: Vec<Arc<dyn PolicyPublisher>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            state,
            source,
            publishers,
            secrets: Arc::new(OsSecretGenerator),
            clock,
            audit: Arc::new(JsonLinesAuditSink::stderr()),
            metrics: Arc::new(NoopSyncMetrics),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    /// Replaces the secret generator.
    #[must_use]
    pub fn with_secret_generator(mut self, secrets: Arc<dyn SecretGenerator>) -> Self {
        self.secrets = secrets;
        self
    }

    /// Replaces the audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn SyncAuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Replaces the metrics sink.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn SyncMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Returns the settings.
    #[must_use]
    pub const fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Returns the typed store.
    #[must_use]
    pub const fn state(&self) -> &TrustState {
        &self.state
    }

    /// Returns the synchronizer's current time.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Returns true when a transition is persisted and not yet finished.
    /// Unreadable stores count as pending.
    #[must_use]
    pub fn has_pending_transition(&self) -> bool {
        !matches!(self.state.load_transition(), Ok(None))
    }

    /// Returns the number of consecutive fetch failures.
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------------
    // Entry points
    // ------------------------------------------------------------------------

    /// Runs one lease-guarded pass of the state machine.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] when the pass cannot make progress; confirmed
    /// per-origin progress is persisted before returning.
    pub async fn run_once(&self, trigger: SyncTrigger) -> Result<SyncReport, SyncError> {
        let lease = match self.acquire_lease() {
            Ok(lease) => lease,
            Err(err) => {
                self.emit_error(SyncEventKind::Aborted, None, &err);
                self.metrics.record_run(err.code());
                return Err(err);
            }
        };
        let result = self.run_locked(trigger, &lease).await;
        if let Err(err) = self.state.store().release_lease(&lease) {
            self.emit_error(SyncEventKind::LeaseReleaseFailed, None, &SyncError::Store(err));
        }
        match &result {
            Ok(report) => {
                self.emit_state(SyncState::Idle, None);
                self.metrics.record_run(report.outcome.as_str());
            }
            Err(err) => {
                if !matches!(err, SyncError::FetchFailed(_) | SyncError::Timeout(_)) {
                    self.emit_error(SyncEventKind::Aborted, None, err);
                }
                self.metrics.record_run(err.code());
            }
        }
        result
    }

    /// Runs passes until the current change completes, waiting out grace windows.
    ///
    /// # Errors
    ///
    /// Returns the first [`SyncError`] encountered.
    pub async fn run_until_settled(&self, trigger: SyncTrigger) -> Result<SyncReport, SyncError> {
        let mut trigger = trigger;
        loop {
            let report = self.run_once(trigger).await?;
            let SyncOutcome::AwaitingGrace {
                narrow_at,
            } = report.outcome
            else {
                return Ok(report);
            };
            let wait = narrow_at.duration_since(self.clock.now());
            tokio::time::sleep(wait).await;
            trigger = SyncTrigger::Scheduled;
        }
    }

    /// Computes what a run would do without publishing or committing.
    ///
    /// Returns `None` when there is nothing to do.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] when the fetch or a store read fails.
    pub async fn plan(&self, trigger: SyncTrigger) -> Result<Option<SyncPlan>, SyncError> {
        let committed = self.load_committed()?;
        if let Some(pending) = self.state.load_transition()?
            && !is_stale(&pending.value, &committed)
        {
            let mut plan = plan_of(&committed, &pending.value.target_ranges, pending.value.ranges_changed);
            plan.secret_rotation = pending.value.secret_rotated;
            plan.target_version = pending.value.target_version;
            plan.resuming = true;
            return Ok(Some(plan));
        }
        let diff = self.diff(trigger, &committed).await?;
        if !diff.ranges_changed && !diff.rotate_secret {
            return Ok(None);
        }
        let mut plan = plan_of(&committed, &diff.target_ranges, diff.ranges_changed);
        plan.secret_rotation = diff.rotate_secret;
        Ok(Some(plan))
    }

    // ------------------------------------------------------------------------
    // Run phases
    // ------------------------------------------------------------------------

    /// Runs one pass while holding the lease.
    async fn run_locked(&self, trigger: SyncTrigger, lease: &Lease) -> Result<SyncReport, SyncError> {
        let committed = self.load_committed()?;
        let resumed = match self.state.load_transition()? {
            Some(pending) if !is_stale(&pending.value, &committed) => Some(pending),
            Some(stale) => {
                self.ensure_lease(lease)?;
                self.state.clear_transition(stale.revision)?;
                None
            }
            None => None,
        };
        let (mut transition, mut revision) = if let Some(pending) = resumed {
            (pending.value, pending.revision)
        } else {
            let diff = self.diff(trigger, &committed).await?;
            if !diff.ranges_changed && !diff.rotate_secret {
                let mut event = self.event(SyncEventKind::Unchanged);
                event.base_version = Some(committed.range_version());
                self.audit.record(&event);
                return Ok(SyncReport {
                    trigger,
                    outcome: SyncOutcome::Unchanged,
                    origins: Vec::new(),
                });
            }
            let transition = self.begin(&committed, diff)?;
            self.ensure_lease(lease)?;
            let revision = self.state.save_transition(0, &transition, self.clock.now())?;
            (transition, revision)
        };

        self.widen(&mut transition, &mut revision, lease).await?;
        self.commit_secret(&transition, lease)?;

        let narrow_at = self.narrow_deadline(&transition);
        if let Some(narrow_at) = narrow_at
            && self.clock.now() < narrow_at
        {
            return Ok(SyncReport {
                trigger,
                outcome: SyncOutcome::AwaitingGrace {
                    narrow_at,
                },
                origins: self.origin_phases(&transition),
            });
        }

        self.narrow(&mut transition, &mut revision, lease).await?;
        let range_version = self.commit_ranges(&transition, lease)?;
        self.ensure_lease(lease)?;
        self.state.clear_transition(revision)?;
        Ok(SyncReport {
            trigger,
            outcome: SyncOutcome::Completed {
                range_version,
                secret_version: transition.active_secret.version,
            },
            origins: self.origin_phases(&transition),
        })
    }

    /// Fetches published ranges and compares them against committed state.
    async fn diff(&self, trigger: SyncTrigger, committed: &Committed) -> Result<Diff, SyncError> {
        self.emit_state(SyncState::Fetching, None);
        let published = self.fetch().await?;
        self.emit_state(SyncState::Diffing, None);
        let target_ranges = published.ranges();
        let ranges_changed =
            committed.ranges.as_ref().is_none_or(|record| !record.value.same_ranges(&target_ranges));
        let rotate_secret = self.rotation_due(trigger, committed.secret.as_ref());
        Ok(Diff {
            published,
            target_ranges,
            ranges_changed,
            rotate_secret,
        })
    }

    /// Fetches under the step timeout and tracks consecutive failures.
    async fn fetch(&self) -> Result<PublishedRanges, SyncError> {
        let result = match tokio::time::timeout(self.settings.step_timeout, self.source.fetch()).await {
            Ok(Ok(published)) => Ok(published),
            Ok(Err(err)) => Err(SyncError::FetchFailed(err.to_string())),
            Err(_) => Err(SyncError::Timeout(format!("fetch from {}", self.source.describe()))),
        };
        match result {
            Ok(published) => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
                self.metrics.set_consecutive_failures(0);
                Ok(published)
            }
            Err(err) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst).saturating_add(1);
                self.metrics.set_consecutive_failures(failures);
                self.emit_error(SyncEventKind::FetchFailed, None, &err);
                if failures >= self.settings.alert_after_failures {
                    self.emit_error(SyncEventKind::Alert, None, &err);
                }
                Err(err)
            }
        }
    }

    /// Returns true when a new secret should be issued.
    fn rotation_due(&self, trigger: SyncTrigger, secret: Option<&Versioned<EdgeSecret>>) -> bool {
        let Some(secret) = secret else {
            return true;
        };
        if trigger == SyncTrigger::RotateSecret {
            return true;
        }
        self.settings
            .secret_rotation_interval
            .is_some_and(|interval| secret.value.created_at.saturating_add(interval) <= self.clock.now())
    }

    /// Builds the transition record for a detected change.
    fn begin(&self, committed: &Committed, diff: Diff) -> Result<PendingTransition, SyncError> {
        let now = self.clock.now();
        let base_version = committed.range_version();
        let target_version = if diff.ranges_changed {
            base_version
                .checked_add(1)
                .ok_or_else(|| SyncError::Store(StoreError::Invalid("range version overflow".to_string())))?
        } else {
            base_version
        };
        let previous_secret = committed.secret.as_ref().map(|record| &record.value);
        let active_secret = match (diff.rotate_secret, previous_secret) {
            (false, Some(current)) => current.clone(),
            (_, previous) => EdgeSecret {
                value: self.secrets.generate().map_err(SyncError::Secret)?,
                created_at: now,
                version: previous.map_or(0, |secret| secret.version).saturating_add(1),
            },
        };
        let mut widen_secrets = BTreeSet::new();
        widen_secrets.insert(active_secret.value.clone());
        if let Some(previous) = previous_secret {
            widen_secrets.insert(previous.value.clone());
        }
        let widen_ranges = committed.range_set().union(&diff.target_ranges).copied().collect();
        let origins = self
            .publishers
            .iter()
            .map(|publisher| {
                let origin = publisher.origin().clone();
                (origin.key(), OriginProgress {
                    origin,
                    phase: OriginPhase::Pending,
                    widened_at: None,
                })
            })
            .collect::<BTreeMap<_, _>>();
        Ok(PendingTransition {
            base_version,
            target_version,
            target_ranges: diff.target_ranges,
            widen_ranges,
            ranges_changed: diff.ranges_changed,
            published: diff.published,
            secret_rotated: diff.rotate_secret || previous_secret.is_none(),
            active_secret,
            widen_secrets,
            grace_required: committed.ranges.is_some() || committed.secret.is_some(),
            started_at: now,
            origins,
        })
    }

    /// Applies the grace policy to every pending origin.
    async fn widen(
        &self,
        transition: &mut PendingTransition,
        revision: &mut u64,
        lease: &Lease,
    ) -> Result<(), SyncError> {
        self.emit_state(SyncState::PublishingGrace, Some(transition));
        let mut failures = Vec::new();
        for publisher in &self.publishers {
            let origin = publisher.origin();
            if transition.phase_of(origin) != OriginPhase::Pending {
                continue;
            }
            self.ensure_lease(lease)?;
            let policy = transition.grace_policy(origin);
            match self.apply(publisher.as_ref(), &policy).await {
                Ok(_) => {
                    self.ensure_lease(lease)?;
                    transition.mark(origin, OriginPhase::Widened, self.clock.now());
                    *revision = self.state.save_transition(*revision, transition, self.clock.now())?;
                }
                Err(err) => failures.push((origin.key(), err)),
            }
        }
        apply_failures(failures)
    }

    /// Applies the target policy to every widened origin.
    async fn narrow(
        &self,
        transition: &mut PendingTransition,
        revision: &mut u64,
        lease: &Lease,
    ) -> Result<(), SyncError> {
        self.emit_state(SyncState::Narrowing, Some(transition));
        let mut failures = Vec::new();
        for publisher in &self.publishers {
            let origin = publisher.origin();
            if transition.phase_of(origin) != OriginPhase::Widened {
                continue;
            }
            self.ensure_lease(lease)?;
            let policy = transition.steady_policy(origin);
            match self.apply(publisher.as_ref(), &policy).await {
                Ok(_) => {
                    self.ensure_lease(lease)?;
                    transition.mark(origin, OriginPhase::Narrowed, self.clock.now());
                    *revision = self.state.save_transition(*revision, transition, self.clock.now())?;
                }
                Err(err) => failures.push((origin.key(), err)),
            }
        }
        apply_failures(failures)
    }

    /// Applies one policy under the step timeout.
    async fn apply(
        &self,
        publisher: &dyn PolicyPublisher,
        policy: &OriginAccessPolicy,
    ) -> Result<ApplyOutcome, PublishError> {
        let key = publisher.origin().key();
        let result = tokio::time::timeout(self.settings.step_timeout, publisher.apply(policy))
            .await
            .unwrap_or(Err(PublishError::Timeout));
        self.metrics.record_apply(&key, result.is_ok());
        let mut event = self.event(match result {
            Ok(_) => SyncEventKind::OriginApplied,
            Err(_) => SyncEventKind::OriginFailed,
        });
        event.origin = Some(key);
        event.target_version = Some(policy.applied_version);
        event.error = result.as_ref().err().map(ToString::to_string);
        self.audit.record(&event);
        result
    }

    /// Commits the new secret once every origin accepts it.
    fn commit_secret(&self, transition: &PendingTransition, lease: &Lease) -> Result<(), SyncError> {
        if !transition.secret_rotated {
            return Ok(());
        }
        let current = self.state.load_secret()?;
        if current.as_ref().is_some_and(|record| record.value.version >= transition.active_secret.version) {
            return Ok(());
        }
        self.ensure_lease(lease)?;
        let expected = current.as_ref().map_or(0, |record| record.revision);
        self.state.commit_secret(expected, &transition.active_secret, self.clock.now())?;
        let mut event = self.event(SyncEventKind::SecretCommitted);
        event.secret_version = Some(transition.active_secret.version);
        self.audit.record(&event);
        Ok(())
    }

    /// Commits the target range set; returns the committed version.
    fn commit_ranges(&self, transition: &PendingTransition, lease: &Lease) -> Result<u64, SyncError> {
        let current = self.state.load_ranges()?;
        let current_version = current.as_ref().map_or(0, |record| record.value.version);
        if !transition.ranges_changed || current_version >= transition.target_version {
            return Ok(current_version);
        }
        let next = TrustedRangeSet::successor(
            current.as_ref().map(|record| &record.value),
            &transition.target_ranges,
            &transition.published,
        )
        .ok_or_else(|| SyncError::Store(StoreError::Invalid("range version overflow".to_string())))?;
        if next.version != transition.target_version {
            return Err(SyncError::VersionConflict(format!(
                "committed range version {current_version} does not precede target {}",
                transition.target_version
            )));
        }
        self.ensure_lease(lease)?;
        let expected = current.as_ref().map_or(0, |record| record.revision);
        self.state.commit_ranges(expected, &next, self.clock.now())?;
        let mut event = self.event(SyncEventKind::RangesCommitted);
        event.base_version = Some(transition.base_version);
        event.target_version = Some(next.version);
        self.audit.record(&event);
        Ok(next.version)
    }

    /// Returns the latest narrowing time across widened origins.
    fn narrow_deadline(&self, transition: &PendingTransition) -> Option<Timestamp> {
        self.publishers
            .iter()
            .filter(|publisher| transition.phase_of(publisher.origin()) == OriginPhase::Widened)
            .filter_map(|publisher| transition.narrow_after(publisher.origin(), self.settings.grace))
            .max()
    }

    /// Returns the phase of every configured origin.
    fn origin_phases(&self, transition: &PendingTransition) -> Vec<(OriginRef, OriginPhase)> {
        self.publishers
            .iter()
            .map(|publisher| (publisher.origin().clone(), transition.phase_of(publisher.origin())))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Lease and store helpers
    // ------------------------------------------------------------------------

    /// Acquires the singleton lease.
    fn acquire_lease(&self) -> Result<Lease, SyncError> {
        let ttl_ms = u64::try_from(self.settings.lease_ttl.as_millis()).unwrap_or(u64::MAX);
        let request = LeaseRequest {
            name: SYNC_LEASE_NAME.to_string(),
            holder: self.settings.holder_id.clone(),
            ttl_ms,
            now: self.clock.now(),
        };
        Ok(self.state.store().acquire_lease(&request)?)
    }

    /// Fails when the lease expired before a write.
    fn ensure_lease(&self, lease: &Lease) -> Result<(), SyncError> {
        if self.clock.now() >= lease.expires_at {
            return Err(SyncError::LeaseLost(format!("lease expired at {}", lease.expires_at)));
        }
        Ok(())
    }

    /// Loads committed ranges and secret.
    fn load_committed(&self) -> Result<Committed, SyncError> {
        Ok(Committed {
            ranges: self.state.load_ranges()?,
            secret: self.state.load_secret()?,
        })
    }

    // ------------------------------------------------------------------------
    // Audit helpers
    // ------------------------------------------------------------------------

    /// Creates an event stamped with the current time.
    fn event(&self, kind: SyncEventKind) -> SyncAuditEvent {
        SyncAuditEvent::new(
            kind,
            self.clock.now().as_millis(),
            &self.settings.holder_id,
            self.consecutive_failures(),
        )
    }

    /// Records a state transition.
    fn emit_state(&self, state: SyncState, transition: Option<&PendingTransition>) {
        let mut event = self.event(SyncEventKind::State);
        event.state = Some(state.as_str());
        if let Some(transition) = transition {
            event.base_version = Some(transition.base_version);
            event.target_version = Some(transition.target_version);
            event.secret_version = Some(transition.active_secret.version);
        }
        self.audit.record(&event);
    }

    /// Records an error event.
    fn emit_error(&self, kind: SyncEventKind, origin: Option<String>, err: &SyncError) {
        let mut event = self.event(kind);
        event.origin = origin;
        event.error = Some(err.to_string());
        self.audit.record(&event);
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns true when committed state moved past a persisted transition.
fn is_stale(transition: &PendingTransition, committed: &Committed) -> bool {
    let range_version = committed.range_version();
    let secret_version = committed.secret.as_ref().map_or(0, |record| record.value.version);
    (range_version != transition.base_version && range_version != transition.target_version)
        || secret_version > transition.active_secret.version
}

/// Builds a plan describing the range delta.
fn plan_of(committed: &Committed, target: &BTreeSet<IpRange>, ranges_changed: bool) -> SyncPlan {
    let current = committed.range_set();
    let base_version = committed.range_version();
    SyncPlan {
        base_version,
        target_version: if ranges_changed { base_version.saturating_add(1) } else { base_version },
        ranges_changed,
        secret_rotation: false,
        added: target.difference(&current).copied().collect(),
        removed: current.difference(target).copied().collect(),
        resuming: false,
    }
}

/// Converts collected per-origin failures into a run error.
fn apply_failures(failures: Vec<(String, PublishError)>) -> Result<(), SyncError> {
    let Some((_, first)) = failures.first() else {
        return Ok(());
    };
    let reason = first.to_string();
    Err(SyncError::PolicyApplyFailed {
        origins: failures.into_iter().map(|(origin, _)| origin).collect(),
        reason,
    })
}
