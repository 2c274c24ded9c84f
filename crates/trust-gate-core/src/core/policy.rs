// crates/trust-gate-core/src/core/policy.rs
// ============================================================================
// Module: Trust Gate Origin Policies
// Description: Origin access policies and in-flight transition records.
// Purpose: Describe what each origin accepts and how a change is rolled out.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! An [`OriginAccessPolicy`] is the abstract policy a publisher materializes
//! on one origin. A [`PendingTransition`] is the persisted plan for moving
//! every origin from the committed state to a new target: first a grace
//! policy that accepts old and new ranges and secrets, then the narrowed
//! policy that accepts only the target.
//!
//! Security posture: an empty range or secret set accepts nothing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::OriginRef;
use crate::core::ranges::IpRange;
use crate::core::time::Timestamp;
use crate::core::trust::EdgeSecret;
use crate::core::trust::PublishedRanges;
use crate::core::trust::SecretValue;

// ============================================================================
// SECTION: Origin Access Policy
// ============================================================================

/// Rollout phase a policy belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyPhase {
    /// Union of old and new during a grace window.
    Grace,
    /// Target-only policy.
    Steady,
}

/// Materialized access policy for one origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginAccessPolicy {
    /// Origin the policy applies to.
    pub applies_to: OriginRef,
    /// Source ranges accepted.
    pub allowed_ranges: BTreeSet<IpRange>,
    /// Secrets accepted; more than one only during a grace window.
    pub required_secrets: BTreeSet<SecretValue>,
    /// Range version this policy is derived from.
    pub applied_version: u64,
    /// Rollout phase.
    pub phase: PolicyPhase,
}

impl OriginAccessPolicy {
    /// Returns true when a request from `addr` carrying `secret` is accepted.
    #[must_use]
    pub fn accepts(&self, addr: IpAddr, secret: Option<&str>) -> bool {
        let Some(secret) = secret else {
            return false;
        };
        let in_range = self.allowed_ranges.iter().any(|range| range.contains(addr));
        let secret_ok = self.required_secrets.iter().any(|value| value.matches(secret));
        in_range && secret_ok
    }
}

// ============================================================================
// SECTION: Transitions
// ============================================================================

/// Progress of a single origin through a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginPhase {
    /// Nothing applied for this transition yet.
    Pending,
    /// Grace policy confirmed.
    Widened,
    /// Target policy confirmed.
    Narrowed,
}

/// Per-origin transition progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginProgress {
    /// Origin being transitioned.
    pub origin: OriginRef,
    /// Current phase.
    pub phase: OriginPhase,
    /// Time the grace policy was confirmed.
    pub widened_at: Option<Timestamp>,
}

/// Persisted plan for an in-flight range or secret change.
///
/// # Invariants
/// - `widen_ranges` is a superset of both the committed and target ranges.
/// - `widen_secrets` contains the target secret and the previous secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransition {
    /// Committed range version when the transition started (0 when none).
    pub base_version: u64,
    /// Range version the narrowed policies carry.
    pub target_version: u64,
    /// Ranges the origins narrow to.
    pub target_ranges: BTreeSet<IpRange>,
    /// Ranges accepted during grace.
    pub widen_ranges: BTreeSet<IpRange>,
    /// True when the target ranges differ from the committed ranges.
    pub ranges_changed: bool,
    /// Published document the target was derived from.
    pub published: PublishedRanges,
    /// Secret that is active once the transition completes.
    pub active_secret: EdgeSecret,
    /// True when `active_secret` is new and must be committed.
    pub secret_rotated: bool,
    /// Secrets accepted during grace.
    pub widen_secrets: BTreeSet<SecretValue>,
    /// False on first bootstrap when nothing was protected before.
    pub grace_required: bool,
    /// Start time.
    pub started_at: Timestamp,
    /// Progress keyed by [`OriginRef::key`].
    pub origins: BTreeMap<String, OriginProgress>,
}

impl PendingTransition {
    /// Returns the grace policy for `origin`.
    #[must_use]
    pub fn grace_policy(&self, origin: &OriginRef) -> OriginAccessPolicy {
        OriginAccessPolicy {
            applies_to: origin.clone(),
            allowed_ranges: self.widen_ranges.clone(),
            required_secrets: self.widen_secrets.clone(),
            applied_version: self.target_version,
            phase: PolicyPhase::Grace,
        }
    }

    /// Returns the narrowed policy for `origin`.
    #[must_use]
    pub fn steady_policy(&self, origin: &OriginRef) -> OriginAccessPolicy {
        let mut required_secrets = BTreeSet::new();
        required_secrets.insert(self.active_secret.value.clone());
        OriginAccessPolicy {
            applies_to: origin.clone(),
            allowed_ranges: self.target_ranges.clone(),
            required_secrets,
            applied_version: self.target_version,
            phase: PolicyPhase::Steady,
        }
    }

    /// Returns the phase recorded for `origin`.
    #[must_use]
    pub fn phase_of(&self, origin: &OriginRef) -> OriginPhase {
        self.origins.get(&origin.key()).map_or(OriginPhase::Pending, |progress| progress.phase)
    }

    /// Records a phase change for `origin`.
    pub fn mark(&mut self, origin: &OriginRef, phase: OriginPhase, at: Timestamp) {
        let entry = self.origins.entry(origin.key()).or_insert_with(|| OriginProgress {
            origin: origin.clone(),
            phase: OriginPhase::Pending,
            widened_at: None,
        });
        entry.phase = phase;
        if phase == OriginPhase::Widened {
            entry.widened_at = Some(at);
        }
    }

    /// Returns the time at which `origin` may be narrowed.
    #[must_use]
    pub fn narrow_after(&self, origin: &OriginRef, grace: Duration) -> Option<Timestamp> {
        let progress = self.origins.get(&origin.key())?;
        let widened_at = progress.widened_at?;
        if self.grace_required {
            Some(widened_at.saturating_add(grace))
        } else {
            Some(widened_at)
        }
    }

    /// Returns true when every listed origin confirmed the narrowed policy.
    #[must_use]
    pub fn is_complete<'a, I>(&self, origins: I) -> bool
    where
        I: IntoIterator<Item = &'a OriginRef>,
    {
        origins.into_iter().all(|origin| self.phase_of(origin) == OriginPhase::Narrowed)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
