// crates/trust-gate-core/src/core/trust.rs
// ============================================================================
// Module: Trust Gate Trust Records
// Description: Trusted range sets and edge secrets.
// Purpose: Model the durable facts that decide whether traffic came via the edge.
// Dependencies: serde, subtle
// ============================================================================

//! ## Overview
//! [`PublishedRanges`] is what the edge provider currently advertises.
//! [`TrustedRangeSet`] is the committed, versioned copy the synchronizer
//! has fully applied. [`EdgeSecret`] is the shared value the edge injects
//! into every origin request.
//!
//! Security posture: secret values never appear in `Debug` output and are
//! compared in constant time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;

use serde::Deserialize;
use serde::Serialize;
use subtle::ConstantTimeEq;

use crate::core::ranges::IpRange;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Published Ranges
// ============================================================================

/// Ranges as fetched from the edge provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedRanges {
    /// IPv4 ranges.
    pub ipv4_ranges: BTreeSet<IpRange>,
    /// IPv6 ranges.
    pub ipv6_ranges: BTreeSet<IpRange>,
    /// Source label (URL or configured name).
    pub source: String,
    /// Provider sync token when the document carries one.
    pub sync_token: Option<String>,
    /// Fetch time.
    pub fetched_at: Timestamp,
}

impl PublishedRanges {
    /// Builds a published set, splitting ranges by family.
    #[must_use]
    pub fn from_ranges<I>(ranges: I, source: impl Into<String>, fetched_at: Timestamp) -> Self
    where
        I: IntoIterator<Item = IpRange>,
    {
        let (ipv4_ranges, ipv6_ranges) = split_by_family(ranges);
        Self {
            ipv4_ranges,
            ipv6_ranges,
            source: source.into(),
            sync_token: None,
            fetched_at,
        }
    }

    /// Returns true when no ranges were published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ipv4_ranges.is_empty() && self.ipv6_ranges.is_empty()
    }

    /// Returns every range across both families.
    #[must_use]
    pub fn ranges(&self) -> BTreeSet<IpRange> {
        self.ipv4_ranges.union(&self.ipv6_ranges).copied().collect()
    }
}

// ============================================================================
// SECTION: Trusted Range Set
// ============================================================================

/// Committed, versioned range set.
///
/// # Invariants
/// - `version` strictly increases on every committed change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedRangeSet {
    /// Monotonic version; 1 for the first committed set.
    pub version: u64,
    /// IPv4 ranges.
    pub ipv4_ranges: BTreeSet<IpRange>,
    /// IPv6 ranges.
    pub ipv6_ranges: BTreeSet<IpRange>,
    /// Fetch time of the ranges that were committed.
    pub fetched_at: Timestamp,
    /// Source label of the committed ranges.
    pub source: String,
}

impl TrustedRangeSet {
    /// Builds the successor of `previous` from a published set.
    ///
    /// Returns `None` when the version would overflow.
    #[must_use]
    pub fn successor(previous: Option<&Self>, ranges: &BTreeSet<IpRange>, published: &PublishedRanges) -> Option<Self> {
        let version = match previous {
            Some(prev) => prev.version.checked_add(1)?,
            None => 1,
        };
        let (ipv4_ranges, ipv6_ranges) = split_by_family(ranges.iter().copied());
        Some(Self {
            version,
            ipv4_ranges,
            ipv6_ranges,
            fetched_at: published.fetched_at,
            source: published.source.clone(),
        })
    }

    /// Returns every range across both families.
    #[must_use]
    pub fn ranges(&self) -> BTreeSet<IpRange> {
        self.ipv4_ranges.union(&self.ipv6_ranges).copied().collect()
    }

    /// Returns true when the committed ranges equal `ranges`.
    #[must_use]
    pub fn same_ranges(&self, ranges: &BTreeSet<IpRange>) -> bool {
        &self.ranges() == ranges
    }

    /// Returns true when any committed range contains `addr`.
    #[must_use]
    pub fn contains(&self, addr: IpAddr) -> bool {
        self.ipv4_ranges.iter().chain(self.ipv6_ranges.iter()).any(|range| range.contains(addr))
    }
}

// ============================================================================
// SECTION: Edge Secret
// ============================================================================

/// Shared secret value with redacted formatting.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretValue(String);

impl SecretValue {
    /// Wraps a secret value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw secret for rendering into policy documents.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Compares against a presented value in constant time.
    #[must_use]
    pub fn matches(&self, presented: &str) -> bool {
        let expected = self.0.as_bytes();
        let presented = presented.as_bytes();
        expected.len() == presented.len() && bool::from(expected.ct_eq(presented))
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue(<redacted>)")
    }
}

/// Active edge secret record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSecret {
    /// Secret value.
    pub value: SecretValue,
    /// Creation time.
    pub created_at: Timestamp,
    /// Monotonic version; 1 for the first secret.
    pub version: u64,
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Splits ranges into IPv4 and IPv6 sets.
fn split_by_family<I>(ranges: I) -> (BTreeSet<IpRange>, BTreeSet<IpRange>)
where
    I: IntoIterator<Item = IpRange>,
{
    ranges.into_iter().partition(IpRange::is_ipv4)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
