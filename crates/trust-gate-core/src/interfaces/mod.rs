// crates/trust-gate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Trust Gate Interfaces
// Description: Backend-agnostic storage interfaces for trust records.
// Purpose: Define the conditional-write contract durable stores implement.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! Trust records are opaque versioned payloads. Every mutation is a
//! compare-and-swap on the record version; there is no blind overwrite.
//! Single-writer jobs coordinate through named leases with an expiry.
//!
//! Security posture: store contents are untrusted on load and are re-checked
//! by the typed layer in [`crate::runtime`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use thiserror::Error;

use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Record Keys
// ============================================================================

/// Well-known trust record keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordKey {
    /// Committed [`crate::TrustedRangeSet`].
    TrustedRanges,
    /// Active [`crate::EdgeSecret`].
    EdgeSecret,
    /// In-flight [`crate::PendingTransition`].
    Transition,
}

impl RecordKey {
    /// Returns the stable storage key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TrustedRanges => "trusted_ranges",
            Self::EdgeSecret => "edge_secret",
            Self::Transition => "transition",
        }
    }

    /// Parses a stable storage key.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "trusted_ranges" => Some(Self::TrustedRanges),
            "edge_secret" => Some(Self::EdgeSecret),
            "transition" => Some(Self::Transition),
            _ => None,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Records and Leases
// ============================================================================

/// Versioned record as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    /// Record revision; starts at 1 and increments on every write.
    pub revision: u64,
    /// Serialized payload.
    pub payload: Vec<u8>,
    /// Time of the last write.
    pub updated_at: Timestamp,
}

/// Lease acquisition request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseRequest {
    /// Lease name.
    pub name: String,
    /// Holder identity.
    pub holder: String,
    /// Lease lifetime in milliseconds.
    pub ttl_ms: u64,
    /// Current time.
    pub now: Timestamp,
}

/// Granted lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    /// Lease name.
    pub name: String,
    /// Holder identity.
    pub holder: String,
    /// Fencing token; increments every time the lease changes hands.
    pub token: u64,
    /// Expiry time.
    pub expires_at: Timestamp,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Trust store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("trust store io error: {0}")]
    Io(String),
    /// Database error.
    #[error("trust store db error: {0}")]
    Db(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("trust store corruption: {0}")]
    Corrupt(String),
    /// Store data or request is invalid.
    #[error("trust store invalid data: {0}")]
    Invalid(String),
    /// Conditional write lost against a concurrent writer.
    #[error("trust store version conflict on {key}: expected {expected}, found {actual}")]
    VersionConflict {
        /// Record key.
        key: String,
        /// Revision the caller expected.
        expected: u64,
        /// Revision found in the store.
        actual: u64,
    },
    /// Lease is held by another holder.
    #[error("lease held by {holder} until {expires_at}")]
    LeaseHeld {
        /// Current holder.
        holder: String,
        /// Expiry of the current lease.
        expires_at: Timestamp,
    },
}

// ============================================================================
// SECTION: Trust Store
// ============================================================================

/// Durable store for versioned trust records.
pub trait TrustStore: Send + Sync {
    /// Loads a record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn load(&self, key: RecordKey) -> Result<Option<StoredRecord>, StoreError>;

    /// Writes `payload` when the current revision equals `expected_revision`
    /// (0 meaning absent) and returns the new revision.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VersionConflict`] when the revision moved.
    fn compare_and_swap(
        &self,
        key: RecordKey,
        expected_revision: u64,
        payload: &[u8],
        now: Timestamp,
    ) -> Result<u64, StoreError>;

    /// Deletes a record when the current revision equals `expected_revision`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VersionConflict`] when the revision moved.
    fn compare_and_delete(&self, key: RecordKey, expected_revision: u64) -> Result<(), StoreError>;

    /// Acquires or renews a named lease.
    ///
    /// Succeeds when the lease is absent, expired, or already held by the
    /// requesting holder.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LeaseHeld`] when another holder owns the lease.
    fn acquire_lease(&self, request: &LeaseRequest) -> Result<Lease, StoreError>;

    /// Releases a lease if still held with the same token.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the release cannot be recorded.
    fn release_lease(&self, lease: &Lease) -> Result<(), StoreError>;

    /// Returns a human-readable location for provisioning output.
    fn location(&self) -> String;

    /// Reports store readiness for liveness/readiness probes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store is unavailable.
    fn readiness(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
