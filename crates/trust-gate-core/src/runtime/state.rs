// crates/trust-gate-core/src/runtime/state.rs
// ============================================================================
// Module: Trust Gate Typed State
// Description: Typed, versioned access to trust records.
// Purpose: Enforce monotonic versions on top of the byte-level store.
// Dependencies: crate::{core, interfaces}, serde_json
// ============================================================================

//! ## Overview
//! [`TrustState`] serializes trust records as JSON and writes them through
//! compare-and-swap. Range and secret versions are checked against the
//! record being replaced, so a version can never go backwards even if a
//! caller computes it from stale data.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::core::policy::PendingTransition;
use crate::core::time::Timestamp;
use crate::core::trust::EdgeSecret;
use crate::core::trust::TrustedRangeSet;
use crate::interfaces::RecordKey;
use crate::interfaces::StoreError;
use crate::interfaces::TrustStore;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Value loaded together with its store revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    /// Decoded value.
    pub value: T,
    /// Store revision used for the next conditional write.
    pub revision: u64,
}

/// Typed accessor over a [`TrustStore`].
#[derive(Clone)]
pub struct TrustState {
    /// Backing store.
    store: Arc<dyn TrustStore>,
}

impl TrustState {
    /// Wraps a store.
    #[must_use]
    pub fn new(store: Arc<dyn TrustStore>) -> Self {
        Self {
            store,
        }
    }

    /// Returns the backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn TrustStore> {
        &self.store
    }

    // ------------------------------------------------------------------------
    // Trusted ranges
    // ------------------------------------------------------------------------

    /// Loads the committed range set.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading or decoding fails.
    pub fn load_ranges(&self) -> Result<Option<Versioned<TrustedRangeSet>>, StoreError> {
        self.load(RecordKey::TrustedRanges)
    }

    /// Commits a new range set; its version must exceed the replaced one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VersionConflict`] when another writer advanced
    /// the record, or [`StoreError::Invalid`] when the version does not
    /// increase.
    pub fn commit_ranges(
        &self,
        expected_revision: u64,
        ranges: &TrustedRangeSet,
        now: Timestamp,
    ) -> Result<u64, StoreError> {
        let current = self.load_ranges()?;
        check_increasing(
            RecordKey::TrustedRanges,
            expected_revision,
            current.as_ref().map(|c| (c.revision, c.value.version)),
            ranges.version,
        )?;
        self.write(RecordKey::TrustedRanges, expected_revision, ranges, now)
    }

    // ------------------------------------------------------------------------
    // Edge secret
    // ------------------------------------------------------------------------

    /// Loads the active edge secret.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading or decoding fails.
    pub fn load_secret(&self) -> Result<Option<Versioned<EdgeSecret>>, StoreError> {
        self.load(RecordKey::EdgeSecret)
    }

    /// Commits a new active secret; its version must exceed the replaced one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on conflict or non-increasing version.
    pub fn commit_secret(
        &self,
        expected_revision: u64,
        secret: &EdgeSecret,
        now: Timestamp,
    ) -> Result<u64, StoreError> {
        let current = self.load_secret()?;
        check_increasing(
            RecordKey::EdgeSecret,
            expected_revision,
            current.as_ref().map(|c| (c.revision, c.value.version)),
            secret.version,
        )?;
        self.write(RecordKey::EdgeSecret, expected_revision, secret, now)
    }

    // ------------------------------------------------------------------------
    // Transition
    // ------------------------------------------------------------------------

    /// Loads the in-flight transition.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading or decoding fails.
    pub fn load_transition(&self) -> Result<Option<Versioned<PendingTransition>>, StoreError> {
        self.load(RecordKey::Transition)
    }

    /// Saves the in-flight transition.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VersionConflict`] when another writer advanced it.
    pub fn save_transition(
        &self,
        expected_revision: u64,
        transition: &PendingTransition,
        now: Timestamp,
    ) -> Result<u64, StoreError> {
        self.write(RecordKey::Transition, expected_revision, transition, now)
    }

    /// Removes a completed transition.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VersionConflict`] when another writer advanced it.
    pub fn clear_transition(&self, expected_revision: u64) -> Result<(), StoreError> {
        self.store.compare_and_delete(RecordKey::Transition, expected_revision)
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Loads and decodes a record.
    fn load<T: DeserializeOwned>(&self, key: RecordKey) -> Result<Option<Versioned<T>>, StoreError> {
        let Some(record) = self.store.load(key)? else {
            return Ok(None);
        };
        let value = serde_json::from_slice(&record.payload)
            .map_err(|err| StoreError::Corrupt(format!("{key}: {err}")))?;
        Ok(Some(Versioned {
            value,
            revision: record.revision,
        }))
    }

    /// Encodes and conditionally writes a record.
    fn write<T: Serialize>(
        &self,
        key: RecordKey,
        expected_revision: u64,
        value: &T,
        now: Timestamp,
    ) -> Result<u64, StoreError> {
        let payload =
            serde_json::to_vec(value).map_err(|err| StoreError::Invalid(format!("{key}: {err}")))?;
        self.store.compare_and_swap(key, expected_revision, &payload, now)
    }
}

/// Rejects stale revisions and non-increasing versions before writing.
fn check_increasing(
    key: RecordKey,
    expected_revision: u64,
    current: Option<(u64, u64)>,
    next_version: u64,
) -> Result<(), StoreError> {
    let (actual_revision, current_version) = current.unwrap_or((0, 0));
    if actual_revision != expected_revision {
        return Err(StoreError::VersionConflict {
            key: key.as_str().to_string(),
            expected: expected_revision,
            actual: actual_revision,
        });
    }
    if next_version <= current_version {
        return Err(StoreError::Invalid(format!(
            "{key}: version {next_version} does not advance past {current_version}"
        )));
    }
    Ok(())
}
