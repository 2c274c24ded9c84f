// crates/trust-gate-core/src/runtime/store.rs
// ============================================================================
// Module: Trust Gate In-Memory Store
// Description: Process-local trust store with CAS and leases.
// Purpose: Back tests and single-process deployments without a database.
// Dependencies: crate::interfaces
// ============================================================================

//! ## Overview
//! [`InMemoryTrustStore`] implements the full [`TrustStore`] contract with a
//! mutex-guarded map. It is not durable; restart-survival requires the
//! SQLite store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::core::time::Timestamp;
use crate::interfaces::Lease;
use crate::interfaces::LeaseRequest;
use crate::interfaces::RecordKey;
use crate::interfaces::StoreError;
use crate::interfaces::StoredRecord;
use crate::interfaces::TrustStore;

// ============================================================================
// SECTION: Store
// ============================================================================

/// Mutable store contents.
#[derive(Debug, Default)]
struct Inner {
    /// Records by key.
    records: BTreeMap<RecordKey, StoredRecord>,
    /// Leases by name.
    leases: BTreeMap<String, Lease>,
}

/// In-memory trust store.
#[derive(Debug, Default)]
pub struct InMemoryTrustStore {
    /// Guarded contents.
    inner: Mutex<Inner>,
}

impl InMemoryTrustStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the store contents.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Io("trust store mutex poisoned".to_string()))
    }
}

impl TrustStore for InMemoryTrustStore {
    fn load(&self, key: RecordKey) -> Result<Option<StoredRecord>, StoreError> {
        Ok(self.lock()?.records.get(&key).cloned())
    }

    fn compare_and_swap(
        &self,
        key: RecordKey,
        expected_revision: u64,
        payload: &[u8],
        now: Timestamp,
    ) -> Result<u64, StoreError> {
        let mut guard = self.lock()?;
        let actual = guard.records.get(&key).map_or(0, |record| record.revision);
        if actual != expected_revision {
            return Err(StoreError::VersionConflict {
                key: key.as_str().to_string(),
                expected: expected_revision,
                actual,
            });
        }
        let revision = actual
            .checked_add(1)
            .ok_or_else(|| StoreError::Invalid("record revision overflow".to_string()))?;
        guard.records.insert(
            key,
            StoredRecord {
                revision,
                payload: payload.to_vec(),
                updated_at: now,
            },
        );
        drop(guard);
        Ok(revision)
    }

    fn compare_and_delete(&self, key: RecordKey, expected_revision: u64) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let actual = guard.records.get(&key).map_or(0, |record| record.revision);
        if actual != expected_revision {
            return Err(StoreError::VersionConflict {
                key: key.as_str().to_string(),
                expected: expected_revision,
                actual,
            });
        }
        guard.records.remove(&key);
        drop(guard);
        Ok(())
    }

    fn acquire_lease(&self, request: &LeaseRequest) -> Result<Lease, StoreError> {
        let mut guard = self.lock()?;
        let expires_at = request.now.saturating_add(std::time::Duration::from_millis(request.ttl_ms));
        let token = match guard.leases.get(&request.name) {
            Some(current) if current.holder == request.holder => current.token,
            Some(current) if current.expires_at > request.now => {
                return Err(StoreError::LeaseHeld {
                    holder: current.holder.clone(),
                    expires_at: current.expires_at,
                });
            }
            Some(current) => current.token.saturating_add(1),
            None => 1,
        };
        let lease = Lease {
            name: request.name.clone(),
            holder: request.holder.clone(),
            token,
            expires_at,
        };
        guard.leases.insert(request.name.clone(), lease.clone());
        drop(guard);
        Ok(lease)
    }

    fn release_lease(&self, lease: &Lease) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        if guard
            .leases
            .get(&lease.name)
            .is_some_and(|current| current.holder == lease.holder && current.token == lease.token)
        {
            guard.leases.remove(&lease.name);
        }
        drop(guard);
        Ok(())
    }

    fn location(&self) -> String {
        "memory://trust-gate".to_string()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
