// crates/trust-gate-authorizer/src/cache.rs
// ============================================================================
// Module: Decision Cache
// Description: Bounded read-through cache of allow decisions.
// Purpose: Skip signature verification for recently verified tokens.
// Dependencies: trust-gate-core
// ============================================================================

//! ## Overview
//! Entries are keyed by the token fingerprint plus the domain resolved from
//! the path, so a token verified for one domain never produces a cached
//! allow for another. Entries are immutable and expire at the earlier of the
//! configured TTL and the token's own expiry. Only allow decisions are
//! cached.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;

use trust_gate_core::AuthorizationContext;
use trust_gate_core::DomainId;
use trust_gate_core::HashDigest;
use trust_gate_core::Timestamp;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Cached allow decision.
#[derive(Debug, Clone)]
pub struct CachedDecision {
    /// Verified context.
    pub context: Arc<AuthorizationContext>,
    /// Token id used for revocation re-checks.
    pub token_id: Option<String>,
    /// Entry expiry.
    pub expires_at: Timestamp,
}

impl CachedDecision {
    /// Returns the remaining lifetime at `now`.
    #[must_use]
    pub const fn remaining(&self, now: Timestamp) -> Duration {
        self.expires_at.duration_since(now)
    }
}

/// Bounded decision cache.
#[derive(Debug)]
pub struct DecisionCache {
    /// Configured TTL; zero disables caching.
    ttl: Duration,
    /// Maximum entries.
    max_entries: usize,
    /// Entries keyed by fingerprint and domain.
    entries: RwLock<HashMap<(HashDigest, DomainId), CachedDecision>>,
}

impl DecisionCache {
    /// Creates a cache.
    #[must_use]
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns true when caching is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero() && self.max_entries > 0
    }

    /// Returns a live entry.
    #[must_use]
    pub fn get(&self, fingerprint: &HashDigest, domain: DomainId, now: Timestamp) -> Option<CachedDecision> {
        if !self.is_enabled() {
            return None;
        }
        let guard = self.entries.read().ok()?;
        guard.get(&(fingerprint.clone(), domain)).filter(|entry| now < entry.expires_at).cloned()
    }

    /// Inserts an allow decision and returns the TTL granted, or `None` when
    /// the entry was not cached.
    pub fn insert(
        &self,
        fingerprint: HashDigest,
        domain: DomainId,
        context: Arc<AuthorizationContext>,
        token_id: Option<String>,
        now: Timestamp,
    ) -> Option<Duration> {
        if !self.is_enabled() {
            return None;
        }
        let ttl = self.ttl.min(context.expires_at.duration_since(now));
        if ttl.is_zero() {
            return None;
        }
        let mut guard = self.entries.write().ok()?;
        if guard.len() >= self.max_entries {
            guard.retain(|_, entry| now < entry.expires_at);
        }
        if guard.len() >= self.max_entries {
            return None;
        }
        guard.insert(
            (fingerprint, domain),
            CachedDecision {
                context,
                token_id,
                expires_at: now.saturating_add(ttl),
            },
        );
        drop(guard);
        Some(ttl)
    }

    /// Drops an entry.
    pub fn remove(&self, fingerprint: &HashDigest, domain: DomainId) {
        if let Ok(mut guard) = self.entries.write() {
            guard.remove(&(fingerprint.clone(), domain));
        }
    }

    /// Returns the number of stored entries, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map_or(0, |guard| guard.len())
    }

    /// Returns true when no entries are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
