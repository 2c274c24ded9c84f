// crates/trust-gate-authorizer/src/revocation.rs
// ============================================================================
// Module: Token Revocation
// Description: Revocation lookups for verified tokens.
// Purpose: Deny tokens that verify but were withdrawn before expiry.
// Dependencies: trust-gate-core
// ============================================================================

//! ## Overview
//! Revocation is consulted after signature and claim checks and again on
//! every decision cache hit, so a revoked token stops working without
//! waiting for its cache entry to expire.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use trust_gate_core::DomainId;
use trust_gate_core::HashDigest;

// ============================================================================
// SECTION: Revocation Source
// ============================================================================

/// Revocation lookup interface.
pub trait RevocationSource: Send + Sync {
    /// Returns true when the token is revoked.
    fn is_revoked(&self, domain: DomainId, token_id: Option<&str>, fingerprint: &HashDigest) -> bool;
}

/// Fixed revocation list of token ids and token fingerprints.
#[derive(Debug, Clone, Default)]
pub struct StaticRevocationList {
    /// Revoked `jti` values.
    token_ids: BTreeSet<String>,
    /// Revoked token fingerprints.
    fingerprints: BTreeSet<String>,
}

impl StaticRevocationList {
    /// Creates a list from revoked token ids.
    #[must_use]
    pub fn from_token_ids<I, S>(token_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            token_ids: token_ids.into_iter().map(Into::into).collect(),
            fingerprints: BTreeSet::new(),
        }
    }

    /// Adds a revoked token fingerprint.
    #[must_use]
    pub fn with_fingerprint(mut self, fingerprint: &HashDigest) -> Self {
        self.fingerprints.insert(fingerprint.as_str().to_string());
        self
    }
}

impl RevocationSource for StaticRevocationList {
    fn is_revoked(&self, _domain: DomainId, token_id: Option<&str>, fingerprint: &HashDigest) -> bool {
        token_id.is_some_and(|jti| self.token_ids.contains(jti)) || self.fingerprints.contains(fingerprint.as_str())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
