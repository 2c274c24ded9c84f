// crates/trust-gate-core/src/core/context.rs
// ============================================================================
// Module: Trust Gate Authorization Context
// Description: Identity facts extracted from a verified bearer credential.
// Purpose: Carry subject, domain, and group membership to downstream handlers.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! An [`AuthorizationContext`] only exists for a credential that verified
//! against the domain resolved from the request path. The domain is supplied
//! by the authorizer, never read from a claim inside the token.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::core::identifiers::DomainId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Authorization Context
// ============================================================================

/// Result of a successful token validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationContext {
    /// Subject identifier from the credential.
    pub subject_id: String,
    /// Domain resolved from the request path.
    pub domain_id: DomainId,
    /// Group memberships in first-seen order without duplicates.
    pub groups: Vec<String>,
    /// Issued-at time when present in the credential.
    pub issued_at: Option<Timestamp>,
    /// Expiry time of the credential.
    pub expires_at: Timestamp,
    /// Opaque claim map as presented by the identity provider.
    pub raw_claims: Map<String, Value>,
}

impl AuthorizationContext {
    /// Returns true when the subject belongs to `group`.
    #[must_use]
    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|member| member == group)
    }
}

/// Deduplicates groups while preserving first-seen order.
#[must_use]
pub fn ordered_groups<I, S>(groups: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut ordered: Vec<String> = Vec::new();
    for group in groups {
        let group = group.into();
        if !ordered.contains(&group) {
            ordered.push(group);
        }
    }
    ordered
}
