// crates/trust-gate-authorizer/src/registry.rs
// ============================================================================
// Module: Identity Domain Registry
// Description: Path-prefix routing from request paths to identity domains.
// Purpose: Resolve the single domain a path belongs to before any token parsing.
// Dependencies: trust-gate-core, jsonwebtoken
// ============================================================================

//! ## Overview
//! The registry holds every configured [`IdentityDomain`] together with its
//! path prefixes. Prefixes of different domains may not overlap on a segment
//! boundary, so a path resolves to at most one domain. Resolution rejects
//! paths carrying dot segments, empty segments, encoded separators, or NUL
//! bytes instead of normalizing them.
//!
//! Security posture: the resolved domain is the only input that selects key
//! material; nothing read from a token can influence it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use jsonwebtoken::Algorithm;
use thiserror::Error;
use trust_gate_core::DomainId;

use crate::claims::ClaimSchema;
use crate::keys::KeySource;

// ============================================================================
// SECTION: Identity Domain
// ============================================================================

/// One isolated identity population and the keys that vouch for it.
#[derive(Clone)]
pub struct IdentityDomain {
    /// Domain identifier.
    pub id: DomainId,
    /// Expected `iss` claim.
    pub issuer: String,
    /// Path prefixes served by this domain.
    pub path_prefixes: Vec<String>,
    /// Accepted audiences (`aud` or `client_id`); empty accepts any.
    pub audiences: Vec<String>,
    /// Required `token_use` claim value.
    pub token_use: Option<String>,
    /// Accepted signing algorithms.
    pub algorithms: Vec<Algorithm>,
    /// Claim carrying the subject id.
    pub subject_claim: String,
    /// Claim carrying group memberships.
    pub groups_claim: String,
    /// Custom claim schema.
    pub claims: ClaimSchema,
    /// Signing key source for this domain only.
    pub key_source: Arc<dyn KeySource>,
}

impl fmt::Debug for IdentityDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityDomain")
            .field("id", &self.id)
            .field("issuer", &self.issuer)
            .field("path_prefixes", &self.path_prefixes)
            .field("key_source", &self.key_source.describe())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Registry construction errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// No domains were supplied.
    #[error("domain registry requires at least one domain")]
    Empty,
    /// Two entries share a domain id.
    #[error("duplicate identity domain {0}")]
    DuplicateDomain(DomainId),
    /// A prefix is not a normalized absolute path.
    #[error("invalid path prefix {0}")]
    InvalidPrefix(String),
    /// Prefixes of two domains overlap.
    #[error("path prefix {left} ({left_domain}) overlaps {right} ({right_domain})")]
    OverlappingPrefix {
        /// First prefix.
        left: String,
        /// Domain owning the first prefix.
        left_domain: DomainId,
        /// Second prefix.
        right: String,
        /// Domain owning the second prefix.
        right_domain: DomainId,
    },
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Routing rule from a prefix to a domain index.
#[derive(Debug, Clone)]
struct PrefixRule {
    /// Normalized prefix.
    prefix: String,
    /// Index into `domains`.
    domain: usize,
    /// Owning domain id.
    owner: DomainId,
}

/// Immutable registry of identity domains.
///
/// # Invariants
/// - Prefixes across domains are mutually exclusive on segment boundaries.
/// - Rules are ordered longest prefix first.
#[derive(Debug, Clone)]
pub struct DomainRegistry {
    /// Registered domains.
    domains: Vec<Arc<IdentityDomain>>,
    /// Ordered prefix rules.
    rules: Vec<PrefixRule>,
}

impl DomainRegistry {
    /// Builds a registry, rejecting duplicate ids and overlapping prefixes.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the domain set is not isolated.
    pub fn new(domains: Vec<IdentityDomain>) -> Result<Self, RegistryError> {
        if domains.is_empty() {
            return Err(RegistryError::Empty);
        }
        let mut ids = BTreeSet::new();
        let mut rules: Vec<PrefixRule> = Vec::new();
        for (index, domain) in domains.iter().enumerate() {
            if !ids.insert(domain.id) {
                return Err(RegistryError::DuplicateDomain(domain.id));
            }
            for prefix in &domain.path_prefixes {
                if !is_normalized_prefix(prefix) {
                    return Err(RegistryError::InvalidPrefix(prefix.clone()));
                }
                for rule in &rules {
                    if rule.owner != domain.id
                        && (prefix_covers(&rule.prefix, prefix) || prefix_covers(prefix, &rule.prefix))
                    {
                        return Err(RegistryError::OverlappingPrefix {
                            left: rule.prefix.clone(),
                            left_domain: rule.owner,
                            right: prefix.clone(),
                            right_domain: domain.id,
                        });
                    }
                }
                rules.push(PrefixRule {
                    prefix: prefix.clone(),
                    domain: index,
                    owner: domain.id,
                });
            }
        }
        rules.sort_by(|left, right| right.prefix.len().cmp(&left.prefix.len()));
        Ok(Self {
            domains: domains.into_iter().map(Arc::new).collect(),
            rules,
        })
    }

    /// Resolves the domain owning `path`.
    ///
    /// The query string and fragment are ignored. Returns `None` for paths
    /// that are not absolute, not normalized, or not covered by any prefix.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<&Arc<IdentityDomain>> {
        let path = strip_query(path);
        if !is_routable_path(path) {
            return None;
        }
        self.rules
            .iter()
            .find(|rule| prefix_covers(&rule.prefix, path))
            .and_then(|rule| self.domains.get(rule.domain))
    }

    /// Returns a domain by id.
    #[must_use]
    pub fn get(&self, id: DomainId) -> Option<&Arc<IdentityDomain>> {
        self.domains.iter().find(|domain| domain.id == id)
    }

    /// Returns every registered domain.
    #[must_use]
    pub fn domains(&self) -> &[Arc<IdentityDomain>] {
        &self.domains
    }
}

// ============================================================================
// SECTION: Method ARNs
// ============================================================================

/// Extracts the resource path from a gateway method ARN.
///
/// `arn:aws:execute-api:{region}:{account}:{api}/{stage}/{verb}/{path}`
/// yields `/{path}`; an ARN without a resource path yields `/`.
#[must_use]
pub fn extract_resource_path(method_arn: &str) -> Option<String> {
    let mut fields = method_arn.splitn(6, ':');
    if fields.next() != Some("arn") {
        return None;
    }
    let _partition = fields.next()?;
    if fields.next() != Some("execute-api") {
        return None;
    }
    let _region = fields.next()?;
    let _account = fields.next()?;
    let resource = fields.next()?;
    let mut parts = resource.splitn(4, '/');
    let _api = parts.next().filter(|value| !value.is_empty())?;
    let _stage = parts.next().filter(|value| !value.is_empty())?;
    let _verb = parts.next().filter(|value| !value.is_empty())?;
    Some(format!("/{}", parts.next().unwrap_or_default()))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Drops the query string and fragment.
fn strip_query(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or_default()
}

/// Returns true when `prefix` covers `path` on a segment boundary.
fn prefix_covers(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    path == prefix || path.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/'))
}

/// Returns true for a normalized absolute prefix.
fn is_normalized_prefix(prefix: &str) -> bool {
    prefix == "/" || (!prefix.ends_with('/') && is_routable_path(prefix))
}

/// Returns true for an absolute path free of ambiguous segments.
fn is_routable_path(path: &str) -> bool {
    if !path.starts_with('/') || path.contains('\0') {
        return false;
    }
    if path == "/" {
        return true;
    }
    path.split('/').skip(1).all(is_plain_segment)
}

/// Rejects empty, dot, and percent-encoded dot or separator segments.
fn is_plain_segment(segment: &str) -> bool {
    if segment.is_empty() || segment == "." || segment == ".." {
        return false;
    }
    let lowered = segment.to_ascii_lowercase();
    !(lowered.contains("%2e") || lowered.contains("%2f") || lowered.contains("%5c") || lowered.contains("%00"))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
