// crates/trust-gate-authorizer/src/authorizer.rs
// ============================================================================
// Module: Token Authorizer
// Description: Path-scoped bearer token verification.
// Purpose: Return an authorization context or a typed deny for each request.
// Dependencies: trust-gate-core, jsonwebtoken, base64, tokio
// ============================================================================

//! ## Overview
//! [`TokenAuthorizer`] evaluates a request in a fixed order:
//! 1. resolve the identity domain from the path;
//! 2. read the token issuer and key id without trusting them, denying an
//!    issuer that belongs to another domain;
//! 3. verify the signature with the resolved domain's key source only;
//! 4. check expiry, claim schema, and revocation;
//! 5. build the context with the resolved domain id.
//!
//! The whole verification runs under a hard timeout. Allow decisions are
//! cached per token fingerprint and domain. Callers see allow or deny;
//! the typed [`DenyReason`] goes to audit and metrics.
//!
//! Security posture: tokens are untrusted input until step 3 succeeds.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::Validation;
use jsonwebtoken::decode;
use jsonwebtoken::decode_header;
use jsonwebtoken::errors::ErrorKind;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;
use trust_gate_core::AuthorizationContext;
use trust_gate_core::Clock;
use trust_gate_core::DomainId;
use trust_gate_core::HashDigest;
use trust_gate_core::JsonLinesAuditSink;
use trust_gate_core::Timestamp;
use trust_gate_core::fingerprint_token;
use trust_gate_core::ordered_groups;

use crate::audit::AuthzAuditEvent;
use crate::audit::AuthzAuditSink;
use crate::audit::AuthzMetricEvent;
use crate::audit::AuthzMetrics;
use crate::audit::NoopMetrics;
use crate::cache::DecisionCache;
use crate::keys::KeyError;
use crate::registry::DomainRegistry;
use crate::registry::IdentityDomain;
use crate::registry::extract_resource_path;
use crate::revocation::RevocationSource;
use crate::revocation::StaticRevocationList;

// ============================================================================
// SECTION: Decisions
// ============================================================================

/// Authorization effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    /// Request may proceed.
    Allow,
    /// Request is rejected.
    Deny,
}

/// Typed deny reasons.
///
/// # Invariants
/// - Codes are stable for audit and metrics labels.
/// - Reasons are never returned to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// No domain serves the path.
    #[error("no identity domain serves the request path")]
    NoDomainForPath,
    /// No bearer token was presented.
    #[error("no bearer token presented")]
    MissingToken,
    /// The token could not be parsed.
    #[error("token is malformed")]
    TokenMalformed,
    /// The token was issued for another domain.
    #[error("token issuer does not match the path domain")]
    DomainMismatch,
    /// Unknown key id, disallowed algorithm, or bad signature.
    #[error("token signature is invalid")]
    SignatureInvalid,
    /// The token is outside its validity window.
    #[error("token is expired or not yet valid")]
    TokenExpired,
    /// The token was revoked.
    #[error("token is revoked")]
    TokenRevoked,
    /// Claims do not match the domain schema.
    #[error("token claims do not match the domain schema")]
    ClaimSchemaMismatch,
    /// Verification exceeded the hard timeout.
    #[error("token verification timed out")]
    VerificationTimeout,
    /// The domain's key source could not be consulted.
    #[error("signing keys are unavailable")]
    KeySourceUnavailable,
}

impl DenyReason {
    /// Returns the stable reason code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoDomainForPath => "no_domain_for_path",
            Self::MissingToken => "missing_token",
            Self::TokenMalformed => "token_malformed",
            Self::DomainMismatch => "domain_mismatch",
            Self::SignatureInvalid => "signature_invalid",
            Self::TokenExpired => "token_expired",
            Self::TokenRevoked => "token_revoked",
            Self::ClaimSchemaMismatch => "claim_schema_mismatch",
            Self::VerificationTimeout => "verification_timeout",
            Self::KeySourceUnavailable => "key_source_unavailable",
        }
    }
}

/// Successful verification.
#[derive(Debug, Clone)]
pub struct Verified {
    /// Verified context.
    pub context: Arc<AuthorizationContext>,
    /// Lifetime the caller may cache the allow for.
    pub cache_ttl: Duration,
    /// True when served from the decision cache.
    pub cache_hit: bool,
}

/// Decision with the facts needed for audit.
#[derive(Debug)]
struct Decision {
    /// Domain resolved from the path.
    domain: Option<DomainId>,
    /// Token fingerprint.
    fingerprint: Option<HashDigest>,
    /// Outcome.
    outcome: Result<Verified, DenyReason>,
}

impl Decision {
    /// Builds a deny decision.
    fn deny(domain: Option<DomainId>, fingerprint: Option<HashDigest>, reason: DenyReason) -> Self {
        Self {
            domain,
            fingerprint,
            outcome: Err(reason),
        }
    }
}

// ============================================================================
// SECTION: Invocation Contract
// ============================================================================

/// Request attributes supplied by the invoking edge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceAttributes {
    /// Client IP address.
    #[serde(default)]
    pub peer_ip: Option<String>,
    /// Request correlation id.
    #[serde(default)]
    pub request_id: Option<String>,
    /// Gateway method ARN, used when `path` is empty.
    #[serde(default)]
    pub method_arn: Option<String>,
}

/// Authorizer invocation input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    /// Request path.
    #[serde(default)]
    pub path: String,
    /// Bearer token, with or without the `Bearer ` scheme prefix.
    #[serde(default)]
    pub bearer_token: Option<String>,
    /// Edge-supplied attributes.
    #[serde(default)]
    pub source_attributes: SourceAttributes,
}

impl AuthorizationRequest {
    /// Returns the path to resolve, falling back to the method ARN.
    #[must_use]
    pub fn resource_path(&self) -> Option<String> {
        if !self.path.is_empty() {
            return Some(self.path.clone());
        }
        self.source_attributes.method_arn.as_deref().and_then(extract_resource_path)
    }

    /// Returns the token with any `Bearer` scheme prefix removed.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        let raw = self.bearer_token.as_deref()?.trim();
        let token = match raw.split_once(' ') {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
            _ => raw,
        };
        (!token.is_empty()).then_some(token)
    }
}

/// Authorizer invocation output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorizationResponse {
    /// Decision.
    pub effect: Effect,
    /// Context on allow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<AuthorizationContext>,
    /// Seconds the caller may cache this allow (0 on deny).
    pub cache_ttl_secs: u64,
    /// Internal deny reason; never serialized.
    #[serde(skip)]
    pub deny_reason: Option<DenyReason>,
}

impl AuthorizationResponse {
    /// Returns true for an allow decision.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.effect == Effect::Allow
    }
}

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Authorizer runtime settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorizerSettings {
    /// Decision cache TTL; zero disables caching.
    pub cache_ttl: Duration,
    /// Maximum cached decisions.
    pub max_cache_entries: usize,
    /// Hard verification timeout.
    pub verification_timeout: Duration,
    /// Clock skew leeway for expiry checks, in seconds.
    pub leeway_secs: u64,
}

impl Default for AuthorizerSettings {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),
            max_cache_entries: 10_000,
            verification_timeout: Duration::from_millis(250),
            leeway_secs: 0,
        }
    }
}

// ============================================================================
// SECTION: Authorizer
// ============================================================================

/// Dual-domain bearer token authorizer.
pub struct TokenAuthorizer {
    /// Domain registry.
    registry: DomainRegistry,
    /// Runtime settings.
    settings: AuthorizerSettings,
    /// Allow decision cache.
    cache: DecisionCache,
    /// Revocation lookups.
    revocation: Arc<dyn RevocationSource>,
    /// Clock for expiry and cache checks.
    clock: Arc<dyn Clock>,
    /// Decision audit sink.
    audit: Arc<dyn AuthzAuditSink>,
    /// Decision metrics.
    metrics: Arc<dyn AuthzMetrics>,
}

impl TokenAuthorizer {
    /// Creates an authorizer with no revocations and no-op audit and metrics.
    #[must_use]
    pub fn new(registry: DomainRegistry, settings: AuthorizerSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry,
            settings,
            cache: DecisionCache::new(settings.cache_ttl, settings.max_cache_entries),
            revocation: Arc::new(StaticRevocationList::default()),
            clock,
            audit: Arc::new(JsonLinesAuditSink::noop()),
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Replaces the revocation source.
    #[must_use]
    pub fn with_revocation(mut self, revocation: Arc<dyn RevocationSource>) -> Self {
        self.revocation = revocation;
        self
    }

    /// Replaces the audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuthzAuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Replaces the metrics sink.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn AuthzMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Returns the domain registry.
    #[must_use]
    pub const fn registry(&self) -> &DomainRegistry {
        &self.registry
    }

    /// Returns the decision cache.
    #[must_use]
    pub const fn cache(&self) -> &DecisionCache {
        &self.cache
    }

    /// Loads every domain's keys ahead of the first request and returns the
    /// domains whose load failed. Failed domains still fetch on first use.
    pub async fn prewarm_keys(&self) -> Vec<(DomainId, KeyError)> {
        let mut failures = Vec::new();
        for domain in self.registry.domains() {
            if let Err(err) = domain.key_source.prewarm().await {
                failures.push((domain.id, err));
            }
        }
        failures
    }

    /// Evaluates `token` for `path` without auditing.
    ///
    /// # Errors
    ///
    /// Returns the [`DenyReason`] when the request is denied.
    pub async fn evaluate(&self, path: &str, token: &str) -> Result<Verified, DenyReason> {
        self.decide(path, Some(token)).await.outcome
    }

    /// Handles an invocation: decides, audits, records metrics, and
    /// renders the caller-facing response.
    pub async fn authorize(&self, request: &AuthorizationRequest) -> AuthorizationResponse {
        let started = Instant::now();
        let path = request.resource_path().unwrap_or_default();
        let decision = self.decide(&path, request.token()).await;
        let latency = started.elapsed();

        let (effect, reason, cache_hit) = match &decision.outcome {
            Ok(verified) => (Effect::Allow, None, verified.cache_hit),
            Err(reason) => (Effect::Deny, Some(*reason), false),
        };
        let metric = AuthzMetricEvent {
            domain: decision.domain,
            effect,
            reason,
            cache_hit,
        };
        self.metrics.record_decision(metric);
        self.metrics.record_latency(metric, latency);
        self.audit.record(&AuthzAuditEvent {
            event: "authz_decision",
            timestamp_ms: self.clock.now().as_millis(),
            request_id: request.source_attributes.request_id.clone(),
            peer_ip: request.source_attributes.peer_ip.clone(),
            path,
            domain: decision.domain,
            effect,
            reason: reason.map(DenyReason::as_str),
            token_fingerprint: decision.fingerprint.as_ref().map(|digest| digest.as_str().to_string()),
            cache_hit,
            latency_us: u64::try_from(latency.as_micros()).unwrap_or(u64::MAX),
        });

        match decision.outcome {
            Ok(verified) => AuthorizationResponse {
                effect: Effect::Allow,
                context: Some(verified.context.as_ref().clone()),
                cache_ttl_secs: verified.cache_ttl.as_secs(),
                deny_reason: None,
            },
            Err(reason) => AuthorizationResponse {
                effect: Effect::Deny,
                context: None,
                cache_ttl_secs: 0,
                deny_reason: Some(reason),
            },
        }
    }

    /// Runs the decision pipeline.
    async fn decide(&self, path: &str, token: Option<&str>) -> Decision {
        let Some(domain) = self.registry.resolve(path) else {
            return Decision::deny(None, None, DenyReason::NoDomainForPath);
        };
        let Some(token) = token.map(str::trim).filter(|token| !token.is_empty()) else {
            return Decision::deny(Some(domain.id), None, DenyReason::MissingToken);
        };
        let fingerprint = fingerprint_token(token);
        let now = self.clock.now();

        if let Some(hit) = self.cache.get(&fingerprint, domain.id, now) {
            if self.revocation.is_revoked(domain.id, hit.token_id.as_deref(), &fingerprint) {
                self.cache.remove(&fingerprint, domain.id);
                return Decision::deny(Some(domain.id), Some(fingerprint), DenyReason::TokenRevoked);
            }
            let cache_ttl = hit.remaining(now);
            return Decision {
                domain: Some(domain.id),
                fingerprint: Some(fingerprint),
                outcome: Ok(Verified {
                    context: hit.context,
                    cache_ttl,
                    cache_hit: true,
                }),
            };
        }

        let verified = tokio::time::timeout(
            self.settings.verification_timeout,
            self.verify(domain, token, &fingerprint, now),
        )
        .await
        .unwrap_or(Err(DenyReason::VerificationTimeout));

        let outcome = verified.map(|(context, token_id)| {
            let context = Arc::new(context);
            let cache_ttl = self
                .cache
                .insert(fingerprint.clone(), domain.id, Arc::clone(&context), token_id, now)
                .unwrap_or(Duration::ZERO);
            Verified {
                context,
                cache_ttl,
                cache_hit: false,
            }
        });
        Decision {
            domain: Some(domain.id),
            fingerprint: Some(fingerprint),
            outcome,
        }
    }

    /// Verifies `token` against `domain` and builds its context.
    async fn verify(
        &self,
        domain: &IdentityDomain,
        token: &str,
        fingerprint: &HashDigest,
        now: Timestamp,
    ) -> Result<(AuthorizationContext, Option<String>), DenyReason> {
        let header = decode_header(token).map_err(|_| DenyReason::TokenMalformed)?;
        let unverified = unverified_claims(token)?;
        let issuer = unverified.get("iss").and_then(Value::as_str).ok_or(DenyReason::TokenMalformed)?;
        if issuer != domain.issuer {
            return Err(DenyReason::DomainMismatch);
        }
        if !domain.algorithms.contains(&header.alg) {
            return Err(DenyReason::SignatureInvalid);
        }

        let key = domain.key_source.decoding_key(header.kid.as_deref()).await.map_err(|err| match err {
            KeyError::UnknownKey(_) => DenyReason::SignatureInvalid,
            KeyError::Unavailable(_) | KeyError::Invalid(_) => DenyReason::KeySourceUnavailable,
        })?;

        let mut validation = Validation::new(header.alg);
        validation.algorithms.clone_from(&domain.algorithms);
        validation.set_issuer(&[domain.issuer.as_str()]);
        validation.validate_aud = false;
        validation.validate_nbf = true;
        validation.leeway = self.settings.leeway_secs;
        let claims = decode::<Map<String, Value>>(token, &key, &validation)
            .map_err(|err| map_decode_error(err.kind()))?
            .claims;

        let expires_at = claims.get("exp").and_then(Value::as_u64).ok_or(DenyReason::ClaimSchemaMismatch)?;
        if now.as_secs() > expires_at.saturating_add(self.settings.leeway_secs) {
            return Err(DenyReason::TokenExpired);
        }
        check_domain_claims(domain, &claims)?;

        let token_id = claims.get("jti").and_then(Value::as_str).map(ToString::to_string);
        if self.revocation.is_revoked(domain.id, token_id.as_deref(), fingerprint) {
            return Err(DenyReason::TokenRevoked);
        }

        let subject_id = claims
            .get(&domain.subject_claim)
            .and_then(Value::as_str)
            .filter(|subject| !subject.is_empty())
            .ok_or(DenyReason::ClaimSchemaMismatch)?
            .to_string();
        let groups = match claims.get(&domain.groups_claim) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => {
                let names: Option<Vec<&str>> = items.iter().map(Value::as_str).collect();
                ordered_groups(names.ok_or(DenyReason::ClaimSchemaMismatch)?)
            }
            Some(_) => return Err(DenyReason::ClaimSchemaMismatch),
        };
        let issued_at = claims.get("iat").and_then(Value::as_u64).map(Timestamp::from_secs);
        Ok((
            AuthorizationContext {
                subject_id,
                domain_id: domain.id,
                groups,
                issued_at,
                expires_at: Timestamp::from_secs(expires_at),
                raw_claims: claims,
            },
            token_id,
        ))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Decodes the payload segment without verifying the signature.
fn unverified_claims(token: &str) -> Result<Map<String, Value>, DenyReason> {
    let mut segments = token.split('.');
    let (Some(_), Some(payload), Some(_), None) =
        (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        return Err(DenyReason::TokenMalformed);
    };
    let bytes = URL_SAFE_NO_PAD.decode(payload).map_err(|_| DenyReason::TokenMalformed)?;
    serde_json::from_slice(&bytes).map_err(|_| DenyReason::TokenMalformed)
}

/// Maps a verification error onto a deny reason.
fn map_decode_error(kind: &ErrorKind) -> DenyReason {
    match kind {
        ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => DenyReason::TokenExpired,
        ErrorKind::InvalidIssuer => DenyReason::DomainMismatch,
        ErrorKind::InvalidAudience | ErrorKind::InvalidSubject | ErrorKind::MissingRequiredClaim(_) => {
            DenyReason::ClaimSchemaMismatch
        }
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
            DenyReason::TokenMalformed
        }
        _ => DenyReason::SignatureInvalid,
    }
}

/// Checks `token_use`, audience, and the custom claim schema.
fn check_domain_claims(domain: &IdentityDomain, claims: &Map<String, Value>) -> Result<(), DenyReason> {
    if let Some(expected) = &domain.token_use
        && claims.get("token_use").and_then(Value::as_str) != Some(expected.as_str())
    {
        return Err(DenyReason::ClaimSchemaMismatch);
    }
    if !domain.audiences.is_empty() {
        let accepted = |value: &str| domain.audiences.iter().any(|audience| audience == value);
        let aud_ok = match claims.get("aud") {
            Some(Value::String(aud)) => accepted(aud),
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).any(accepted),
            _ => false,
        };
        let client_ok = claims.get("client_id").and_then(Value::as_str).is_some_and(accepted);
        if !aud_ok && !client_ok {
            return Err(DenyReason::ClaimSchemaMismatch);
        }
    }
    domain.claims.check(claims).map_err(|_| DenyReason::ClaimSchemaMismatch)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
