// crates/trust-gate-authorizer/tests/authorizer_decisions.rs
// ============================================================================
// Module: Authorizer Decision Tests
// Description: End-to-end allow/deny decisions across two identity domains.
// Purpose: Validate domain isolation, expiry, claims, revocation, and caching.
// Dependencies: trust-gate-authorizer, jsonwebtoken, tokio
// ============================================================================

//! ## Overview
//! Tokens are minted with HS256 against per-domain secrets so each domain
//! verifies with its own key source. The authorizer clock starts at wall
//! time so signature-library expiry checks and ours agree.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::CUSTOMER_SECRET;
use common::STAFF_SECRET;
use common::SlowKeySource;
use common::UnreachableKeySource;
use common::customer_claims;
use common::customer_domain;
use common::fixture;
use common::sign;
use common::staff_claims;
use common::staff_domain;
use serde_json::json;
use trust_gate_authorizer::AuthorizationRequest;
use trust_gate_authorizer::AuthorizerSettings;
use trust_gate_authorizer::AuthzAuditEvent;
use trust_gate_authorizer::AuthzAuditSink;
use trust_gate_authorizer::DenyReason;
use trust_gate_authorizer::DomainRegistry;
use trust_gate_authorizer::Effect;
use trust_gate_authorizer::KeyError;
use trust_gate_authorizer::KeySource;
use trust_gate_authorizer::RevocationSource;
use trust_gate_authorizer::SharedSecretSource;
use trust_gate_authorizer::SourceAttributes;
use trust_gate_authorizer::TokenAuthorizer;
use trust_gate_core::Clock;
use trust_gate_core::DomainId;
use trust_gate_core::HashDigest;
use trust_gate_core::ManualClock;
use trust_gate_core::SystemClock;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Revocation source that can be switched on mid-test.
#[derive(Default)]
struct ToggleRevocation {
    revoked: AtomicBool,
}

impl RevocationSource for ToggleRevocation {
    fn is_revoked(&self, _domain: DomainId, token_id: Option<&str>, _fingerprint: &HashDigest) -> bool {
        self.revoked.load(Ordering::SeqCst) && token_id == Some("cust-token-1")
    }
}

/// Audit sink capturing events in memory.
#[derive(Default)]
struct CapturingAudit {
    events: Mutex<Vec<AuthzAuditEvent>>,
}

impl AuthzAuditSink for CapturingAudit {
    fn record(&self, event: &AuthzAuditEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn request(path: &str, token: Option<&str>) -> AuthorizationRequest {
    AuthorizationRequest {
        path: path.to_string(),
        bearer_token: token.map(|token| format!("Bearer {token}")),
        source_attributes: SourceAttributes {
            peer_ip: Some("198.51.100.7".to_string()),
            request_id: Some("req-1".to_string()),
            method_arn: None,
        },
    }
}

// ============================================================================
// SECTION: Domain Isolation
// ============================================================================

#[tokio::test]
async fn customer_token_allowed_on_customer_path() {
    let fx = fixture(AuthorizerSettings::default());
    let token = sign(&customer_claims(600), CUSTOMER_SECRET);

    let verified = fx.authorizer.evaluate("/api/customer/profile", &token).await.unwrap();
    assert_eq!(verified.context.domain_id, DomainId::Customer);
    assert_eq!(verified.context.subject_id, "cust-42");
    assert_eq!(verified.context.groups, vec!["buyers", "beta"]);
    assert!(!verified.cache_hit);
    assert_eq!(fx.customer_keys.calls(), 1);
    assert_eq!(fx.staff_keys.calls(), 0);
}

#[tokio::test]
async fn staff_token_on_customer_path_is_domain_mismatch() {
    let fx = fixture(AuthorizerSettings::default());
    let token = sign(&staff_claims(600), STAFF_SECRET);

    let reason = fx.authorizer.evaluate("/api/customer/profile", &token).await.unwrap_err();
    assert_eq!(reason, DenyReason::DomainMismatch);
    assert_eq!(fx.customer_keys.calls(), 0);
    assert_eq!(fx.staff_keys.calls(), 0);

    let verified = fx.authorizer.evaluate("/api/staff/reports", &token).await.unwrap();
    assert_eq!(verified.context.domain_id, DomainId::Staff);
    assert_eq!(fx.staff_keys.calls(), 1);
}

#[tokio::test]
async fn customer_token_on_staff_path_is_domain_mismatch() {
    let fx = fixture(AuthorizerSettings::default());
    let token = sign(&customer_claims(600), CUSTOMER_SECRET);

    let reason = fx.authorizer.evaluate("/api/staff/reports", &token).await.unwrap_err();
    assert_eq!(reason, DenyReason::DomainMismatch);
}

#[tokio::test]
async fn forged_issuer_fails_signature_with_resolved_domain_key() {
    let fx = fixture(AuthorizerSettings::default());
    // Claims name the customer issuer but the staff key signed them.
    let token = sign(&customer_claims(600), STAFF_SECRET);

    let reason = fx.authorizer.evaluate("/api/customer/profile", &token).await.unwrap_err();
    assert_eq!(reason, DenyReason::SignatureInvalid);
    assert_eq!(fx.customer_keys.calls(), 1);
    assert_eq!(fx.staff_keys.calls(), 0);
}

#[tokio::test]
async fn unmapped_path_is_denied_before_token_inspection() {
    let fx = fixture(AuthorizerSettings::default());
    let token = sign(&customer_claims(600), CUSTOMER_SECRET);

    assert_eq!(fx.authorizer.evaluate("/public/catalog", &token).await.unwrap_err(), DenyReason::NoDomainForPath);
    assert_eq!(
        fx.authorizer.evaluate("/api/customer/../staff/reports", &token).await.unwrap_err(),
        DenyReason::NoDomainForPath
    );
    assert_eq!(fx.customer_keys.calls(), 0);
}

// ============================================================================
// SECTION: Token Checks
// ============================================================================

#[tokio::test]
async fn malformed_and_missing_tokens_are_denied() {
    let fx = fixture(AuthorizerSettings::default());

    assert_eq!(
        fx.authorizer.evaluate("/api/customer/profile", "not-a-jwt").await.unwrap_err(),
        DenyReason::TokenMalformed
    );
    let response = fx.authorizer.authorize(&request("/api/customer/profile", None)).await;
    assert_eq!(response.effect, Effect::Deny);
    assert_eq!(response.deny_reason, Some(DenyReason::MissingToken));
    assert!(response.context.is_none());
}

#[tokio::test]
async fn expired_token_is_denied() {
    let fx = fixture(AuthorizerSettings::default());
    let mut claims = customer_claims(0);
    claims["exp"] = json!(common::now_secs() - 120);
    let token = sign(&claims, CUSTOMER_SECRET);

    assert_eq!(
        fx.authorizer.evaluate("/api/customer/profile", &token).await.unwrap_err(),
        DenyReason::TokenExpired
    );
}

#[tokio::test]
async fn token_use_and_audience_are_enforced() {
    let fx = fixture(AuthorizerSettings::default());

    let mut wrong_use = customer_claims(600);
    wrong_use["token_use"] = json!("access");
    let token = sign(&wrong_use, CUSTOMER_SECRET);
    assert_eq!(
        fx.authorizer.evaluate("/api/customer/profile", &token).await.unwrap_err(),
        DenyReason::ClaimSchemaMismatch
    );

    let mut wrong_aud = customer_claims(600);
    wrong_aud["aud"] = json!("partner-portal");
    let token = sign(&wrong_aud, CUSTOMER_SECRET);
    assert_eq!(
        fx.authorizer.evaluate("/api/customer/profile", &token).await.unwrap_err(),
        DenyReason::ClaimSchemaMismatch
    );
}

#[tokio::test]
async fn staff_claim_schema_is_enforced() {
    let fx = fixture(AuthorizerSettings::default());

    let mut missing = staff_claims(600);
    missing.as_object_mut().unwrap().remove("custom:employee_id");
    let token = sign(&missing, STAFF_SECRET);
    assert_eq!(
        fx.authorizer.evaluate("/api/staff/reports", &token).await.unwrap_err(),
        DenyReason::ClaimSchemaMismatch
    );

    let mut wrong_type = staff_claims(600);
    wrong_type["custom:employee_id"] = json!(7);
    let token = sign(&wrong_type, STAFF_SECRET);
    assert_eq!(
        fx.authorizer.evaluate("/api/staff/reports", &token).await.unwrap_err(),
        DenyReason::ClaimSchemaMismatch
    );
}

#[tokio::test]
async fn non_string_groups_are_rejected() {
    let fx = fixture(AuthorizerSettings::default());
    let mut claims = customer_claims(600);
    claims["cognito:groups"] = json!(["buyers", 3]);
    let token = sign(&claims, CUSTOMER_SECRET);

    assert_eq!(
        fx.authorizer.evaluate("/api/customer/profile", &token).await.unwrap_err(),
        DenyReason::ClaimSchemaMismatch
    );
}

// ============================================================================
// SECTION: Caching And Revocation
// ============================================================================

#[tokio::test]
async fn cache_ttl_is_bounded_by_token_expiry() {
    let fx = fixture(AuthorizerSettings::default());
    let token = sign(&customer_claims(100), CUSTOMER_SECRET);

    let first = fx.authorizer.evaluate("/api/customer/profile", &token).await.unwrap();
    assert!(first.cache_ttl <= Duration::from_secs(100));
    assert!(first.cache_ttl > Duration::ZERO);

    let second = fx.authorizer.evaluate("/api/customer/profile", &token).await.unwrap();
    assert!(second.cache_hit);
    assert_eq!(fx.customer_keys.calls(), 1);

    fx.clock.advance(Duration::from_secs(101));
    assert_eq!(
        fx.authorizer.evaluate("/api/customer/profile", &token).await.unwrap_err(),
        DenyReason::TokenExpired
    );
    assert_eq!(fx.customer_keys.calls(), 2);
}

#[tokio::test]
async fn cache_is_scoped_by_domain() {
    let fx = fixture(AuthorizerSettings::default());
    let token = sign(&customer_claims(600), CUSTOMER_SECRET);

    fx.authorizer.evaluate("/api/customer/profile", &token).await.unwrap();
    assert_eq!(
        fx.authorizer.evaluate("/api/staff/reports", &token).await.unwrap_err(),
        DenyReason::DomainMismatch
    );
}

#[tokio::test]
async fn disabled_cache_verifies_every_request() {
    let fx = fixture(AuthorizerSettings {
        cache_ttl: Duration::ZERO,
        ..AuthorizerSettings::default()
    });
    let token = sign(&customer_claims(600), CUSTOMER_SECRET);

    let first = fx.authorizer.evaluate("/api/customer/profile", &token).await.unwrap();
    let second = fx.authorizer.evaluate("/api/customer/profile", &token).await.unwrap();
    assert_eq!(first.cache_ttl, Duration::ZERO);
    assert!(!second.cache_hit);
    assert_eq!(fx.customer_keys.calls(), 2);
}

#[tokio::test]
async fn revocation_applies_to_cached_decisions() {
    let revocation = Arc::new(ToggleRevocation::default());
    let fx = fixture(AuthorizerSettings::default());
    let authorizer = fx.authorizer.with_revocation(Arc::clone(&revocation) as Arc<dyn RevocationSource>);
    let token = sign(&customer_claims(600), CUSTOMER_SECRET);

    authorizer.evaluate("/api/customer/profile", &token).await.unwrap();
    assert_eq!(authorizer.cache().len(), 1);

    revocation.revoked.store(true, Ordering::SeqCst);
    assert_eq!(
        authorizer.evaluate("/api/customer/profile", &token).await.unwrap_err(),
        DenyReason::TokenRevoked
    );
    assert!(authorizer.cache().is_empty());
    assert_eq!(
        authorizer.evaluate("/api/customer/profile", &token).await.unwrap_err(),
        DenyReason::TokenRevoked
    );
}

// ============================================================================
// SECTION: Timeout And Audit
// ============================================================================

#[tokio::test]
async fn prewarm_reports_domains_whose_keys_fail_to_load() {
    let registry = DomainRegistry::new(vec![
        customer_domain(Arc::new(UnreachableKeySource) as Arc<dyn KeySource>),
        staff_domain(Arc::new(SharedSecretSource::new(STAFF_SECRET, None)) as Arc<dyn KeySource>),
    ])
    .unwrap();
    let clock = Arc::new(ManualClock::new(SystemClock.now()));
    let authorizer = TokenAuthorizer::new(registry, AuthorizerSettings::default(), clock as Arc<dyn Clock>);

    let failures = authorizer.prewarm_keys().await;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, DomainId::Customer);
    assert!(matches!(failures[0].1, KeyError::Unavailable(_)));
}

#[tokio::test(start_paused = true)]
async fn slow_key_source_hits_verification_timeout() {
    let registry = DomainRegistry::new(vec![
        customer_domain(Arc::new(SlowKeySource) as Arc<dyn KeySource>),
        staff_domain(Arc::new(SharedSecretSource::new(STAFF_SECRET, None)) as Arc<dyn KeySource>),
    ])
    .unwrap();
    let settings = AuthorizerSettings {
        verification_timeout: Duration::from_millis(100),
        ..AuthorizerSettings::default()
    };
    let clock = Arc::new(ManualClock::new(SystemClock.now()));
    let authorizer = TokenAuthorizer::new(registry, settings, clock as Arc<dyn Clock>);
    let token = sign(&customer_claims(600), CUSTOMER_SECRET);

    assert_eq!(
        authorizer.evaluate("/api/customer/profile", &token).await.unwrap_err(),
        DenyReason::VerificationTimeout
    );
    assert!(authorizer.cache().is_empty());
}

#[tokio::test]
async fn audit_records_reason_without_token() {
    let audit = Arc::new(CapturingAudit::default());
    let fx = fixture(AuthorizerSettings::default());
    let authorizer = fx.authorizer.with_audit(Arc::clone(&audit) as Arc<dyn AuthzAuditSink>);
    let staff_token = sign(&staff_claims(600), STAFF_SECRET);
    let customer_token = sign(&customer_claims(600), CUSTOMER_SECRET);

    let denied = authorizer.authorize(&request("/api/customer/profile", Some(&staff_token))).await;
    let allowed = authorizer.authorize(&request("/api/customer/profile", Some(&customer_token))).await;
    assert!(!denied.is_allowed());
    assert!(allowed.is_allowed());
    assert_eq!(allowed.context.as_ref().map(|context| context.domain_id), Some(DomainId::Customer));

    let events = audit.events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].reason, Some("domain_mismatch"));
    assert_eq!(events[0].domain, Some(DomainId::Customer));
    assert_eq!(events[0].request_id.as_deref(), Some("req-1"));
    assert_eq!(events[1].effect, Effect::Allow);
    let rendered = serde_json::to_string(&*events).unwrap();
    assert!(!rendered.contains(&staff_token));
    assert!(!rendered.contains(&customer_token));
}
