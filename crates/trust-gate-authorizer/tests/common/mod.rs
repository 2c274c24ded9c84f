// crates/trust-gate-authorizer/tests/common/mod.rs
// ============================================================================
// Module: Authorizer Test Fixtures
// Description: Token minting and two-domain registry fixtures.
// Purpose: Share HS256 token helpers and counting key sources across tests.
// Dependencies: trust-gate-authorizer, jsonwebtoken
// ============================================================================

#![allow(dead_code, reason = "Each integration test uses a subset of the fixtures.")]

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::Algorithm;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Header;
use serde_json::Value;
use serde_json::json;
use trust_gate_authorizer::AuthorizerSettings;
use trust_gate_authorizer::ClaimRule;
use trust_gate_authorizer::ClaimSchema;
use trust_gate_authorizer::DomainRegistry;
use trust_gate_authorizer::IdentityDomain;
use trust_gate_authorizer::KeyError;
use trust_gate_authorizer::KeySource;
use trust_gate_authorizer::SharedSecretSource;
use trust_gate_authorizer::TokenAuthorizer;
use trust_gate_config::ClaimKind;
use trust_gate_core::Clock;
use trust_gate_core::DomainId;
use trust_gate_core::ManualClock;
use trust_gate_core::SystemClock;

pub const CUSTOMER_ISSUER: &str = "https://cognito-idp.us-east-1.amazonaws.com/us-east-1_customer";
pub const STAFF_ISSUER: &str = "https://cognito-idp.us-east-1.amazonaws.com/us-east-1_staff";
pub const CUSTOMER_SECRET: &[u8] = b"customer-pool-signing-secret";
pub const STAFF_SECRET: &[u8] = b"staff-pool-signing-secret";

/// Key source wrapper counting lookups.
pub struct CountingKeySource {
    inner: SharedSecretSource,
    pub calls: AtomicUsize,
}

impl CountingKeySource {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            inner: SharedSecretSource::new(secret, None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySource for CountingKeySource {
    async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey, KeyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.decoding_key(kid).await
    }

    fn describe(&self) -> String {
        "counting".to_string()
    }
}

/// Key source that never answers within a test timeout.
pub struct SlowKeySource;

#[async_trait]
impl KeySource for SlowKeySource {
    async fn decoding_key(&self, _kid: Option<&str>) -> Result<DecodingKey, KeyError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Err(KeyError::Unavailable("slow".to_string()))
    }

    fn describe(&self) -> String {
        "slow".to_string()
    }
}

/// Key source whose remote document cannot be loaded.
pub struct UnreachableKeySource;

#[async_trait]
impl KeySource for UnreachableKeySource {
    async fn decoding_key(&self, _kid: Option<&str>) -> Result<DecodingKey, KeyError> {
        Err(KeyError::Unavailable("unreachable".to_string()))
    }

    async fn prewarm(&self) -> Result<(), KeyError> {
        Err(KeyError::Unavailable("unreachable".to_string()))
    }

    fn describe(&self) -> String {
        "unreachable".to_string()
    }
}

/// Two-domain fixture with counting key sources.
pub struct Fixture {
    pub authorizer: TokenAuthorizer,
    pub clock: Arc<ManualClock>,
    pub customer_keys: Arc<CountingKeySource>,
    pub staff_keys: Arc<CountingKeySource>,
}

pub fn customer_domain(key_source: Arc<dyn KeySource>) -> IdentityDomain {
    IdentityDomain {
        id: DomainId::Customer,
        issuer: CUSTOMER_ISSUER.to_string(),
        path_prefixes: vec!["/api/customer".to_string(), "/api/orders".to_string()],
        audiences: vec!["customer-web".to_string()],
        token_use: Some("id".to_string()),
        algorithms: vec![Algorithm::HS256],
        subject_claim: "sub".to_string(),
        groups_claim: "cognito:groups".to_string(),
        claims: ClaimSchema::default(),
        key_source,
    }
}

pub fn staff_domain(key_source: Arc<dyn KeySource>) -> IdentityDomain {
    IdentityDomain {
        id: DomainId::Staff,
        issuer: STAFF_ISSUER.to_string(),
        path_prefixes: vec!["/api/staff".to_string()],
        audiences: Vec::new(),
        token_use: Some("access".to_string()),
        algorithms: vec![Algorithm::HS256],
        subject_claim: "sub".to_string(),
        groups_claim: "cognito:groups".to_string(),
        claims: ClaimSchema::new(vec![ClaimRule {
            name: "custom:employee_id".to_string(),
            kind: ClaimKind::String,
            required: true,
        }]),
        key_source,
    }
}

pub fn fixture(settings: AuthorizerSettings) -> Fixture {
    let clock = Arc::new(ManualClock::new(SystemClock.now()));
    let customer_keys = Arc::new(CountingKeySource::new(CUSTOMER_SECRET));
    let staff_keys = Arc::new(CountingKeySource::new(STAFF_SECRET));
    let registry = DomainRegistry::new(vec![
        customer_domain(Arc::clone(&customer_keys) as Arc<dyn KeySource>),
        staff_domain(Arc::clone(&staff_keys) as Arc<dyn KeySource>),
    ])
    .expect("registry");
    let authorizer = TokenAuthorizer::new(registry, settings, Arc::clone(&clock) as Arc<dyn Clock>);
    Fixture {
        authorizer,
        clock,
        customer_keys,
        staff_keys,
    }
}

pub fn now_secs() -> u64 {
    SystemClock.now().as_secs()
}

pub fn customer_claims(ttl_secs: u64) -> Value {
    let now = now_secs();
    json!({
        "iss": CUSTOMER_ISSUER,
        "sub": "cust-42",
        "aud": "customer-web",
        "token_use": "id",
        "cognito:groups": ["buyers", "beta", "buyers"],
        "iat": now,
        "exp": now + ttl_secs,
        "jti": "cust-token-1"
    })
}

pub fn staff_claims(ttl_secs: u64) -> Value {
    let now = now_secs();
    json!({
        "iss": STAFF_ISSUER,
        "sub": "emp-7",
        "client_id": "staff-console",
        "token_use": "access",
        "cognito:groups": ["admins"],
        "custom:employee_id": "E-0007",
        "iat": now,
        "exp": now + ttl_secs,
        "jti": "staff-token-1"
    })
}

pub fn sign(claims: &Value, secret: &[u8]) -> String {
    jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &EncodingKey::from_secret(secret))
        .expect("sign token")
}
