// crates/trust-gate-config/tests/common/mod.rs
// =============================================================================
// Module: Config Test Helpers
// Description: Shared helpers for config validation tests.
// Purpose: Reduce duplication across integration tests for trust-gate-config.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use trust_gate_config::TrustGateConfig;

/// Two-domain authorizer section shared by every fixture.
pub const DOMAINS_TOML: &str = r#"
[[authorizer.domains]]
id = "customer"
issuer = "https://cognito-idp.us-east-1.amazonaws.com/us-east-1_customer"
path_prefixes = ["/api/customer", "/api/orders"]
key_source = { type = "jwks_url", url = "https://cognito-idp.us-east-1.amazonaws.com/us-east-1_customer/.well-known/jwks.json" }

[[authorizer.domains]]
id = "staff"
issuer = "https://cognito-idp.us-east-1.amazonaws.com/us-east-1_staff"
path_prefixes = ["/api/staff"]
token_use = "access"
claims = [{ name = "custom:employee_id", kind = "string", required = true }]
key_source = { type = "jwks_url", url = "https://cognito-idp.us-east-1.amazonaws.com/us-east-1_staff/.well-known/jwks.json" }
"#;

/// Synchronizer section with two origins.
pub const SYNC_TOML: &str = r#"
[sync]
holder_id = "sync-a"

[[sync.origins]]
type = "s3_bucket"
bucket = "marketplace-site"

[[sync.origins]]
type = "api_gateway"
rest_api_id = "a1b2c3"
stage = "prod"
"#;

/// Parses a TOML string without validation.
pub fn config_from_toml(toml_str: &str) -> Result<TrustGateConfig, toml::de::Error> {
    toml::from_str(toml_str)
}

/// Returns a minimal config with both domains and all defaults applied.
pub fn minimal_config() -> Result<TrustGateConfig, toml::de::Error> {
    config_from_toml(DOMAINS_TOML)
}

/// Returns a config with both domains and a synchronizer.
pub fn config_with_sync() -> Result<TrustGateConfig, toml::de::Error> {
    config_from_toml(&format!("{DOMAINS_TOML}\n{SYNC_TOML}"))
}
