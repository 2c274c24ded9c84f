// crates/trust-gate-authorizer/src/builder.rs
// ============================================================================
// Module: Authorizer Builder
// Description: Construct a token authorizer from validated configuration.
// Purpose: Turn `[authorizer]` config into domains, key sources, and settings.
// Dependencies: trust-gate-config, jsonwebtoken
// ============================================================================

//! ## Overview
//! [`build_authorizer`] expects configuration that already passed
//! `TrustGateConfig::validate`, and re-checks only what validation cannot
//! see: environment-provided secrets and key material.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use thiserror::Error;
use trust_gate_config::AuthorizerConfig;
use trust_gate_config::DomainConfig;
use trust_gate_config::KeySourceConfig;
use trust_gate_core::Clock;

use crate::authorizer::AuthorizerSettings;
use crate::authorizer::TokenAuthorizer;
use crate::claims::ClaimRule;
use crate::claims::ClaimSchema;
use crate::keys::KeyError;
use crate::keys::KeySource;
use crate::keys::RemoteJwksConfig;
use crate::keys::RemoteJwksSource;
use crate::keys::SharedSecretSource;
use crate::keys::StaticJwksSource;
use crate::registry::DomainRegistry;
use crate::registry::IdentityDomain;
use crate::registry::RegistryError;
use crate::revocation::StaticRevocationList;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Authorizer construction errors.
#[derive(Debug, Error)]
pub enum AuthorizerBuildError {
    /// Unsupported algorithm name.
    #[error("domain {domain}: unsupported algorithm {algorithm}")]
    Algorithm {
        /// Domain label.
        domain: String,
        /// Algorithm name.
        algorithm: String,
    },
    /// Shared secret environment variable missing or empty.
    #[error("domain {domain}: environment variable {variable} is not set")]
    MissingSecret {
        /// Domain label.
        domain: String,
        /// Variable name.
        variable: String,
    },
    /// Key source construction failed.
    #[error("domain {domain}: {source}")]
    KeySource {
        /// Domain label.
        domain: String,
        /// Underlying error.
        source: KeyError,
    },
    /// Registry rejected the domains.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Builds an authorizer, reading shared secrets through `env`.
///
/// # Errors
///
/// Returns [`AuthorizerBuildError`] when a domain cannot be constructed.
pub fn build_authorizer<E>(
    config: &AuthorizerConfig,
    clock: Arc<dyn Clock>,
    env: E,
) -> Result<TokenAuthorizer, AuthorizerBuildError>
where
    E: Fn(&str) -> Option<String>,
{
    let mut domains = Vec::with_capacity(config.domains.len());
    for domain in &config.domains {
        domains.push(build_domain(domain, &clock, &env)?);
    }
    let registry = DomainRegistry::new(domains)?;
    let settings = AuthorizerSettings {
        cache_ttl: Duration::from_secs(config.cache_ttl_secs),
        max_cache_entries: config.max_cache_entries,
        verification_timeout: Duration::from_millis(config.verification_timeout_ms),
        leeway_secs: config.leeway_secs,
    };
    let revocation = StaticRevocationList::from_token_ids(config.revoked_token_ids.iter().cloned());
    Ok(TokenAuthorizer::new(registry, settings, clock).with_revocation(Arc::new(revocation)))
}

/// Builds one identity domain.
fn build_domain<E>(
    config: &DomainConfig,
    clock: &Arc<dyn Clock>,
    env: &E,
) -> Result<IdentityDomain, AuthorizerBuildError>
where
    E: Fn(&str) -> Option<String>,
{
    let label = config.id.to_string();
    let algorithms = config
        .algorithms
        .iter()
        .map(|name| {
            Algorithm::from_str(name).map_err(|_| AuthorizerBuildError::Algorithm {
                domain: label.clone(),
                algorithm: name.clone(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let key_source = build_key_source(&label, &config.key_source, clock, env)?;
    Ok(IdentityDomain {
        id: config.id,
        issuer: config.issuer.clone(),
        path_prefixes: config.path_prefixes.clone(),
        audiences: config.audiences.clone(),
        token_use: config.token_use.clone(),
        algorithms,
        subject_claim: config.subject_claim.clone(),
        groups_claim: config.groups_claim.clone(),
        claims: ClaimSchema::new(config.claims.iter().map(ClaimRule::from).collect()),
        key_source,
    })
}

/// Builds the key source for one domain.
fn build_key_source<E>(
    label: &str,
    config: &KeySourceConfig,
    clock: &Arc<dyn Clock>,
    env: &E,
) -> Result<Arc<dyn KeySource>, AuthorizerBuildError>
where
    E: Fn(&str) -> Option<String>,
{
    let key_error = |source: KeyError| AuthorizerBuildError::KeySource {
        domain: label.to_string(),
        source,
    };
    match config {
        KeySourceConfig::JwksUrl {
            url,
            cache_ttl_secs,
            timeout_ms,
            max_response_bytes,
            min_refresh_interval_secs,
            allow_http,
        } => {
            let remote = RemoteJwksSource::new(
                RemoteJwksConfig {
                    url: url.clone(),
                    cache_ttl: Duration::from_secs(*cache_ttl_secs),
                    timeout: Duration::from_millis(*timeout_ms),
                    max_response_bytes: *max_response_bytes,
                    min_refresh_interval: Duration::from_secs(*min_refresh_interval_secs),
                    allow_http: *allow_http,
                },
                Arc::clone(clock),
            )
            .map_err(key_error)?;
            Ok(Arc::new(remote))
        }
        KeySourceConfig::Jwks {
            document,
        } => Ok(Arc::new(StaticJwksSource::from_json(document).map_err(key_error)?)),
        KeySourceConfig::SharedSecret {
            secret_env,
            kid,
        } => {
            let secret = env(secret_env).filter(|value| !value.is_empty()).ok_or_else(|| {
                AuthorizerBuildError::MissingSecret {
                    domain: label.to_string(),
                    variable: secret_env.clone(),
                }
            })?;
            Ok(Arc::new(SharedSecretSource::new(secret.as_bytes(), kid.clone())))
        }
    }
}
