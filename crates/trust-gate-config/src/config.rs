// crates/trust-gate-config/src/config.rs
// ============================================================================
// Module: Trust Gate Configuration
// Description: Configuration loading and validation for Trust Gate.
// Purpose: Provide strict, fail-closed config parsing with explicit limits.
// Dependencies: serde, toml, trust-gate-core, trust-gate-store-sqlite
// ============================================================================

//! ## Overview
//! Configuration is loaded from `trust-gate.toml` (or the path named by
//! `TRUST_GATE_CONFIG`) and validated before any component is built.
//! Invariants:
//! - Path prefixes of different identity domains never overlap.
//! - Each domain id appears at most once.
//! - Remote fetches require `https://` unless `allow_http` is set.
//! - The grace window is shorter than the sync interval and the lease.
//!
//! Security posture: config input is untrusted and must be validated.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use trust_gate_core::DomainId;
use trust_gate_core::IpRange;
use trust_gate_core::OriginKind;
use trust_gate_store_sqlite::SqliteStoreConfig;
use trust_gate_store_sqlite::SqliteStoreMode;
use trust_gate_store_sqlite::SqliteSyncMode;

// ============================================================================
// SECTION: Limits and Defaults
// ============================================================================

/// Default config file name.
const DEFAULT_CONFIG_NAME: &str = "trust-gate.toml";
/// Environment variable used to override the config path.
pub(crate) const CONFIG_ENV_VAR: &str = "TRUST_GATE_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum number of path prefixes per domain.
pub(crate) const MAX_PATH_PREFIXES: usize = 64;
/// Maximum number of claim rules per domain.
pub(crate) const MAX_CLAIM_RULES: usize = 32;
/// Maximum number of revoked token ids.
pub(crate) const MAX_REVOKED_TOKEN_IDS: usize = 10_000;
/// Maximum number of origins.
pub(crate) const MAX_ORIGINS: usize = 32;
/// Default decision cache TTL in seconds.
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
/// Maximum decision cache TTL in seconds.
const MAX_CACHE_TTL_SECS: u64 = 3_600;
/// Default maximum cached decisions.
const DEFAULT_MAX_CACHE_ENTRIES: usize = 10_000;
/// Maximum cached decisions.
const MAX_CACHE_ENTRIES: usize = 1_000_000;
/// Default per-request verification timeout in milliseconds.
const DEFAULT_VERIFICATION_TIMEOUT_MS: u64 = 250;
/// Minimum per-request verification timeout in milliseconds.
const MIN_VERIFICATION_TIMEOUT_MS: u64 = 10;
/// Maximum per-request verification timeout in milliseconds.
const MAX_VERIFICATION_TIMEOUT_MS: u64 = 5_000;
/// Maximum clock skew leeway in seconds.
const MAX_LEEWAY_SECS: u64 = 300;
/// Default JWKS cache TTL in seconds.
const DEFAULT_JWKS_CACHE_TTL_SECS: u64 = 3_600;
/// Default JWKS fetch timeout in milliseconds.
const DEFAULT_JWKS_TIMEOUT_MS: u64 = 2_000;
/// Default JWKS response limit in bytes.
const DEFAULT_JWKS_MAX_BYTES: usize = 256 * 1024;
/// Default minimum interval between JWKS refreshes for unknown key ids.
const DEFAULT_JWKS_MIN_REFRESH_SECS: u64 = 30;
/// Default sync interval (7 days).
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;
/// Minimum sync interval.
const MIN_SYNC_INTERVAL_SECS: u64 = 60;
/// Default grace window (15 minutes).
const DEFAULT_GRACE_SECS: u64 = 15 * 60;
/// Default synchronizer step timeout in milliseconds.
const DEFAULT_STEP_TIMEOUT_MS: u64 = 10_000;
/// Minimum synchronizer step timeout in milliseconds.
const MIN_STEP_TIMEOUT_MS: u64 = 100;
/// Maximum synchronizer step timeout in milliseconds.
const MAX_STEP_TIMEOUT_MS: u64 = 300_000;
/// Default synchronizer lease TTL in seconds.
const DEFAULT_LEASE_TTL_SECS: u64 = 60 * 60;
/// Default consecutive fetch failures before an alert.
const DEFAULT_ALERT_AFTER_FAILURES: u32 = 3;
/// Default edge-provider range document.
const DEFAULT_RANGES_URL: &str = "https://ip-ranges.amazonaws.com/ip-ranges.json";
/// Default service filter applied to the range document.
const DEFAULT_RANGES_SERVICE: &str = "CLOUDFRONT_ORIGIN_FACING";
/// Default range fetch timeout in milliseconds.
const DEFAULT_RANGES_TIMEOUT_MS: u64 = 5_000;
/// Default range document size limit in bytes.
const DEFAULT_RANGES_MAX_BYTES: usize = 8 * 1024 * 1024;
/// Default request attribute that carries the edge secret.
const DEFAULT_SECRET_CONDITION_KEY: &str = "aws:Referer";
/// Default authorizer bind address.
const DEFAULT_BIND: &str = "127.0.0.1:8088";
/// Default maximum request body for the authorizer endpoint.
const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024;

// ============================================================================
// SECTION: Root Configuration
// ============================================================================

/// Trust Gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustGateConfig {
    /// Authorizer HTTP endpoint configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Token authorizer configuration.
    pub authorizer: AuthorizerConfig,
    /// Trust record store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Origin trust synchronizer configuration.
    #[serde(default)]
    pub sync: Option<SyncConfig>,
    /// Audit output configuration.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl TrustGateConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.authorizer.validate()?;
        self.store.validate()?;
        if let Some(sync) = &self.sync {
            sync.validate()?;
        }
        self.audit.validate()?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// Authorizer HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum accepted request body in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ServerConfig {
    /// Validates server configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::Invalid("server.bind must be a socket address".to_string()))?;
        if self.max_body_bytes == 0 || self.max_body_bytes > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("server.max_body_bytes out of range".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Authorizer
// ============================================================================

/// Token authorizer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizerConfig {
    /// Decision cache TTL in seconds (0 disables caching).
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Maximum cached decisions.
    #[serde(default = "default_max_cache_entries")]
    pub max_cache_entries: usize,
    /// Hard per-request verification timeout in milliseconds.
    #[serde(default = "default_verification_timeout_ms")]
    pub verification_timeout_ms: u64,
    /// Clock skew leeway applied to expiry checks.
    #[serde(default)]
    pub leeway_secs: u64,
    /// Revoked token identifiers (`jti`).
    #[serde(default)]
    pub revoked_token_ids: Vec<String>,
    /// Identity domains.
    pub domains: Vec<DomainConfig>,
}

impl AuthorizerConfig {
    /// Validates authorizer configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_ttl_secs > MAX_CACHE_TTL_SECS {
            return Err(ConfigError::Invalid(format!(
                "authorizer.cache_ttl_secs must be <= {MAX_CACHE_TTL_SECS}"
            )));
        }
        if self.max_cache_entries == 0 || self.max_cache_entries > MAX_CACHE_ENTRIES {
            return Err(ConfigError::Invalid("authorizer.max_cache_entries out of range".to_string()));
        }
        if !(MIN_VERIFICATION_TIMEOUT_MS..=MAX_VERIFICATION_TIMEOUT_MS)
            .contains(&self.verification_timeout_ms)
        {
            return Err(ConfigError::Invalid(format!(
                "authorizer.verification_timeout_ms must be between \
                 {MIN_VERIFICATION_TIMEOUT_MS} and {MAX_VERIFICATION_TIMEOUT_MS}"
            )));
        }
        if self.leeway_secs > MAX_LEEWAY_SECS {
            return Err(ConfigError::Invalid(format!(
                "authorizer.leeway_secs must be <= {MAX_LEEWAY_SECS}"
            )));
        }
        if self.revoked_token_ids.len() > MAX_REVOKED_TOKEN_IDS {
            return Err(ConfigError::Invalid("authorizer.revoked_token_ids too large".to_string()));
        }
        if self.revoked_token_ids.iter().any(|jti| jti.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "authorizer.revoked_token_ids entries must be non-empty".to_string(),
            ));
        }
        if self.domains.is_empty() {
            return Err(ConfigError::Invalid("authorizer.domains must be non-empty".to_string()));
        }
        let mut seen = BTreeSet::new();
        for domain in &self.domains {
            if !seen.insert(domain.id) {
                return Err(ConfigError::Invalid(format!(
                    "authorizer.domains contains duplicate domain {}",
                    domain.id
                )));
            }
            domain.validate()?;
        }
        validate_prefix_isolation(&self.domains)
    }
}

/// Identity domain configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Domain identifier.
    pub id: DomainId,
    /// Expected `iss` claim.
    pub issuer: String,
    /// Path prefixes served by this domain.
    pub path_prefixes: Vec<String>,
    /// Accepted audiences (`aud` or `client_id`); empty accepts any.
    #[serde(default)]
    pub audiences: Vec<String>,
    /// Required `token_use` claim value.
    #[serde(default)]
    pub token_use: Option<String>,
    /// Accepted signing algorithms.
    #[serde(default = "default_algorithms")]
    pub algorithms: Vec<String>,
    /// Claim carrying the subject id.
    #[serde(default = "default_subject_claim")]
    pub subject_claim: String,
    /// Claim carrying group memberships.
    #[serde(default = "default_groups_claim")]
    pub groups_claim: String,
    /// Custom claim schema.
    #[serde(default)]
    pub claims: Vec<ClaimRuleConfig>,
    /// Signing key source.
    pub key_source: KeySourceConfig,
}

impl DomainConfig {
    /// Validates a domain entry.
    fn validate(&self) -> Result<(), ConfigError> {
        let label = format!("authorizer.domains[{}]", self.id);
        if self.issuer.trim().is_empty() {
            return Err(ConfigError::Invalid(format!("{label}.issuer must be non-empty")));
        }
        if self.path_prefixes.is_empty() || self.path_prefixes.len() > MAX_PATH_PREFIXES {
            return Err(ConfigError::Invalid(format!(
                "{label}.path_prefixes must contain 1..={MAX_PATH_PREFIXES} entries"
            )));
        }
        for prefix in &self.path_prefixes {
            validate_prefix(&label, prefix)?;
        }
        if self.algorithms.is_empty() {
            return Err(ConfigError::Invalid(format!("{label}.algorithms must be non-empty")));
        }
        for algorithm in &self.algorithms {
            if !SUPPORTED_ALGORITHMS.contains(&algorithm.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "{label}.algorithms contains unsupported algorithm {algorithm}"
                )));
            }
        }
        if self.subject_claim.trim().is_empty() || self.groups_claim.trim().is_empty() {
            return Err(ConfigError::Invalid(format!("{label} claim names must be non-empty")));
        }
        if self.claims.len() > MAX_CLAIM_RULES {
            return Err(ConfigError::Invalid(format!("{label}.claims too large")));
        }
        let mut names = BTreeSet::new();
        for claim in &self.claims {
            if claim.name.trim().is_empty() || !names.insert(claim.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "{label}.claims names must be unique and non-empty"
                )));
            }
        }
        let hmac = self.algorithms.iter().any(|alg| alg.starts_with("HS"));
        match &self.key_source {
            KeySourceConfig::SharedSecret {
                ..
            } if !hmac => Err(ConfigError::Invalid(format!(
                "{label}: shared_secret key source requires an HS* algorithm"
            ))),
            KeySourceConfig::JwksUrl {
                ..
            }
            | KeySourceConfig::Jwks {
                ..
            } if hmac => Err(ConfigError::Invalid(format!(
                "{label}: HS* algorithms require a shared_secret key source"
            ))),
            source => source.validate(&label),
        }
    }
}

/// Signing algorithms accepted in configuration.
const SUPPORTED_ALGORITHMS: &[&str] =
    &["RS256", "RS384", "RS512", "PS256", "PS384", "PS512", "ES256", "ES384", "HS256", "HS384", "HS512"];

/// Expected type of a custom claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimKind {
    /// JSON string.
    String,
    /// JSON array of strings.
    StringArray,
    /// JSON number.
    Number,
    /// JSON boolean.
    Boolean,
}

/// Custom claim rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRuleConfig {
    /// Claim name.
    pub name: String,
    /// Expected type.
    pub kind: ClaimKind,
    /// True when the claim must be present.
    #[serde(default)]
    pub required: bool,
}

/// Signing key source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KeySourceConfig {
    /// Remote JWKS document.
    JwksUrl {
        /// JWKS URL.
        url: String,
        /// Cache lifetime when the response carries no max-age.
        #[serde(default = "default_jwks_cache_ttl_secs")]
        cache_ttl_secs: u64,
        /// Fetch timeout in milliseconds.
        #[serde(default = "default_jwks_timeout_ms")]
        timeout_ms: u64,
        /// Response size limit in bytes.
        #[serde(default = "default_jwks_max_bytes")]
        max_response_bytes: usize,
        /// Minimum interval between refreshes triggered by unknown key ids.
        #[serde(default = "default_jwks_min_refresh_secs")]
        min_refresh_interval_secs: u64,
        /// Allow cleartext http.
        #[serde(default)]
        allow_http: bool,
    },
    /// Inline JWKS document.
    Jwks {
        /// JWKS JSON text.
        document: String,
    },
    /// Shared HMAC secret read from the environment (development).
    SharedSecret {
        /// Environment variable holding the secret.
        secret_env: String,
        /// Optional key id the token must carry.
        #[serde(default)]
        kid: Option<String>,
    },
}

impl KeySourceConfig {
    /// Validates key source settings.
    fn validate(&self, label: &str) -> Result<(), ConfigError> {
        match self {
            Self::JwksUrl {
                url,
                timeout_ms,
                max_response_bytes,
                allow_http,
                ..
            } => {
                validate_fetch_url(&format!("{label}.key_source.url"), url, *allow_http)?;
                if *timeout_ms == 0 || *timeout_ms > MAX_STEP_TIMEOUT_MS {
                    return Err(ConfigError::Invalid(format!(
                        "{label}.key_source.timeout_ms out of range"
                    )));
                }
                if *max_response_bytes == 0 {
                    return Err(ConfigError::Invalid(format!(
                        "{label}.key_source.max_response_bytes must be > 0"
                    )));
                }
                Ok(())
            }
            Self::Jwks {
                document,
            } => {
                let value: serde_json::Value = serde_json::from_str(document).map_err(|err| {
                    ConfigError::Invalid(format!("{label}.key_source.document: {err}"))
                })?;
                if !value.get("keys").is_some_and(serde_json::Value::is_array) {
                    return Err(ConfigError::Invalid(format!(
                        "{label}.key_source.document must contain a keys array"
                    )));
                }
                Ok(())
            }
            Self::SharedSecret {
                secret_env,
                ..
            } => {
                if secret_env.trim().is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "{label}.key_source.secret_env must be non-empty"
                    )));
                }
                Ok(())
            }
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Trust record store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// Process-local store.
    #[default]
    Memory,
    /// `SQLite` database.
    Sqlite,
}

/// Trust record store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store backend type.
    #[serde(rename = "type", default)]
    pub store_type: StoreType,
    /// `SQLite` database path when using the sqlite backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_store_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::default(),
            path: None,
            busy_timeout_ms: default_store_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl StoreConfig {
    /// Validates store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.store_type {
            StoreType::Memory => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid(
                        "memory store must not set store.path".to_string(),
                    ));
                }
            }
            StoreType::Sqlite => {
                let Some(path) = &self.path else {
                    return Err(ConfigError::Invalid("sqlite store requires store.path".to_string()));
                };
                validate_path_string("store.path", &path.to_string_lossy())?;
            }
        }
        Ok(())
    }

    /// Returns the `SQLite` store config when the backend is sqlite.
    #[must_use]
    pub fn sqlite_config(&self) -> Option<SqliteStoreConfig> {
        if self.store_type != StoreType::Sqlite {
            return None;
        }
        let path = self.path.clone()?;
        let mut config = SqliteStoreConfig::at(path);
        config.busy_timeout_ms = self.busy_timeout_ms;
        config.journal_mode = self.journal_mode;
        config.sync_mode = self.sync_mode;
        Some(config)
    }
}

// ============================================================================
// SECTION: Synchronizer
// ============================================================================

/// Origin trust synchronizer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Lease holder identity; defaults to a process-derived id.
    #[serde(default)]
    pub holder_id: Option<String>,
    /// Schedule interval in seconds.
    #[serde(default = "default_sync_interval_secs")]
    pub interval_secs: u64,
    /// Grace window in seconds.
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
    /// Per-step timeout in milliseconds.
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,
    /// Lease lifetime in seconds.
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: u64,
    /// Automatic secret rotation interval in seconds.
    #[serde(default)]
    pub secret_rotation_interval_secs: Option<u64>,
    /// Consecutive fetch failures before an alert event.
    #[serde(default = "default_alert_after_failures")]
    pub alert_after_failures: u32,
    /// Request attribute the edge secret is checked against.
    #[serde(default = "default_secret_condition_key")]
    pub secret_condition_key: String,
    /// Authoritative range source.
    #[serde(default)]
    pub source: RangeSourceConfig,
    /// Protected origins.
    pub origins: Vec<OriginConfig>,
}

impl SyncConfig {
    /// Validates synchronizer configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(holder) = &self.holder_id
            && holder.trim().is_empty()
        {
            return Err(ConfigError::Invalid("sync.holder_id must be non-empty".to_string()));
        }
        if self.interval_secs < MIN_SYNC_INTERVAL_SECS {
            return Err(ConfigError::Invalid(format!(
                "sync.interval_secs must be >= {MIN_SYNC_INTERVAL_SECS}"
            )));
        }
        if self.grace_secs >= self.interval_secs {
            return Err(ConfigError::Invalid(
                "sync.grace_secs must be shorter than sync.interval_secs".to_string(),
            ));
        }
        if !(MIN_STEP_TIMEOUT_MS..=MAX_STEP_TIMEOUT_MS).contains(&self.step_timeout_ms) {
            return Err(ConfigError::Invalid(format!(
                "sync.step_timeout_ms must be between {MIN_STEP_TIMEOUT_MS} and \
                 {MAX_STEP_TIMEOUT_MS}"
            )));
        }
        if self.lease_ttl_secs <= self.grace_secs {
            return Err(ConfigError::Invalid(
                "sync.lease_ttl_secs must exceed sync.grace_secs".to_string(),
            ));
        }
        if let Some(rotation) = self.secret_rotation_interval_secs
            && rotation < self.interval_secs
        {
            return Err(ConfigError::Invalid(
                "sync.secret_rotation_interval_secs must be >= sync.interval_secs".to_string(),
            ));
        }
        if self.alert_after_failures == 0 {
            return Err(ConfigError::Invalid("sync.alert_after_failures must be > 0".to_string()));
        }
        if self.secret_condition_key.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "sync.secret_condition_key must be non-empty".to_string(),
            ));
        }
        self.source.validate()?;
        if self.origins.is_empty() || self.origins.len() > MAX_ORIGINS {
            return Err(ConfigError::Invalid(format!(
                "sync.origins must contain 1..={MAX_ORIGINS} entries"
            )));
        }
        let mut keys = BTreeSet::new();
        for origin in &self.origins {
            origin.validate()?;
            if !keys.insert(origin.key()) {
                return Err(ConfigError::Invalid(format!(
                    "sync.origins contains duplicate origin {}",
                    origin.key()
                )));
            }
        }
        Ok(())
    }

    /// Returns the configured holder id or a process-derived default.
    #[must_use]
    pub fn effective_holder_id(&self) -> String {
        self.holder_id.clone().unwrap_or_else(|| format!("trust-gate-{}", std::process::id()))
    }
}

/// Authoritative range source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RangeSourceConfig {
    /// Provider-published `ip-ranges.json` document.
    Http {
        /// Document URL.
        #[serde(default = "default_ranges_url")]
        url: String,
        /// Service filter.
        #[serde(default = "default_ranges_service")]
        service: String,
        /// Fetch timeout in milliseconds.
        #[serde(default = "default_ranges_timeout_ms")]
        timeout_ms: u64,
        /// Response size limit in bytes.
        #[serde(default = "default_ranges_max_bytes")]
        max_response_bytes: usize,
        /// Allow cleartext http.
        #[serde(default)]
        allow_http: bool,
    },
    /// Fixed range list.
    Static {
        /// IPv4 CIDR ranges.
        #[serde(default)]
        ipv4: Vec<String>,
        /// IPv6 CIDR ranges.
        #[serde(default)]
        ipv6: Vec<String>,
        /// Source label.
        #[serde(default = "default_static_label")]
        label: String,
    },
}

impl Default for RangeSourceConfig {
    fn default() -> Self {
        Self::Http {
            url: default_ranges_url(),
            service: default_ranges_service(),
            timeout_ms: default_ranges_timeout_ms(),
            max_response_bytes: default_ranges_max_bytes(),
            allow_http: false,
        }
    }
}

impl RangeSourceConfig {
    /// Validates range source settings.
    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Http {
                url,
                service,
                timeout_ms,
                max_response_bytes,
                allow_http,
            } => {
                validate_fetch_url("sync.source.url", url, *allow_http)?;
                if service.trim().is_empty() {
                    return Err(ConfigError::Invalid("sync.source.service must be non-empty".to_string()));
                }
                if *timeout_ms == 0 || *timeout_ms > MAX_STEP_TIMEOUT_MS {
                    return Err(ConfigError::Invalid("sync.source.timeout_ms out of range".to_string()));
                }
                if *max_response_bytes == 0 {
                    return Err(ConfigError::Invalid(
                        "sync.source.max_response_bytes must be > 0".to_string(),
                    ));
                }
                Ok(())
            }
            Self::Static {
                ipv4,
                ipv6,
                ..
            } => {
                if ipv4.is_empty() && ipv6.is_empty() {
                    return Err(ConfigError::Invalid(
                        "sync.source static ranges must be non-empty".to_string(),
                    ));
                }
                for (family_v4, value) in
                    ipv4.iter().map(|v| (true, v)).chain(ipv6.iter().map(|v| (false, v)))
                {
                    let range: IpRange = value.parse().map_err(|err| {
                        ConfigError::Invalid(format!("sync.source range {value}: {err}"))
                    })?;
                    if range.is_ipv4() != family_v4 {
                        return Err(ConfigError::Invalid(format!(
                            "sync.source range {value} listed under the wrong family"
                        )));
                    }
                }
                Ok(())
            }
        }
    }
}

/// Protected origin configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OriginConfig {
    /// S3 bucket policy.
    S3Bucket {
        /// Bucket name.
        bucket: String,
        /// Region override.
        #[serde(default)]
        region: Option<String>,
        /// Endpoint override.
        #[serde(default)]
        endpoint: Option<String>,
        /// Force path-style addressing.
        #[serde(default)]
        force_path_style: bool,
    },
    /// API Gateway REST API resource policy.
    ApiGateway {
        /// REST API id.
        rest_api_id: String,
        /// Stage redeployed after a policy change.
        stage: String,
        /// Region override.
        #[serde(default)]
        region: Option<String>,
        /// Endpoint override.
        #[serde(default)]
        endpoint: Option<String>,
    },
    /// Process-local origin (tests and dry runs).
    Memory {
        /// Origin kind.
        kind: OriginKind,
        /// Origin id.
        id: String,
    },
}

impl OriginConfig {
    /// Returns the stable origin key.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::S3Bucket {
                bucket,
                ..
            } => format!("{}:{bucket}", OriginKind::ObjectStore.as_str()),
            Self::ApiGateway {
                rest_api_id,
                ..
            } => format!("{}:{rest_api_id}", OriginKind::ApiLayer.as_str()),
            Self::Memory {
                kind,
                id,
            } => format!("{}:{id}", kind.as_str()),
        }
    }

    /// Validates origin settings.
    fn validate(&self) -> Result<(), ConfigError> {
        let non_empty = |field: &str, value: &str| {
            if value.trim().is_empty() {
                Err(ConfigError::Invalid(format!("sync.origins {field} must be non-empty")))
            } else {
                Ok(())
            }
        };
        match self {
            Self::S3Bucket {
                bucket,
                ..
            } => non_empty("bucket", bucket),
            Self::ApiGateway {
                rest_api_id,
                stage,
                ..
            } => {
                non_empty("rest_api_id", rest_api_id)?;
                non_empty("stage", stage)
            }
            Self::Memory {
                id,
                ..
            } => non_empty("id", id),
        }
    }
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit output target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// Append-only JSON lines file.
    File,
    /// Discard audit events.
    None,
}

/// Audit output configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Output target.
    #[serde(default)]
    pub sink: AuditSinkKind,
    /// File path when `sink = "file"`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl AuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (AuditSinkKind::File, Some(path)) => {
                validate_path_string("audit.path", &path.to_string_lossy())
            }
            (AuditSinkKind::File, None) => {
                Err(ConfigError::Invalid("audit.sink = file requires audit.path".to_string()))
            }
            (_, Some(_)) => {
                Err(ConfigError::Invalid("audit.path is only valid with sink = file".to_string()))
            }
            (_, None) => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Validates one path prefix.
fn validate_prefix(label: &str, prefix: &str) -> Result<(), ConfigError> {
    if !prefix.starts_with('/') {
        return Err(ConfigError::Invalid(format!("{label}: prefix {prefix} must start with /")));
    }
    if prefix.len() > 1 && prefix.ends_with('/') {
        return Err(ConfigError::Invalid(format!(
            "{label}: prefix {prefix} must not end with /"
        )));
    }
    if prefix.contains('\0') || prefix.contains('?') || prefix.contains('#') {
        return Err(ConfigError::Invalid(format!("{label}: prefix {prefix} has invalid characters")));
    }
    let segments: Vec<&str> = prefix.split('/').skip(1).collect();
    if prefix != "/"
        && segments.iter().any(|segment| segment.is_empty() || *segment == "." || *segment == "..")
    {
        return Err(ConfigError::Invalid(format!(
            "{label}: prefix {prefix} has empty or dot segments"
        )));
    }
    Ok(())
}

/// Returns true when `prefix` covers `path` on a segment boundary.
fn prefix_covers(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    path == prefix || path.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/'))
}

/// Rejects any prefix that overlaps a prefix of a different domain.
fn validate_prefix_isolation(domains: &[DomainConfig]) -> Result<(), ConfigError> {
    for (idx, left) in domains.iter().enumerate() {
        for right in domains.iter().skip(idx + 1) {
            for left_prefix in &left.path_prefixes {
                for right_prefix in &right.path_prefixes {
                    if prefix_covers(left_prefix, right_prefix)
                        || prefix_covers(right_prefix, left_prefix)
                    {
                        return Err(ConfigError::Invalid(format!(
                            "path prefix {left_prefix} ({}) overlaps {right_prefix} ({})",
                            left.id, right.id
                        )));
                    }
                }
            }
        }
    }
    Ok(())
}

/// Validates a remote fetch URL scheme.
fn validate_fetch_url(field: &str, url: &str, allow_http: bool) -> Result<(), ConfigError> {
    if url.starts_with("https://") {
        return Ok(());
    }
    if url.starts_with("http://") {
        if allow_http {
            return Ok(());
        }
        return Err(ConfigError::Invalid(format!("{field} uses http:// without allow_http")));
    }
    Err(ConfigError::Invalid(format!("{field} must be an http(s) url")))
}

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates config path limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path-valued field.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    let path = Path::new(trimmed);
    for component in path.components() {
        let component_value = component.as_os_str().to_string_lossy();
        if component_value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Serde Defaults
// ============================================================================

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

const fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

const fn default_cache_ttl_secs() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

const fn default_max_cache_entries() -> usize {
    DEFAULT_MAX_CACHE_ENTRIES
}

const fn default_verification_timeout_ms() -> u64 {
    DEFAULT_VERIFICATION_TIMEOUT_MS
}

fn default_algorithms() -> Vec<String> {
    vec!["RS256".to_string()]
}

fn default_subject_claim() -> String {
    "sub".to_string()
}

fn default_groups_claim() -> String {
    "cognito:groups".to_string()
}

const fn default_jwks_cache_ttl_secs() -> u64 {
    DEFAULT_JWKS_CACHE_TTL_SECS
}

const fn default_jwks_timeout_ms() -> u64 {
    DEFAULT_JWKS_TIMEOUT_MS
}

const fn default_jwks_max_bytes() -> usize {
    DEFAULT_JWKS_MAX_BYTES
}

const fn default_jwks_min_refresh_secs() -> u64 {
    DEFAULT_JWKS_MIN_REFRESH_SECS
}

const fn default_store_busy_timeout_ms() -> u64 {
    5_000
}

const fn default_sync_interval_secs() -> u64 {
    DEFAULT_SYNC_INTERVAL_SECS
}

const fn default_grace_secs() -> u64 {
    DEFAULT_GRACE_SECS
}

const fn default_step_timeout_ms() -> u64 {
    DEFAULT_STEP_TIMEOUT_MS
}

const fn default_lease_ttl_secs() -> u64 {
    DEFAULT_LEASE_TTL_SECS
}

const fn default_alert_after_failures() -> u32 {
    DEFAULT_ALERT_AFTER_FAILURES
}

fn default_secret_condition_key() -> String {
    DEFAULT_SECRET_CONDITION_KEY.to_string()
}

fn default_ranges_url() -> String {
    DEFAULT_RANGES_URL.to_string()
}

fn default_ranges_service() -> String {
    DEFAULT_RANGES_SERVICE.to_string()
}

const fn default_ranges_timeout_ms() -> u64 {
    DEFAULT_RANGES_TIMEOUT_MS
}

const fn default_ranges_max_bytes() -> usize {
    DEFAULT_RANGES_MAX_BYTES
}

fn default_static_label() -> String {
    "static".to_string()
}
